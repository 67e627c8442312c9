//! Client update loop
//!
//! Each tick drains server messages into the world mirror, routes the keys
//! pressed since the last tick through the input controller, and turns
//! confirmed targets into requests. Fence requests are checked with the same
//! validator the server uses before they are sent; the effect itself is only
//! applied once the server broadcasts it.

use crate::input::{InputController, InputSource, Intent, Key, TargetPurpose};
use crate::network::{NetworkClient, NetworkEvent};
use crate::targeting::{TargetCallback, TargetOutcome, TargetValidator};
use crate::world::{ClientWorld, GameMessageHandler};
use log::{debug, info, warn};
use shared::fence::{FencePlacementValidator, PlacementGrid};
use shared::{Direction, ItemKind, Packet, TileKey, SPAWN_POINT, TILE_SIZE};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::time::{Duration, Instant};

type Outcomes = Rc<RefCell<Vec<(TargetPurpose, TargetOutcome)>>>;

pub struct GameClient {
    handler: GameMessageHandler,
    input: InputController,
    validator: FencePlacementValidator,
    outcomes: Outcomes,
    position: (f32, f32),
    tick: u64,
    running: bool,
}

impl GameClient {
    pub fn new(stability_ticks: u32) -> Self {
        Self {
            handler: GameMessageHandler::new(),
            input: InputController::new(stability_ticks),
            // Ownership is the server's call; the client only checks what it can see
            validator: FencePlacementValidator::new(false),
            outcomes: Rc::new(RefCell::new(Vec::new())),
            position: SPAWN_POINT,
            tick: 0,
            running: true,
        }
    }

    pub fn world(&self) -> &ClientWorld {
        self.handler.world()
    }

    pub fn handler(&self) -> &GameMessageHandler {
        &self.handler
    }

    pub fn input(&self) -> &InputController {
        &self.input
    }

    pub fn position(&self) -> (f32, f32) {
        self.position
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// One client tick; returns the requests to send, in order
    pub fn update(&mut self, keys: &[Key], incoming: Vec<Packet>) -> Vec<Packet> {
        self.tick += 1;
        self.input.tick();
        self.handler.tick();

        for packet in incoming {
            self.track_own_position(&packet);
            if let Err(e) = self.handler.handle(packet) {
                debug!("Tick {}: {}", self.tick, e);
            }
        }

        let mut out = self.handler.drain_outgoing();
        for key in keys {
            if let Some(intent) = self.input.handle_key(*key) {
                self.apply_intent(intent, &mut out);
            }
        }
        self.resolve_targets(&mut out);
        out.extend(self.handler.drain_outgoing());
        out
    }

    /// Drives the client until the player quits or the connection closes
    pub fn run(
        &mut self,
        network: &mut NetworkClient,
        input: &mut dyn InputSource,
        tick_duration: Duration,
    ) {
        info!("Client loop running at {:?} per tick", tick_duration);

        while self.running {
            let started = Instant::now();

            let mut incoming = Vec::new();
            let mut closed = None;
            for event in network.poll() {
                match event {
                    NetworkEvent::Received(envelope) => incoming.push(envelope.packet),
                    NetworkEvent::Closed { reason } => closed = Some(reason),
                }
            }

            let keys = input.poll_keys();
            for packet in self.update(&keys, incoming) {
                if !network.send(packet) {
                    warn!("Connection closed, request dropped");
                }
            }

            if let Some(reason) = closed {
                warn!("Connection lost: {}", reason);
                break;
            }

            std::thread::sleep(tick_duration.saturating_sub(started.elapsed()));
        }

        network.disconnect();
    }

    fn track_own_position(&mut self, packet: &Packet) {
        let me = self.world().player_id();
        let own = match packet {
            Packet::Connected { player_id, .. } => {
                // Player records arrive right after; until then stay at spawn
                debug!("Local player is {}", player_id);
                None
            }
            Packet::PlayerJoined { player } if Some(player.id) == me => Some((player.x, player.y)),
            Packet::WorldSnapshot { snapshot } => snapshot
                .players
                .iter()
                .find(|p| Some(p.id) == me)
                .map(|p| (p.x, p.y)),
            _ => None,
        };
        if let Some(position) = own {
            self.position = position;
        }
    }

    fn apply_intent(&mut self, intent: Intent, out: &mut Vec<Packet>) {
        match intent {
            Intent::Walk(direction) => {
                if !self.handler.is_connected() {
                    return;
                }
                self.position = step(self.position, direction);
                out.push(Packet::Move {
                    x: self.position.0,
                    y: self.position.1,
                });
            }
            Intent::BeginTargeting(purpose) => self.begin_targeting(purpose),
            Intent::Resync => {
                if !self.handler.request_resync() {
                    self.handler.notify("Resync already requested".to_string());
                }
            }
            Intent::Quit => self.running = false,
            Intent::Notice(message) => self.handler.notify(message),
        }
    }

    fn begin_targeting(&mut self, purpose: TargetPurpose) {
        if !self.handler.is_connected() {
            self.handler.notify("Not connected".to_string());
            return;
        }

        let origin = TileKey::from_world(self.position.0, self.position.1);
        let valid = self.valid_tiles_around(origin, purpose);
        let validator: Box<dyn TargetValidator> =
            Box::new(move |tile: TileKey| valid.contains(&tile));

        let sink = Rc::clone(&self.outcomes);
        let callback: TargetCallback =
            Box::new(move |outcome| sink.borrow_mut().push((purpose, outcome)));

        if let Err(e) = self.input.begin_targeting(self.position, Some(validator), callback) {
            self.handler.notify(e.to_string());
        }
    }

    /// Tiles in the 3x3 box around `origin` a confirmed target may land on
    fn valid_tiles_around(&self, origin: TileKey, purpose: TargetPurpose) -> HashSet<TileKey> {
        let world = self.world();
        let player_id = world.player_id().unwrap_or_default();
        let material = self.input.selected_material();

        let mut valid = HashSet::new();
        for dy in -1..=1 {
            for dx in -1..=1 {
                let tile = origin.offset(dx, dy);
                let ok = match purpose {
                    TargetPurpose::Attack => world.attack_target(tile).is_some(),
                    TargetPurpose::PickUp => world.item_at(tile).is_some(),
                    TargetPurpose::Plant => !world.is_blocked(tile) && !world.is_occupied(tile),
                    TargetPurpose::PlaceFence => self
                        .validator
                        .validate_placement(world, world.inventory(), tile, material, player_id)
                        .is_ok(),
                    TargetPurpose::RemoveFence | TargetPurpose::ClearEnclosure => {
                        world.fence_at(tile).is_some()
                    }
                };
                if ok {
                    valid.insert(tile);
                }
            }
        }
        valid
    }

    fn resolve_targets(&mut self, out: &mut Vec<Packet>) {
        let outcomes: Vec<_> = self.outcomes.borrow_mut().drain(..).collect();
        for (purpose, outcome) in outcomes {
            let tile = match outcome {
                TargetOutcome::Confirmed(tile) => tile,
                TargetOutcome::Cancelled => {
                    debug!("{:?} cancelled", purpose);
                    continue;
                }
            };
            match self.request_for(purpose, tile) {
                Ok(packet) => out.push(packet),
                Err(message) => self.handler.notify(message),
            }
        }
    }

    fn request_for(&self, purpose: TargetPurpose, tile: TileKey) -> Result<Packet, String> {
        let world = self.world();
        let player_id = world.player_id().unwrap_or_default();
        match purpose {
            TargetPurpose::Attack => world
                .attack_target(tile)
                .map(|target| Packet::Attack { target })
                .ok_or_else(|| format!("Nothing to attack at {}", tile)),
            TargetPurpose::PickUp => world
                .item_at(tile)
                .map(|item| Packet::PickUp { item_id: item.id })
                .ok_or_else(|| format!("Nothing to pick up at {}", tile)),
            TargetPurpose::Plant => {
                if world.inventory().count(ItemKind::Sapling) == 0 {
                    return Err("Cannot plant: no sapling to plant".to_string());
                }
                Ok(Packet::Plant { position: tile })
            }
            TargetPurpose::PlaceFence => {
                let material = self.input.selected_material();
                self.validator
                    .validate_placement(world, world.inventory(), tile, material, player_id)
                    .map_err(|e| format!("Cannot place fence: {}", e))?;
                Ok(Packet::PlaceFence {
                    position: tile,
                    material,
                    piece_type: self.input.selected_piece(),
                })
            }
            TargetPurpose::RemoveFence => {
                self.validator
                    .validate_removal(world, tile, player_id)
                    .map_err(|e| format!("Cannot remove fence: {}", e))?;
                world
                    .fence_at(tile)
                    .map(|fence| Packet::RemoveFence { fence_id: fence.id })
                    .ok_or_else(|| format!("No fence at {}", tile))
            }
            TargetPurpose::ClearEnclosure => Ok(Packet::ClearEnclosure { near: tile }),
        }
    }
}

fn step(position: (f32, f32), direction: Direction) -> (f32, f32) {
    let (dx, dy) = direction.delta();
    (
        position.0 + dx as f32 * TILE_SIZE,
        position.1 + dy as f32 * TILE_SIZE,
    )
}
