//! Session handlers and broadcast
//!
//! `GameServer` owns the canonical world and every connection's outbound
//! queue. The network layer keeps it behind one `tokio::sync::Mutex` and
//! each request is handled to completion while the lock is held: lookups,
//! generation, mutation and enqueueing of the resulting messages all happen
//! atomically with respect to other sessions.
//!
//! Handlers never talk to connections directly. They record messages in an
//! [`Outbox`], which is dispatched once the handler returns. A rejected
//! request leaves the world untouched and produces a single
//! `ActionRejected` for the requester.

use crate::client_manager::ClientManager;
use crate::config::ServerConfig;
use crate::world::{Damage, Lookup, WorldState};
use log::{debug, info, warn};
use shared::coords::TileKey;
use shared::entity::{EntityKey, EntitySnapshot, ItemKind};
use shared::error::{ValidationError, ValidationResult};
use shared::fence::{
    FenceMaterial, FenceMaterialProvider, FencePieceType, FencePlacementValidator, FenceState,
    FenceStructureManager, PlacementGrid,
};
use shared::protocol::{Action, Envelope, Packet, PROTOCOL_VERSION, SERVER_SESSION};
use shared::{get_timestamp, Inventory, ATTACK_DAMAGE};
use std::collections::BTreeSet;
use std::net::SocketAddr;
use tokio::sync::mpsc::UnboundedSender;

/// Upper bound on the pieces a single clear-enclosure request may touch
const MAX_ENCLOSURE_PIECES: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Everyone,
    Player(u32),
}

/// Messages produced by one handler invocation, in order
#[derive(Debug)]
pub struct Outbox {
    session: u32,
    deliveries: Vec<(Audience, Packet)>,
}

impl Outbox {
    pub fn new(session: u32) -> Self {
        Self {
            session,
            deliveries: Vec::new(),
        }
    }

    pub fn broadcast(&mut self, packet: Packet) {
        self.deliveries.push((Audience::Everyone, packet));
    }

    pub fn send_to(&mut self, player_id: u32, packet: Packet) {
        self.deliveries.push((Audience::Player(player_id), packet));
    }

    /// Broadcasts an effect on an entity obtained through a lookup. An
    /// entity generated by that lookup is announced first.
    pub fn entity_effect<T>(&mut self, lookup: &Lookup<T>, effect: Packet)
    where
        T: Clone + Into<EntitySnapshot>,
    {
        if let Lookup::Generated(entity) = lookup {
            self.broadcast(Packet::EntityCreated {
                entity: entity.clone().into(),
            });
        }
        self.broadcast(effect);
    }

    pub fn deliveries(&self) -> &[(Audience, Packet)] {
        &self.deliveries
    }

    pub fn len(&self) -> usize {
        self.deliveries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deliveries.is_empty()
    }
}

pub struct GameServer {
    world: WorldState,
    clients: ClientManager,
    validator: FencePlacementValidator,
    structures: FenceStructureManager,
    auto_orient: bool,
    tick: u64,
}

impl GameServer {
    pub fn new(config: &ServerConfig, world: WorldState) -> Self {
        Self {
            world,
            clients: ClientManager::new(config.max_clients),
            validator: FencePlacementValidator::new(config.enforce_ownership),
            structures: FenceStructureManager::new(),
            auto_orient: config.auto_orient,
            tick: 0,
        }
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut WorldState {
        &mut self.world
    }

    pub fn clients(&self) -> &ClientManager {
        &self.clients
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn set_ownership_enforcement(&mut self, enabled: bool) {
        self.validator.set_ownership_enforcement(enabled);
    }

    // --- connection lifecycle ---

    /// Registers a new connection. When the server is full the connection
    /// is told so through its queue and `None` is returned.
    pub fn accept(&mut self, addr: SocketAddr, outbound: UnboundedSender<Envelope>) -> Option<u32> {
        match self.clients.add_client(addr, outbound.clone()) {
            Some(client_id) => Some(client_id),
            None => {
                warn!("Rejecting connection from {}: server full", addr);
                let _ = outbound.send(Envelope::new(
                    SERVER_SESSION,
                    Packet::Disconnected {
                        reason: "Server full".to_string(),
                    },
                ));
                None
            }
        }
    }

    pub fn is_connected(&self, client_id: u32) -> bool {
        self.clients.get(client_id).is_some()
    }

    /// Entry point for every frame read from a connection
    pub fn handle_packet(&mut self, client_id: u32, packet: Packet) {
        match (packet, self.clients.player_of(client_id)) {
            (
                Packet::Connect {
                    client_version,
                    player_name,
                },
                None,
            ) => self.connect(client_id, client_version, &player_name),
            (Packet::Connect { .. }, Some(player_id)) => {
                warn!("Player {} sent a second connect", player_id);
            }
            (Packet::Heartbeat, _) => {}
            (Packet::Disconnect, _) => self.disconnect(client_id, None),
            (packet, None) => {
                debug!(
                    "Ignoring {:?} from connection {} before connect",
                    packet, client_id
                );
            }
            (packet, Some(player_id)) => self.handle_request(player_id, packet),
        }
    }

    fn handle_request(&mut self, player_id: u32, packet: Packet) {
        let mut out = Outbox::new(player_id);
        let (action, result) = match packet {
            Packet::Move { x, y } => (Action::Move, self.handle_move(player_id, x, y, &mut out)),
            Packet::Attack { target } => (
                Action::Attack,
                self.handle_attack(player_id, target, &mut out),
            ),
            Packet::PlaceFence {
                position,
                material,
                piece_type,
            } => (
                Action::PlaceFence,
                self.handle_fence_place(player_id, position, material, piece_type, &mut out),
            ),
            Packet::RemoveFence { fence_id } => (
                Action::RemoveFence,
                self.handle_fence_remove(player_id, fence_id, &mut out),
            ),
            Packet::ClearEnclosure { near } => (
                Action::ClearEnclosure,
                self.handle_clear_enclosure(player_id, near, &mut out),
            ),
            Packet::Plant { position } => (
                Action::Plant,
                self.handle_plant(player_id, position, &mut out),
            ),
            Packet::PickUp { item_id } => (
                Action::PickUp,
                self.handle_pickup(player_id, item_id, &mut out),
            ),
            Packet::RequestResync => {
                self.handle_resync(player_id, &mut out);
                self.dispatch(out);
                return;
            }
            other => {
                warn!("Unexpected packet from player {}: {:?}", player_id, other);
                return;
            }
        };

        if let Err(reason) = result {
            debug!("Rejected {:?} from player {}: {}", action, player_id, reason);
            out.send_to(player_id, Packet::ActionRejected { action, reason });
        }
        self.dispatch(out);
    }

    /// Queues every message of an outbox on the addressed connections
    pub fn dispatch(&mut self, out: Outbox) {
        let session = out.session;
        for (audience, packet) in out.deliveries {
            let envelope = Envelope::new(session, packet);
            match audience {
                Audience::Everyone => self.clients.broadcast(&envelope),
                Audience::Player(player_id) => self.clients.send_to_player(player_id, envelope),
            }
        }
    }

    fn connect(&mut self, client_id: u32, client_version: u32, player_name: &str) {
        let name = player_name.trim();
        let refusal = if client_version != PROTOCOL_VERSION {
            Some(format!(
                "Protocol version mismatch (server {}, client {})",
                PROTOCOL_VERSION, client_version
            ))
        } else if name.is_empty() {
            Some("Player name required".to_string())
        } else {
            None
        };
        if let Some(reason) = refusal {
            self.disconnect(client_id, Some(&reason));
            return;
        }

        let player_id = self.world.register_player(name);
        if self.clients.find_by_player(player_id).is_some() {
            self.disconnect(client_id, Some("Player already connected"));
            return;
        }

        let player = self.world.spawn_player(player_id, name);
        self.clients.bind_player(client_id, player_id, name);
        info!(
            "Player {} ({}) joined on connection {}",
            player_id, name, client_id
        );

        let mut out = Outbox::new(player_id);
        out.send_to(
            player_id,
            Packet::Connected {
                player_id,
                world_seed: self.world.seed(),
            },
        );
        self.handle_resync(player_id, &mut out);
        out.broadcast(Packet::PlayerJoined { player });
        self.dispatch(out);
    }

    /// Closes a connection, optionally telling the client why. The player's
    /// inventory and fences stay in the world.
    pub fn disconnect(&mut self, client_id: u32, reason: Option<&str>) {
        if let Some(reason) = reason {
            info!("Disconnecting connection {}: {}", client_id, reason);
            self.clients.send_to_client(
                client_id,
                Envelope::new(
                    SERVER_SESSION,
                    Packet::Disconnected {
                        reason: reason.to_string(),
                    },
                ),
            );
        }

        let Some(client) = self.clients.remove_client(client_id) else {
            return;
        };
        if let Some(player_id) = client.player_id {
            self.world.despawn_player(player_id);
            info!("Player {} left", player_id);
            let mut out = Outbox::new(player_id);
            out.broadcast(Packet::PlayerLeft { player_id });
            self.dispatch(out);
        }
    }

    /// Advances timers; saplings that finish growing become trees
    pub fn tick(&mut self) {
        self.tick += 1;
        let grown = self.world.tick_saplings();
        if grown.is_empty() {
            return;
        }

        let mut out = Outbox::new(SERVER_SESSION);
        for (sapling, tree) in grown {
            debug!("Sapling at {} grew into a tree", sapling.key);
            out.broadcast(Packet::EntityDestroyed {
                key: EntityKey::Sapling(sapling.key),
            });
            out.broadcast(Packet::EntityCreated {
                entity: EntitySnapshot::Tree(tree),
            });
        }
        self.dispatch(out);
    }

    // --- request handlers ---

    fn player_position(&self, player_id: u32) -> Result<(f32, f32), ValidationError> {
        self.world
            .player(player_id)
            .map(|player| (player.x, player.y))
            .ok_or(ValidationError::NotConnected)
    }

    fn inventory_update(&self, player_id: u32) -> Packet {
        Packet::InventoryUpdate {
            player_id,
            counts: self
                .world
                .inventory(player_id)
                .map(|inventory| inventory.counts().clone())
                .unwrap_or_default(),
        }
    }

    pub fn handle_move(&mut self, player_id: u32, x: f32, y: f32, out: &mut Outbox) -> ValidationResult {
        if !x.is_finite() || !y.is_finite() {
            return Err(ValidationError::InvalidPosition);
        }
        self.world
            .move_player(player_id, x, y)
            .ok_or(ValidationError::NotConnected)?;
        out.broadcast(Packet::PlayerMoved { player_id, x, y });
        Ok(())
    }

    /// Damages a tree or stone, generating it first if nobody has touched
    /// its tile yet
    pub fn handle_attack(&mut self, player_id: u32, target: EntityKey, out: &mut Outbox) -> ValidationResult {
        let (px, py) = self.player_position(player_id)?;
        match target {
            EntityKey::Tree(tile) => {
                if !self.world.in_reach(player_id, tile) {
                    return Err(ValidationError::OutOfReach { key: target });
                }
                let lookup = self.world.generate_tree_at(tile);
                let outcome = match lookup.entity() {
                    Some(_) => self.world.damage_tree(tile, ATTACK_DAMAGE),
                    None => None,
                };
                match outcome {
                    Some(Damage::Damaged { health }) => {
                        out.entity_effect(&lookup, Packet::EntityHealthUpdate { key: target, health });
                    }
                    Some(Damage::Destroyed(tree)) => {
                        info!("Player {} felled the {:?} at {}", player_id, tree.kind, tile);
                        out.entity_effect(&lookup, Packet::EntityHealthUpdate { key: target, health: 0 });
                        out.broadcast(Packet::EntityDestroyed { key: target });
                        self.drop_items(tile, &tree.drops(), out);
                    }
                    None => return Err(ValidationError::NoSuchEntity { key: target }),
                }
            }
            EntityKey::Stone(tile) => {
                if !self.world.in_reach(player_id, tile) {
                    return Err(ValidationError::OutOfReach { key: target });
                }
                let lookup = self.world.generate_stone_at(tile, px, py);
                let outcome = match lookup.entity() {
                    Some(_) => self.world.damage_stone(tile, ATTACK_DAMAGE),
                    None => None,
                };
                match outcome {
                    Some(Damage::Damaged { health }) => {
                        out.entity_effect(&lookup, Packet::EntityHealthUpdate { key: target, health });
                    }
                    Some(Damage::Destroyed(stone)) => {
                        info!("Player {} broke the stone at {}", player_id, tile);
                        out.entity_effect(&lookup, Packet::EntityHealthUpdate { key: target, health: 0 });
                        out.broadcast(Packet::EntityDestroyed { key: target });
                        self.drop_items(tile, &stone.drops(), out);
                    }
                    None => return Err(ValidationError::NoSuchEntity { key: target }),
                }
            }
            EntityKey::Sapling(_) | EntityKey::Item(_) => {
                return Err(ValidationError::NoSuchEntity { key: target });
            }
        }
        Ok(())
    }

    fn drop_items(&mut self, tile: TileKey, drops: &[(ItemKind, u32)], out: &mut Outbox) {
        for item in self.world.drop_items(tile, drops) {
            out.broadcast(Packet::EntityCreated {
                entity: EntitySnapshot::Item(item),
            });
        }
    }

    /// Places one fence piece. Without an explicit piece type the type is
    /// inferred from the occupied neighbours.
    pub fn handle_fence_place(
        &mut self,
        player_id: u32,
        position: TileKey,
        material: FenceMaterial,
        piece_type: Option<FencePieceType>,
        out: &mut Outbox,
    ) -> ValidationResult {
        if self.world.player(player_id).is_none() {
            return Err(ValidationError::NotConnected);
        }
        if !self.world.in_reach(player_id, position) {
            return Err(ValidationError::PositionOutOfReach { position });
        }

        let empty = Inventory::new();
        let inventory = self.world.inventory(player_id).unwrap_or(&empty);
        self.validator
            .validate_placement(&self.world, inventory, position, material, player_id)?;

        if !self.world.inventory_mut(player_id).consume_materials(material, 1) {
            return Err(ValidationError::InsufficientMaterials { material });
        }

        let piece_type = piece_type
            .or_else(|| self.structures.infer_piece_type(self.world.fences(), position))
            .unwrap_or(FencePieceType::Top);
        let fence = FenceState {
            id: self.world.allocate_fence_id(),
            position,
            piece_type,
            material,
            owner_id: player_id,
            created_at: get_timestamp(),
        };
        debug!(
            "Player {} placed {:?} fence {} at {}",
            player_id, material, fence.id, position
        );
        self.world.add_or_update_fence(fence.clone());

        out.broadcast(Packet::FenceCreated { fence });
        self.reorient_around(position, out);
        out.broadcast(self.inventory_update(player_id));
        Ok(())
    }

    /// Removes a piece and gives its material back to the owner
    pub fn handle_fence_remove(&mut self, player_id: u32, fence_id: u64, out: &mut Outbox) -> ValidationResult {
        let fence = self.remove_piece(player_id, fence_id, out)?;
        self.reorient_around(fence.position, out);
        out.broadcast(self.inventory_update(fence.owner_id));
        Ok(())
    }

    /// Validates and removes one piece, refunding its owner. Announces only
    /// the removal; reorientation and inventory updates are up to the caller.
    fn remove_piece(&mut self, player_id: u32, fence_id: u64, out: &mut Outbox) -> Result<FenceState, ValidationError> {
        if self.world.player(player_id).is_none() {
            return Err(ValidationError::NotConnected);
        }

        let position = self
            .world
            .fence(fence_id)
            .map(|fence| fence.position)
            .ok_or(ValidationError::UnknownFence { fence_id })?;
        self.validator
            .validate_removal(&self.world, position, player_id)?;

        let fence = self
            .world
            .remove_fence(fence_id)
            .ok_or(ValidationError::UnknownFence { fence_id })?;
        self.world
            .inventory_mut(fence.owner_id)
            .return_materials(fence.material, 1);
        debug!(
            "Player {} removed fence {} owned by {}",
            player_id, fence_id, fence.owner_id
        );

        out.broadcast(Packet::FenceRemoved { fence_id });
        Ok(fence)
    }

    /// Removes every piece of the requester's that is connected to the
    /// piece at or next to `near`
    pub fn handle_clear_enclosure(&mut self, player_id: u32, near: TileKey, out: &mut Outbox) -> ValidationResult {
        if self.world.player(player_id).is_none() {
            return Err(ValidationError::NotConnected);
        }
        if !self.world.in_reach(player_id, near) {
            return Err(ValidationError::PositionOutOfReach { position: near });
        }

        let start = std::iter::once(near)
            .chain(near.neighbors())
            .find(|position| self.world.fences().contains_position(*position))
            .ok_or(ValidationError::NoFencePiece { position: near })?;

        let owned: Vec<u64> = self
            .world
            .fences()
            .connected_component(start, MAX_ENCLOSURE_PIECES)
            .into_iter()
            .filter(|id| {
                self.world
                    .fence(*id)
                    .map_or(false, |fence| fence.owner_id == player_id)
            })
            .collect();

        if owned.is_empty() {
            let owner_id = self.world.owner_at(start).unwrap_or_default();
            return Err(ValidationError::NotOwner {
                position: start,
                owner_id,
            });
        }

        info!(
            "Player {} clearing {} pieces around {}",
            player_id,
            owned.len(),
            near
        );
        let mut removed = Vec::with_capacity(owned.len());
        for fence_id in owned {
            match self.remove_piece(player_id, fence_id, out) {
                Ok(fence) => removed.push(fence.position),
                Err(reason) => debug!("Skipped fence {} while clearing: {}", fence_id, reason),
            }
        }

        // Only survivors bordering the cleared cells can change shape
        let borders: BTreeSet<TileKey> = removed
            .iter()
            .flat_map(|position| position.neighbors())
            .filter(|position| self.world.fences().contains_position(*position))
            .collect();
        let borders: Vec<TileKey> = borders.into_iter().collect();
        if self.auto_orient {
            let changes = self.structures.reorient_pieces(self.world.fences(), &borders);
            self.apply_reorientation(changes, out);
        }

        out.broadcast(self.inventory_update(player_id));
        Ok(())
    }

    /// Re-derives the pieces next to `position` and announces the changes
    fn reorient_around(&mut self, position: TileKey, out: &mut Outbox) {
        if !self.auto_orient {
            return;
        }
        let changes = self
            .structures
            .reorient_neighbors(self.world.fences(), position);
        self.apply_reorientation(changes, out);
    }

    fn apply_reorientation(&mut self, changes: Vec<(u64, FencePieceType)>, out: &mut Outbox) {
        for (fence_id, piece_type) in changes {
            let Some(mut fence) = self.world.fence(fence_id).cloned() else {
                continue;
            };
            fence.piece_type = piece_type;
            self.world.add_or_update_fence(fence.clone());
            out.broadcast(Packet::FenceCreated { fence });
        }
    }

    pub fn handle_plant(&mut self, player_id: u32, position: TileKey, out: &mut Outbox) -> ValidationResult {
        if self.world.player(player_id).is_none() {
            return Err(ValidationError::NotConnected);
        }
        if !self.world.in_reach(player_id, position) {
            return Err(ValidationError::OutOfReach {
                key: EntityKey::Sapling(position),
            });
        }
        let has_sapling = self
            .world
            .inventory(player_id)
            .map_or(false, |inventory| inventory.count(ItemKind::Sapling) > 0);
        if !has_sapling {
            return Err(ValidationError::NoSapling);
        }
        if !self.world.biome_at(position).supports_trees()
            || self.world.is_blocked(position)
            || self.world.is_occupied(position)
        {
            return Err(ValidationError::PositionBlocked { position });
        }

        self.world.inventory_mut(player_id).remove(ItemKind::Sapling, 1);
        let sapling = self.world.plant_sapling(position, player_id);
        debug!("Player {} planted a sapling at {}", player_id, position);

        out.broadcast(Packet::EntityCreated {
            entity: EntitySnapshot::Sapling(sapling),
        });
        out.broadcast(self.inventory_update(player_id));
        Ok(())
    }

    pub fn handle_pickup(&mut self, player_id: u32, item_id: u64, out: &mut Outbox) -> ValidationResult {
        if self.world.player(player_id).is_none() {
            return Err(ValidationError::NotConnected);
        }
        let key = EntityKey::Item(item_id);
        let tile = self
            .world
            .item(item_id)
            .map(|item| item.tile)
            .ok_or(ValidationError::NoSuchEntity { key })?;
        if !self.world.in_reach(player_id, tile) {
            return Err(ValidationError::OutOfReach { key });
        }

        let item = self
            .world
            .take_item(item_id)
            .ok_or(ValidationError::NoSuchEntity { key })?;
        self.world
            .inventory_mut(player_id)
            .add(item.kind, item.quantity);

        out.broadcast(Packet::EntityDestroyed { key });
        out.broadcast(self.inventory_update(player_id));
        Ok(())
    }

    /// Full world and inventory, for the requester only
    pub fn handle_resync(&mut self, player_id: u32, out: &mut Outbox) {
        out.send_to(
            player_id,
            Packet::WorldSnapshot {
                snapshot: Box::new(self.world.snapshot()),
            },
        );
        out.send_to(
            player_id,
            Packet::InventorySync {
                counts: self
                    .world
                    .inventory(player_id)
                    .map(|inventory| inventory.counts().clone())
                    .unwrap_or_default(),
            },
        );
    }
}
