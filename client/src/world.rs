//! Client-side mirror of the world and the handler that applies server deltas
//!
//! The client never predicts world entities: everything in `ClientWorld`
//! arrived from the server. An effect that names an entity the mirror has
//! never seen means a message was missed, so the handler asks for a fresh
//! snapshot. Only one resync request is outstanding at any time.

use log::{debug, info, warn};
use shared::fence::{FenceGrid, PlacementGrid};
use shared::protocol::Action;
use shared::{
    Biome, BiomeMap, EntityKey, EntitySnapshot, FenceState, Inventory, ItemState, Packet,
    PlayerState, SaplingState, StoneState, TileKey, TreeState, ValidationError, WorldSnapshot,
};
use shared::generation;
use std::collections::{HashMap, HashSet, VecDeque};
use thiserror::Error;

/// Ticks a notification stays visible
pub const NOTIFICATION_TICKS: u32 = 120;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyError {
    #[error("update for unknown entity {key}")]
    UnknownEntity { key: EntityKey },
    #[error("update for unknown fence {fence_id}")]
    UnknownFence { fence_id: u64 },
    #[error("update for unknown player {player_id}")]
    UnknownPlayer { player_id: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub remaining_ticks: u32,
}

#[derive(Debug, Default)]
pub struct ClientWorld {
    player_id: Option<u32>,
    biomes: Option<BiomeMap>,
    trees: HashMap<TileKey, TreeState>,
    stones: HashMap<TileKey, StoneState>,
    saplings: HashMap<TileKey, SaplingState>,
    items: HashMap<u64, ItemState>,
    fences: FenceGrid,
    players: HashMap<u32, PlayerState>,
    inventory: Inventory,
    /// Tiles whose generated tree or stone has been destroyed
    cleared: HashSet<EntityKey>,
}

impl ClientWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn player_id(&self) -> Option<u32> {
        self.player_id
    }

    pub fn seed(&self) -> Option<u64> {
        self.biomes.as_ref().map(BiomeMap::seed)
    }

    pub fn local_player(&self) -> Option<&PlayerState> {
        self.player_id.and_then(|id| self.players.get(&id))
    }

    pub fn player(&self, player_id: u32) -> Option<&PlayerState> {
        self.players.get(&player_id)
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerState> {
        self.players.values()
    }

    pub fn tree(&self, tile: TileKey) -> Option<&TreeState> {
        self.trees.get(&tile)
    }

    pub fn stone(&self, tile: TileKey) -> Option<&StoneState> {
        self.stones.get(&tile)
    }

    pub fn sapling(&self, tile: TileKey) -> Option<&SaplingState> {
        self.saplings.get(&tile)
    }

    pub fn item(&self, item_id: u64) -> Option<&ItemState> {
        self.items.get(&item_id)
    }

    /// First item pile lying on `tile`, lowest id first
    pub fn item_at(&self, tile: TileKey) -> Option<&ItemState> {
        self.items
            .values()
            .filter(|item| item.tile == tile)
            .min_by_key(|item| item.id)
    }

    pub fn fences(&self) -> &FenceGrid {
        &self.fences
    }

    pub fn fence_at(&self, tile: TileKey) -> Option<&FenceState> {
        self.fences.at(tile)
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    /// Entity an attack on `tile` would hit, counting content the server
    /// generates on first touch
    pub fn attack_target(&self, tile: TileKey) -> Option<EntityKey> {
        if self.trees.contains_key(&tile) {
            return Some(EntityKey::Tree(tile));
        }
        if self.stones.contains_key(&tile) {
            return Some(EntityKey::Stone(tile));
        }
        let biomes = self.biomes.as_ref()?;
        let tree = EntityKey::Tree(tile);
        let stone = EntityKey::Stone(tile);
        if !self.cleared.contains(&tree) && generation::tree_at(biomes, tile).is_some() {
            Some(tree)
        } else if !self.cleared.contains(&stone) && generation::stone_at(biomes, tile).is_some() {
            Some(stone)
        } else {
            None
        }
    }

    pub fn entity_count(&self) -> usize {
        self.trees.len() + self.stones.len() + self.saplings.len() + self.items.len()
    }

    /// Applies one server message to the mirror
    pub fn apply(&mut self, packet: &Packet) -> Result<(), ConsistencyError> {
        match packet {
            Packet::Connected {
                player_id,
                world_seed,
            } => {
                self.player_id = Some(*player_id);
                if self.seed() != Some(*world_seed) {
                    self.biomes = Some(BiomeMap::new(*world_seed));
                }
            }
            Packet::WorldSnapshot { snapshot } => self.load_snapshot(snapshot),
            Packet::EntityCreated { entity } => self.insert_entity(entity.clone()),
            Packet::EntityHealthUpdate { key, health } => self.set_health(*key, *health)?,
            Packet::EntityDestroyed { key } => self.remove_entity(*key)?,
            Packet::FenceCreated { fence } => {
                self.fences.add_or_update(fence.clone());
            }
            Packet::FenceRemoved { fence_id } => {
                if self.fences.remove(*fence_id).is_none() {
                    return Err(ConsistencyError::UnknownFence {
                        fence_id: *fence_id,
                    });
                }
            }
            Packet::InventoryUpdate { player_id, counts } => {
                if Some(*player_id) == self.player_id {
                    self.inventory = Inventory::from_counts(counts.clone());
                }
            }
            Packet::InventorySync { counts } => {
                self.inventory = Inventory::from_counts(counts.clone());
            }
            Packet::PlayerJoined { player } => {
                self.players.insert(player.id, player.clone());
            }
            Packet::PlayerMoved { player_id, x, y } => {
                let Some(player) = self.players.get_mut(player_id) else {
                    return Err(ConsistencyError::UnknownPlayer {
                        player_id: *player_id,
                    });
                };
                player.x = *x;
                player.y = *y;
            }
            Packet::PlayerLeft { player_id } => {
                self.players.remove(player_id);
            }
            other => debug!("World mirror ignores {:?}", other),
        }
        Ok(())
    }

    fn load_snapshot(&mut self, snapshot: &WorldSnapshot) {
        self.trees = snapshot.trees.iter().map(|t| (t.key, t.clone())).collect();
        self.stones = snapshot.stones.iter().map(|s| (s.key, s.clone())).collect();
        self.saplings = snapshot
            .saplings
            .iter()
            .map(|s| (s.key, s.clone()))
            .collect();
        self.items = snapshot.items.iter().map(|i| (i.id, i.clone())).collect();
        self.fences.clear();
        for fence in &snapshot.fences {
            self.fences.add_or_update(fence.clone());
        }
        self.players = snapshot
            .players
            .iter()
            .map(|p| (p.id, p.clone()))
            .collect();
        self.cleared = snapshot
            .cleared_trees
            .iter()
            .map(|tile| EntityKey::Tree(*tile))
            .chain(snapshot.cleared_stones.iter().map(|tile| EntityKey::Stone(*tile)))
            .collect();
    }

    fn insert_entity(&mut self, entity: EntitySnapshot) {
        match entity {
            EntitySnapshot::Tree(tree) => {
                self.trees.insert(tree.key, tree);
            }
            EntitySnapshot::Stone(stone) => {
                self.stones.insert(stone.key, stone);
            }
            EntitySnapshot::Sapling(sapling) => {
                self.saplings.insert(sapling.key, sapling);
            }
            EntitySnapshot::Item(item) => {
                self.items.insert(item.id, item);
            }
        }
    }

    fn set_health(&mut self, key: EntityKey, health: u32) -> Result<(), ConsistencyError> {
        let slot = match key {
            EntityKey::Tree(tile) => self.trees.get_mut(&tile).map(|t| &mut t.health),
            EntityKey::Stone(tile) => self.stones.get_mut(&tile).map(|s| &mut s.health),
            EntityKey::Sapling(_) | EntityKey::Item(_) => None,
        };
        match slot {
            Some(current) => {
                *current = health;
                Ok(())
            }
            None => Err(ConsistencyError::UnknownEntity { key }),
        }
    }

    fn remove_entity(&mut self, key: EntityKey) -> Result<(), ConsistencyError> {
        let removed = match key {
            EntityKey::Tree(tile) => self.trees.remove(&tile).is_some(),
            EntityKey::Stone(tile) => self.stones.remove(&tile).is_some(),
            EntityKey::Sapling(tile) => self.saplings.remove(&tile).is_some(),
            EntityKey::Item(id) => self.items.remove(&id).is_some(),
        };
        if removed {
            if matches!(key, EntityKey::Tree(_) | EntityKey::Stone(_)) {
                self.cleared.insert(key);
            }
            Ok(())
        } else {
            Err(ConsistencyError::UnknownEntity { key })
        }
    }
}

/// Pre-validation view: the server re-checks everything, including entities
/// this client has not been told about yet
impl PlacementGrid for ClientWorld {
    fn is_occupied(&self, position: TileKey) -> bool {
        self.fences.contains_position(position)
    }

    fn is_blocked(&self, position: TileKey) -> bool {
        let water = self
            .biomes
            .as_ref()
            .is_some_and(|biomes| biomes.biome_at_tile(position) == Biome::Water);
        water
            || self.trees.contains_key(&position)
            || self.stones.contains_key(&position)
            || self.saplings.contains_key(&position)
    }

    fn owner_at(&self, position: TileKey) -> Option<u32> {
        self.fences.at(position).map(|fence| fence.owner_id)
    }
}

/// Applies server messages and turns failures into resyncs and notifications
#[derive(Debug, Default)]
pub struct GameMessageHandler {
    world: ClientWorld,
    connected: bool,
    resync_in_flight: bool,
    outgoing: Vec<Packet>,
    notifications: VecDeque<Notification>,
}

impl GameMessageHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn world(&self) -> &ClientWorld {
        &self.world
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn resync_in_flight(&self) -> bool {
        self.resync_in_flight
    }

    pub fn handle(&mut self, packet: Packet) -> Result<(), ConsistencyError> {
        match &packet {
            Packet::Connected { player_id, .. } => {
                info!("Connected as player {}", player_id);
                self.connected = true;
            }
            Packet::WorldSnapshot { .. } => self.resync_in_flight = false,
            Packet::ActionRejected { action, reason } => {
                self.notify(rejection_message(*action, reason));
                return Ok(());
            }
            Packet::Disconnected { reason } => {
                warn!("Disconnected: {}", reason);
                self.connected = false;
                self.notify(format!("Disconnected: {}", reason));
                return Ok(());
            }
            _ => {}
        }

        let result = self.world.apply(&packet);
        if let Err(e) = &result {
            warn!("World mirror out of sync: {}", e);
            self.request_resync();
        }
        result
    }

    /// Queues a resync unless one is already outstanding
    pub fn request_resync(&mut self) -> bool {
        if self.resync_in_flight {
            return false;
        }
        self.resync_in_flight = true;
        self.outgoing.push(Packet::RequestResync);
        true
    }

    /// Requests generated while handling messages
    pub fn drain_outgoing(&mut self) -> Vec<Packet> {
        std::mem::take(&mut self.outgoing)
    }

    pub fn notify(&mut self, message: String) {
        info!("{}", message);
        self.notifications.push_back(Notification {
            message,
            remaining_ticks: NOTIFICATION_TICKS,
        });
    }

    pub fn notifications(&self) -> impl Iterator<Item = &Notification> {
        self.notifications.iter()
    }

    /// Ages notifications and drops the expired ones
    pub fn tick(&mut self) {
        for notification in self.notifications.iter_mut() {
            notification.remaining_ticks = notification.remaining_ticks.saturating_sub(1);
        }
        self.notifications.retain(|n| n.remaining_ticks > 0);
    }
}

fn rejection_message(action: Action, reason: &ValidationError) -> String {
    let verb = match action {
        Action::Move => "move",
        Action::Attack => "attack",
        Action::PlaceFence => "place fence",
        Action::RemoveFence => "remove fence",
        Action::ClearEnclosure => "clear enclosure",
        Action::Plant => "plant",
        Action::PickUp => "pick up",
    };
    format!("Cannot {}: {}", verb, reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::fence::{FenceMaterial, FencePieceType};
    use shared::{ItemKind, TreeKind, MAX_HEALTH};
    use std::collections::BTreeMap;

    fn tree_at(x: i32, y: i32) -> TreeState {
        TreeState::new(TileKey::new(x, y), TreeKind::Oak)
    }

    fn fence(id: u64, x: i32, piece_type: FencePieceType) -> FenceState {
        FenceState {
            id,
            position: TileKey::new(x, 0),
            piece_type,
            material: FenceMaterial::Wood,
            owner_id: 1,
            created_at: 0,
        }
    }

    #[test]
    fn test_creation_then_health_update() {
        let mut handler = GameMessageHandler::new();
        let tree = tree_at(30, 0);
        handler
            .handle(Packet::EntityCreated {
                entity: EntitySnapshot::Tree(tree.clone()),
            })
            .unwrap();
        handler
            .handle(Packet::EntityHealthUpdate {
                key: EntityKey::Tree(tree.key),
                health: 75,
            })
            .unwrap();

        assert_eq!(handler.world().tree(tree.key).unwrap().health, 75);
        assert!(handler.drain_outgoing().is_empty());
    }

    #[test]
    fn test_unknown_entity_requests_single_resync() {
        let mut handler = GameMessageHandler::new();
        let key = EntityKey::Tree(TileKey::new(9, 9));

        assert_eq!(
            handler.handle(Packet::EntityHealthUpdate { key, health: 50 }),
            Err(ConsistencyError::UnknownEntity { key })
        );
        assert!(handler.handle(Packet::EntityDestroyed { key }).is_err());
        assert_eq!(handler.drain_outgoing(), vec![Packet::RequestResync]);
        assert!(handler.resync_in_flight());

        let mut snapshot = WorldSnapshot::default();
        snapshot.trees.push(TreeState {
            health: 50,
            ..tree_at(9, 9)
        });
        handler
            .handle(Packet::WorldSnapshot {
                snapshot: Box::new(snapshot),
            })
            .unwrap();
        assert!(!handler.resync_in_flight());
        assert_eq!(handler.world().tree(TileKey::new(9, 9)).unwrap().health, 50);

        assert!(handler.handle(Packet::FenceRemoved { fence_id: 4 }).is_err());
        assert_eq!(handler.drain_outgoing(), vec![Packet::RequestResync]);
    }

    #[test]
    fn test_snapshot_cleared_tiles_are_not_targeted() {
        let seed = 12345;
        let biomes = BiomeMap::new(seed);
        let tile = (20..400)
            .map(|x| TileKey::new(x, 0))
            .find(|tile| generation::tree_at(&biomes, *tile).is_some())
            .unwrap();

        let mut handler = GameMessageHandler::new();
        handler
            .handle(Packet::Connected {
                player_id: 1,
                world_seed: seed,
            })
            .unwrap();
        assert_eq!(handler.world().attack_target(tile), Some(EntityKey::Tree(tile)));

        let mut snapshot = WorldSnapshot::default();
        snapshot.cleared_trees.push(tile);
        handler
            .handle(Packet::WorldSnapshot {
                snapshot: Box::new(snapshot),
            })
            .unwrap();
        assert_eq!(handler.world().attack_target(tile), None);
    }

    #[test]
    fn test_fence_created_is_an_upsert() {
        let mut handler = GameMessageHandler::new();
        handler
            .handle(Packet::FenceCreated {
                fence: fence(1, 0, FencePieceType::Top),
            })
            .unwrap();
        handler
            .handle(Packet::FenceCreated {
                fence: fence(1, 0, FencePieceType::TopLeft),
            })
            .unwrap();

        let world = handler.world();
        assert_eq!(world.fences().len(), 1);
        assert_eq!(
            world.fence_at(TileKey::new(0, 0)).unwrap().piece_type,
            FencePieceType::TopLeft
        );

        handler.handle(Packet::FenceRemoved { fence_id: 1 }).unwrap();
        assert!(handler.world().fences().is_empty());
    }

    #[test]
    fn test_inventory_updates_only_apply_to_self() {
        let mut handler = GameMessageHandler::new();
        handler
            .handle(Packet::Connected {
                player_id: 3,
                world_seed: 1,
            })
            .unwrap();

        let mut counts = BTreeMap::new();
        counts.insert(ItemKind::Wood, 4);
        handler
            .handle(Packet::InventoryUpdate {
                player_id: 8,
                counts: counts.clone(),
            })
            .unwrap();
        assert_eq!(handler.world().inventory().count(ItemKind::Wood), 0);

        handler
            .handle(Packet::InventoryUpdate {
                player_id: 3,
                counts,
            })
            .unwrap();
        assert_eq!(handler.world().inventory().count(ItemKind::Wood), 4);
    }

    #[test]
    fn test_rejection_becomes_transient_notification() {
        let mut handler = GameMessageHandler::new();
        handler
            .handle(Packet::ActionRejected {
                action: Action::PlaceFence,
                reason: ValidationError::InsufficientMaterials {
                    material: FenceMaterial::Wood,
                },
            })
            .unwrap();

        let message = handler.notifications().next().unwrap().message.clone();
        assert!(message.starts_with("Cannot place fence"));
        assert!(message.contains("insufficient materials"));

        for _ in 0..NOTIFICATION_TICKS {
            handler.tick();
        }
        assert_eq!(handler.notifications().count(), 0);
    }

    #[test]
    fn test_players_follow_join_move_leave() {
        let mut handler = GameMessageHandler::new();
        handler
            .handle(Packet::PlayerJoined {
                player: PlayerState::new(2, "bob", 0.0, 0.0),
            })
            .unwrap();
        handler
            .handle(Packet::PlayerMoved {
                player_id: 2,
                x: 64.0,
                y: 32.0,
            })
            .unwrap();
        assert_eq!(handler.world().player(2).unwrap().x, 64.0);

        handler.handle(Packet::PlayerLeft { player_id: 2 }).unwrap();
        assert!(handler
            .handle(Packet::PlayerMoved {
                player_id: 2,
                x: 0.0,
                y: 0.0,
            })
            .is_err());
    }

    #[test]
    fn test_known_entities_block_placement() {
        let mut world = ClientWorld::new();
        world
            .apply(&Packet::EntityCreated {
                entity: EntitySnapshot::Tree(tree_at(1, 1)),
            })
            .unwrap();
        assert!(world.is_blocked(TileKey::new(1, 1)));
        assert!(!world.is_blocked(TileKey::new(2, 1)));
        assert_eq!(world.tree(TileKey::new(1, 1)).unwrap().health, MAX_HEALTH);
    }
}
