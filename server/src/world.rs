//! Canonical world state
//!
//! `WorldState` is the single writer of everything that exists in the world.
//! Trees and stones are produced by the deterministic generators in `shared`
//! either at creation (inside a bounded square around the origin) or lazily
//! the first time someone interacts with a tile. Destroyed content goes into
//! a cleared set and is never generated again.

use crate::persistence::{WorldSave, SAVE_FORMAT_VERSION};
use log::{debug, info, warn};
use shared::biome::{Biome, BiomeMap};
use shared::coords::TileKey;
use shared::entity::{
    ItemKind, ItemState, PlayerState, SaplingState, StoneState, TreeKind, TreeState,
};
use shared::fence::{FenceGrid, FenceState, PlacementGrid};
use shared::generation::{stone_at, tree_at};
use shared::protocol::WorldSnapshot;
use shared::{
    within_reach, Inventory, INTERACTION_RANGE_TILES, SAPLING_GROWTH_TICKS, SPAWN_POINT,
};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq)]
pub struct WorldSettings {
    pub seed: u64,
    /// Half-width, in tiles, of the square populated at creation
    pub init_radius: i32,
    pub interaction_range_tiles: f32,
    pub sapling_growth_ticks: u32,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            seed: 12345,
            init_radius: 24,
            interaction_range_tiles: INTERACTION_RANGE_TILES,
            sapling_growth_ticks: SAPLING_GROWTH_TICKS,
        }
    }
}

/// Outcome of looking up content that may be generated on demand
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    /// Already part of the canonical world
    Existing(T),
    /// Created by this lookup; no client has heard of it yet
    Generated(T),
    /// Destroyed earlier and never coming back
    Cleared,
    /// Nothing of this kind on the tile
    Absent,
}

impl<T> Lookup<T> {
    pub fn entity(&self) -> Option<&T> {
        match self {
            Lookup::Existing(entity) | Lookup::Generated(entity) => Some(entity),
            Lookup::Cleared | Lookup::Absent => None,
        }
    }

    pub fn is_generated(&self) -> bool {
        matches!(self, Lookup::Generated(_))
    }
}

/// Result of damaging a tree or stone
#[derive(Debug, Clone, PartialEq)]
pub enum Damage<T> {
    Damaged { health: u32 },
    /// Health reached zero; the entity is gone and its tile is cleared
    Destroyed(T),
}

pub struct WorldState {
    settings: WorldSettings,
    biomes: BiomeMap,
    trees: HashMap<TileKey, TreeState>,
    stones: HashMap<TileKey, StoneState>,
    saplings: HashMap<TileKey, SaplingState>,
    items: HashMap<u64, ItemState>,
    fences: FenceGrid,
    cleared_trees: HashSet<TileKey>,
    cleared_stones: HashSet<TileKey>,
    players: HashMap<u32, PlayerState>,
    inventories: HashMap<u32, Inventory>,
    player_names: HashMap<String, u32>,
    next_fence_id: u64,
    next_item_id: u64,
    next_player_id: u32,
}

impl WorldState {
    /// Fresh world, populated around the origin
    pub fn new(settings: WorldSettings) -> Self {
        let mut world = Self::empty(settings);
        world.populate();
        world
    }

    fn empty(settings: WorldSettings) -> Self {
        Self {
            biomes: BiomeMap::new(settings.seed),
            settings,
            trees: HashMap::new(),
            stones: HashMap::new(),
            saplings: HashMap::new(),
            items: HashMap::new(),
            fences: FenceGrid::new(),
            cleared_trees: HashSet::new(),
            cleared_stones: HashSet::new(),
            players: HashMap::new(),
            inventories: HashMap::new(),
            player_names: HashMap::new(),
            next_fence_id: 1,
            next_item_id: 1,
            next_player_id: 1,
        }
    }

    /// Rebuilds a world from a save. The save's seed wins over the
    /// configured one.
    pub fn from_save(save: WorldSave, mut settings: WorldSettings) -> Self {
        if settings.seed != save.seed {
            warn!(
                "Configured seed {} ignored, save was generated with {}",
                settings.seed, save.seed
            );
            settings.seed = save.seed;
        }

        let mut world = Self::empty(settings);
        world.cleared_trees.extend(save.cleared_trees);
        world.cleared_stones.extend(save.cleared_stones);
        world.populate();

        for tree in save.trees {
            world.trees.insert(tree.key, tree);
        }
        for stone in save.stones {
            world.stones.insert(stone.key, stone);
        }
        for sapling in save.saplings {
            world.saplings.insert(sapling.key, sapling);
        }
        for item in save.items {
            world.items.insert(item.id, item);
        }

        let mut max_fence_id = 0;
        for fence in save.fences {
            max_fence_id = max_fence_id.max(fence.id);
            world.fences.add_or_update(fence);
        }
        let max_item_id = world.items.keys().copied().max().unwrap_or(0);

        world.inventories.extend(save.inventories);
        world.player_names.extend(save.player_names);
        let max_player_id = world.player_names.values().copied().max().unwrap_or(0);

        world.next_fence_id = save.next_fence_id.max(max_fence_id + 1);
        world.next_item_id = save.next_item_id.max(max_item_id + 1);
        world.next_player_id = save.next_player_id.max(max_player_id + 1);

        info!(
            "Loaded world (seed {}): {} fences, {} cleared trees, {} cleared stones",
            world.seed(),
            world.fences.len(),
            world.cleared_trees.len(),
            world.cleared_stones.len()
        );
        world
    }

    /// Generates every tree and stone in the initial square
    fn populate(&mut self) {
        let radius = self.settings.init_radius;
        for y in -radius..=radius {
            for x in -radius..=radius {
                let tile = TileKey::new(x, y);
                if !self.cleared_trees.contains(&tile) {
                    if let Some(tree) = tree_at(&self.biomes, tile) {
                        self.trees.insert(tile, tree);
                    }
                }
                if !self.cleared_stones.contains(&tile) {
                    if let Some(stone) = stone_at(&self.biomes, tile) {
                        self.stones.insert(tile, stone);
                    }
                }
            }
        }
        debug!(
            "Populated {}x{} tiles: {} trees, {} stones",
            2 * radius + 1,
            2 * radius + 1,
            self.trees.len(),
            self.stones.len()
        );
    }

    pub fn seed(&self) -> u64 {
        self.settings.seed
    }

    pub fn settings(&self) -> &WorldSettings {
        &self.settings
    }

    pub fn biome_at(&self, tile: TileKey) -> Biome {
        self.biomes.biome_at_tile(tile)
    }

    // --- trees and stones ---

    /// Fetches the tree on `tile`, generating it on first contact
    pub fn generate_tree_at(&mut self, tile: TileKey) -> Lookup<TreeState> {
        if let Some(tree) = self.trees.get(&tile) {
            return Lookup::Existing(tree.clone());
        }
        if self.cleared_trees.contains(&tile) {
            return Lookup::Cleared;
        }
        match tree_at(&self.biomes, tile) {
            Some(tree) => {
                debug!("Generated {:?} tree at {}", tree.kind, tile);
                self.trees.insert(tile, tree.clone());
                Lookup::Generated(tree)
            }
            None => Lookup::Absent,
        }
    }

    /// Fetches the stone on `tile`, generating it on first contact.
    ///
    /// Generation only runs when the tile is within reach of the reference
    /// point; the reference point never changes what is generated.
    pub fn generate_stone_at(&mut self, tile: TileKey, ref_x: f32, ref_y: f32) -> Lookup<StoneState> {
        if let Some(stone) = self.stones.get(&tile) {
            return Lookup::Existing(stone.clone());
        }
        if self.cleared_stones.contains(&tile) {
            return Lookup::Cleared;
        }
        if !within_reach(ref_x, ref_y, tile, self.settings.interaction_range_tiles) {
            debug!("Stone lookup at {} from ({}, {}) is out of reach", tile, ref_x, ref_y);
            return Lookup::Absent;
        }
        match stone_at(&self.biomes, tile) {
            Some(stone) => {
                debug!("Generated {:?} stone at {}", stone.kind, tile);
                self.stones.insert(tile, stone.clone());
                Lookup::Generated(stone)
            }
            None => Lookup::Absent,
        }
    }

    pub fn tree(&self, tile: TileKey) -> Option<&TreeState> {
        self.trees.get(&tile)
    }

    pub fn stone(&self, tile: TileKey) -> Option<&StoneState> {
        self.stones.get(&tile)
    }

    /// Whether a tree stands on `tile`, generated yet or not. Never mutates.
    pub fn has_tree(&self, tile: TileKey) -> bool {
        self.trees.contains_key(&tile)
            || (!self.cleared_trees.contains(&tile) && tree_at(&self.biomes, tile).is_some())
    }

    pub fn has_stone(&self, tile: TileKey) -> bool {
        self.stones.contains_key(&tile)
            || (!self.cleared_stones.contains(&tile) && stone_at(&self.biomes, tile).is_some())
    }

    pub fn is_tree_cleared(&self, tile: TileKey) -> bool {
        self.cleared_trees.contains(&tile)
    }

    pub fn is_stone_cleared(&self, tile: TileKey) -> bool {
        self.cleared_stones.contains(&tile)
    }

    pub fn damage_tree(&mut self, tile: TileKey, amount: u32) -> Option<Damage<TreeState>> {
        let tree = self.trees.get_mut(&tile)?;
        if !tree.apply_damage(amount) {
            return Some(Damage::Damaged { health: tree.health });
        }
        let tree = self.trees.remove(&tile)?;
        self.cleared_trees.insert(tile);
        Some(Damage::Destroyed(tree))
    }

    pub fn damage_stone(&mut self, tile: TileKey, amount: u32) -> Option<Damage<StoneState>> {
        let stone = self.stones.get_mut(&tile)?;
        if !stone.apply_damage(amount) {
            return Some(Damage::Damaged {
                health: stone.health,
            });
        }
        let stone = self.stones.remove(&tile)?;
        self.cleared_stones.insert(tile);
        Some(Damage::Destroyed(stone))
    }

    // --- saplings ---

    pub fn sapling(&self, tile: TileKey) -> Option<&SaplingState> {
        self.saplings.get(&tile)
    }

    pub fn plant_sapling(&mut self, tile: TileKey, owner_id: u32) -> SaplingState {
        let sapling = SaplingState {
            key: tile,
            owner_id,
            remaining_ticks: self.settings.sapling_growth_ticks,
        };
        self.saplings.insert(tile, sapling.clone());
        sapling
    }

    /// Advances every sapling by one tick and turns the ripe ones into oaks
    pub fn tick_saplings(&mut self) -> Vec<(SaplingState, TreeState)> {
        let mut ripe: Vec<TileKey> = self
            .saplings
            .values_mut()
            .filter_map(|sapling| {
                sapling.remaining_ticks = sapling.remaining_ticks.saturating_sub(1);
                (sapling.remaining_ticks == 0).then_some(sapling.key)
            })
            .collect();
        ripe.sort();

        ripe.into_iter()
            .filter_map(|tile| {
                let sapling = self.saplings.remove(&tile)?;
                let tree = TreeState::new(tile, TreeKind::Oak);
                self.cleared_trees.remove(&tile);
                self.trees.insert(tile, tree.clone());
                Some((sapling, tree))
            })
            .collect()
    }

    // --- items ---

    pub fn item(&self, id: u64) -> Option<&ItemState> {
        self.items.get(&id)
    }

    /// Leaves one item pile per entry on `tile`
    pub fn drop_items(&mut self, tile: TileKey, drops: &[(ItemKind, u32)]) -> Vec<ItemState> {
        drops
            .iter()
            .filter(|(_, quantity)| *quantity > 0)
            .map(|&(kind, quantity)| {
                let item = ItemState {
                    id: self.next_item_id,
                    kind,
                    tile,
                    quantity,
                };
                self.next_item_id += 1;
                self.items.insert(item.id, item.clone());
                item
            })
            .collect()
    }

    pub fn take_item(&mut self, id: u64) -> Option<ItemState> {
        self.items.remove(&id)
    }

    // --- fences ---

    pub fn allocate_fence_id(&mut self) -> u64 {
        let id = self.next_fence_id;
        self.next_fence_id += 1;
        id
    }

    /// Inserts a piece or replaces the stored record for its id
    pub fn add_or_update_fence(&mut self, fence: FenceState) -> Option<FenceState> {
        if fence.id >= self.next_fence_id {
            self.next_fence_id = fence.id + 1;
        }
        self.fences.add_or_update(fence)
    }

    pub fn remove_fence(&mut self, fence_id: u64) -> Option<FenceState> {
        self.fences.remove(fence_id)
    }

    pub fn fence(&self, fence_id: u64) -> Option<&FenceState> {
        self.fences.get(fence_id)
    }

    pub fn fence_at(&self, x: i32, y: i32) -> Option<&FenceState> {
        self.fences.at(TileKey::new(x, y))
    }

    pub fn fences_by_owner(&self, owner_id: u32) -> Vec<&FenceState> {
        self.fences.by_owner(owner_id)
    }

    pub fn fence_count_by_owner(&self, owner_id: u32) -> usize {
        self.fences.count_by_owner(owner_id)
    }

    pub fn fences(&self) -> &FenceGrid {
        &self.fences
    }

    // --- players and inventories ---

    /// Stable id for a player name; the same name always gets the same id
    pub fn register_player(&mut self, name: &str) -> u32 {
        if let Some(&id) = self.player_names.get(name) {
            return id;
        }
        let id = self.next_player_id;
        self.next_player_id += 1;
        self.player_names.insert(name.to_string(), id);
        id
    }

    pub fn spawn_player(&mut self, id: u32, name: &str) -> PlayerState {
        let player = PlayerState::new(id, name, SPAWN_POINT.0, SPAWN_POINT.1);
        self.inventories.entry(id).or_default();
        self.players.insert(id, player.clone());
        info!("Spawned player {} ({}) at ({}, {})", id, name, player.x, player.y);
        player
    }

    /// Removes the avatar; the inventory stays with the player id
    pub fn despawn_player(&mut self, id: u32) -> Option<PlayerState> {
        self.players.remove(&id)
    }

    pub fn player(&self, id: u32) -> Option<&PlayerState> {
        self.players.get(&id)
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerState> {
        self.players.values()
    }

    pub fn move_player(&mut self, id: u32, x: f32, y: f32) -> Option<&PlayerState> {
        let player = self.players.get_mut(&id)?;
        player.x = x;
        player.y = y;
        Some(player)
    }

    /// Whether the player's avatar is close enough to act on `tile`
    pub fn in_reach(&self, player_id: u32, tile: TileKey) -> bool {
        self.players.get(&player_id).map_or(false, |player| {
            within_reach(player.x, player.y, tile, self.settings.interaction_range_tiles)
        })
    }

    pub fn inventory(&self, player_id: u32) -> Option<&Inventory> {
        self.inventories.get(&player_id)
    }

    pub fn inventory_mut(&mut self, player_id: u32) -> &mut Inventory {
        self.inventories.entry(player_id).or_default()
    }

    // --- views ---

    /// Everything a newly connected client needs, in a stable order
    pub fn snapshot(&self) -> WorldSnapshot {
        let mut trees: Vec<TreeState> = self.trees.values().cloned().collect();
        trees.sort_by_key(|tree| tree.key);
        let mut stones: Vec<StoneState> = self.stones.values().cloned().collect();
        stones.sort_by_key(|stone| stone.key);
        let mut saplings: Vec<SaplingState> = self.saplings.values().cloned().collect();
        saplings.sort_by_key(|sapling| sapling.key);
        let mut items: Vec<ItemState> = self.items.values().cloned().collect();
        items.sort_by_key(|item| item.id);
        let mut fences: Vec<FenceState> = self.fences.iter().cloned().collect();
        fences.sort_by_key(|fence| fence.id);
        let mut players: Vec<PlayerState> = self.players.values().cloned().collect();
        players.sort_by_key(|player| player.id);
        let mut cleared_trees: Vec<TileKey> = self.cleared_trees.iter().copied().collect();
        cleared_trees.sort();
        let mut cleared_stones: Vec<TileKey> = self.cleared_stones.iter().copied().collect();
        cleared_stones.sort();

        WorldSnapshot {
            trees,
            stones,
            saplings,
            items,
            fences,
            players,
            cleared_trees,
            cleared_stones,
        }
    }

    /// Persistent part of the world. Trees and stones identical to their
    /// generated form are left out; generation brings them back.
    pub fn to_save(&self) -> WorldSave {
        let mut trees: Vec<TreeState> = self
            .trees
            .values()
            .filter(|tree| tree_at(&self.biomes, tree.key).as_ref() != Some(*tree))
            .cloned()
            .collect();
        trees.sort_by_key(|tree| tree.key);
        let mut stones: Vec<StoneState> = self
            .stones
            .values()
            .filter(|stone| stone_at(&self.biomes, stone.key).as_ref() != Some(*stone))
            .cloned()
            .collect();
        stones.sort_by_key(|stone| stone.key);

        let snapshot = self.snapshot();
        let mut inventories: Vec<(u32, Inventory)> = self
            .inventories
            .iter()
            .map(|(id, inventory)| (*id, inventory.clone()))
            .collect();
        inventories.sort_by_key(|(id, _)| *id);
        let mut player_names: Vec<(String, u32)> = self
            .player_names
            .iter()
            .map(|(name, id)| (name.clone(), *id))
            .collect();
        player_names.sort_by_key(|(_, id)| *id);

        WorldSave {
            format_version: SAVE_FORMAT_VERSION,
            seed: self.seed(),
            cleared_trees: snapshot.cleared_trees,
            cleared_stones: snapshot.cleared_stones,
            trees,
            stones,
            saplings: snapshot.saplings,
            items: snapshot.items,
            fences: snapshot.fences,
            inventories,
            player_names,
            next_fence_id: self.next_fence_id,
            next_item_id: self.next_item_id,
            next_player_id: self.next_player_id,
        }
    }
}

impl PlacementGrid for WorldState {
    fn is_occupied(&self, position: TileKey) -> bool {
        self.fences.contains_position(position)
    }

    fn is_blocked(&self, position: TileKey) -> bool {
        self.biome_at(position) == Biome::Water
            || self.saplings.contains_key(&position)
            || self.has_tree(position)
            || self.has_stone(position)
    }

    fn owner_at(&self, position: TileKey) -> Option<u32> {
        self.fences.at(position).map(|fence| fence.owner_id)
    }
}
