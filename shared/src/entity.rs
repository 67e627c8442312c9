//! World entity records shared by the server's canonical maps and the
//! client's mirror

use crate::coords::TileKey;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Health of a freshly generated tree or stone
pub const MAX_HEALTH: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TreeKind {
    Oak,
    Pine,
    Bamboo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StoneKind {
    Granite,
    Sandstone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ItemKind {
    Wood,
    Bamboo,
    Sapling,
    Stone,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeState {
    pub key: TileKey,
    pub kind: TreeKind,
    pub health: u32,
}

impl TreeState {
    pub fn new(key: TileKey, kind: TreeKind) -> Self {
        Self {
            key,
            kind,
            health: MAX_HEALTH,
        }
    }

    /// Applies damage and reports whether the tree is now destroyed
    pub fn apply_damage(&mut self, amount: u32) -> bool {
        self.health = self.health.saturating_sub(amount);
        self.health == 0
    }

    pub fn is_damaged(&self) -> bool {
        self.health < MAX_HEALTH
    }

    /// Items left behind when the tree is felled
    pub fn drops(&self) -> Vec<(ItemKind, u32)> {
        match self.kind {
            TreeKind::Oak | TreeKind::Pine => vec![(ItemKind::Wood, 2), (ItemKind::Sapling, 1)],
            TreeKind::Bamboo => vec![(ItemKind::Bamboo, 2)],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoneState {
    pub key: TileKey,
    pub kind: StoneKind,
    pub health: u32,
}

impl StoneState {
    pub fn new(key: TileKey, kind: StoneKind) -> Self {
        Self {
            key,
            kind,
            health: MAX_HEALTH,
        }
    }

    pub fn apply_damage(&mut self, amount: u32) -> bool {
        self.health = self.health.saturating_sub(amount);
        self.health == 0
    }

    pub fn is_damaged(&self) -> bool {
        self.health < MAX_HEALTH
    }

    pub fn drops(&self) -> Vec<(ItemKind, u32)> {
        vec![(ItemKind::Stone, 2)]
    }
}

/// A pile of items lying on a tile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemState {
    pub id: u64,
    pub kind: ItemKind,
    pub tile: TileKey,
    pub quantity: u32,
}

/// A planted sapling counting down to become a tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaplingState {
    pub key: TileKey,
    pub owner_id: u32,
    pub remaining_ticks: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub id: u32,
    pub name: String,
    pub x: f32,
    pub y: f32,
}

impl PlayerState {
    pub fn new(id: u32, name: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            id,
            name: name.into(),
            x,
            y,
        }
    }

    pub fn tile(&self) -> TileKey {
        TileKey::from_world(self.x, self.y)
    }
}

/// Identity of any non-fence world entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKey {
    Tree(TileKey),
    Stone(TileKey),
    Sapling(TileKey),
    Item(u64),
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Tree(key) => write!(f, "tree:{}", key),
            EntityKey::Stone(key) => write!(f, "stone:{}", key),
            EntityKey::Sapling(key) => write!(f, "sapling:{}", key),
            EntityKey::Item(id) => write!(f, "item:{}", id),
        }
    }
}

/// Full record of an entity, as carried by creation messages and snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntitySnapshot {
    Tree(TreeState),
    Stone(StoneState),
    Sapling(SaplingState),
    Item(ItemState),
}

impl EntitySnapshot {
    pub fn key(&self) -> EntityKey {
        match self {
            EntitySnapshot::Tree(tree) => EntityKey::Tree(tree.key),
            EntitySnapshot::Stone(stone) => EntityKey::Stone(stone.key),
            EntitySnapshot::Sapling(sapling) => EntityKey::Sapling(sapling.key),
            EntitySnapshot::Item(item) => EntityKey::Item(item.id),
        }
    }
}

impl From<TreeState> for EntitySnapshot {
    fn from(tree: TreeState) -> Self {
        EntitySnapshot::Tree(tree)
    }
}

impl From<StoneState> for EntitySnapshot {
    fn from(stone: StoneState) -> Self {
        EntitySnapshot::Stone(stone)
    }
}

impl From<SaplingState> for EntitySnapshot {
    fn from(sapling: SaplingState) -> Self {
        EntitySnapshot::Sapling(sapling)
    }
}

impl From<ItemState> for EntitySnapshot {
    fn from(item: ItemState) -> Self {
        EntitySnapshot::Item(item)
    }
}
