//! Types and rules shared by the homestead server and client.
//!
//! Everything here is deterministic: the same seed yields the same biomes,
//! trees and stones on every machine, and the fence validator gives the same
//! answer on both ends of the wire.

pub mod biome;
pub mod coords;
pub mod entity;
pub mod error;
pub mod fence;
pub mod generation;
pub mod inventory;
pub mod protocol;

pub use biome::{Biome, BiomeMap};
pub use coords::{Direction, TileKey, TILE_SIZE};
pub use entity::{
    EntityKey, EntitySnapshot, ItemKind, ItemState, PlayerState, SaplingState, StoneKind,
    StoneState, TreeKind, TreeState, MAX_HEALTH,
};
pub use error::{ValidationError, ValidationResult};
pub use fence::{FenceMaterial, FencePieceType, FenceState};
pub use inventory::Inventory;
pub use protocol::{Envelope, Packet, WorldSnapshot, PROTOCOL_VERSION};

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Health removed by a single attack
pub const ATTACK_DAMAGE: u32 = 25;

/// Default reach for attacks, pickups and planting, in tiles
pub const INTERACTION_RANGE_TILES: f32 = 3.0;

/// Server ticks between planting a sapling and it becoming a tree
pub const SAPLING_GROWTH_TICKS: u32 = 600;

/// Walking speed in world units per second
pub const PLAYER_SPEED: f32 = 180.0;

/// Where new players appear, in the middle of the always-grass spawn region
pub const SPAWN_POINT: (f32, f32) = (TILE_SIZE / 2.0, TILE_SIZE / 2.0);

/// Milliseconds since the Unix epoch
pub fn get_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as u64
}

/// Whether world point `(x, y)` lies within `range_tiles` tiles of `tile`
pub fn within_reach(x: f32, y: f32, tile: TileKey, range_tiles: f32) -> bool {
    if !x.is_finite() || !y.is_finite() {
        return false;
    }
    let (cx, cy) = tile.world_center();
    let (dx, dy) = (cx - x, cy - y);
    (dx * dx + dy * dy).sqrt() <= (range_tiles + 0.5) * TILE_SIZE
}
