//! Deterministic per-tile content
//!
//! What grows on a tile is a pure function of the world seed and the tile
//! coordinates. The server calls these at world init and lazily on first
//! interaction; any other observer holding the seed gets the same answer.

use crate::biome::BiomeMap;
use crate::coords::TileKey;
use crate::entity::{StoneKind, StoneState, TreeKind, TreeState};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Probability that an eligible grass tile carries a tree
pub const TREE_DENSITY: f64 = 0.12;
/// Probability that an eligible sand tile carries a stone
pub const STONE_DENSITY: f64 = 0.08;

const TREE_SALT: u64 = 0x7472_6565;
const STONE_SALT: u64 = 0x7374_6f6e;

fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Random stream dedicated to one tile and one kind of content
fn tile_rng(seed: u64, tile: TileKey, salt: u64) -> StdRng {
    let h = mix(seed ^ salt);
    let h = mix(h ^ tile.x as u32 as u64);
    let h = mix(h ^ ((tile.y as u32 as u64) << 32));
    StdRng::seed_from_u64(h)
}

/// The tree a never-touched tile would carry, if any
pub fn tree_at(biomes: &BiomeMap, tile: TileKey) -> Option<TreeState> {
    if !biomes.biome_at_tile(tile).supports_trees() {
        return None;
    }
    let mut rng = tile_rng(biomes.seed(), tile, TREE_SALT);
    if rng.gen::<f64>() >= TREE_DENSITY {
        return None;
    }
    let kind = match rng.gen::<f64>() {
        roll if roll < 0.45 => TreeKind::Oak,
        roll if roll < 0.8 => TreeKind::Pine,
        _ => TreeKind::Bamboo,
    };
    Some(TreeState::new(tile, kind))
}

/// The stone a never-touched tile would carry, if any
pub fn stone_at(biomes: &BiomeMap, tile: TileKey) -> Option<StoneState> {
    if !biomes.biome_at_tile(tile).supports_stones() {
        return None;
    }
    let mut rng = tile_rng(biomes.seed(), tile, STONE_SALT);
    if rng.gen::<f64>() >= STONE_DENSITY {
        return None;
    }
    let kind = if rng.gen_bool(0.6) {
        StoneKind::Sandstone
    } else {
        StoneKind::Granite
    };
    Some(StoneState::new(tile, kind))
}
