//! Terrain classification
//!
//! Biomes are computed in two phases. Phase one picks the base terrain (grass
//! or sand) from large-scale noise, with a fixed grass disc around the spawn
//! point. Phase two floods some grass with water, gated by a second noise
//! field and by a buffer that keeps water away from sand.
//!
//! `BiomeMap` only holds immutable noise tables built from the world seed, so
//! the classification is a pure function of `(seed, x, y)` and can be shared
//! across sessions without locking.

use crate::coords::TileKey;
use noise::{NoiseFn, Perlin};
use serde::{Deserialize, Serialize};

/// Frequency of the base terrain noise, in cycles per tile
const BASE_FREQUENCY: f64 = 1.0 / 48.0;
/// Base noise above this value is sand
const SAND_THRESHOLD: f64 = 0.22;
/// Radius of the always-grass disc around the origin, in tiles
pub const SPAWN_RADIUS_TILES: f64 = 12.0;

const WATER_FREQUENCY: f64 = 1.0 / 20.0;
/// Tuned so that roughly 12% of eligible grass becomes water
const WATER_THRESHOLD: f64 = 0.32;
/// Water must keep at least this many tiles between itself and sand
const WATER_BUFFER_TILES: f64 = 3.0;
const WATER_BUFFER_SAMPLES: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Biome {
    Grass,
    Sand,
    Water,
}

impl Biome {
    /// Trees and saplings only take root on grass
    pub fn supports_trees(self) -> bool {
        self == Biome::Grass
    }

    /// Stones only appear on sand
    pub fn supports_stones(self) -> bool {
        self == Biome::Sand
    }

    /// Fences can stand anywhere except water
    pub fn is_buildable(self) -> bool {
        self != Biome::Water
    }
}

/// Noise tables for one world seed
#[derive(Clone)]
pub struct BiomeMap {
    seed: u64,
    base: Perlin,
    water: Perlin,
}

impl std::fmt::Debug for BiomeMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BiomeMap").field("seed", &self.seed).finish()
    }
}

impl BiomeMap {
    pub fn new(seed: u64) -> Self {
        let folded = (seed ^ (seed >> 32)) as u32;
        Self {
            seed,
            base: Perlin::new(folded),
            water: Perlin::new(folded.wrapping_add(0x9E37_79B9)),
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Classifies the tile containing the given world position
    pub fn biome_at_position(&self, x: f32, y: f32) -> Biome {
        if !x.is_finite() || !y.is_finite() {
            return Biome::Grass;
        }
        self.biome_at_tile(TileKey::from_world(x, y))
    }

    pub fn biome_at_tile(&self, tile: TileKey) -> Biome {
        let (tx, ty) = (tile.x as f64 + 0.5, tile.y as f64 + 0.5);
        match self.base_at(tx, ty) {
            Biome::Sand => Biome::Sand,
            _ if self.is_water(tx, ty) => Biome::Water,
            _ => Biome::Grass,
        }
    }

    fn in_spawn_region(tx: f64, ty: f64) -> bool {
        tx * tx + ty * ty <= SPAWN_RADIUS_TILES * SPAWN_RADIUS_TILES
    }

    /// Phase one: grass or sand
    fn base_at(&self, tx: f64, ty: f64) -> Biome {
        if Self::in_spawn_region(tx, ty) {
            return Biome::Grass;
        }
        let value = self.base.get([tx * BASE_FREQUENCY, ty * BASE_FREQUENCY]);
        if value > SAND_THRESHOLD {
            Biome::Sand
        } else {
            Biome::Grass
        }
    }

    /// Phase two: water overlay on grass away from sand
    fn is_water(&self, tx: f64, ty: f64) -> bool {
        if Self::in_spawn_region(tx, ty) {
            return false;
        }
        let value = self.water.get([tx * WATER_FREQUENCY, ty * WATER_FREQUENCY]);
        if value <= WATER_THRESHOLD {
            return false;
        }
        (0..WATER_BUFFER_SAMPLES).all(|i| {
            let angle = i as f64 * std::f64::consts::TAU / WATER_BUFFER_SAMPLES as f64;
            let sx = tx + angle.cos() * WATER_BUFFER_TILES;
            let sy = ty + angle.sin() * WATER_BUFFER_TILES;
            self.base_at(sx, sy) == Biome::Grass
        })
    }
}
