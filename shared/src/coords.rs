//! Tile grid and world coordinate helpers
//!
//! Every placeable entity lives on a 64-unit tile grid. World coordinates are
//! plain `f32` pairs; the grid index of a coordinate is `floor(coord / 64)`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Side length of a tile in world units
pub const TILE_SIZE: f32 = 64.0;

/// Converts a world coordinate to its tile index.
///
/// Non-finite input maps to tile 0 so callers never observe a panic or a
/// saturated index from garbage coordinates.
pub fn tile_index(coord: f32) -> i32 {
    if !coord.is_finite() {
        return 0;
    }
    (coord / TILE_SIZE).floor() as i32
}

/// Snaps a world coordinate to the origin of its tile
pub fn snap_to_tile(coord: f32) -> f32 {
    tile_index(coord) as f32 * TILE_SIZE
}

/// Integer tile position; also the identity of tile-bound entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileKey {
    pub x: i32,
    pub y: i32,
}

impl TileKey {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Tile containing the given world position
    pub fn from_world(x: f32, y: f32) -> Self {
        Self::new(tile_index(x), tile_index(y))
    }

    /// World position of the tile origin (top-left corner)
    pub fn world_origin(&self) -> (f32, f32) {
        (self.x as f32 * TILE_SIZE, self.y as f32 * TILE_SIZE)
    }

    /// World position of the tile center
    pub fn world_center(&self) -> (f32, f32) {
        let (x, y) = self.world_origin();
        (x + TILE_SIZE / 2.0, y + TILE_SIZE / 2.0)
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x.saturating_add(dx), self.y.saturating_add(dy))
    }

    /// The four edge-adjacent tiles: up, right, down, left
    pub fn neighbors(&self) -> [TileKey; 4] {
        [
            self.offset(0, -1),
            self.offset(1, 0),
            self.offset(0, 1),
            self.offset(-1, 0),
        ]
    }

    /// Euclidean distance between tile indices, in tiles
    pub fn distance(&self, other: &TileKey) -> f32 {
        let dx = (self.x as f64 - other.x as f64) as f32;
        let dy = (self.y as f64 - other.y as f64) as f32;
        (dx * dx + dy * dy).sqrt()
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed tile key '{0}', expected \"x,y\"")]
pub struct ParseTileKeyError(pub String);

impl FromStr for TileKey {
    type Err = ParseTileKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (x, y) = s
            .split_once(',')
            .ok_or_else(|| ParseTileKeyError(s.to_string()))?;
        let x = x
            .trim()
            .parse()
            .map_err(|_| ParseTileKeyError(s.to_string()))?;
        let y = y
            .trim()
            .parse()
            .map_err(|_| ParseTileKeyError(s.to_string()))?;
        Ok(TileKey { x, y })
    }
}

/// One of the four grid directions used by cursors and piece cycling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Tile step for this direction; y grows downward
    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }
}
