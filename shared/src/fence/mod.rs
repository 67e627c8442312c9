//! Fence pieces and the logic shared by the server and client for placing
//! them: the spatial index, enclosure shapes and placement validation.

mod grid;
mod structure;
mod validator;

pub use grid::{FenceGrid, PlacementGrid};
pub use structure::{EnclosurePiece, FenceStructureManager, StructureError};
pub use validator::{FenceMaterialProvider, FencePlacementValidator};

use crate::coords::TileKey;
use crate::entity::ItemKind;
use serde::{Deserialize, Serialize};

/// Material a fence piece is built from; one unit per piece
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FenceMaterial {
    Wood,
    Bamboo,
}

impl FenceMaterial {
    pub const ALL: [FenceMaterial; 2] = [FenceMaterial::Wood, FenceMaterial::Bamboo];

    /// Inventory item consumed when building with this material
    pub fn item_kind(self) -> ItemKind {
        match self {
            FenceMaterial::Wood => ItemKind::Wood,
            FenceMaterial::Bamboo => ItemKind::Bamboo,
        }
    }
}

/// The eight piece shapes: four corners and four straight edges.
///
/// Orientation assumes y grows downward, so `Top` is the upper edge of an
/// enclosure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FencePieceType {
    TopLeft,
    TopRight,
    BottomRight,
    BottomLeft,
    Top,
    Right,
    Bottom,
    Left,
}

impl FencePieceType {
    /// Cycling order used by the building cursor
    pub const ALL: [FencePieceType; 8] = [
        FencePieceType::TopLeft,
        FencePieceType::Top,
        FencePieceType::TopRight,
        FencePieceType::Right,
        FencePieceType::BottomRight,
        FencePieceType::Bottom,
        FencePieceType::BottomLeft,
        FencePieceType::Left,
    ];

    pub fn is_corner(self) -> bool {
        matches!(
            self,
            FencePieceType::TopLeft
                | FencePieceType::TopRight
                | FencePieceType::BottomRight
                | FencePieceType::BottomLeft
        )
    }

    pub fn is_edge(self) -> bool {
        !self.is_corner()
    }

    fn cycle_index(self) -> usize {
        Self::ALL
            .iter()
            .position(|piece| *piece == self)
            .unwrap_or(0)
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.cycle_index() + 1) % Self::ALL.len()]
    }

    pub fn previous(self) -> Self {
        Self::ALL[(self.cycle_index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

/// A placed fence piece.
///
/// The id is allocated by the server and never derived from the position,
/// since pieces can be removed and a new one built on the same cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FenceState {
    pub id: u64,
    pub position: TileKey,
    pub piece_type: FencePieceType,
    pub material: FenceMaterial,
    pub owner_id: u32,
    pub created_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_piece_classification() {
        let corners = FencePieceType::ALL.iter().filter(|p| p.is_corner()).count();
        let edges = FencePieceType::ALL.iter().filter(|p| p.is_edge()).count();
        assert_eq!(corners, 4);
        assert_eq!(edges, 4);
    }

    #[test]
    fn test_piece_cycle_wraps() {
        let mut piece = FencePieceType::TopLeft;
        for _ in 0..FencePieceType::ALL.len() {
            piece = piece.next();
        }
        assert_eq!(piece, FencePieceType::TopLeft);
        assert_eq!(FencePieceType::TopLeft.previous(), FencePieceType::Left);
        assert_eq!(FencePieceType::Left.next(), FencePieceType::TopLeft);
    }

    #[test]
    fn test_material_item_kinds() {
        assert_eq!(FenceMaterial::Wood.item_kind(), ItemKind::Wood);
        assert_eq!(FenceMaterial::Bamboo.item_kind(), ItemKind::Bamboo);
    }
}
