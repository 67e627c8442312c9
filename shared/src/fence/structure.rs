use super::{FenceGrid, FencePieceType};
use crate::coords::TileKey;
use thiserror::Error;

/// How far a straight piece looks across the enclosure to decide which side
/// it faces
const DEFAULT_SCAN_WINDOW: i32 = 16;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StructureError {
    #[error("enclosure must be at least 2x2, got {width}x{height}")]
    TooSmall { width: u32, height: u32 },
}

/// One perimeter cell of a rectangular enclosure, relative to its top-left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnclosurePiece {
    pub offset: TileKey,
    pub piece_type: FencePieceType,
}

/// Assigns piece types to fence cells.
///
/// Rectangles are laid out purely from position. Free-form building infers
/// each piece from its occupied neighbours.
#[derive(Debug, Clone)]
pub struct FenceStructureManager {
    scan_window: i32,
}

impl Default for FenceStructureManager {
    fn default() -> Self {
        Self {
            scan_window: DEFAULT_SCAN_WINDOW,
        }
    }
}

impl FenceStructureManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scan_window(scan_window: i32) -> Self {
        Self {
            scan_window: scan_window.max(1),
        }
    }

    /// Number of pieces, and so of material units, for a `width` x `height`
    /// enclosure
    pub fn material_cost(width: u32, height: u32) -> Result<u32, StructureError> {
        if width < 2 || height < 2 {
            return Err(StructureError::TooSmall { width, height });
        }
        Ok(2 * (width + height) - 4)
    }

    /// Perimeter of a `width` x `height` rectangle, clockwise from the top-left
    /// corner
    pub fn enclosure(width: u32, height: u32) -> Result<Vec<EnclosurePiece>, StructureError> {
        let cost = Self::material_cost(width, height)?;
        let (w, h) = (width as i32, height as i32);
        let mut pieces = Vec::with_capacity(cost as usize);

        let mut push = |x: i32, y: i32| {
            pieces.push(EnclosurePiece {
                offset: TileKey::new(x, y),
                piece_type: Self::rectangle_piece(x, y, w, h),
            });
        };

        for x in 0..w {
            push(x, 0);
        }
        for y in 1..h {
            push(w - 1, y);
        }
        for x in (0..w - 1).rev() {
            push(x, h - 1);
        }
        for y in (1..h - 1).rev() {
            push(0, y);
        }

        Ok(pieces)
    }

    /// Enclosure cells translated to start at `origin`
    pub fn enclosure_at(
        origin: TileKey,
        width: u32,
        height: u32,
    ) -> Result<Vec<EnclosurePiece>, StructureError> {
        Ok(Self::enclosure(width, height)?
            .into_iter()
            .map(|piece| EnclosurePiece {
                offset: origin.offset(piece.offset.x, piece.offset.y),
                piece_type: piece.piece_type,
            })
            .collect())
    }

    fn rectangle_piece(x: i32, y: i32, w: i32, h: i32) -> FencePieceType {
        let (left, right, top, bottom) = (x == 0, x == w - 1, y == 0, y == h - 1);
        match (left, right, top, bottom) {
            (true, _, true, _) => FencePieceType::TopLeft,
            (_, true, true, _) => FencePieceType::TopRight,
            (_, true, _, true) => FencePieceType::BottomRight,
            (true, _, _, true) => FencePieceType::BottomLeft,
            (_, _, true, _) => FencePieceType::Top,
            (_, _, _, true) => FencePieceType::Bottom,
            (true, _, _, _) => FencePieceType::Left,
            _ => FencePieceType::Right,
        }
    }

    /// Piece type matching the occupied neighbours of `position`, or `None`
    /// when the cell stands alone
    pub fn infer_piece_type(&self, grid: &FenceGrid, position: TileKey) -> Option<FencePieceType> {
        let occupied = |dx: i32, dy: i32| grid.contains_position(position.offset(dx, dy));
        let (up, right, down, left) = (
            occupied(0, -1),
            occupied(1, 0),
            occupied(0, 1),
            occupied(-1, 0),
        );

        let piece = match (up, right, down, left) {
            (false, false, false, false) => return None,
            (_, true, _, true) => self.horizontal_edge(grid, position),
            (true, _, true, _) => self.vertical_edge(grid, position),
            (false, true, true, false) => FencePieceType::TopLeft,
            (false, false, true, true) => FencePieceType::TopRight,
            (true, false, false, true) => FencePieceType::BottomRight,
            (true, true, false, false) => FencePieceType::BottomLeft,
            (_, true, _, _) | (_, _, _, true) => self.horizontal_edge(grid, position),
            _ => self.vertical_edge(grid, position),
        };
        Some(piece)
    }

    /// A horizontal run faces the side its enclosure lies on
    fn horizontal_edge(&self, grid: &FenceGrid, position: TileKey) -> FencePieceType {
        if self.scan(grid, position, 0, 1) {
            FencePieceType::Top
        } else if self.scan(grid, position, 0, -1) {
            FencePieceType::Bottom
        } else {
            FencePieceType::Top
        }
    }

    fn vertical_edge(&self, grid: &FenceGrid, position: TileKey) -> FencePieceType {
        if self.scan(grid, position, 1, 0) {
            FencePieceType::Left
        } else if self.scan(grid, position, -1, 0) {
            FencePieceType::Right
        } else {
            FencePieceType::Left
        }
    }

    /// Looks for an occupied cell along one axis within the scan window
    fn scan(&self, grid: &FenceGrid, position: TileKey, dx: i32, dy: i32) -> bool {
        (1..=self.scan_window)
            .any(|step| grid.contains_position(position.offset(dx * step, dy * step)))
    }

    /// Re-derives the occupied neighbours of `position` after its occupancy
    /// changed. Returns the ids whose piece type differs from what is stored;
    /// ids themselves never change.
    pub fn reorient_neighbors(
        &self,
        grid: &FenceGrid,
        position: TileKey,
    ) -> Vec<(u64, FencePieceType)> {
        self.reorient_pieces(grid, &position.neighbors())
    }

    /// Re-derived types for the occupied `positions` whose type changed
    pub fn reorient_pieces(
        &self,
        grid: &FenceGrid,
        positions: &[TileKey],
    ) -> Vec<(u64, FencePieceType)> {
        positions
            .iter()
            .filter_map(|position| {
                let fence = grid.at(*position)?;
                let inferred = self.infer_piece_type(grid, *position)?;
                (inferred != fence.piece_type).then_some((fence.id, inferred))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fence::{FenceMaterial, FenceState};
    use std::collections::HashSet;

    fn grid_from(cells: &[(i32, i32)]) -> FenceGrid {
        let mut grid = FenceGrid::new();
        for (index, (x, y)) in cells.iter().enumerate() {
            grid.add_or_update(FenceState {
                id: index as u64 + 1,
                position: TileKey::new(*x, *y),
                piece_type: FencePieceType::Top,
                material: FenceMaterial::Wood,
                owner_id: 1,
                created_at: 0,
            });
        }
        grid
    }

    #[test]
    fn test_rectangular_completeness() {
        for width in 2..24 {
            for height in 2..24 {
                let pieces = FenceStructureManager::enclosure(width, height).unwrap();
                let cost = FenceStructureManager::material_cost(width, height).unwrap();
                assert_eq!(pieces.len() as u32, cost);
                assert_eq!(cost, 2 * (width + height) - 4);

                let corners: Vec<_> = pieces.iter().filter(|p| p.piece_type.is_corner()).collect();
                let edges = pieces.iter().filter(|p| p.piece_type.is_edge()).count();
                assert_eq!(corners.len(), 4);
                assert_eq!(edges as u32, 2 * (width + height) - 8);

                let corner_types: HashSet<_> = corners.iter().map(|p| p.piece_type).collect();
                assert_eq!(corner_types.len(), 4);

                let mut offsets: Vec<_> = pieces.iter().map(|p| p.offset).collect();
                offsets.sort();
                offsets.dedup();
                assert_eq!(offsets.len(), pieces.len(), "{}x{} repeats a cell", width, height);
            }
        }
    }

    #[test]
    fn test_four_by_three_enclosure() {
        let pieces = FenceStructureManager::enclosure(4, 3).unwrap();
        assert_eq!(FenceStructureManager::material_cost(4, 3), Ok(10));
        assert_eq!(pieces.len(), 10);

        let type_at = |x, y| {
            pieces
                .iter()
                .find(|p| p.offset == TileKey::new(x, y))
                .map(|p| p.piece_type)
        };
        assert_eq!(type_at(0, 0), Some(FencePieceType::TopLeft));
        assert_eq!(type_at(3, 0), Some(FencePieceType::TopRight));
        assert_eq!(type_at(3, 2), Some(FencePieceType::BottomRight));
        assert_eq!(type_at(0, 2), Some(FencePieceType::BottomLeft));
        assert_eq!(type_at(1, 0), Some(FencePieceType::Top));
        assert_eq!(type_at(2, 2), Some(FencePieceType::Bottom));
        assert_eq!(type_at(0, 1), Some(FencePieceType::Left));
        assert_eq!(type_at(3, 1), Some(FencePieceType::Right));
        assert_eq!(type_at(1, 1), None);

        assert_eq!(pieces.iter().filter(|p| p.piece_type.is_corner()).count(), 4);
        assert_eq!(pieces.iter().filter(|p| p.piece_type.is_edge()).count(), 6);
        assert_eq!(pieces[0].offset, TileKey::new(0, 0));
    }

    #[test]
    fn test_too_small_enclosure() {
        assert_eq!(
            FenceStructureManager::material_cost(1, 5),
            Err(StructureError::TooSmall { width: 1, height: 5 })
        );
        assert!(FenceStructureManager::enclosure(3, 0).is_err());
    }

    #[test]
    fn test_enclosure_at_origin() {
        let pieces = FenceStructureManager::enclosure_at(TileKey::new(10, -4), 2, 2).unwrap();
        assert_eq!(pieces[0].offset, TileKey::new(10, -4));
        assert_eq!(pieces[2].offset, TileKey::new(11, -3));
    }

    #[test]
    fn test_inference_matches_rectangle_layout() {
        let manager = FenceStructureManager::new();
        for (width, height) in [(2, 2), (3, 2), (4, 3), (5, 7), (9, 4)] {
            let pieces = FenceStructureManager::enclosure(width, height).unwrap();
            let cells: Vec<(i32, i32)> = pieces.iter().map(|p| (p.offset.x, p.offset.y)).collect();
            let grid = grid_from(&cells);
            for piece in &pieces {
                assert_eq!(
                    manager.infer_piece_type(&grid, piece.offset),
                    Some(piece.piece_type),
                    "{}x{} at {}",
                    width,
                    height,
                    piece.offset
                );
            }
        }
    }

    #[test]
    fn test_inference_for_isolated_and_runs() {
        let manager = FenceStructureManager::new();
        let grid = grid_from(&[(0, 0)]);
        assert_eq!(manager.infer_piece_type(&grid, TileKey::new(0, 0)), None);

        let grid = grid_from(&[(0, 0), (1, 0), (2, 0)]);
        assert_eq!(
            manager.infer_piece_type(&grid, TileKey::new(1, 0)),
            Some(FencePieceType::Top)
        );
        assert_eq!(
            manager.infer_piece_type(&grid, TileKey::new(0, 0)),
            Some(FencePieceType::Top)
        );

        let grid = grid_from(&[(0, 0), (0, 1), (0, 2)]);
        assert_eq!(
            manager.infer_piece_type(&grid, TileKey::new(0, 1)),
            Some(FencePieceType::Left)
        );
    }

    #[test]
    fn test_reorient_neighbors_after_placement() {
        let manager = FenceStructureManager::new();
        // a straight run; adding a cell below the end turns it into a corner
        let mut grid = grid_from(&[(0, 0), (1, 0)]);
        grid.add_or_update(FenceState {
            id: 10,
            position: TileKey::new(1, 1),
            piece_type: FencePieceType::Left,
            material: FenceMaterial::Bamboo,
            owner_id: 1,
            created_at: 0,
        });

        let changes = manager.reorient_neighbors(&grid, TileKey::new(1, 1));
        assert_eq!(changes, vec![(2, FencePieceType::TopRight)]);
    }
}
