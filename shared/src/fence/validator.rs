use super::{FenceMaterial, PlacementGrid};
use crate::coords::TileKey;
use crate::error::{ValidationError, ValidationResult};
use log::debug;

/// Ledger of building materials, read and written by material type
pub trait FenceMaterialProvider {
    fn has_enough_materials(&self, material: FenceMaterial, amount: u32) -> bool {
        self.material_count(material) >= amount
    }

    /// Removes `amount` units; returns false and changes nothing when short
    fn consume_materials(&mut self, material: FenceMaterial, amount: u32) -> bool;

    fn return_materials(&mut self, material: FenceMaterial, amount: u32);

    fn material_count(&self, material: FenceMaterial) -> u32;
}

/// Single gate for fence placement and removal.
///
/// Used unchanged by the server before mutating the world and by the client
/// to reject obviously bad requests before they hit the wire. Validation
/// never mutates materials or the grid.
#[derive(Debug, Clone, Default)]
pub struct FencePlacementValidator {
    enforce_ownership: bool,
}

impl FencePlacementValidator {
    pub fn new(enforce_ownership: bool) -> Self {
        Self { enforce_ownership }
    }

    pub fn ownership_enforced(&self) -> bool {
        self.enforce_ownership
    }

    pub fn set_ownership_enforcement(&mut self, enabled: bool) {
        self.enforce_ownership = enabled;
    }

    pub fn validate_placement(
        &self,
        grid: &dyn PlacementGrid,
        materials: &dyn FenceMaterialProvider,
        position: TileKey,
        material: FenceMaterial,
        player_id: u32,
    ) -> ValidationResult {
        let result = if !materials.has_enough_materials(material, 1) {
            Err(ValidationError::InsufficientMaterials { material })
        } else if grid.is_occupied(position) {
            Err(ValidationError::PositionOccupied { position })
        } else if grid.is_blocked(position) {
            Err(ValidationError::PositionBlocked { position })
        } else {
            Ok(())
        };

        if let Err(reason) = &result {
            debug!("Placement by player {} refused: {}", player_id, reason);
        }
        result
    }

    pub fn validate_removal(
        &self,
        grid: &dyn PlacementGrid,
        position: TileKey,
        player_id: u32,
    ) -> ValidationResult {
        let Some(owner_id) = grid.owner_at(position) else {
            return Err(ValidationError::NoFencePiece { position });
        };
        if self.enforce_ownership && owner_id != player_id {
            debug!(
                "Removal by player {} refused: piece at {} belongs to {}",
                player_id, position, owner_id
            );
            return Err(ValidationError::NotOwner { position, owner_id });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct StubGrid {
        occupied: HashMap<TileKey, u32>,
        blocked: Vec<TileKey>,
    }

    impl PlacementGrid for StubGrid {
        fn is_occupied(&self, position: TileKey) -> bool {
            self.occupied.contains_key(&position)
        }

        fn is_blocked(&self, position: TileKey) -> bool {
            self.blocked.contains(&position)
        }

        fn owner_at(&self, position: TileKey) -> Option<u32> {
            self.occupied.get(&position).copied()
        }
    }

    struct StubMaterials(u32);

    impl FenceMaterialProvider for StubMaterials {
        fn consume_materials(&mut self, _material: FenceMaterial, amount: u32) -> bool {
            if self.0 < amount {
                return false;
            }
            self.0 -= amount;
            true
        }

        fn return_materials(&mut self, _material: FenceMaterial, amount: u32) {
            self.0 += amount;
        }

        fn material_count(&self, _material: FenceMaterial) -> u32 {
            self.0
        }
    }

    #[test]
    fn test_gating_truth_table() {
        let validator = FencePlacementValidator::default();
        let position = TileKey::new(2, 3);

        for count in [0, 1, 5] {
            for occupied in [false, true] {
                for blocked in [false, true] {
                    let mut grid = StubGrid::default();
                    if occupied {
                        grid.occupied.insert(position, 9);
                    }
                    if blocked {
                        grid.blocked.push(position);
                    }
                    let materials = StubMaterials(count);

                    let result = validator.validate_placement(
                        &grid,
                        &materials,
                        position,
                        FenceMaterial::Wood,
                        1,
                    );
                    let expected = count >= 1 && !occupied && !blocked;
                    assert_eq!(result.is_ok(), expected, "{} {} {}", count, occupied, blocked);
                }
            }
        }
    }

    #[test]
    fn test_specific_reasons() {
        let validator = FencePlacementValidator::default();
        let position = TileKey::new(0, 0);
        let mut grid = StubGrid::default();

        assert_eq!(
            validator.validate_placement(&grid, &StubMaterials(0), position, FenceMaterial::Bamboo, 1),
            Err(ValidationError::InsufficientMaterials {
                material: FenceMaterial::Bamboo
            })
        );

        grid.blocked.push(position);
        assert_eq!(
            validator.validate_placement(&grid, &StubMaterials(1), position, FenceMaterial::Wood, 1),
            Err(ValidationError::PositionBlocked { position })
        );

        grid.occupied.insert(position, 2);
        assert_eq!(
            validator.validate_placement(&grid, &StubMaterials(1), position, FenceMaterial::Wood, 1),
            Err(ValidationError::PositionOccupied { position })
        );
    }

    #[test]
    fn test_validation_does_not_consume() {
        let validator = FencePlacementValidator::default();
        let grid = StubGrid::default();
        let materials = StubMaterials(1);
        for _ in 0..3 {
            assert!(validator
                .validate_placement(&grid, &materials, TileKey::new(0, 0), FenceMaterial::Wood, 1)
                .is_ok());
        }
        assert_eq!(materials.material_count(FenceMaterial::Wood), 1);
    }

    #[test]
    fn test_removal_requires_piece() {
        let validator = FencePlacementValidator::new(true);
        let grid = StubGrid::default();
        assert_eq!(
            validator.validate_removal(&grid, TileKey::new(4, 4), 1),
            Err(ValidationError::NoFencePiece {
                position: TileKey::new(4, 4)
            })
        );
    }

    #[test]
    fn test_ownership_enforcement() {
        let mut validator = FencePlacementValidator::new(true);
        let position = TileKey::new(1, 1);
        let mut grid = StubGrid::default();
        grid.occupied.insert(position, 10);

        assert_eq!(
            validator.validate_removal(&grid, position, 11),
            Err(ValidationError::NotOwner {
                position,
                owner_id: 10
            })
        );
        assert!(validator.validate_removal(&grid, position, 10).is_ok());

        validator.set_ownership_enforcement(false);
        assert!(!validator.ownership_enforced());
        assert!(validator.validate_removal(&grid, position, 11).is_ok());
    }
}
