use crate::coords::TileKey;
use crate::entity::EntityKey;
use crate::fence::FenceMaterial;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why the server refused a request.
///
/// Always recoverable: the requester is told, nobody else is, and the world
/// is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("insufficient materials: need {material:?}")]
    InsufficientMaterials { material: FenceMaterial },
    #[error("position occupied at {position}")]
    PositionOccupied { position: TileKey },
    #[error("position blocked at {position}")]
    PositionBlocked { position: TileKey },
    #[error("no fence piece exists at {position}")]
    NoFencePiece { position: TileKey },
    #[error("fence {fence_id} does not exist")]
    UnknownFence { fence_id: u64 },
    #[error("not yours: fence at {position} belongs to player {owner_id}")]
    NotOwner { position: TileKey, owner_id: u32 },
    #[error("nothing to act on at {key}")]
    NoSuchEntity { key: EntityKey },
    #[error("{key} is out of reach")]
    OutOfReach { key: EntityKey },
    #[error("tile {position} is out of reach")]
    PositionOutOfReach { position: TileKey },
    #[error("no sapling to plant")]
    NoSapling,
    #[error("invalid position")]
    InvalidPosition,
    #[error("not connected")]
    NotConnected,
}

/// `Ok(())` when a request may proceed
pub type ValidationResult = Result<(), ValidationError>;
