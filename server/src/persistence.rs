//! World save files
//!
//! Only what generation cannot reproduce is stored: the seed, cleared tiles,
//! entities that differ from their generated form, fences, items, saplings,
//! inventories and the id counters. Files are bincode and are replaced
//! atomically so a crash mid-save leaves the previous file intact.

use bincode::{deserialize, serialize};
use log::info;
use serde::{Deserialize, Serialize};
use shared::coords::TileKey;
use shared::entity::{ItemState, SaplingState, StoneState, TreeState};
use shared::fence::FenceState;
use shared::Inventory;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SAVE_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("corrupt save: {0}")]
    Encoding(#[from] bincode::Error),
    #[error("save format {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSave {
    pub format_version: u32,
    pub seed: u64,
    pub cleared_trees: Vec<TileKey>,
    pub cleared_stones: Vec<TileKey>,
    /// Trees that differ from what generation yields: damaged or grown
    pub trees: Vec<TreeState>,
    pub stones: Vec<StoneState>,
    pub saplings: Vec<SaplingState>,
    pub items: Vec<ItemState>,
    pub fences: Vec<FenceState>,
    pub inventories: Vec<(u32, Inventory)>,
    pub player_names: Vec<(String, u32)>,
    pub next_fence_id: u64,
    pub next_item_id: u64,
    pub next_player_id: u32,
}

impl WorldSave {
    pub fn empty(seed: u64) -> Self {
        Self {
            format_version: SAVE_FORMAT_VERSION,
            seed,
            cleared_trees: Vec::new(),
            cleared_stones: Vec::new(),
            trees: Vec::new(),
            stones: Vec::new(),
            saplings: Vec::new(),
            items: Vec::new(),
            fences: Vec::new(),
            inventories: Vec::new(),
            player_names: Vec::new(),
            next_fence_id: 1,
            next_item_id: 1,
            next_player_id: 1,
        }
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("world");
    let tmp_name = format!("{}.tmp", file_name);
    match path.parent() {
        Some(parent) => parent.join(tmp_name),
        None => PathBuf::from(tmp_name),
    }
}

/// Writes the save next to `path` and renames it into place
pub fn save_world(path: &Path, save: &WorldSave) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let bytes = serialize(save)?;
    let tmp_path = temp_path_for(path);
    fs::write(&tmp_path, &bytes)?;
    if let Err(e) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(e.into());
    }

    info!(
        "Saved world to {} ({} bytes, {} fences)",
        path.display(),
        bytes.len(),
        save.fences.len()
    );
    Ok(())
}

/// Reads a save; `Ok(None)` when no file exists yet
pub fn load_world(path: &Path) -> Result<Option<WorldSave>, PersistenceError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let save: WorldSave = deserialize(&bytes)?;
    if save.format_version != SAVE_FORMAT_VERSION {
        return Err(PersistenceError::UnsupportedVersion {
            found: save.format_version,
            expected: SAVE_FORMAT_VERSION,
        });
    }
    Ok(Some(save))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::entity::{ItemKind, TreeKind};
    use shared::fence::{FenceMaterial, FencePieceType};

    fn sample_save() -> WorldSave {
        let mut save = WorldSave::empty(77);
        save.cleared_trees.push(TileKey::new(5, 5));
        let mut tree = TreeState::new(TileKey::new(6, 6), TreeKind::Oak);
        tree.apply_damage(25);
        save.trees.push(tree);
        save.fences.push(FenceState {
            id: 3,
            position: TileKey::new(1, 1),
            piece_type: FencePieceType::TopLeft,
            material: FenceMaterial::Wood,
            owner_id: 1,
            created_at: 1000,
        });
        save.inventories
            .push((1, Inventory::new().with(ItemKind::Wood, 4)));
        save.player_names.push(("ada".to_string(), 1));
        save.next_fence_id = 4;
        save.next_player_id = 2;
        save
    }

    #[test]
    fn test_missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_world(&dir.path().join("absent.bin")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("saves").join("world.bin");
        let save = sample_save();

        save_world(&path, &save).unwrap();
        assert!(!temp_path_for(&path).exists());

        let loaded = load_world(&path).unwrap().unwrap();
        assert_eq!(loaded, save);
    }

    #[test]
    fn test_overwrite_replaces_previous_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.bin");

        save_world(&path, &WorldSave::empty(1)).unwrap();
        save_world(&path, &sample_save()).unwrap();

        assert_eq!(load_world(&path).unwrap().unwrap().seed, 77);
    }

    #[test]
    fn test_version_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.bin");
        let mut save = WorldSave::empty(1);
        save.format_version = 99;
        save_world(&path, &save).unwrap();

        assert!(matches!(
            load_world(&path),
            Err(PersistenceError::UnsupportedVersion { found: 99, .. })
        ));
    }

    #[test]
    fn test_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.bin");
        fs::write(&path, b"not a save").unwrap();
        assert!(load_world(&path).is_err());
    }
}
