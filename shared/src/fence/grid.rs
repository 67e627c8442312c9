use super::FenceState;
use crate::coords::TileKey;
use log::warn;
use std::collections::{HashMap, HashSet, VecDeque};

/// Read-only view of a placement surface, consulted by the validator
pub trait PlacementGrid {
    /// A fence piece already stands on this cell
    fn is_occupied(&self, position: TileKey) -> bool;

    /// The cell cannot take a fence for a reason other than another fence
    fn is_blocked(&self, position: TileKey) -> bool;

    /// Owner of the piece on this cell, if any
    fn owner_at(&self, position: TileKey) -> Option<u32>;
}

/// Spatial index of fence pieces.
///
/// Pieces are stored by id; a position index and an owner index are kept in
/// step with the id map so every lookup and removal is O(1).
#[derive(Debug, Clone, Default)]
pub struct FenceGrid {
    by_id: HashMap<u64, FenceState>,
    by_position: HashMap<TileKey, u64>,
    by_owner: HashMap<u32, HashSet<u64>>,
}

impl FenceGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a piece or updates the piece with the same id.
    ///
    /// A different piece occupying the target cell is displaced and
    /// returned. The owner of an existing id never changes.
    pub fn add_or_update(&mut self, mut fence: FenceState) -> Option<FenceState> {
        if let Some(existing) = self.by_id.get(&fence.id) {
            if existing.owner_id != fence.owner_id {
                warn!(
                    "Ignoring owner change for fence {} ({} -> {})",
                    fence.id, existing.owner_id, fence.owner_id
                );
                fence.owner_id = existing.owner_id;
            }
            let old_position = existing.position;
            self.by_position.remove(&old_position);
        }

        let displaced = match self.by_position.get(&fence.position) {
            Some(&other) if other != fence.id => self.remove(other),
            _ => None,
        };

        self.by_position.insert(fence.position, fence.id);
        self.by_owner
            .entry(fence.owner_id)
            .or_default()
            .insert(fence.id);
        self.by_id.insert(fence.id, fence);
        displaced
    }

    pub fn remove(&mut self, id: u64) -> Option<FenceState> {
        let fence = self.by_id.remove(&id)?;
        if self.by_position.get(&fence.position) == Some(&id) {
            self.by_position.remove(&fence.position);
        }
        if let Some(ids) = self.by_owner.get_mut(&fence.owner_id) {
            ids.remove(&id);
            if ids.is_empty() {
                self.by_owner.remove(&fence.owner_id);
            }
        }
        Some(fence)
    }

    pub fn get(&self, id: u64) -> Option<&FenceState> {
        self.by_id.get(&id)
    }

    pub fn at(&self, position: TileKey) -> Option<&FenceState> {
        self.by_position
            .get(&position)
            .and_then(|id| self.by_id.get(id))
    }

    pub fn contains_position(&self, position: TileKey) -> bool {
        self.by_position.contains_key(&position)
    }

    /// Pieces owned by a player, ordered by id
    pub fn by_owner(&self, owner_id: u32) -> Vec<&FenceState> {
        let mut fences: Vec<&FenceState> = self
            .by_owner
            .get(&owner_id)
            .map(|ids| ids.iter().filter_map(|id| self.by_id.get(id)).collect())
            .unwrap_or_default();
        fences.sort_by_key(|fence| fence.id);
        fences
    }

    pub fn count_by_owner(&self, owner_id: u32) -> usize {
        self.by_owner.get(&owner_id).map_or(0, HashSet::len)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FenceState> {
        self.by_id.values()
    }

    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_position.clear();
        self.by_owner.clear();
    }

    /// Ids of all pieces edge-connected to the piece at `start`, in
    /// breadth-first order, capped at `limit` pieces
    pub fn connected_component(&self, start: TileKey, limit: usize) -> Vec<u64> {
        let Some(&first) = self.by_position.get(&start) else {
            return Vec::new();
        };

        let mut visited = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        let mut component = vec![first];

        while let Some(position) = queue.pop_front() {
            for neighbor in position.neighbors() {
                if component.len() >= limit {
                    return component;
                }
                if !visited.insert(neighbor) {
                    continue;
                }
                if let Some(&id) = self.by_position.get(&neighbor) {
                    component.push(id);
                    queue.push_back(neighbor);
                }
            }
        }
        component
    }
}

impl PlacementGrid for FenceGrid {
    fn is_occupied(&self, position: TileKey) -> bool {
        self.contains_position(position)
    }

    fn is_blocked(&self, _position: TileKey) -> bool {
        false
    }

    fn owner_at(&self, position: TileKey) -> Option<u32> {
        self.at(position).map(|fence| fence.owner_id)
    }
}
