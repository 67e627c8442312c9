use crate::entity::ItemKind;
use crate::fence::{FenceMaterial, FenceMaterialProvider};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Item counts carried by one player. Counts never go below zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    counts: BTreeMap<ItemKind, u32>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: ItemKind, amount: u32) -> Self {
        self.add(kind, amount);
        self
    }

    pub fn from_counts(counts: BTreeMap<ItemKind, u32>) -> Self {
        Self { counts }
    }

    pub fn count(&self, kind: ItemKind) -> u32 {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn add(&mut self, kind: ItemKind, amount: u32) {
        if amount == 0 {
            return;
        }
        let entry = self.counts.entry(kind).or_insert(0);
        *entry = entry.saturating_add(amount);
    }

    /// Takes `amount` items if all of them are available
    pub fn remove(&mut self, kind: ItemKind, amount: u32) -> bool {
        let available = self.count(kind);
        if available < amount {
            return false;
        }
        if available == amount {
            self.counts.remove(&kind);
        } else {
            self.counts.insert(kind, available - amount);
        }
        true
    }

    pub fn counts(&self) -> &BTreeMap<ItemKind, u32> {
        &self.counts
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

impl FenceMaterialProvider for Inventory {
    fn consume_materials(&mut self, material: FenceMaterial, amount: u32) -> bool {
        self.remove(material.item_kind(), amount)
    }

    fn return_materials(&mut self, material: FenceMaterial, amount: u32) {
        self.add(material.item_kind(), amount);
    }

    fn material_count(&self, material: FenceMaterial) -> u32 {
        self.count(material.item_kind())
    }
}
