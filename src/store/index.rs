//! In-memory B-tree index over resource ids.
//!
//! Grounded on the teacher's `index/btree.rs` `BTreeIndex`: a `BTreeMap`
//! giving O(log n) point lookups and ordered iteration without a second
//! on-disk structure, exactly what `spec.md` §4.1 asks of
//! `GetResourceState`/`GetAllCurrentResources`. Unlike the teacher's
//! standalone `BTreeIndex` (which carries its own `parking_lot::RwLock`
//! because callers reach it directly), this index lives inside
//! [`super::StoreState`] behind the store's single outer lock (`spec.md`
//! §5: "the in-memory B-tree index is mutated only under the exclusive
//! lock"), so it does not need a lock of its own.

use std::collections::BTreeMap;

use crate::model::ResourceState;

/// The store's in-memory index: resource id -> current [`ResourceState`].
#[derive(Debug, Clone, Default)]
pub struct ResourceIndex {
    entries: BTreeMap<String, ResourceState>,
}

impl ResourceIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the entry for `state.id`.
    pub fn upsert(&mut self, state: ResourceState) {
        self.entries.insert(state.id.clone(), state);
    }

    /// Looks up the current state for `id`.
    pub fn get(&self, id: &str) -> Option<&ResourceState> {
        self.entries.get(id)
    }

    /// Drops every entry, used when rebuilding the index from the log.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of tracked ids (existing or tombstoned).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index has no entries at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries with `exists == true`.
    pub fn current(&self) -> Vec<ResourceState> {
        self.entries.values().filter(|s| s.exists).cloned().collect()
    }

    /// All entries with `exists == true` and `owner == owner`.
    pub fn current_by_owner(&self, owner: &str) -> Vec<ResourceState> {
        self.entries
            .values()
            .filter(|s| s.exists && s.owner == owner)
            .cloned()
            .collect()
    }

    /// A full snapshot of every tracked entry, existing or not.
    pub fn all(&self) -> Vec<ResourceState> {
        self.entries.values().cloned().collect()
    }
}
