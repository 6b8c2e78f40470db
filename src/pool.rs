//! The ordered collection of unpaired clients.
//!
//! Backed by an `IndexMap` so insertion order is preserved (FIFO tie-break)
//! while removal by client id stays O(1) amortized instead of the O(n) a
//! plain `Vec` scan-and-remove would cost.

use indexmap::IndexMap;

use crate::interests::InterestList;
use crate::session::ClientId;

#[derive(Debug, Clone)]
pub struct WaitingEntry {
    pub client_id: ClientId,
    pub interests: InterestList,
    pub joined_at_nanos: u128,
}

#[derive(Debug, Default)]
pub struct WaitingPool {
    entries: IndexMap<ClientId, WaitingEntry>,
}

impl WaitingPool {
    pub fn new() -> Self {
        WaitingPool {
            entries: IndexMap::new(),
        }
    }

    /// Appends `entry`. Caller guarantees `entry.client_id` is not already
    /// present (pool invariant: at most one entry per client).
    pub fn insert(&mut self, entry: WaitingEntry) {
        debug_assert!(
            !self.entries.contains_key(&entry.client_id),
            "client already in waiting pool"
        );
        self.entries.insert(entry.client_id.clone(), entry);
    }

    /// Idempotent; returns whether an entry existed.
    pub fn remove_by_id(&mut self, client_id: &ClientId) -> bool {
        // `shift_remove` keeps the remaining entries' relative order intact,
        // which `swap_remove` would not.
        self.entries.shift_remove(client_id).is_some()
    }

    pub fn contains(&self, client_id: &ClientId) -> bool {
        self.entries.contains_key(client_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &WaitingEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
