//! Per-record mutual exclusion for mutating operations.

use crate::model::RecordId;
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeSet;

#[derive(Debug, Default)]
pub struct RecordLocks {
    held: Mutex<BTreeSet<RecordId>>,
    released: Condvar,
}

/// Holds a set of record ids until dropped.
#[derive(Debug)]
pub struct RecordGuard<'a> {
    locks: &'a RecordLocks,
    ids: Vec<RecordId>,
}

impl RecordLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until every id is free, then takes them together in ascending
    /// order.
    pub fn lock(&self, ids: &[RecordId]) -> RecordGuard<'_> {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        let mut held = self.held.lock();
        while ids.iter().any(|id| held.contains(id)) {
            self.released.wait(&mut held);
        }
        held.extend(ids.iter().copied());
        RecordGuard { locks: self, ids }
    }

    pub fn is_locked(&self, id: RecordId) -> bool {
        self.held.lock().contains(&id)
    }
}

impl RecordGuard<'_> {
    pub fn ids(&self) -> &[RecordId] {
        &self.ids
    }
}

impl Drop for RecordGuard<'_> {
    fn drop(&mut self) {
        let mut held = self.locks.held.lock();
        for id in &self.ids {
            held.remove(id);
        }
        self.locks.released.notify_all();
    }
}
