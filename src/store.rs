//! Last-observed GC snapshot per process.

use dashmap::DashMap;

use crate::snapshot::GcSnapshot;

/// Concurrent map from pid to the most recent successful snapshot.
///
/// Sharded locking keeps tasks sampling different pids from contending.
#[derive(Debug, Default)]
pub struct StateStore {
    entries: DashMap<u32, GcSnapshot>,
}

impl StateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pid: u32) -> Option<GcSnapshot> {
        self.entries.get(&pid).map(|entry| *entry.value())
    }

    /// Stores `snapshot` as the state for `pid` and returns the state it
    /// replaced, in one step under the key's shard lock.
    pub fn upsert(&self, pid: u32, snapshot: GcSnapshot) -> Option<GcSnapshot> {
        self.entries.insert(pid, snapshot)
    }

    pub fn remove(&self, pid: u32) -> Option<GcSnapshot> {
        self.entries.remove(&pid).map(|(_, snapshot)| snapshot)
    }

    /// Sorted copy of the tracked pids.
    pub fn pids(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = self.entries.iter().map(|entry| *entry.key()).collect();
        pids.sort_unstable();
        pids
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
