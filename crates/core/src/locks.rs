//! Per-key mutual exclusion (one lock per machine, one per ticket).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Lazily created lock per key.
///
/// An entry lives only while some caller holds its `Arc`. Entries nobody
/// references are pruned on the next `get`, so the map never grows past
/// the number of keys in use at once.
#[derive(Default)]
pub struct KeyedLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock for `key`, creating it if needed.
    pub fn get(&self, key: &str) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        // Only the map holds these, so no thread can be waiting on them.
        map.retain(|k, lock| k == key || Arc::strong_count(lock) > 1);
        Arc::clone(map.entry(key.to_string()).or_default())
    }

    /// Number of live lock entries.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
        map.len()
    }

    /// Returns the locks for several keys, deduplicated and in sorted key
    /// order. Acquire them in the returned order.
    pub fn get_many<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Vec<Arc<Mutex<()>>> {
        let mut keys: Vec<&str> = keys.into_iter().collect();
        keys.sort_unstable();
        keys.dedup();
        keys.into_iter().map(|k| self.get(k)).collect()
    }
}

/// Acquire a unit lock. The guarded data is `()`, so a poisoned lock
/// carries no broken state and is recovered.
pub fn acquire(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(|e| e.into_inner())
}
