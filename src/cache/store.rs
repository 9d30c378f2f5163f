//! Partition Store Module
//!
//! Holds every named partition behind one lock. Each operation takes the lock,
//! does its work and releases it before returning, so callers see every
//! `get`/`put`/`delete` as a single atomic step even when request tasks and
//! background refreshes interleave.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use crate::cache::{CacheEntry, CachePartition};

// == Partition Store ==
#[derive(Debug)]
pub struct PartitionStore<T> {
    partitions: Mutex<HashMap<String, CachePartition<T>>>,
}

impl<T: Clone> Default for PartitionStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> PartitionStore<T> {
    pub fn new() -> Self {
        Self {
            partitions: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CachePartition<T>>> {
        self.partitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // == Partition Management ==
    /// Creates a partition unless one with that name already exists.
    ///
    /// Returns true when a new partition was created.
    pub fn create_partition(&self, name: &str, max_size: usize, max_age: Duration) -> bool {
        let mut partitions = self.lock();
        if partitions.contains_key(name) {
            return false;
        }
        partitions.insert(
            name.to_string(),
            CachePartition::new(name, max_size, max_age),
        );
        debug!(partition = name, max_size, "Created partition");
        true
    }

    pub fn delete_partition(&self, name: &str) -> bool {
        self.lock().remove(name).is_some()
    }

    pub fn has_partition(&self, name: &str) -> bool {
        self.lock().contains_key(name)
    }

    /// Partition names in sorted order.
    pub fn partition_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    // == Entry Operations ==
    /// Looks up an entry (valid or expired) and marks it recently used.
    pub fn get(&self, partition: &str, key: &str, now: u64) -> Option<CacheEntry<T>> {
        self.lock().get_mut(partition)?.get(key, now)
    }

    /// Looks up an entry without touching recency.
    pub fn peek(&self, partition: &str, key: &str) -> Option<CacheEntry<T>> {
        self.lock().get(partition)?.peek(key).cloned()
    }

    /// Stores an entry. Returns false when the partition does not exist.
    pub fn put(&self, partition: &str, entry: CacheEntry<T>) -> bool {
        let mut partitions = self.lock();
        let Some(target) = partitions.get_mut(partition) else {
            debug!(partition, key = %entry.key, "Dropping write to missing partition");
            return false;
        };
        if let Some(evicted) = target.put(entry) {
            debug!(partition, evicted = %evicted, "Evicted least recently used entry");
        }
        true
    }

    pub fn delete(&self, partition: &str, key: &str) -> bool {
        self.lock()
            .get_mut(partition)
            .map(|p| p.delete(key))
            .unwrap_or(false)
    }

    /// Keys of a partition, least recently used first.
    pub fn keys(&self, partition: &str) -> Vec<String> {
        self.lock()
            .get(partition)
            .map(CachePartition::keys)
            .unwrap_or_default()
    }

    pub fn clear(&self, partition: &str) -> usize {
        self.lock()
            .get_mut(partition)
            .map(CachePartition::clear)
            .unwrap_or(0)
    }

    /// Empties every partition, keeping the partitions themselves.
    pub fn clear_all(&self) -> usize {
        self.lock().values_mut().map(CachePartition::clear).sum()
    }

    /// Applies every partition's max-age ceiling.
    pub fn sweep(&self, now: u64) -> usize {
        self.lock().values_mut().map(|p| p.sweep(now)).sum()
    }

    pub fn len(&self, partition: &str) -> usize {
        self.lock().get(partition).map(CachePartition::len).unwrap_or(0)
    }

    pub fn total_len(&self) -> usize {
        self.lock().values().map(CachePartition::len).sum()
    }

    pub fn total_evictions(&self) -> u64 {
        self.lock().values().map(CachePartition::evictions).sum()
    }
}
