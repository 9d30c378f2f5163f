//! Cache Partition Module
//!
//! A named, bounded key -> entry map with LRU eviction and a max-age ceiling.

use std::collections::HashMap;
use std::time::Duration;

use crate::cache::{duration_ms, CacheEntry, LruTracker};

// == Cache Partition ==
#[derive(Debug)]
pub struct CachePartition<T> {
    name: String,
    entries: HashMap<String, CacheEntry<T>>,
    lru: LruTracker,
    max_size: usize,
    /// Hard cap on entry age, independent of per-entry TTL
    max_age_ms: u64,
    evictions: u64,
}

impl<T: Clone> CachePartition<T> {
    // == Constructor ==
    /// Creates an empty partition. `max_size` is at least one.
    pub fn new(name: impl Into<String>, max_size: usize, max_age: Duration) -> Self {
        Self {
            name: name.into(),
            entries: HashMap::new(),
            lru: LruTracker::new(),
            max_size: max_size.max(1),
            max_age_ms: duration_ms(max_age),
            evictions: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_millis(self.max_age_ms)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    // == Get ==
    /// Returns a copy of the entry, valid or not, and marks it most recently
    /// used. Validity is the caller's decision.
    pub fn get(&mut self, key: &str, now: u64) -> Option<CacheEntry<T>> {
        let entry = self.entries.get_mut(key)?;
        entry.record_access(now);
        self.lru.touch(key);
        Some(entry.clone())
    }

    /// Reads an entry without touching recency or access metadata.
    pub fn peek(&self, key: &str) -> Option<&CacheEntry<T>> {
        self.entries.get(key)
    }

    // == Put ==
    /// Inserts or replaces an entry, evicting the least recently used entry
    /// first when the partition is full.
    ///
    /// Returns the evicted key, if any.
    pub fn put(&mut self, entry: CacheEntry<T>) -> Option<String> {
        let mut evicted = None;

        if !self.entries.contains_key(&entry.key) && self.entries.len() >= self.max_size {
            if let Some(oldest) = self.lru.pop_lru() {
                self.entries.remove(&oldest);
                self.evictions += 1;
                evicted = Some(oldest);
            }
        }

        self.lru.touch(&entry.key);
        self.entries.insert(entry.key.clone(), entry);
        evicted
    }

    // == Delete ==
    pub fn delete(&mut self, key: &str) -> bool {
        self.lru.remove(key);
        self.entries.remove(key).is_some()
    }

    /// Removes `key` only if it is past its TTL at `now`, returning the
    /// removed entry. Check and removal happen under the same borrow.
    pub fn take_if_expired(&mut self, key: &str, now: u64) -> Option<CacheEntry<T>> {
        if !self.entries.get(key)?.is_expired(now) {
            return None;
        }
        self.lru.remove(key);
        self.entries.remove(key)
    }

    /// Keys from least to most recently used.
    pub fn keys(&self) -> Vec<String> {
        self.lru.iter().map(str::to_string).collect()
    }

    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        self.lru.clear();
        removed
    }

    // == Sweeps ==
    /// Drops entries older than the partition's max-age ceiling.
    pub fn sweep(&mut self, now: u64) -> usize {
        let max_age = self.max_age_ms;
        self.retain(|entry| entry.age_ms(now) <= max_age)
    }

    /// Drops entries past their own TTL.
    pub fn remove_expired(&mut self, now: u64) -> usize {
        self.retain(|entry| entry.is_valid(now))
    }

    /// Keeps entries matching `keep`, returns how many were removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&CacheEntry<T>) -> bool) -> usize {
        let doomed: Vec<String> = self
            .entries
            .values()
            .filter(|entry| !keep(entry))
            .map(|entry| entry.key.clone())
            .collect();

        for key in &doomed {
            self.delete(key);
        }
        doomed.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
