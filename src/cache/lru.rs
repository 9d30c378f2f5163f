//! LRU Tracker Module
//!
//! Recency ordering for partition eviction.

use std::collections::{BTreeMap, HashMap};

// == LRU Tracker ==
/// Tracks key recency with a monotonically increasing tick.
///
/// `ticks` maps key -> last tick, `order` maps tick -> key, so the smallest
/// tick in `order` is always the least recently used key.
#[derive(Debug, Default)]
pub struct LruTracker {
    ticks: HashMap<String, u64>,
    order: BTreeMap<u64, String>,
    next_tick: u64,
}

impl LruTracker {
    pub fn new() -> Self {
        Self::default()
    }

    // == Touch ==
    /// Marks a key as most recently used, inserting it if unknown.
    pub fn touch(&mut self, key: &str) {
        let tick = self.next_tick;
        self.next_tick += 1;

        if let Some(old) = self.ticks.insert(key.to_string(), tick) {
            self.order.remove(&old);
        }
        self.order.insert(tick, key.to_string());
    }

    // == Remove ==
    pub fn remove(&mut self, key: &str) {
        if let Some(tick) = self.ticks.remove(key) {
            self.order.remove(&tick);
        }
    }

    // == Pop LRU ==
    /// Removes and returns the least recently used key.
    pub fn pop_lru(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        self.ticks.remove(&key);
        Some(key)
    }

    // == Peek LRU ==
    pub fn peek_lru(&self) -> Option<&str> {
        self.order.values().next().map(String::as_str)
    }

    /// Keys from least to most recently used.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.order.values().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.ticks.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.ticks.contains_key(key)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_is_eviction_order() {
        let mut lru = LruTracker::new();
        lru.touch("a");
        lru.touch("b");
        lru.touch("c");

        assert_eq!(lru.peek_lru(), Some("a"));
        assert_eq!(lru.pop_lru(), Some("a".to_string()));
        assert_eq!(lru.pop_lru(), Some("b".to_string()));
        assert_eq!(lru.pop_lru(), Some("c".to_string()));
        assert_eq!(lru.pop_lru(), None);
    }

    #[test]
    fn test_touch_moves_to_most_recent() {
        let mut lru = LruTracker::new();
        lru.touch("a");
        lru.touch("b");
        lru.touch("c");
        lru.touch("a");

        let order: Vec<&str> = lru.iter().collect();
        assert_eq!(order, vec!["b", "c", "a"]);
        assert_eq!(lru.len(), 3);
    }

    #[test]
    fn test_remove_and_contains() {
        let mut lru = LruTracker::new();
        lru.touch("a");
        lru.touch("b");

        lru.remove("a");
        lru.remove("missing");

        assert!(!lru.contains("a"));
        assert!(lru.contains("b"));
        assert_eq!(lru.peek_lru(), Some("b"));
    }

    #[test]
    fn test_repeated_touch_keeps_one_slot() {
        let mut lru = LruTracker::new();
        lru.touch("k");
        lru.touch("k");
        lru.touch("k");

        assert_eq!(lru.len(), 1);
        assert_eq!(lru.pop_lru(), Some("k".to_string()));
        assert!(lru.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut lru = LruTracker::new();
        lru.touch("a");
        lru.clear();
        assert!(lru.is_empty());
        assert_eq!(lru.peek_lru(), None);
    }
}
