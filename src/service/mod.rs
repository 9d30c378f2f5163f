//! Cache Service
//!
//! Application-level cache for structured values (product lists, user
//! profiles, ...). Entries live in an in-memory LRU partition; keys matching
//! the persistence allow-list are also written through to durable storage so
//! they survive a restart.
//!
//! Durable layout: key `cache_<key>`, value
//! `{ "data": ..., "metadata": { "timestamp", "ttl", "accessCount", "lastAccess" } }`.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CachePartition, Metrics, MetricsSnapshot};
use crate::clock::SharedClock;
use crate::config::Config;
use crate::error::{Result, StorageError};
use crate::storage::SharedStore;
use crate::tasks::Sweep;

/// Prefix of every durable key written by the service.
pub const STORAGE_PREFIX: &str = "cache_";

const PARTITION_NAME: &str = "service";

// == Durable Record ==
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordMetadata {
    timestamp: u64,
    ttl: u64,
    access_count: u64,
    last_access: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredRecord {
    data: Value,
    metadata: RecordMetadata,
}

impl StoredRecord {
    fn from_entry(entry: &CacheEntry<Value>) -> Self {
        Self {
            data: entry.payload.clone(),
            metadata: RecordMetadata {
                timestamp: entry.stored_at,
                ttl: entry.ttl,
                access_count: entry.access_count,
                last_access: entry.last_access,
            },
        }
    }

    fn into_entry(self, key: &str) -> CacheEntry<Value> {
        let mut entry = CacheEntry::new(
            key,
            self.data,
            self.metadata.timestamp,
            Duration::from_millis(self.metadata.ttl),
            PARTITION_NAME,
        );
        entry.access_count = self.metadata.access_count;
        entry.last_access = self.metadata.last_access;
        entry
    }
}

fn storage_key(key: &str) -> String {
    format!("{}{}", STORAGE_PREFIX, key)
}

// == Service Stats ==
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStats {
    pub entries: usize,
    pub max_entries: usize,
    pub evictions: u64,
    #[serde(flatten)]
    pub metrics: MetricsSnapshot,
}

// == Cache Service ==
#[derive(Debug)]
pub struct CacheService {
    entries: Mutex<CachePartition<Value>>,
    storage: Option<SharedStore>,
    persist_keys: Vec<String>,
    default_ttl: Duration,
    clock: SharedClock,
    metrics: Metrics,
}

impl CacheService {
    /// Creates an empty service. Without `storage` every entry is
    /// memory-only.
    pub fn new(
        clock: SharedClock,
        storage: Option<SharedStore>,
        max_entries: usize,
        default_ttl: Duration,
        persist_keys: Vec<String>,
    ) -> Self {
        Self {
            entries: Mutex::new(CachePartition::new(
                PARTITION_NAME,
                max_entries,
                Duration::from_millis(u64::MAX),
            )),
            storage,
            persist_keys,
            default_ttl,
            clock,
            metrics: Metrics::new(),
        }
    }

    pub fn from_config(config: &Config, clock: SharedClock, storage: Option<SharedStore>) -> Self {
        Self::new(
            clock,
            storage,
            config.service_max_entries,
            Duration::from_secs(config.service_default_ttl),
            config.persist_keys.clone(),
        )
    }

    fn entries(&self) -> MutexGuard<'_, CachePartition<Value>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether `key` is written through to durable storage.
    pub fn should_persist(&self, key: &str) -> bool {
        self.storage.is_some() && self.persist_keys.iter().any(|p| key.contains(p.as_str()))
    }

    // == Set ==
    /// Stores `value` under `key` for `ttl` (service default when `None`).
    ///
    /// A failed durable write is logged; the value is still cached in memory.
    pub fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()> {
        let data = serde_json::to_value(value).map_err(StorageError::from)?;
        let entry = CacheEntry::new(
            key,
            data,
            self.clock.now_ms(),
            ttl.unwrap_or(self.default_ttl),
            PARTITION_NAME,
        );

        if self.should_persist(key) {
            self.persist(&entry);
        }
        if let Some(evicted) = self.entries().put(entry) {
            debug!(key = %evicted, "Evicted least recently used service entry");
        }
        Ok(())
    }

    fn persist(&self, entry: &CacheEntry<Value>) {
        let Some(storage) = &self.storage else {
            return;
        };
        let written = serde_json::to_string(&StoredRecord::from_entry(entry))
            .map_err(StorageError::from)
            .and_then(|raw| storage.set(&storage_key(&entry.key), &raw));
        if let Err(e) = written {
            warn!(key = %entry.key, error = %e, "Failed to persist cache entry, keeping it in memory only");
        }
    }

    // == Get ==
    /// Returns the cached value if present and within its TTL.
    ///
    /// Falls back to durable storage for persisted keys. Expired and corrupt
    /// records are removed and reported as a miss.
    pub fn get_value(&self, key: &str) -> Option<Value> {
        let now = self.clock.now_ms();
        let (cached, expired) = {
            let mut entries = self.entries();
            if entries.take_if_expired(key, now).is_some() {
                debug!(key = %key, "Service entry expired");
                if self.should_persist(key) {
                    self.remove_persisted(key);
                }
                (None, true)
            } else {
                (entries.get(key, now), false)
            }
        };

        let entry = match cached {
            Some(entry) => Some(entry),
            None if expired => None,
            None => self.load_persisted(key, now),
        };

        match entry {
            Some(entry) => {
                self.metrics.record_hit();
                Some(entry.payload)
            }
            None => {
                self.metrics.record_miss();
                None
            }
        }
    }

    /// Typed variant of [`CacheService::get_value`].
    ///
    /// A value that does not decode as `T` is dropped and reported as a miss.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get_value(key)?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                warn!(key = %key, error = %e, "Cached value has unexpected shape, dropping it");
                self.delete(key);
                None
            }
        }
    }

    fn load_persisted(&self, key: &str, now: u64) -> Option<CacheEntry<Value>> {
        if !self.should_persist(key) {
            return None;
        }
        let entry = self.read_record(key)?;
        if entry.is_expired(now) {
            self.remove_persisted(key);
            return None;
        }
        let mut entry = entry;
        entry.record_access(now);
        self.entries().put(entry.clone());
        Some(entry)
    }

    /// Reads and decodes a durable record, removing it when it is corrupt.
    fn read_record(&self, key: &str) -> Option<CacheEntry<Value>> {
        let storage = self.storage.as_ref()?;
        let raw = match storage.get(&storage_key(key)) {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read persisted cache entry");
                return None;
            }
        };

        match serde_json::from_str::<StoredRecord>(&raw) {
            Ok(record) => Some(record.into_entry(key)),
            Err(e) => {
                let err = StorageError::Corrupt {
                    key: key.to_string(),
                    reason: e.to_string(),
                };
                warn!(error = %err, "Removing corrupt cache entry");
                self.remove_persisted(key);
                None
            }
        }
    }

    /// Removes a durable record, returning whether one existed.
    fn remove_persisted(&self, key: &str) -> bool {
        let Some(storage) = &self.storage else {
            return false;
        };
        let durable_key = storage_key(key);
        let existed = matches!(storage.get(&durable_key), Ok(Some(_)));
        match storage.remove(&durable_key) {
            Ok(()) => existed,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to remove persisted cache entry");
                false
            }
        }
    }

    /// Whether a valid entry exists. Does not count as a hit or miss.
    pub fn has(&self, key: &str) -> bool {
        let now = self.clock.now_ms();
        if let Some(entry) = self.entries().peek(key) {
            return entry.is_valid(now);
        }
        self.should_persist(key)
            && self
                .read_record(key)
                .is_some_and(|entry| entry.is_valid(now))
    }

    // == Delete / Clear ==
    /// Removes `key` from memory and durable storage. True if either held it.
    pub fn delete(&self, key: &str) -> bool {
        let removed = self.entries().delete(key);
        let persisted = self.should_persist(key) && self.remove_persisted(key);
        removed || persisted
    }

    /// Drops every entry, in memory and in durable storage.
    pub fn clear(&self) -> usize {
        let removed = self.entries().clear();
        for key in self.persisted_keys() {
            self.remove_persisted(&key);
        }
        info!(removed, "Cache service cleared");
        removed
    }

    /// Removes every entry whose key starts with `prefix`.
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        let keys: Vec<String> = self
            .entries()
            .keys()
            .into_iter()
            .filter(|key| key.starts_with(prefix))
            .collect();
        for key in &keys {
            self.delete(key);
        }
        for key in self.persisted_keys() {
            if key.starts_with(prefix) {
                self.remove_persisted(&key);
            }
        }
        debug!(prefix = %prefix, removed = keys.len(), "Invalidated service entries");
        keys.len()
    }

    /// Removes entries past their TTL, in memory and in durable storage.
    pub fn cleanup_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let expired: Vec<String> = {
            let mut entries = self.entries();
            let expired = entries
                .keys()
                .into_iter()
                .filter(|key| entries.peek(key).is_some_and(|e| e.is_expired(now)))
                .collect::<Vec<_>>();
            for key in &expired {
                entries.delete(key);
            }
            expired
        };
        for key in &expired {
            if self.should_persist(key) {
                self.remove_persisted(key);
            }
        }

        let mut removed = expired.len();
        for key in self.persisted_keys() {
            if self.read_record(&key).is_some_and(|e| e.is_expired(now)) {
                self.remove_persisted(&key);
                removed += 1;
            }
        }
        removed
    }

    /// Service keys (without prefix) currently in durable storage.
    fn persisted_keys(&self) -> Vec<String> {
        let Some(storage) = &self.storage else {
            return Vec::new();
        };
        match storage.keys() {
            Ok(keys) => keys
                .into_iter()
                .filter_map(|k| k.strip_prefix(STORAGE_PREFIX).map(str::to_string))
                .collect(),
            Err(e) => {
                warn!(error = %e, "Failed to list persisted cache entries");
                Vec::new()
            }
        }
    }

    // == Hydrate ==
    /// Loads valid persisted entries into memory. Returns how many were
    /// loaded; expired and corrupt records are removed.
    pub fn hydrate(&self) -> usize {
        let now = self.clock.now_ms();
        let mut loaded = 0;
        for key in self.persisted_keys() {
            match self.read_record(&key) {
                Some(entry) if entry.is_valid(now) => {
                    self.entries().put(entry);
                    loaded += 1;
                }
                Some(_) => {
                    self.remove_persisted(&key);
                }
                None => {}
            }
        }
        info!(loaded, "Hydrated cache service from durable storage");
        loaded
    }

    // == Get Or Load ==
    /// Returns the cached value for `key`, or runs `loader`, caches its
    /// result for `ttl` and returns it. Loader errors are returned unchanged
    /// and nothing is cached.
    pub async fn get_or_load<T, F, Fut>(&self, key: &str, ttl: Option<Duration>, loader: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(value) = self.get::<T>(key) {
            return Ok(value);
        }
        let value = loader().await?;
        self.set(key, &value, ttl)?;
        Ok(value)
    }

    // == Stats ==
    pub fn stats(&self) -> ServiceStats {
        let entries = self.entries();
        ServiceStats {
            entries: entries.len(),
            max_entries: entries.max_size(),
            evictions: entries.evictions(),
            metrics: self.metrics.snapshot(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

impl Sweep for CacheService {
    fn name(&self) -> &'static str {
        "cache service"
    }

    fn sweep(&self) -> usize {
        self.cleanup_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::AgentError;
    use std::io;
    use crate::storage::{KeyValueStore, MemoryStorage};
    use serde_json::json;
    use std::sync::Arc;

    /// Storage that accepts reads but rejects every write.
    #[derive(Debug)]
    struct ReadOnlyStorage;

    impl KeyValueStore for ReadOnlyStorage {
        fn get(&self, _key: &str) -> std::result::Result<Option<String>, StorageError> {
            Ok(None)
        }

        fn set(&self, _key: &str, _value: &str) -> std::result::Result<(), StorageError> {
            Err(StorageError::Io(io::Error::new(io::ErrorKind::Other, "disk full")))
        }

        fn remove(&self, _key: &str) -> std::result::Result<(), StorageError> {
            Ok(())
        }

        fn keys(&self) -> std::result::Result<Vec<String>, StorageError> {
            Ok(Vec::new())
        }
    }

    fn service(clock: &Arc<ManualClock>, storage: Option<SharedStore>) -> CacheService {
        CacheService::new(
            clock.clone(),
            storage,
            3,
            Duration::from_secs(300),
            vec!["products".to_string(), "userProfile".to_string()],
        )
    }

    #[test]
    fn test_set_get_roundtrip_and_metrics() {
        let clock = Arc::new(ManualClock::new(1_000));
        let svc = service(&clock, None);

        svc.set("cart", &json!({"items": 2}), None).unwrap();
        assert_eq!(svc.get_value("cart"), Some(json!({"items": 2})));
        assert_eq!(svc.get_value("missing"), None);

        let stats = svc.stats();
        assert_eq!(stats.metrics.hits, 1);
        assert_eq!(stats.metrics.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_ttl_expiry_removes_entry() {
        let clock = Arc::new(ManualClock::new(0));
        let svc = service(&clock, None);

        svc.set("cart", &1, Some(Duration::from_secs(30))).unwrap();
        clock.set(29_999);
        assert!(svc.has("cart"));
        clock.set(30_000);
        assert!(!svc.has("cart"));
        assert_eq!(svc.get::<i32>("cart"), None);
        assert!(svc.is_empty());
    }

    #[test]
    fn test_lru_capacity() {
        let clock = Arc::new(ManualClock::new(0));
        let svc = service(&clock, None);

        for key in ["a", "b", "c"] {
            svc.set(key, &key, None).unwrap();
        }
        svc.get_value("a");
        svc.set("d", &"d", None).unwrap();

        assert!(svc.has("a"));
        assert!(!svc.has("b"));
        assert_eq!(svc.stats().evictions, 1);
    }

    #[test]
    fn test_allow_listed_keys_are_persisted() {
        let clock = Arc::new(ManualClock::new(5_000));
        let storage = Arc::new(MemoryStorage::new());
        let svc = service(&clock, Some(storage.clone()));

        svc.set("products_all", &json!([1, 2]), None).unwrap();
        svc.set("cart", &json!([]), None).unwrap();

        let raw = storage.get("cache_products_all").unwrap().unwrap();
        let record: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(record["data"], json!([1, 2]));
        assert_eq!(record["metadata"]["timestamp"], 5_000);
        assert_eq!(record["metadata"]["ttl"], 300_000);
        assert_eq!(record["metadata"]["accessCount"], 0);
        assert!(storage.get("cache_cart").unwrap().is_none());
    }

    #[test]
    fn test_failed_durable_write_keeps_value_in_memory() {
        let clock = Arc::new(ManualClock::new(0));
        let svc = service(&clock, Some(Arc::new(ReadOnlyStorage)));

        assert!(svc.set("products", &1, None).is_ok());
        assert_eq!(svc.get_value("products"), Some(json!(1)));
    }

    #[test]
    fn test_expired_persisted_entry_is_not_reloaded() {
        let clock = Arc::new(ManualClock::new(0));
        let storage = Arc::new(MemoryStorage::new());
        let svc = service(&clock, Some(storage.clone()));

        svc.set("products", &json!([1]), Some(Duration::from_secs(1))).unwrap();
        clock.set(1_000);

        assert_eq!(svc.get_value("products"), None);
        assert!(svc.is_empty());
        assert!(storage.get("cache_products").unwrap().is_none());
        assert_eq!(svc.stats().metrics.misses, 1);
    }

    #[test]
    fn test_huge_ttl_never_expires() {
        let clock = Arc::new(ManualClock::new(0));
        let svc = service(&clock, None);

        svc.set("cart", &1, Some(Duration::from_secs(18_446_744_073_709_552)))
            .unwrap();
        clock.set(1_000);
        assert!(svc.has("cart"));
    }

    #[test]
    fn test_delete_reports_persisted_only_entry() {
        let clock = Arc::new(ManualClock::new(0));
        let storage = Arc::new(MemoryStorage::new());
        let svc = service(&clock, Some(storage.clone()));

        svc.set("products", &json!([1, 2]), None).unwrap();
        for key in ["a", "b", "c"] {
            svc.set(key, &key, None).unwrap();
        }
        assert!(svc.entries().peek("products").is_none());
        assert!(storage.get("cache_products").unwrap().is_some());

        assert!(svc.delete("products"));
        assert!(storage.get("cache_products").unwrap().is_none());
        assert!(!svc.delete("products"));
    }

    #[test]
    fn test_hydrate_restores_persisted_entries() {
        let clock = Arc::new(ManualClock::new(0));
        let storage: SharedStore = Arc::new(MemoryStorage::new());

        service(&clock, Some(storage.clone()))
            .set("userProfile", &json!({"name": "Ada"}), None)
            .unwrap();

        let restarted = service(&clock, Some(storage));
        assert_eq!(restarted.hydrate(), 1);
        assert_eq!(restarted.get_value("userProfile"), Some(json!({"name": "Ada"})));
    }

    #[test]
    fn test_corrupt_record_is_removed_and_missed() {
        let clock = Arc::new(ManualClock::new(0));
        let storage = Arc::new(MemoryStorage::new());
        storage.set("cache_products", "{not json").unwrap();

        let svc = service(&clock, Some(storage.clone()));
        assert_eq!(svc.get_value("products"), None);
        assert!(storage.get("cache_products").unwrap().is_none());
        assert_eq!(svc.stats().metrics.misses, 1);
    }

    #[test]
    fn test_invalidate_prefix() {
        let clock = Arc::new(ManualClock::new(0));
        let storage = Arc::new(MemoryStorage::new());
        let svc = service(&clock, Some(storage.clone()));

        svc.set("products_1", &1, None).unwrap();
        svc.set("products_2", &2, None).unwrap();
        svc.set("cart", &3, None).unwrap();

        assert_eq!(svc.invalidate_prefix("products_"), 2);
        assert!(svc.has("cart"));
        assert!(storage.keys().unwrap().is_empty());
    }

    #[test]
    fn test_cleanup_expired_counts_memory_and_storage() {
        let clock = Arc::new(ManualClock::new(0));
        let storage = Arc::new(MemoryStorage::new());
        let svc = service(&clock, Some(storage.clone()));

        svc.set("products", &1, Some(Duration::from_secs(1))).unwrap();
        svc.set("cart", &2, Some(Duration::from_secs(1))).unwrap();
        svc.set("userProfile", &3, Some(Duration::from_secs(60))).unwrap();

        clock.advance(2_000);
        assert_eq!(svc.cleanup_expired(), 2);
        assert_eq!(svc.len(), 1);
        assert_eq!(storage.keys().unwrap(), vec!["cache_userProfile".to_string()]);
    }

    #[tokio::test]
    async fn test_get_or_load_caches_loader_result() {
        let clock = Arc::new(ManualClock::new(0));
        let svc = service(&clock, None);

        let first: Vec<u32> = svc
            .get_or_load("bestSellers", None, || async { Ok(vec![7, 8]) })
            .await
            .unwrap();
        let second: Vec<u32> = svc
            .get_or_load("bestSellers", None, || async {
                Err(AgentError::Internal("loader should not run".to_string()))
            })
            .await
            .unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_get_or_load_reloads_on_shape_mismatch() {
        let clock = Arc::new(ManualClock::new(0));
        let svc = service(&clock, None);
        svc.set("products", &json!("text"), None).unwrap();

        let loaded: Vec<u32> = svc
            .get_or_load("products", None, || async { Ok(vec![1]) })
            .await
            .unwrap();

        assert_eq!(loaded, vec![1]);
        assert_eq!(svc.get_value("products"), Some(json!([1])));
    }

    #[tokio::test]
    async fn test_get_or_load_propagates_loader_error() {
        let clock = Arc::new(ManualClock::new(0));
        let svc = service(&clock, None);

        let result: Result<u32> = svc
            .get_or_load("products", None, || async {
                Err(AgentError::Internal("upstream down".to_string()))
            })
            .await;

        assert!(result.is_err());
        assert!(!svc.has("products"));
    }
}
