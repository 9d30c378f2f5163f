//! Cache Module
//!
//! Partitioned in-memory caching with TTL validity, max-age sweeps and LRU
//! eviction, plus the hit/miss metrics collector.

mod entry;
mod lru;
mod metrics;
mod partition;
mod store;


// Re-export public types
pub use entry::{duration_ms, CacheEntry};
pub use lru::LruTracker;
pub use metrics::{Metrics, MetricsSnapshot, MAX_RESPONSE_SAMPLES, TRIMMED_RESPONSE_SAMPLES};
pub use partition::CachePartition;
pub use store::PartitionStore;
