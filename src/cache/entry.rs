//! Cache Entry Module
//!
//! A stored payload plus the bookkeeping needed for TTL validity, max-age
//! sweeps and access metadata.

use std::time::Duration;

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
pub fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

// == Cache Entry ==
/// A single cached payload.
///
/// Timestamps are Unix milliseconds from the owning cache's clock.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<T> {
    /// Logical key inside the partition
    pub key: String,
    /// The cached value
    pub payload: T,
    /// When the payload was stored or last refreshed
    pub stored_at: u64,
    /// Time-to-live in milliseconds, always > 0
    pub ttl: u64,
    /// Name of the owning partition
    pub partition: String,
    /// Number of reads served from this entry
    pub access_count: u64,
    /// Time of the last read (or of storing, if never read)
    pub last_access: u64,
}

impl<T> CacheEntry<T> {
    // == Constructor ==
    /// Creates an entry stored at `stored_at`.
    ///
    /// A zero TTL is clamped to one millisecond.
    pub fn new(
        key: impl Into<String>,
        payload: T,
        stored_at: u64,
        ttl: Duration,
        partition: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            payload,
            stored_at,
            ttl: duration_ms(ttl).max(1),
            partition: partition.into(),
            access_count: 0,
            last_access: stored_at,
        }
    }

    // == Validity ==
    /// An entry is valid while `now - stored_at < ttl`.
    pub fn is_valid(&self, now: u64) -> bool {
        self.age_ms(now) < self.ttl
    }

    pub fn is_expired(&self, now: u64) -> bool {
        !self.is_valid(now)
    }

    /// Milliseconds since the entry was stored. A clock that moved backwards
    /// yields zero.
    pub fn age_ms(&self, now: u64) -> u64 {
        now.saturating_sub(self.stored_at)
    }

    /// Milliseconds left before expiry, zero once expired.
    pub fn ttl_remaining_ms(&self, now: u64) -> u64 {
        self.ttl.saturating_sub(self.age_ms(now))
    }

    pub fn ttl_duration(&self) -> Duration {
        Duration::from_millis(self.ttl)
    }

    // == Access ==
    /// Records a read at `now`.
    pub fn record_access(&mut self, now: u64) {
        self.access_count += 1;
        self.last_access = now;
    }
}
