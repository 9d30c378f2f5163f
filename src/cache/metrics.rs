//! Metrics Collector Module
//!
//! Hit/miss counters and a bounded window of recent response times.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

/// Samples kept before the window is trimmed.
pub const MAX_RESPONSE_SAMPLES: usize = 100;
/// Samples left after trimming (the most recent ones).
pub const TRIMMED_RESPONSE_SAMPLES: usize = 50;

// == Metrics Snapshot ==
/// Point-in-time view of the collector, as sent over the control channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    /// hits / (hits + misses), 0 when nothing was looked up
    pub hit_rate: f64,
    /// Mean of the sampled response times in milliseconds
    pub avg_response_time: f64,
}

// == Metrics ==
/// Thread-safe collector shared by request tasks.
#[derive(Debug, Default)]
pub struct Metrics {
    hits: AtomicU64,
    misses: AtomicU64,
    response_times: Mutex<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds a response-time sample, trimming the window to the newest
    /// [`TRIMMED_RESPONSE_SAMPLES`] once it exceeds [`MAX_RESPONSE_SAMPLES`].
    pub fn record_response_time(&self, ms: u64) {
        let mut samples = self
            .response_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        samples.push_back(ms);
        if samples.len() > MAX_RESPONSE_SAMPLES {
            let excess = samples.len() - TRIMMED_RESPONSE_SAMPLES;
            samples.drain(..excess);
        }
    }

    pub fn sample_count(&self) -> usize {
        self.response_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    // == Snapshot ==
    pub fn snapshot(&self) -> MetricsSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        };

        let samples = self
            .response_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let avg_response_time = if samples.is_empty() {
            0.0
        } else {
            samples.iter().sum::<u64>() as f64 / samples.len() as f64
        };

        MetricsSnapshot {
            hits,
            misses,
            hit_rate,
            avg_response_time,
        }
    }

    pub fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.response_times
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate_no_requests() {
        let metrics = Metrics::new();
        let snap = metrics.snapshot();
        assert_eq!(snap.hit_rate, 0.0);
        assert_eq!(snap.avg_response_time, 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let metrics = Metrics::new();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_hit();
        metrics.record_miss();

        let snap = metrics.snapshot();
        assert_eq!(snap.hits, 3);
        assert_eq!(snap.misses, 1);
        assert_eq!(snap.hit_rate, 0.75);
    }

    #[test]
    fn test_average_response_time() {
        let metrics = Metrics::new();
        metrics.record_response_time(10);
        metrics.record_response_time(30);
        assert_eq!(metrics.snapshot().avg_response_time, 20.0);
    }

    #[test]
    fn test_window_trims_to_newest_fifty() {
        let metrics = Metrics::new();
        for ms in 0..=100u64 {
            metrics.record_response_time(ms);
        }

        // The 101st sample triggers the trim, leaving 51..=100
        assert_eq!(metrics.sample_count(), TRIMMED_RESPONSE_SAMPLES);
        assert_eq!(metrics.snapshot().avg_response_time, 75.5);
    }

    #[test]
    fn test_window_holds_exactly_one_hundred() {
        let metrics = Metrics::new();
        for ms in 0..100u64 {
            metrics.record_response_time(ms);
        }
        assert_eq!(metrics.sample_count(), MAX_RESPONSE_SAMPLES);
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let metrics = Metrics::new();
        metrics.record_hit();
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["hits"], 1);
        assert!(json.get("hitRate").is_some());
        assert!(json.get("avgResponseTime").is_some());
    }

    #[test]
    fn test_reset() {
        let metrics = Metrics::new();
        metrics.record_hit();
        metrics.record_response_time(5);
        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }
}
