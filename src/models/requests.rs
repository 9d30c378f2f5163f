//! Request DTOs
//!
//! Defines the structure of incoming control messages and HTTP request bodies.

use serde::{Deserialize, Serialize};

/// Control message accepted by the agent, e.g. `{"type": "GET_STATS"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Ask for a metrics snapshot
    GetStats,
    /// Empty every partition
    ClearCache,
    /// Activate without waiting
    SkipWaiting,
}

/// Request body for `PUT /__agent/store/:key`
///
/// # Fields
/// - `value`: Any JSON value
/// - `ttl`: Optional TTL in seconds (uses the service default if not specified)
#[derive(Debug, Clone, Deserialize)]
pub struct SetRequest {
    pub value: serde_json::Value,
    #[serde(default)]
    pub ttl: Option<u64>,
}

/// Validates a cache-service key taken from the URL path.
///
/// Returns an error message if validation fails, None if valid.
pub fn validate_key(key: &str) -> Option<String> {
    if key.is_empty() {
        return Some("Key cannot be empty".to_string());
    }
    if key.len() > 256 {
        return Some("Key exceeds maximum length of 256 characters".to_string());
    }
    None
}
