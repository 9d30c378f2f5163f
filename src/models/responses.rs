//! Response DTOs
//!
//! Defines the structure of control replies and outgoing HTTP response bodies.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::cache::MetricsSnapshot;

/// Reply to a [`ControlMessage`](super::ControlMessage).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ControlReply {
    /// `{ hits, misses, hitRate, avgResponseTime }`
    Stats(MetricsSnapshot),
    /// `{ success: true }`
    Cleared(ClearReply),
    /// No payload
    Ack,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ClearReply {
    pub success: bool,
}

/// Response body for `GET /__agent/store/:key`
#[derive(Debug, Clone, Serialize)]
pub struct GetResponse {
    pub key: String,
    pub value: serde_json::Value,
}

impl GetResponse {
    pub fn new(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Response body for `PUT /__agent/store/:key`
#[derive(Debug, Clone, Serialize)]
pub struct SetResponse {
    /// Success message
    pub message: String,
    /// The key that was set
    pub key: String,
}

impl SetResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' set successfully", key),
            key,
        }
    }
}

/// Response body for `DELETE /__agent/store/:key`
#[derive(Debug, Clone, Serialize)]
pub struct DeleteResponse {
    /// Success message
    pub message: String,
    /// The key that was deleted
    pub key: String,
}

impl DeleteResponse {
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            message: format!("Key '{}' deleted successfully", key),
            key,
        }
    }
}

/// Response body for `GET /__agent/health`
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
    /// Cache generation tag
    pub version: String,
    /// Lifecycle state of the agent
    pub state: String,
    /// Entry count per partition
    pub partitions: BTreeMap<String, usize>,
}

impl HealthResponse {
    /// Creates a healthy response stamped with the current time.
    pub fn healthy(
        version: impl Into<String>,
        state: impl Into<String>,
        partitions: BTreeMap<String, usize>,
    ) -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            version: version.into(),
            state: state.into(),
            partitions,
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
