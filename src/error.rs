//! Error types for the caching agent
//!
//! Network and storage failures get their own enums so the coordinator can
//! decide per failure kind whether to fall back, swallow or surface them.
//! `AgentError` is the umbrella type used by the HTTP and control layers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::fetch::FetchResponse;
use crate::models::ErrorResponse;

// == Network Error ==
/// Failure of a single network fetch.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// The deadline passed before the upstream answered
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// The fetch was cancelled by its owner
    #[error("request cancelled")]
    Cancelled,

    /// DNS, connect, TLS or body read failure
    #[error("connection failed: {0}")]
    Connection(String),

    /// Upstream answered with a non-2xx status
    #[error("upstream returned status {status}")]
    Status {
        status: u16,
        response: Box<FetchResponse>,
    },
}

impl NetworkError {
    /// Returns the upstream response when the failure was an error status.
    pub fn into_upstream_response(self) -> Option<FetchResponse> {
        match self {
            NetworkError::Status { response, .. } => Some(*response),
            _ => None,
        }
    }
}

// == Storage Error ==
/// Failure reading or writing the durable key-value store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored value could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("stored value for '{key}' is corrupt: {reason}")]
    Corrupt { key: String, reason: String },
}

// == Agent Error ==
/// Unified error type for the agent's outer surfaces.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Key not present in the cache service
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The control loop has shut down
    #[error("Control channel closed")]
    ChannelClosed,

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for AgentError {
    fn into_response(self) -> Response {
        let status = match &self {
            AgentError::Network(_) => StatusCode::SERVICE_UNAVAILABLE,
            AgentError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AgentError::NotFound(_) => StatusCode::NOT_FOUND,
            AgentError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AgentError::ChannelClosed => StatusCode::SERVICE_UNAVAILABLE,
            AgentError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(ErrorResponse::new(self.to_string()));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the agent.
pub type Result<T> = std::result::Result<T, AgentError>;
