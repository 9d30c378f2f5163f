//! Network Fetcher
//!
//! [`Fetcher`] is the seam to the real network; [`NetworkFetcher`] wraps any
//! fetcher with a deadline and an explicit cancellation token, and turns
//! non-2xx answers into [`NetworkError::Status`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{FetchRequest, FetchResponse};
use crate::cache::duration_ms;
use crate::error::NetworkError;

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

pub(crate) fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Performs one network round trip. Implementations report transport
/// failures only; status handling belongs to [`NetworkFetcher`].
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn send(&self, request: &FetchRequest) -> Result<FetchResponse, NetworkError>;
}

pub type SharedFetcher = Arc<dyn Fetcher>;

// == HTTP Fetcher ==
/// `reqwest`-backed fetcher used by the binary.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn send(&self, request: &FetchRequest) -> Result<FetchResponse, NetworkError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone());

        for (name, value) in &request.headers {
            if !is_hop_by_hop(name) {
                builder = builder.header(name.as_str(), value.as_str());
            }
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| NetworkError::Connection(e.to_string()))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| NetworkError::Connection(e.to_string()))?;

        Ok(FetchResponse {
            status,
            headers,
            body,
        })
    }
}

// == Network Fetcher ==
/// Deadline- and cancellation-aware wrapper around a [`Fetcher`].
#[derive(Clone)]
pub struct NetworkFetcher {
    inner: SharedFetcher,
    default_timeout: Duration,
}

impl NetworkFetcher {
    pub fn new(inner: SharedFetcher, default_timeout: Duration) -> Self {
        Self {
            inner,
            default_timeout,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Fetches with the given deadline.
    pub async fn fetch(
        &self,
        request: &FetchRequest,
        timeout: Duration,
    ) -> Result<FetchResponse, NetworkError> {
        self.fetch_with_cancel(request, timeout, &CancellationToken::new())
            .await
    }

    /// Fetches until the response arrives, the deadline passes, or `cancel`
    /// fires. The in-flight request is dropped (and thereby aborted) in the
    /// latter two cases.
    pub async fn fetch_with_cancel(
        &self,
        request: &FetchRequest,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<FetchResponse, NetworkError> {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(NetworkError::Cancelled),
            _ = tokio::time::sleep(timeout) => {
                let timeout_ms = duration_ms(timeout);
                debug!(url = %request.url, timeout_ms, "Fetch timed out");
                return Err(NetworkError::Timeout(timeout_ms));
            }
            result = self.inner.send(request) => result?,
        };

        if !response.is_success() {
            return Err(NetworkError::Status {
                status: response.status,
                response: Box::new(response),
            });
        }
        Ok(response)
    }
}
