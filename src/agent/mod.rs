//! Caching Agent
//!
//! Intercepts every outgoing request and answers it from a cache partition,
//! from the network, or from a mix of both. The agent never fails a request:
//! each path ends in a response, synthesized if necessary.
//!
//! Parts:
//! - `coordinator`: the three caching strategies and background refresh
//! - `lifecycle`: install / activate / skip-waiting and generation cleanup
//! - `control`: the typed message channel used by host code

mod control;
mod coordinator;
mod lifecycle;

use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use serde_json::json;
use tokio::sync::watch;
use tokio_util::task::TaskTracker;
use tracing::debug;
use url::Url;

use crate::cache::{Metrics, MetricsSnapshot, PartitionStore};
use crate::clock::SharedClock;
use crate::config::{Config, PartitionLimits};
use crate::error::{AgentError, NetworkError, Result};
use crate::fetch::{
    FetchRequest, FetchResponse, NetworkFetcher, SharedFetcher, CACHE_STATUS_HEADER,
};
use crate::models::{ClearReply, ControlMessage, ControlReply};
use crate::policy::{classify_path, RequestClassifier, ResourceClass, Route, TtlPolicyTable};
use crate::tasks::Sweep;

pub use control::{spawn_control_channel, ControlHandle};
pub use lifecycle::{ActivationReport, InstallReport, LifecycleState};

/// Partition store holding cached network responses.
pub type ResponseStore = PartitionStore<FetchResponse>;

/// Body of the synthesized API failure response.
pub const NETWORK_UNAVAILABLE: &str = "Network unavailable";
/// Body of the synthesized offline response for non-API requests.
pub const OFFLINE_BODY: &str = "Offline: this page is unavailable without a network connection.";

// == Cache Agent ==
pub struct CacheAgent {
    version: String,
    origin: Url,
    store: Arc<ResponseStore>,
    classifier: RequestClassifier,
    ttl_policy: TtlPolicyTable,
    fetcher: NetworkFetcher,
    metrics: Metrics,
    clock: SharedClock,
    limits: [PartitionLimits; 4],
    precache_urls: Vec<String>,
    skip_waiting: AtomicBool,
    state: watch::Sender<LifecycleState>,
    /// Background refreshes in flight
    background: TaskTracker,
    /// Single-flight guard: `partition|key` of refreshes in flight
    refreshing: Mutex<HashSet<String>>,
}

impl std::fmt::Debug for CacheAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheAgent")
            .field("version", &self.version)
            .field("origin", &self.origin.as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl CacheAgent {
    // == Constructors ==
    /// Creates an agent with its own, empty partition store.
    pub fn new(config: &Config, fetcher: SharedFetcher, clock: SharedClock) -> Result<Self> {
        Self::with_store(config, fetcher, clock, Arc::new(PartitionStore::new()))
    }

    /// Creates an agent on top of an existing store, which may still hold
    /// partitions from earlier cache generations.
    pub fn with_store(
        config: &Config,
        fetcher: SharedFetcher,
        clock: SharedClock,
        store: Arc<ResponseStore>,
    ) -> Result<Self> {
        let origin = Url::parse(&config.upstream_url).map_err(|e| {
            AgentError::InvalidRequest(format!("bad upstream URL '{}': {}", config.upstream_url, e))
        })?;
        let (state, _) = watch::channel(LifecycleState::Installing);

        Ok(Self {
            version: config.version.clone(),
            origin,
            store,
            classifier: RequestClassifier::new(config.version.clone()),
            ttl_policy: config.ttl_table(),
            fetcher: NetworkFetcher::new(fetcher, config.fetch_timeout()),
            metrics: Metrics::new(),
            clock,
            limits: config.partition_limits,
            precache_urls: config.precache_urls.clone(),
            skip_waiting: AtomicBool::new(config.skip_waiting),
            state,
            background: TaskTracker::new(),
            refreshing: Mutex::new(HashSet::new()),
        })
    }

    // == Accessors ==
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn store(&self) -> &Arc<ResponseStore> {
        &self.store
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn partition_name(&self, class: ResourceClass) -> String {
        class.partition_name(&self.version)
    }

    fn limits_for(&self, class: ResourceClass) -> PartitionLimits {
        self.limits[class.index()]
    }

    /// Resolves a path against the origin, e.g. for precache manifests.
    pub fn request_for(&self, path: &str) -> Result<FetchRequest> {
        let url = self
            .origin
            .join(path)
            .map_err(|e| AgentError::InvalidRequest(format!("bad path '{}': {}", path, e)))?;
        Ok(FetchRequest::get(url))
    }

    // == Fetch Interception ==
    /// Answers one request. Always produces a response.
    pub async fn handle_fetch(self: &Arc<Self>, request: FetchRequest) -> FetchResponse {
        if !self.is_active() {
            debug!(url = %request.url, state = %self.state(), "Agent not active, passing through");
            return self.pass_through(&request).await;
        }

        match self.classifier.classify(&request) {
            Route::Bypass => self.pass_through(&request).await,
            Route::Cached { class, partition } => {
                let key = request.cache_key();
                let ttl = self.ttl_policy.resolve(&key);
                debug!(key = %key, class = %class, strategy = %class.strategy(), "Intercepted request");
                self.run_strategy(coordinator::Lookup {
                    request,
                    class,
                    partition,
                    key,
                    ttl,
                })
                .await
            }
        }
    }

    /// Sends a non-cacheable request straight to the network.
    async fn pass_through(&self, request: &FetchRequest) -> FetchResponse {
        match self
            .fetcher
            .fetch(request, self.fetcher.default_timeout())
            .await
        {
            Ok(response) => response.with_header(CACHE_STATUS_HEADER, "BYPASS"),
            Err(err) => failure_response(classify_path(request.path()), err),
        }
    }

    // == Control ==
    /// Handles one control-channel message.
    pub fn handle_message(&self, message: ControlMessage) -> ControlReply {
        match message {
            ControlMessage::GetStats => ControlReply::Stats(self.metrics.snapshot()),
            ControlMessage::ClearCache => {
                let removed = self.store.clear_all();
                debug!(removed, "Cleared all partitions");
                ControlReply::Cleared(ClearReply { success: true })
            }
            ControlMessage::SkipWaiting => {
                self.skip_waiting();
                ControlReply::Ack
            }
        }
    }

    /// Waits until every background refresh spawned so far has finished.
    pub async fn settle(&self) {
        self.background.close();
        self.background.wait().await;
        self.background.reopen();
    }
}

impl Sweep for CacheAgent {
    fn name(&self) -> &'static str {
        "agent partitions"
    }

    fn sweep(&self) -> usize {
        self.store.sweep(self.clock.now_ms())
    }
}

// == Synthesized Responses ==
/// Response used when the network failed and nothing cached can stand in.
///
/// An upstream error status is passed on as-is; transport failures become a
/// 503, as JSON for API requests and plain text otherwise.
pub(crate) fn failure_response(class: ResourceClass, err: NetworkError) -> FetchResponse {
    if let Some(upstream) = err.into_upstream_response() {
        return upstream.with_header(CACHE_STATUS_HEADER, "MISS");
    }
    unavailable_response(class)
}

pub fn unavailable_response(class: ResourceClass) -> FetchResponse {
    let response = match class {
        ResourceClass::Api => FetchResponse::json(503, &json!({ "error": NETWORK_UNAVAILABLE })),
        _ => FetchResponse::text(503, OFFLINE_BODY),
    };
    response.with_header(CACHE_STATUS_HEADER, "OFFLINE")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_unavailable_is_json_503() {
        let resp = unavailable_response(ResourceClass::Api);
        assert_eq!(resp.status, 503);
        assert_eq!(resp.header("content-type"), Some("application/json"));

        let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(body["error"], NETWORK_UNAVAILABLE);
    }

    #[test]
    fn test_navigation_unavailable_is_text() {
        let resp = unavailable_response(ResourceClass::Navigation);
        assert_eq!(resp.status, 503);
        assert!(resp.header("content-type").unwrap().starts_with("text/plain"));
        assert_eq!(resp.header(CACHE_STATUS_HEADER), Some("OFFLINE"));
    }

    #[test]
    fn test_failure_response_passes_upstream_status() {
        let err = NetworkError::Status {
            status: 404,
            response: Box::new(FetchResponse::new(404, "no such product")),
        };
        let resp = failure_response(ResourceClass::Api, err);
        assert_eq!(resp.status, 404);
        assert_eq!(resp.body, "no such product");
    }
}
