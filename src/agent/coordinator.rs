//! Stale-While-Revalidate Coordinator
//!
//! Runs one of the three [`CacheStrategy`] variants for a classified request.
//! Reads from the partition store are synchronous and return immediately; a
//! background refresh is a separate task whose only side effect is a later
//! `put` into the store.

use std::sync::{Arc, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use super::{failure_response, CacheAgent};
use crate::cache::{duration_ms, CacheEntry};
use crate::error::NetworkError;
use crate::fetch::{FetchRequest, FetchResponse, CACHE_STATUS_HEADER};
use crate::policy::{CacheStrategy, ResourceClass};

/// Everything a strategy needs to know about one intercepted request.
#[derive(Debug, Clone)]
pub(crate) struct Lookup {
    pub request: FetchRequest,
    pub class: ResourceClass,
    pub partition: String,
    pub key: String,
    pub ttl: Duration,
}

impl Lookup {
    fn flight_key(&self) -> String {
        format!("{}|{}", self.partition, self.key)
    }
}

fn serve(response: FetchResponse, cache_status: &str) -> FetchResponse {
    response.with_header(CACHE_STATUS_HEADER, cache_status)
}

impl CacheAgent {
    pub(crate) async fn run_strategy(self: &Arc<Self>, lookup: Lookup) -> FetchResponse {
        match lookup.class.strategy() {
            CacheStrategy::CacheFirstRefresh => self.cache_first_refresh(lookup).await,
            CacheStrategy::NetworkFirstFallback => self.network_first_fallback(lookup).await,
            CacheStrategy::CacheFirst => self.cache_first(lookup).await,
        }
    }

    // == Cache First, Refresh In Background ==
    async fn cache_first_refresh(self: &Arc<Self>, lookup: Lookup) -> FetchResponse {
        let now = self.clock.now_ms();
        let cached = self.store.get(&lookup.partition, &lookup.key, now);

        if let Some(entry) = &cached {
            if entry.is_valid(now) {
                self.metrics.record_hit();
                let response = serve(entry.payload.clone(), "HIT");
                self.spawn_refresh(lookup);
                return response;
            }
        }

        self.metrics.record_miss();
        match self.fetch_and_store(&lookup).await {
            Ok(response) => serve(response, "MISS"),
            Err(err) => self.fallback(&lookup, err, cached),
        }
    }

    // == Network First, Cache Fallback ==
    async fn network_first_fallback(self: &Arc<Self>, lookup: Lookup) -> FetchResponse {
        match self.fetch_and_store(&lookup).await {
            Ok(response) => {
                self.metrics.record_miss();
                serve(response, "MISS")
            }
            Err(err) => {
                let cached = self
                    .store
                    .get(&lookup.partition, &lookup.key, self.clock.now_ms());
                if cached.is_some() {
                    self.metrics.record_hit();
                } else {
                    self.metrics.record_miss();
                }
                self.fallback(&lookup, err, cached)
            }
        }
    }

    // == Cache First, No Revalidation ==
    async fn cache_first(self: &Arc<Self>, lookup: Lookup) -> FetchResponse {
        let now = self.clock.now_ms();
        if let Some(entry) = self.store.get(&lookup.partition, &lookup.key, now) {
            self.metrics.record_hit();
            return serve(entry.payload, "HIT");
        }

        self.metrics.record_miss();
        match self.fetch_and_store(&lookup).await {
            Ok(response) => serve(response, "MISS"),
            Err(err) => self.fallback(&lookup, err, None),
        }
    }

    // == Fallback Chain ==
    /// Picks a response after the network failed: the cached entry for the
    /// key (however old), then for navigations the cached root document,
    /// then a synthesized failure.
    fn fallback(
        &self,
        lookup: &Lookup,
        err: NetworkError,
        cached: Option<CacheEntry<FetchResponse>>,
    ) -> FetchResponse {
        if let Some(entry) = cached {
            warn!(key = %lookup.key, error = %err, "Network failed, serving stale entry");
            return serve(entry.payload, "STALE");
        }

        // An upstream error status is an answer for this URL; only transport
        // failures fall back to the root document.
        let transport_failure = !matches!(err, NetworkError::Status { .. });
        if lookup.class == ResourceClass::Navigation && transport_failure {
            if let Some(root) = self.root_document() {
                warn!(key = %lookup.key, error = %err, "Network failed, serving cached root document");
                return serve(root, "FALLBACK");
            }
        }

        warn!(key = %lookup.key, error = %err, "Network failed with nothing cached");
        failure_response(lookup.class, err)
    }

    fn root_document(&self) -> Option<FetchResponse> {
        [ResourceClass::Static, ResourceClass::Navigation]
            .iter()
            .find_map(|class| self.store.peek(&self.partition_name(*class), "/"))
            .map(|entry| entry.payload)
    }

    // == Network + Write Back ==
    /// Fetches from the network and, on success, stores the response with a
    /// fresh timestamp.
    async fn fetch_and_store(&self, lookup: &Lookup) -> Result<FetchResponse, NetworkError> {
        let started = Instant::now();
        let response = self
            .fetcher
            .fetch(&lookup.request, self.fetcher.default_timeout())
            .await?;
        self.metrics
            .record_response_time(duration_ms(started.elapsed()));

        let entry = CacheEntry::new(
            &lookup.key,
            response.clone(),
            self.clock.now_ms(),
            lookup.ttl,
            &lookup.partition,
        );
        if !self.store.put(&lookup.partition, entry) {
            debug!(partition = %lookup.partition, "Partition missing, response not cached");
        }
        Ok(response)
    }

    // == Background Refresh ==
    /// Schedules a refresh of `lookup` unless one is already running for the
    /// same partition and key. Failures are logged and leave the cached entry
    /// untouched.
    fn spawn_refresh(self: &Arc<Self>, lookup: Lookup) {
        let flight = lookup.flight_key();
        {
            let mut refreshing = self
                .refreshing
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if !refreshing.insert(flight.clone()) {
                debug!(key = %lookup.key, "Refresh already in flight");
                return;
            }
        }

        let agent = Arc::clone(self);
        self.background.spawn(async move {
            match agent.fetch_and_store(&lookup).await {
                Ok(_) => debug!(key = %lookup.key, "Background refresh stored"),
                Err(err) => {
                    warn!(key = %lookup.key, error = %err, "Background refresh failed, keeping cached entry")
                }
            }
            agent
                .refreshing
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&flight);
        });
    }
}
