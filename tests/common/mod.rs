//! Shared helpers for integration tests: a scripted network and a builder
//! for agents running on a manual clock.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use storefront_cache::clock::ManualClock;
use storefront_cache::error::NetworkError;
use storefront_cache::fetch::{FetchRequest, FetchResponse, Fetcher};
use storefront_cache::{CacheAgent, Config};
use url::Url;

pub const ORIGIN: &str = "http://shop.test";

#[derive(Default)]
struct Script {
    offline: bool,
    responses: HashMap<String, (u16, String)>,
    failing: HashSet<String>,
    calls: Vec<String>,
}

/// Fetcher answering from a table keyed by path and query.
///
/// Unknown paths answer 404; `fail` and `set_offline` simulate transport
/// failures.
#[derive(Default)]
pub struct ScriptedFetcher {
    script: Mutex<Script>,
}

impl ScriptedFetcher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, path: &str, status: u16, body: &str) {
        self.script
            .lock()
            .unwrap()
            .responses
            .insert(path.to_string(), (status, body.to_string()));
    }

    pub fn fail(&self, path: &str) {
        self.script.lock().unwrap().failing.insert(path.to_string());
    }

    pub fn set_offline(&self, offline: bool) {
        self.script.lock().unwrap().offline = offline;
    }

    pub fn calls(&self) -> usize {
        self.script.lock().unwrap().calls.len()
    }

    pub fn calls_for(&self, path: &str) -> usize {
        self.script
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.as_str() == path)
            .count()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn send(&self, request: &FetchRequest) -> Result<FetchResponse, NetworkError> {
        let key = request.cache_key();
        let mut script = self.script.lock().unwrap();
        script.calls.push(key.clone());

        if script.offline || script.failing.contains(&key) {
            return Err(NetworkError::Connection(format!("unreachable: {}", key)));
        }
        Ok(match script.responses.get(&key) {
            Some((status, body)) => FetchResponse::new(*status, body.clone()),
            None => FetchResponse::new(404, "not found"),
        })
    }
}

pub fn test_config(precache: &[&str]) -> Config {
    Config {
        upstream_url: ORIGIN.to_string(),
        precache_urls: precache.iter().map(|p| p.to_string()).collect(),
        ..Config::default()
    }
}

pub struct Harness {
    pub agent: Arc<CacheAgent>,
    pub network: Arc<ScriptedFetcher>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    /// Builds and installs an agent for `config`.
    pub async fn installed(config: Config, network: Arc<ScriptedFetcher>) -> Self {
        let clock = Arc::new(ManualClock::new(0));
        let agent =
            Arc::new(CacheAgent::new(&config, network.clone(), clock.clone()).unwrap());
        agent.install().await.unwrap();
        Self {
            agent,
            network,
            clock,
        }
    }

    pub async fn get(&self, path: &str) -> FetchResponse {
        let url = Url::parse(ORIGIN).unwrap().join(path).unwrap();
        self.agent.handle_fetch(FetchRequest::get(url)).await
    }
}

pub fn body_text(response: &FetchResponse) -> &str {
    std::str::from_utf8(&response.body).unwrap()
}
