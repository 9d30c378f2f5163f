//! Configuration Module
//!
//! Handles loading and managing agent configuration from environment variables.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::policy::{ResourceClass, TtlPolicyTable, TtlRule};

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Size bound and max-age ceiling of one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionLimits {
    pub max_entries: usize,
    pub max_age: Duration,
}

impl PartitionLimits {
    pub const fn new(max_entries: usize, max_age_secs: u64) -> Self {
        Self {
            max_entries,
            max_age: Duration::from_secs(max_age_secs),
        }
    }

    /// Built-in limits per resource class.
    pub fn default_for(class: ResourceClass) -> Self {
        match class {
            ResourceClass::Static => Self::new(100, 30 * DAY),
            ResourceClass::Image => Self::new(60, 7 * DAY),
            ResourceClass::Api => Self::new(50, HOUR),
            ResourceClass::Navigation => Self::new(50, DAY),
        }
    }
}

/// Agent configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Cache generation tag appended to every partition name
    pub version: String,
    /// Origin that requests are forwarded to
    pub upstream_url: String,
    /// HTTP server port
    pub server_port: u16,
    /// Max-age sweep interval in seconds
    pub sweep_interval: u64,
    /// Network timeout in milliseconds
    pub fetch_timeout_ms: u64,
    /// Paths precached into the static partition on install
    pub precache_urls: Vec<String>,
    /// Activate right after install instead of waiting for SKIP_WAITING
    pub skip_waiting: bool,
    /// Directory for durable cache-service entries; memory-only when unset
    pub storage_dir: Option<PathBuf>,
    /// Default TTL in seconds when no rule matches
    pub default_ttl: u64,
    /// Ordered TTL rules; empty means the storefront defaults
    pub ttl_rules: Vec<TtlRule>,
    /// Per-class partition limits, indexed like `ResourceClass::ALL`
    pub partition_limits: [PartitionLimits; 4],
    /// Cache service capacity
    pub service_max_entries: usize,
    /// Cache service default TTL in seconds
    pub service_default_ttl: u64,
    /// Substrings of service keys that are written through to durable storage
    pub persist_keys: Vec<String>,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_VERSION` - Generation tag (default: v1)
    /// - `UPSTREAM_URL` - Origin to proxy (default: http://127.0.0.1:8080)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `SWEEP_INTERVAL` - Sweep frequency in seconds (default: 600)
    /// - `FETCH_TIMEOUT_MS` - Network timeout (default: 10000)
    /// - `PRECACHE_URLS` - Comma-separated install manifest
    /// - `SKIP_WAITING` - Activate immediately after install (default: true)
    /// - `STORAGE_DIR` - Durable storage directory (default: unset, memory only)
    /// - `DEFAULT_TTL` - Fallback TTL in seconds (default: 300)
    /// - `TTL_RULES` - Comma-separated `<pattern>=<ttl_ms>` rules
    /// - `{STATIC,IMAGES,API,PAGES}_MAX_ENTRIES` / `_MAX_AGE` - Partition limits
    /// - `SERVICE_MAX_ENTRIES` / `SERVICE_DEFAULT_TTL` - Cache service limits
    /// - `PERSIST_KEYS` - Comma-separated persistence allow-list
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let partition_limits = ResourceClass::ALL.map(|class| {
            let base = PartitionLimits::default_for(class);
            let prefix = class.partition_kind().to_ascii_uppercase();
            PartitionLimits {
                max_entries: env_or(&format!("{}_MAX_ENTRIES", prefix), base.max_entries),
                max_age: Duration::from_secs(env_or(
                    &format!("{}_MAX_AGE", prefix),
                    base.max_age.as_secs(),
                )),
            }
        });

        let ttl_rules = env::var("TTL_RULES")
            .map(|raw| parse_ttl_rules(&raw))
            .unwrap_or_default();

        Self {
            version: env::var("CACHE_VERSION").unwrap_or(defaults.version),
            upstream_url: env::var("UPSTREAM_URL").unwrap_or(defaults.upstream_url),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            sweep_interval: env_or("SWEEP_INTERVAL", defaults.sweep_interval),
            fetch_timeout_ms: env_or("FETCH_TIMEOUT_MS", defaults.fetch_timeout_ms),
            precache_urls: env::var("PRECACHE_URLS")
                .map(|raw| split_list(&raw))
                .unwrap_or(defaults.precache_urls),
            skip_waiting: env_or("SKIP_WAITING", defaults.skip_waiting),
            storage_dir: env::var("STORAGE_DIR").ok().map(PathBuf::from),
            default_ttl: env_or("DEFAULT_TTL", defaults.default_ttl),
            ttl_rules,
            partition_limits,
            service_max_entries: env_or("SERVICE_MAX_ENTRIES", defaults.service_max_entries),
            service_default_ttl: env_or("SERVICE_DEFAULT_TTL", defaults.service_default_ttl),
            persist_keys: env::var("PERSIST_KEYS")
                .map(|raw| split_list(&raw))
                .unwrap_or(defaults.persist_keys),
        }
    }

    pub fn limits_for(&self, class: ResourceClass) -> PartitionLimits {
        self.partition_limits[class.index()]
    }

    /// TTL table built from the configured rules.
    pub fn ttl_table(&self) -> TtlPolicyTable {
        let default_ttl = Duration::from_secs(self.default_ttl);
        if self.ttl_rules.is_empty() {
            let storefront = TtlPolicyTable::storefront();
            TtlPolicyTable::from_rules(storefront.rules().to_vec(), default_ttl)
        } else {
            TtlPolicyTable::from_rules(self.ttl_rules.clone(), default_ttl)
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "v1".to_string(),
            upstream_url: "http://127.0.0.1:8080".to_string(),
            server_port: 3000,
            sweep_interval: 10 * MINUTE,
            fetch_timeout_ms: 10_000,
            precache_urls: vec![
                "/".to_string(),
                "/manifest.webmanifest".to_string(),
                "/static/js/main.js".to_string(),
                "/static/css/main.css".to_string(),
                "/favicon.ico".to_string(),
            ],
            skip_waiting: true,
            storage_dir: None,
            default_ttl: 5 * MINUTE,
            ttl_rules: Vec::new(),
            partition_limits: ResourceClass::ALL.map(PartitionLimits::default_for),
            service_max_entries: 100,
            service_default_ttl: 5 * MINUTE,
            persist_keys: vec![
                "products".to_string(),
                "bestSellers".to_string(),
                "userProfile".to_string(),
            ],
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parses comma-separated TTL rules, skipping (and logging) invalid ones.
pub fn parse_ttl_rules(raw: &str) -> Vec<TtlRule> {
    split_list(raw)
        .into_iter()
        .filter_map(|item| match item.parse::<TtlRule>() {
            Ok(rule) => Some(rule),
            Err(e) => {
                warn!("Ignoring TTL rule: {}", e);
                None
            }
        })
        .collect()
}
