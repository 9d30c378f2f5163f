//! Storefront Cache - an offline-capable caching agent for a storefront
//!
//! Sits between a client and its origin, answering requests from versioned
//! cache partitions with per-class strategies (cache-first with background
//! refresh, network-first with fallback, cache-first) and keeping working
//! when the network does not.

pub mod agent;
pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod fetch;
pub mod models;
pub mod policy;
pub mod service;
pub mod storage;
pub mod tasks;

pub use agent::{spawn_control_channel, CacheAgent, ControlHandle};
pub use api::AppState;
pub use config::Config;
pub use service::CacheService;
pub use tasks::spawn_sweep_task;
