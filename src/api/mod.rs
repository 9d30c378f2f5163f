//! API Module
//!
//! HTTP handlers and routing for the agent.
//!
//! # Endpoints
//! - `GET /__agent/health` - Health check endpoint
//! - `POST /__agent/message` - Control channel over HTTP
//! - `GET|PUT|DELETE /__agent/store/:key` - Cache service
//! - fallback - Caching proxy to the upstream origin

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
