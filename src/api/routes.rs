//! API Routes
//!
//! Configures the Axum router: agent endpoints under `/__agent`, everything
//! else through the caching proxy.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    delete_handler, get_handler, health_handler, message_handler, proxy_handler, set_handler,
    AppState,
};

/// Creates the main router with all endpoints configured.
///
/// # Endpoints
/// - `GET /__agent/health` - Health and lifecycle state
/// - `POST /__agent/message` - Control messages (`GET_STATS`, `CLEAR_CACHE`, `SKIP_WAITING`)
/// - `GET|PUT|DELETE /__agent/store/:key` - Cache service
/// - anything else - Intercepted and answered by the cache agent
///
/// # Middleware
/// - CORS: Allows any origin
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/__agent/health", get(health_handler))
        .route("/__agent/message", post(message_handler))
        .route(
            "/__agent/store/:key",
            get(get_handler).put(set_handler).delete(delete_handler),
        )
        .fallback(proxy_handler)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
