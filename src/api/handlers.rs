//! API Handlers
//!
//! HTTP request handlers for the agent's own endpoints and for the proxy
//! fallback that feeds every other request through the cache agent.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    extract::{Path, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use crate::agent::{CacheAgent, ControlHandle};
use crate::error::{AgentError, Result};
use crate::fetch::{is_hop_by_hop, FetchRequest, FetchResponse};
use crate::models::requests::validate_key;
use crate::models::{
    ControlMessage, ControlReply, DeleteResponse, GetResponse, HealthResponse, SetRequest,
    SetResponse,
};
use crate::service::CacheService;

/// Largest request body forwarded upstream.
const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<CacheAgent>,
    pub service: Arc<CacheService>,
    pub control: ControlHandle,
}

impl AppState {
    pub fn new(agent: Arc<CacheAgent>, service: Arc<CacheService>, control: ControlHandle) -> Self {
        Self {
            agent,
            service,
            control,
        }
    }
}

/// Handler for GET /__agent/health
///
/// Reports lifecycle state and the entry count of every partition.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = state.agent.store();
    let partitions = store
        .partition_names()
        .into_iter()
        .map(|name| {
            let len = store.len(&name);
            (name, len)
        })
        .collect();

    Json(HealthResponse::healthy(
        state.agent.version(),
        state.agent.state().to_string(),
        partitions,
    ))
}

/// Handler for POST /__agent/message
///
/// Forwards a control message over the control channel. Replies without a
/// payload become `204 No Content`.
pub async fn message_handler(
    State(state): State<AppState>,
    Json(message): Json<ControlMessage>,
) -> Result<Response> {
    let reply = state.control.send(message).await?;
    Ok(match reply {
        ControlReply::Ack => StatusCode::NO_CONTENT.into_response(),
        other => Json(other).into_response(),
    })
}

/// Handler for GET /__agent/store/:key
pub async fn get_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>> {
    let value = state
        .service
        .get_value(&key)
        .ok_or_else(|| AgentError::NotFound(key.clone()))?;

    Ok(Json(GetResponse::new(key, value)))
}

/// Handler for PUT /__agent/store/:key
///
/// Stores a JSON value with an optional TTL in seconds.
pub async fn set_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(req): Json<SetRequest>,
) -> Result<Json<SetResponse>> {
    if let Some(error_msg) = validate_key(&key) {
        return Err(AgentError::InvalidRequest(error_msg));
    }

    state
        .service
        .set(&key, &req.value, req.ttl.map(Duration::from_secs))?;

    Ok(Json(SetResponse::new(key)))
}

/// Handler for DELETE /__agent/store/:key
pub async fn delete_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<DeleteResponse>> {
    if !state.service.delete(&key) {
        return Err(AgentError::NotFound(key));
    }

    Ok(Json(DeleteResponse::new(key)))
}

/// Fallback handler: every request not addressed to the agent itself is
/// answered by the cache agent.
pub async fn proxy_handler(State(state): State<AppState>, request: Request) -> Result<Response> {
    let fetch = into_fetch_request(&state.agent, request).await?;
    let response = state.agent.handle_fetch(fetch).await;
    Ok(into_http_response(response))
}

async fn into_fetch_request(agent: &CacheAgent, request: Request) -> Result<FetchRequest> {
    let (parts, body) = request.into_parts();

    let mut url = agent.origin().clone();
    url.set_path(parts.uri.path());
    url.set_query(parts.uri.query());

    let body = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| AgentError::InvalidRequest(format!("unreadable body: {}", e)))?;

    let mut fetch = FetchRequest::new(parts.method, url).with_body(body);
    for (name, value) in &parts.headers {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            fetch = fetch.with_header(name.as_str(), value);
        }
    }
    Ok(fetch)
}

fn into_http_response(response: FetchResponse) -> Response {
    let mut builder = Response::builder().status(response.status);
    for (name, value) in &response.headers {
        if !is_hop_by_hop(name) {
            builder = builder.header(name.as_str(), value.as_str());
        }
    }

    builder
        .body(Body::from(response.body))
        .unwrap_or_else(|e| {
            warn!(error = %e, "Dropping malformed upstream response");
            AgentError::Internal(e.to_string()).into_response()
        })
}
