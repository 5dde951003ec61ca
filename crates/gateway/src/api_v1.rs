//! HTTP API v1.
//!
//! Endpoints:
//!
//! - `POST /v1/events`: Enqueue a message and wait for its response
//! - `GET  /v1/state`: Current agent state
//! - `GET  /v1/plugins`: Registered plugins, executors, and capabilities

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use conduit_core::capability::CapabilityDescriptor;
use conduit_core::context::ContextItem;
use conduit_core::error::EnqueueError;
use conduit_core::event::{AgentState, EventResponse};
use conduit_core::plugin::TriggerDescriptor;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::SharedState;

/// Platform name stamped on events created over HTTP.
pub const PLATFORM: &str = "http";

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        .route("/events", post(create_event_handler))
        .route("/state", get(state_handler))
        .route("/plugins", get(plugins_handler))
        .with_state(state)
}

// ── Request / response types ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct EventRequest {
    pub content: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Extra platform metadata passed through to plugins
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventReply {
    pub event_id: String,
    #[serde(flatten)]
    pub response: EventResponse,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    event_id: Option<String>,
}

fn error_response(status: StatusCode, error: impl Into<String>, event_id: Option<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            event_id,
        }),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
struct ExecutorDto {
    name: String,
    description: String,
}

#[derive(Debug, Serialize)]
struct PluginDto {
    id: String,
    description: String,
    always_run_first: bool,
    executors: Vec<ExecutorDto>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    triggers: Vec<TriggerDescriptor>,
}

#[derive(Debug, Serialize)]
struct PluginListResponse {
    plugins: Vec<PluginDto>,
    capabilities: Vec<CapabilityDescriptor>,
}

// ── Handlers ──────────────────────────────────────────────────────────────

/// `POST /v1/events`: the HTTP trigger.
///
/// 200 with the terminal content, 500 with the error payload when the
/// pipeline failed, 504 when the response did not arrive in time.
async fn create_event_handler(
    State(state): State<SharedState>,
    Json(payload): Json<EventRequest>,
) -> Response {
    if payload.content.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "content must not be empty", None);
    }

    let mut metadata = payload.metadata;
    if let Some(conversation_id) = payload.conversation_id {
        metadata.insert("conversation_id".into(), conversation_id.into());
    }

    let item = ContextItem::message(PLATFORM, payload.content);
    let (event_id, rx) = match state.runtime.send(item, PLATFORM, metadata) {
        Ok(sent) => sent,
        Err(e) => {
            let status = match e {
                EnqueueError::MalformedItem(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::SERVICE_UNAVAILABLE,
            };
            warn!(error = %e, "Rejected inbound event");
            return error_response(status, e.to_string(), None);
        }
    };
    info!(event_id = %event_id.0, "Event enqueued over HTTP");

    match tokio::time::timeout(state.response_timeout, rx).await {
        Ok(Ok(response)) => {
            let status = if response.is_error() {
                StatusCode::INTERNAL_SERVER_ERROR
            } else {
                StatusCode::OK
            };
            let reply = EventReply {
                event_id: event_id.0,
                response,
            };
            (status, Json(reply)).into_response()
        }
        Ok(Err(_)) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "runtime dropped the event without responding",
            Some(event_id.0),
        ),
        Err(_) => error_response(
            StatusCode::GATEWAY_TIMEOUT,
            format!(
                "no response within {}s; the event is still queued",
                state.response_timeout.as_secs()
            ),
            Some(event_id.0),
        ),
    }
}

async fn state_handler(State(state): State<SharedState>) -> Json<AgentState> {
    Json(state.runtime.agent_state())
}

async fn plugins_handler(State(state): State<SharedState>) -> Json<PluginListResponse> {
    let registry = state.runtime.plugins();
    let first = registry.first_run_steps();
    let descriptors = registry.descriptors();
    let triggers = registry.triggers();

    let plugins = registry
        .plugin_ids()
        .into_iter()
        .map(|id| PluginDto {
            id: id.to_string(),
            description: registry.plugin_description(id).unwrap_or_default().to_string(),
            always_run_first: first.iter().any(|s| s.plugin_id == id),
            executors: descriptors
                .iter()
                .filter(|d| d.plugin_id == id)
                .map(|d| ExecutorDto {
                    name: d.name.clone(),
                    description: d.description.clone(),
                })
                .collect(),
            triggers: triggers
                .iter()
                .filter(|(plugin_id, _)| plugin_id == id)
                .map(|(_, trigger)| trigger.clone())
                .collect(),
        })
        .collect();

    Json(PluginListResponse {
        plugins,
        capabilities: state.runtime.capabilities().descriptors(),
    })
}
