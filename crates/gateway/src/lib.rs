//! HTTP gateway for conduit.
//!
//! The gateway is a trigger like any other: `POST /v1/events` turns a
//! request into an event on the runtime's queue and waits for that event's
//! response. It also exposes the runtime's state and plugins, and pushes
//! monitor snapshots over WebSocket and SSE.
//!
//! Built on Axum.

pub mod api_v1;
pub mod monitor;

use axum::extract::DefaultBodyLimit;
use axum::{Router, response::Json, routing::get};
use conduit_config::GatewayConfig;
use conduit_runtime::RuntimeHandle;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub runtime: RuntimeHandle,
    /// How long `POST /v1/events` waits before answering 504
    pub response_timeout: Duration,
}

impl GatewayState {
    pub fn new(runtime: RuntimeHandle, config: &GatewayConfig) -> Self {
        Self {
            runtime,
            response_timeout: Duration::from_secs(config.response_timeout_secs),
        }
    }
}

pub type SharedState = Arc<GatewayState>;

/// Build the full router: `/health` plus everything under `/v1`.
pub fn build_router(state: SharedState) -> Router {
    let v1 = api_v1::v1_router(state.clone()).merge(monitor::monitor_router(state));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", v1)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Serve the gateway until `shutdown` resolves.
pub async fn start(
    runtime: RuntimeHandle,
    config: &GatewayConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.host, config.port);
    let app = build_router(Arc::new(GatewayState::new(runtime, config)));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Gateway stopped");
    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
