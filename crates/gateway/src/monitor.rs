//! Monitor push surfaces.
//!
//! - `GET /v1/monitor/ws`: WebSocket, one JSON text frame per snapshot
//! - `GET /v1/monitor/stream`: SSE, event name is the snapshot kind
//!
//! Both start with the current agent state, then follow the monitor bus.
//! A client that falls behind skips the snapshots it missed.

use axum::{
    Router,
    extract::State,
    extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::get,
};
use conduit_core::monitor::MonitorSnapshot;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info};

use crate::SharedState;

pub fn monitor_router(state: SharedState) -> Router {
    Router::new()
        .route("/monitor/ws", get(ws_handler))
        .route("/monitor/stream", get(stream_handler))
        .with_state(state)
}

fn sse_event(snapshot: &MonitorSnapshot) -> SseEvent {
    let data = serde_json::to_string(snapshot).unwrap_or_default();
    SseEvent::default().event(snapshot.kind()).data(data)
}

// ── WebSocket ─────────────────────────────────────────────────────────────

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

async fn send_snapshot(socket: &mut WebSocket, snapshot: &MonitorSnapshot) -> bool {
    let json = serde_json::to_string(snapshot).unwrap_or_default();
    socket.send(WsMessage::Text(json.into())).await.is_ok()
}

async fn handle_ws_connection(mut socket: WebSocket, state: SharedState) {
    info!("Monitor WebSocket connected");
    let mut rx = state.runtime.subscribe();

    let initial = MonitorSnapshot::AgentState(state.runtime.agent_state());
    if !send_snapshot(&mut socket, &initial).await {
        return;
    }

    loop {
        tokio::select! {
            snapshot = rx.recv() => match snapshot {
                Ok(snapshot) => {
                    if !send_snapshot(&mut socket, &snapshot).await {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Monitor WebSocket lagging");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                // Clients have nothing to say; pings are answered by axum.
                Some(Ok(_)) => {}
            },
        }
    }

    info!("Monitor WebSocket closed");
}

// ── SSE ───────────────────────────────────────────────────────────────────

async fn stream_handler(
    State(state): State<SharedState>,
) -> Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>> {
    let initial = Arc::new(MonitorSnapshot::AgentState(state.runtime.agent_state()));
    let updates = BroadcastStream::new(state.runtime.subscribe()).filter_map(|result| result.ok());

    let stream = tokio_stream::once(initial)
        .chain(updates)
        .map(|snapshot| Ok(sse_event(&snapshot)));

    Sse::new(stream).keep_alive(KeepAlive::default())
}
