//! Events, platform context, and the response channel back to the caller.
//!
//! An [`Event`] is the unit of work on the runtime queue: the initial
//! context item plus the [`PlatformContext`] that knows how to deliver the
//! final answer to whichever trigger created the event.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::context::ContextItem;
use crate::error::ResponseDeliveryError;

/// Unique identifier for an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the originating caller receives once the event is finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EventResponse {
    /// The terminal content of a completed pipeline
    Content {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item: Option<ContextItem>,
    },

    /// The pipeline aborted or failed before producing content
    Error { kind: String, message: String },
}

impl EventResponse {
    pub fn content(item: &ContextItem) -> Self {
        Self::Content {
            content: item.content.clone(),
            item: Some(item.clone()),
        }
    }

    pub fn error(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// The content or the error message, whichever applies.
    pub fn text(&self) -> &str {
        match self {
            Self::Content { content, .. } => content,
            Self::Error { message, .. } => message,
        }
    }
}

/// Delivers an event's final response back to its trigger.
#[async_trait]
pub trait ResponseHandler: Send + Sync {
    async fn respond(&self, response: EventResponse) -> Result<(), ResponseDeliveryError>;
}

/// A response handler that completes a oneshot channel.
///
/// Used by request/response triggers (HTTP, CLI) that wait for the answer.
pub struct OneshotResponder {
    platform: String,
    sender: Mutex<Option<oneshot::Sender<EventResponse>>>,
}

impl OneshotResponder {
    pub fn channel(
        platform: impl Into<String>,
    ) -> (Arc<dyn ResponseHandler>, oneshot::Receiver<EventResponse>) {
        let (tx, rx) = oneshot::channel();
        let responder = Self {
            platform: platform.into(),
            sender: Mutex::new(Some(tx)),
        };
        (Arc::new(responder), rx)
    }
}

#[async_trait]
impl ResponseHandler for OneshotResponder {
    async fn respond(&self, response: EventResponse) -> Result<(), ResponseDeliveryError> {
        let sender = self
            .sender
            .lock()
            .map_err(|_| ResponseDeliveryError::Rejected {
                platform: self.platform.clone(),
                reason: "responder lock poisoned".into(),
            })?
            .take()
            .ok_or_else(|| ResponseDeliveryError::AlreadyDelivered(self.platform.clone()))?;
        sender
            .send(response)
            .map_err(|_| ResponseDeliveryError::ReceiverDropped(self.platform.clone()))
    }
}

/// Per-event metadata carrying the response channel back to the trigger.
#[derive(Clone)]
pub struct PlatformContext {
    pub platform: String,
    pub response_handler: Arc<dyn ResponseHandler>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl PlatformContext {
    pub fn new(platform: impl Into<String>, response_handler: Arc<dyn ResponseHandler>) -> Self {
        Self {
            platform: platform.into(),
            response_handler,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// The conversation this event belongs to, if the trigger knows it.
    pub fn conversation_id(&self) -> Option<&str> {
        self.metadata.get("conversation_id").and_then(|v| v.as_str())
    }
}

impl std::fmt::Debug for PlatformContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformContext")
            .field("platform", &self.platform)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// A unit of work on the event queue.
#[derive(Debug)]
pub struct Event {
    pub id: EventId,
    pub initial_item: ContextItem,
    pub platform: PlatformContext,
    pub enqueued_at: DateTime<Utc>,
}

impl Event {
    pub fn new(initial_item: ContextItem, platform: PlatformContext) -> Self {
        Self {
            id: EventId::new(),
            initial_item,
            platform,
            enqueued_at: Utc::now(),
        }
    }
}

/// Coarse liveness snapshot of the runtime loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentState {
    /// Events waiting in the queue, excluding the one being processed
    pub queue_length: usize,
    pub is_running: bool,
    pub last_update: DateTime<Utc>,
    /// Events finished since startup
    #[serde(default)]
    pub events_processed: u64,
}

impl Default for AgentState {
    fn default() -> Self {
        Self {
            queue_length: 0,
            is_running: false,
            last_update: Utc::now(),
            events_processed: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn oneshot_responder_delivers_once() {
        let (handler, rx) = OneshotResponder::channel("http");
        handler
            .respond(EventResponse::error("executor_error", "boom"))
            .await
            .unwrap();
        let second = handler.respond(EventResponse::error("x", "y")).await;
        assert_eq!(
            second,
            Err(ResponseDeliveryError::AlreadyDelivered("http".into()))
        );
        let response = rx.await.unwrap();
        assert!(response.is_error());
        assert_eq!(response.text(), "boom");
    }

    #[tokio::test]
    async fn dropped_receiver_is_reported() {
        let (handler, rx) = OneshotResponder::channel("cli");
        drop(rx);
        let item = ContextItem::message("cli", "hello");
        let err = handler.respond(EventResponse::content(&item)).await.unwrap_err();
        assert!(matches!(err, ResponseDeliveryError::ReceiverDropped(_)));
    }

    #[test]
    fn response_serializes_with_status_tag() {
        let json = serde_json::to_value(EventResponse::error("plan_validation_error", "nope")).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["kind"], "plan_validation_error");
    }

    #[test]
    fn platform_context_reads_conversation_id() {
        let (handler, _rx) = OneshotResponder::channel("http");
        let platform = PlatformContext::new("http", handler)
            .with_metadata("conversation_id", serde_json::json!("conv-1"));
        assert_eq!(platform.conversation_id(), Some("conv-1"));
    }

    #[test]
    fn agent_state_starts_idle() {
        let state = AgentState::default();
        assert!(!state.is_running);
        assert_eq!(state.queue_length, 0);
    }
}
