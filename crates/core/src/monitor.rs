//! Monitor bus: best-effort fan-out of runtime snapshots to observers.
//!
//! Publishing never blocks: snapshots go into a `tokio::sync::broadcast`
//! channel, and a subscriber that falls behind simply loses the oldest
//! snapshots (it sees `RecvError::Lagged`) instead of slowing the pipeline.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::context::{ContextChain, ContextItem};
use crate::error::MonitorError;
use crate::event::AgentState;
use crate::pipeline::PipelineState;

/// Everything observers can be told about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MonitorSnapshot {
    AgentState(AgentState),
    PipelineState(PipelineState),
    ContextChain {
        #[serde(rename = "eventId")]
        event_id: Option<String>,
        items: Vec<ContextItem>,
    },
}

impl MonitorSnapshot {
    pub fn context_chain(event_id: &str, chain: &ContextChain) -> Self {
        Self::ContextChain {
            event_id: Some(event_id.to_string()),
            items: chain.items().to_vec(),
        }
    }

    /// The chain snapshot sent when no event is active.
    pub fn empty_chain() -> Self {
        Self::ContextChain {
            event_id: None,
            items: Vec::new(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::AgentState(_) => "agent_state",
            Self::PipelineState(_) => "pipeline_state",
            Self::ContextChain { .. } => "context_chain",
        }
    }
}

/// Broadcast bus for [`MonitorSnapshot`]s.
pub struct MonitorBus {
    sender: broadcast::Sender<Arc<MonitorSnapshot>>,
}

impl MonitorBus {
    /// Create a new bus; `capacity` is how far a subscriber may lag.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Fire-and-forget publish.
    pub fn publish(&self, snapshot: MonitorSnapshot) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(snapshot));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<MonitorSnapshot>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for MonitorBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// An external observer (console logger, push channel, dashboard feed).
#[async_trait]
pub trait MonitorProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn init(&self) -> Result<(), MonitorError> {
        Ok(())
    }

    async fn update_state(&self, state: &AgentState);

    /// Pipeline and context chain snapshots.
    async fn publish_event(&self, snapshot: &MonitorSnapshot);
}
