//! Push-channel monitor: serialized snapshots into a bounded queue.
//!
//! Transports (WebSocket, SSE, a dashboard bridge) drain the receiver at
//! their own pace. When the queue is full the snapshot is dropped rather
//! than awaited.

use async_trait::async_trait;
use conduit_core::event::AgentState;
use conduit_core::monitor::{MonitorProvider, MonitorSnapshot};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

pub struct ChannelMonitor {
    sender: mpsc::Sender<serde_json::Value>,
    dropped: AtomicU64,
}

impl ChannelMonitor {
    /// Create a monitor and the receiving end of its queue.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<serde_json::Value>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
                dropped: AtomicU64::new(0),
            },
            receiver,
        )
    }

    /// Snapshots dropped because the consumer was full or gone.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn push(&self, snapshot: &MonitorSnapshot) {
        let Ok(value) = serde_json::to_value(snapshot) else {
            return;
        };
        if self.sender.try_send(value).is_err() {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(kind = snapshot.kind(), dropped, "Push channel full, snapshot dropped");
        }
    }
}

#[async_trait]
impl MonitorProvider for ChannelMonitor {
    fn name(&self) -> &str {
        "channel"
    }

    async fn update_state(&self, state: &AgentState) {
        self.push(&MonitorSnapshot::AgentState(state.clone()));
    }

    async fn publish_event(&self, snapshot: &MonitorSnapshot) {
        self.push(snapshot);
    }
}
