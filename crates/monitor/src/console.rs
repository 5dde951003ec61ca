//! Console monitor: snapshots rendered through `tracing`.

use async_trait::async_trait;
use conduit_core::error::MonitorError;
use conduit_core::event::AgentState;
use conduit_core::monitor::{MonitorProvider, MonitorSnapshot};
use tracing::{debug, info};

pub struct ConsoleMonitor;

#[async_trait]
impl MonitorProvider for ConsoleMonitor {
    fn name(&self) -> &str {
        "console"
    }

    async fn init(&self) -> Result<(), MonitorError> {
        info!("Console monitor attached");
        Ok(())
    }

    async fn update_state(&self, state: &AgentState) {
        debug!(
            target: "conduit::monitor",
            queue_length = state.queue_length,
            is_running = state.is_running,
            events_processed = state.events_processed,
            "agent state"
        );
    }

    async fn publish_event(&self, snapshot: &MonitorSnapshot) {
        match snapshot {
            MonitorSnapshot::PipelineState(state) => {
                let steps: Vec<String> = state.pipeline.iter().map(|s| s.to_string()).collect();
                debug!(
                    target: "conduit::monitor",
                    event_id = state.event_id.as_deref().unwrap_or("-"),
                    phase = ?state.phase,
                    current_step = state.current_step,
                    pipeline = %steps.join(" -> "),
                    "pipeline state"
                );
            }
            MonitorSnapshot::ContextChain { event_id, items } => {
                if let Some(last) = items.last() {
                    debug!(
                        target: "conduit::monitor",
                        event_id = event_id.as_deref().unwrap_or("-"),
                        items = items.len(),
                        last_type = %last.item_type,
                        last_plugin = %last.plugin_id,
                        "context chain"
                    );
                }
            }
            MonitorSnapshot::AgentState(state) => self.update_state(state).await,
        }
    }
}
