//! Monitor providers for conduit, and the forwarder that feeds them.
//!
//! The runtime only ever publishes to a [`MonitorBus`]. [`attach`] gives a
//! [`MonitorProvider`] its own subscription and task, so a slow provider
//! falls behind (and skips snapshots) without touching the pipeline.

pub mod channel;
pub mod console;

pub use channel::ChannelMonitor;
pub use console::ConsoleMonitor;

use conduit_core::monitor::{MonitorBus, MonitorProvider, MonitorSnapshot};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Forward every snapshot on `bus` to `provider` until the bus is dropped.
pub fn attach(provider: Arc<dyn MonitorProvider>, bus: &MonitorBus) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        if let Err(e) = provider.init().await {
            warn!(monitor = provider.name(), error = %e, "Monitor init failed, not attached");
            return;
        }

        loop {
            match rx.recv().await {
                Ok(snapshot) => match snapshot.as_ref() {
                    MonitorSnapshot::AgentState(state) => provider.update_state(state).await,
                    other => provider.publish_event(other).await,
                },
                Err(RecvError::Lagged(skipped)) => {
                    warn!(monitor = provider.name(), skipped, "Monitor lagging, snapshots skipped");
                }
                Err(RecvError::Closed) => break,
            }
        }
        info!(monitor = provider.name(), "Monitor detached");
    })
}
