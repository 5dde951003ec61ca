//! Time plugin: puts the current date and time into the context.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conduit_core::plugin::{ExecutionContext, Executor, ExecutorOutput, Plugin};
use serde_json::json;
use std::sync::Arc;

/// Item type produced by [`CurrentTime`].
pub const CURRENT_TIME: &str = "current_time";

pub struct TimePlugin;

impl Plugin for TimePlugin {
    fn id(&self) -> &str {
        "time"
    }

    fn description(&self) -> &str {
        "Current date and time"
    }

    fn executors(&self) -> Vec<Arc<dyn Executor>> {
        vec![Arc::new(CurrentTime)]
    }
}

pub struct CurrentTime;

#[async_trait]
impl Executor for CurrentTime {
    fn name(&self) -> &str {
        "current_time"
    }

    fn description(&self) -> &str {
        "Look up the current date and time (UTC). Use before answering questions about dates, times, or days of the week."
    }

    async fn execute(&self, _ctx: &mut ExecutionContext<'_>) -> ExecutorOutput {
        describe(Utc::now())
    }
}

fn describe(now: DateTime<Utc>) -> ExecutorOutput {
    ExecutorOutput::item(
        CURRENT_TIME,
        format!("It is {} (UTC).", now.format("%A, %B %-d, %Y %H:%M")),
    )
    .with_field("iso", json!(now.to_rfc3339()))
    .with_field("unix", json!(now.timestamp()))
}
