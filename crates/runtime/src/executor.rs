//! Pipeline execution: run planned steps in order against the plugin
//! registry, grow the context chain, and apply mid-run mutations.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use conduit_config::{FailurePolicy, RuntimeConfig};
use conduit_core::capability::{CapabilityRegistry, ids};
use conduit_core::context::{ContextItem, types};
use conduit_core::error::{Error, ExecutorError, MutationError};
use conduit_core::event::EventResponse;
use conduit_core::monitor::{MonitorBus, MonitorSnapshot};
use conduit_core::pipeline::{MutationRequest, PipelinePhase, PipelineStep};
use conduit_core::plugin::{ExecutionContext, ExecutorOutput, PluginRegistry};
use futures::FutureExt;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::state::RuntimeState;

/// Plugin id used for items the runtime itself appends.
pub const RUNTIME_PLUGIN_ID: &str = "runtime";

const DIRECT_RESPONSE_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Answer the latest message using the context provided.";

/// Knobs for [`PipelineExecutor`].
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub failure_policy: FailurePolicy,
    pub step_timeout: Duration,
    pub max_pipeline_steps: usize,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self::from(&RuntimeConfig::default())
    }
}

impl From<&RuntimeConfig> for ExecutorSettings {
    fn from(config: &RuntimeConfig) -> Self {
        Self {
            failure_policy: config.failure_policy,
            step_timeout: Duration::from_secs(config.step_timeout_secs),
            max_pipeline_steps: config.max_pipeline_steps,
        }
    }
}

pub struct PipelineExecutor {
    plugins: Arc<PluginRegistry>,
    capabilities: Arc<CapabilityRegistry>,
    monitor: Arc<MonitorBus>,
    settings: ExecutorSettings,
}

impl PipelineExecutor {
    pub fn new(
        plugins: Arc<PluginRegistry>,
        capabilities: Arc<CapabilityRegistry>,
        monitor: Arc<MonitorBus>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            plugins,
            capabilities,
            monitor,
            settings,
        }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Run `state.pipeline` to a terminal phase and pick the response.
    ///
    /// Step failures are handled here according to the failure policy.
    /// An `Err` is only returned when the direct-response fallback fails.
    pub async fn run(&self, state: &mut RuntimeState) -> Result<EventResponse, Error> {
        state.pipeline.phase = PipelinePhase::Executing;
        state.pipeline.current_step = 0;
        self.publish_pipeline(state);

        let first_run = self.plugins.first_run_steps();
        let produced_from = state.chain.len();
        let mut index = 0;

        while index < state.pipeline.pipeline.len() {
            state.pipeline.current_step = index;
            self.publish_pipeline(state);

            let step = state.pipeline.pipeline[index].clone();
            debug!(event_id = %state.event_id, step = %step, index, "Running step");

            let failure = match self.invoke(&step, state).await {
                Ok(output) => {
                    self.append(state, output.to_context_item(&step));
                    if output.success {
                        if let Some(request) = output.mutation() {
                            self.apply_mutation(state, &step, request);
                        }
                        None
                    } else {
                        Some(ExecutorError::Failed {
                            step: step.to_string(),
                            message: output.failure_message(),
                        })
                    }
                }
                Err(e) => {
                    self.append(
                        state,
                        ContextItem::error(&step.plugin_id, &step.executor, e.to_string()),
                    );
                    Some(e)
                }
            };

            if let Some(error) = failure {
                warn!(event_id = %state.event_id, step = %step, error = %error, "Step failed");
                if self.settings.failure_policy == FailurePolicy::Abort {
                    state.pipeline.phase = PipelinePhase::Aborted;
                    self.publish_pipeline(state);
                    let error = Error::from(error);
                    return Ok(EventResponse::error(error.kind(), error.to_string()));
                }
            }

            index += 1;
        }

        // Nothing beyond the always-run-first steps was planned
        if state.pipeline.pipeline.iter().all(|s| first_run.contains(s)) {
            return self.direct_response(state, &first_run).await;
        }

        state.pipeline.phase = PipelinePhase::Completed;
        self.publish_pipeline(state);
        info!(
            event_id = %state.event_id,
            steps = state.pipeline.pipeline.len(),
            mutations = state.pipeline.modified_steps.len(),
            "Pipeline completed"
        );

        let terminal = state.chain.items()[produced_from..]
            .iter()
            .rev()
            .find(|item| !item.is_error() && !produced_by_any(item, &first_run));
        Ok(match terminal {
            Some(item) => EventResponse::content(item),
            None => EventResponse::error("executor_error", "pipeline produced no content"),
        })
    }

    /// Invoke one step under the step timeout, isolating panics.
    async fn invoke(
        &self,
        step: &PipelineStep,
        state: &mut RuntimeState,
    ) -> Result<ExecutorOutput, ExecutorError> {
        let executor = self
            .plugins
            .get(step)
            .ok_or_else(|| ExecutorError::NotFound {
                plugin_id: step.plugin_id.clone(),
                executor: step.executor.clone(),
            })?;

        let mut ctx = ExecutionContext::new(
            &state.event_id,
            step,
            &state.platform,
            &self.capabilities,
            &mut state.chain,
            &self.monitor,
        );
        let call = AssertUnwindSafe(executor.execute(&mut ctx)).catch_unwind();

        match tokio::time::timeout(self.settings.step_timeout, call).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(panic)) => Err(ExecutorError::Panicked {
                step: step.to_string(),
                message: panic_message(panic.as_ref()),
            }),
            Err(_) => Err(ExecutorError::Timeout {
                step: step.to_string(),
                timeout_ms: self.settings.step_timeout.as_millis() as u64,
            }),
        }
    }

    fn apply_mutation(
        &self,
        state: &mut RuntimeState,
        step: &PipelineStep,
        request: Result<MutationRequest, MutationError>,
    ) {
        state.pipeline.phase = PipelinePhase::Mutating;
        self.publish_pipeline(state);

        let plugins = &self.plugins;
        let applied = request.and_then(|request| {
            state
                .pipeline
                .apply(&request, step, self.settings.max_pipeline_steps, |s| {
                    plugins.contains(s)
                })
                .map(|()| request)
        });

        match applied {
            Ok(request) => info!(
                event_id = %state.event_id,
                step = %step,
                mutations = request.mutations.len(),
                explanation = %request.explanation,
                "Pipeline mutated"
            ),
            Err(e) => {
                warn!(event_id = %state.event_id, step = %step, error = %e, "Mutation rejected");
                self.append(
                    state,
                    ContextItem::error(&step.plugin_id, "mutation_rejected", e.to_string()),
                );
            }
        }

        state.pipeline.phase = PipelinePhase::Executing;
        self.publish_pipeline(state);
    }

    /// Answer with the text capability alone. Items from always-run-first
    /// steps (a persona, say) become the system prompt, not the conversation.
    async fn direct_response(
        &self,
        state: &mut RuntimeState,
        first_run: &[PipelineStep],
    ) -> Result<EventResponse, Error> {
        debug!(event_id = %state.event_id, "No planned steps, answering directly");
        let (preamble, conversation): (Vec<&ContextItem>, Vec<&ContextItem>) = state
            .chain
            .iter()
            .filter(|item| !item.is_error())
            .partition(|item| produced_by_any(item, first_run));
        let prompt = conversation
            .iter()
            .map(|i| format!("[{}/{}] {}", i.plugin_id, i.item_type, i.content))
            .collect::<Vec<_>>()
            .join("\n");
        let system = if preamble.is_empty() {
            DIRECT_RESPONSE_SYSTEM_PROMPT.to_string()
        } else {
            preamble.iter().map(|i| i.content.as_str()).collect::<Vec<_>>().join("\n")
        };
        let input = json!({ "prompt": prompt, "system": system });

        let output = match self
            .capabilities
            .execute_capability(ids::TEXT_GENERATION, input, &serde_json::Value::Null)
            .await
        {
            Ok(output) => output,
            Err(e) => {
                state.pipeline.phase = PipelinePhase::Aborted;
                self.publish_pipeline(state);
                return Err(e.into());
            }
        };

        let text = output
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or_default();
        let mut item = ContextItem::new(RUNTIME_PLUGIN_ID, types::GENERATED_TEXT, "direct_response", text);
        if let Some(model) = output.get("model") {
            item = item.with_field("model", model.clone());
        }
        self.append(state, item);

        state.pipeline.phase = PipelinePhase::Completed;
        self.publish_pipeline(state);

        Ok(state
            .chain
            .last()
            .map(EventResponse::content)
            .unwrap_or_else(|| EventResponse::error("internal_error", "chain is empty")))
    }

    fn append(&self, state: &mut RuntimeState, item: ContextItem) {
        state.chain.append(item);
        self.monitor
            .publish(MonitorSnapshot::context_chain(&state.event_id, &state.chain));
    }

    fn publish_pipeline(&self, state: &RuntimeState) {
        self.monitor
            .publish(MonitorSnapshot::PipelineState(state.pipeline.clone()));
    }
}

fn produced_by_any(item: &ContextItem, steps: &[PipelineStep]) -> bool {
    steps
        .iter()
        .any(|s| s.plugin_id == item.plugin_id && s.executor == item.action)
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".into()
    }
}
