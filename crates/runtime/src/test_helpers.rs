//! Shared test helpers for runtime tests.

use async_trait::async_trait;
use conduit_core::capability::{CapabilityRegistry, handler_fn, ids, schemas};
use conduit_core::context::{ContextChain, ContextItem, types};
use conduit_core::error::ResponseDeliveryError;
use conduit_core::event::{Event, EventResponse, OneshotResponder, PlatformContext, ResponseHandler};
use conduit_core::plugin::{ExecutionContext, Executor, ExecutorOutput, Plugin};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

type Script = Arc<dyn Fn(&ContextChain) -> ExecutorOutput + Send + Sync>;

enum Behavior {
    Script(Script),
    Sleep(Duration),
    /// Call text-generation with the rendered chain
    Generate,
}

/// An executor whose output is decided by the test.
pub struct ScriptedExecutor {
    name: String,
    behavior: Behavior,
}

#[async_trait]
impl Executor for ScriptedExecutor {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "scripted test executor"
    }

    async fn execute(&self, ctx: &mut ExecutionContext<'_>) -> ExecutorOutput {
        match &self.behavior {
            Behavior::Script(script) => script(ctx.chain()),
            Behavior::Sleep(duration) => {
                tokio::time::sleep(*duration).await;
                ExecutorOutput::item(types::RESULT, "woke up")
            }
            Behavior::Generate => {
                let input = json!({ "prompt": ctx.chain().render() });
                match ctx
                    .execute_capability(ids::TEXT_GENERATION, input, &serde_json::Value::Null)
                    .await
                {
                    Ok(out) => ExecutorOutput::item(
                        types::GENERATED_TEXT,
                        out["text"].as_str().unwrap_or_default(),
                    ),
                    Err(e) => ExecutorOutput::failure(e.to_string()),
                }
            }
        }
    }
}

/// A plugin assembled from scripted executors.
pub struct ScriptedPlugin {
    id: String,
    executors: Vec<Arc<dyn Executor>>,
    always_first: bool,
}

impl ScriptedPlugin {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.into(),
            executors: vec![],
            always_first: false,
        }
    }

    fn with(mut self, name: &str, behavior: Behavior) -> Self {
        self.executors.push(Arc::new(ScriptedExecutor {
            name: name.into(),
            behavior,
        }));
        self
    }

    pub fn executor(
        self,
        name: &str,
        script: impl Fn(&ContextChain) -> ExecutorOutput + Send + Sync + 'static,
    ) -> Self {
        self.with(name, Behavior::Script(Arc::new(script)))
    }

    pub fn sleeper(self, name: &str, duration: Duration) -> Self {
        self.with(name, Behavior::Sleep(duration))
    }

    pub fn generator(self, name: &str) -> Self {
        self.with(name, Behavior::Generate)
    }

    pub fn always_first(mut self) -> Self {
        self.always_first = true;
        self
    }
}

impl Plugin for ScriptedPlugin {
    fn id(&self) -> &str {
        &self.id
    }

    fn executors(&self) -> Vec<Arc<dyn Executor>> {
        self.executors.clone()
    }

    fn always_run_first(&self) -> bool {
        self.always_first
    }
}

/// A registry whose text-generation capability always answers `reply`.
pub fn scripted_text_capability(reply: &str) -> CapabilityRegistry {
    let mut registry = CapabilityRegistry::new()
        .with_alias_groups([[ids::TEXT_GENERATION, "generate_text"]]);
    let reply = reply.to_string();
    registry
        .add_capability(
            ids::TEXT_GENERATION,
            schemas::text_generation_input(),
            schemas::text_generation_output(),
            handler_fn(move |_input, _config| {
                let reply = reply.clone();
                async move { Ok(json!({ "text": reply })) }
            }),
        )
        .unwrap();
    registry
}

/// Records every response it is handed.
#[derive(Default)]
pub struct RecordingResponder {
    responses: Mutex<Vec<EventResponse>>,
}

impl RecordingResponder {
    pub fn responses(&self) -> Vec<EventResponse> {
        self.responses.lock().unwrap().clone()
    }
}

#[async_trait]
impl ResponseHandler for RecordingResponder {
    async fn respond(&self, response: EventResponse) -> Result<(), ResponseDeliveryError> {
        self.responses.lock().unwrap().push(response);
        Ok(())
    }
}

/// An event carrying `text`, answered through a oneshot channel.
pub fn event(text: &str) -> (Event, oneshot::Receiver<EventResponse>) {
    let (handler, rx) = OneshotResponder::channel("test");
    let platform = PlatformContext::new("test", handler);
    (Event::new(ContextItem::message("test", text), platform), rx)
}

/// An event answered into `recorder`.
pub fn recorded_event(text: &str, recorder: Arc<RecordingResponder>) -> Event {
    let platform = PlatformContext::new("test", recorder);
    Event::new(ContextItem::message("test", text), platform)
}
