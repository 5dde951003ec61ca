//! Plugins, executors, and the flat executor registry.
//!
//! A plugin is a named bundle of executors (and optionally triggers). The
//! runtime never calls plugins directly: at registration time every executor
//! is flattened into the [`PluginRegistry`] under its `(pluginId, name)` pair,
//! and pipeline steps refer to executors only by that pair.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::capability::CapabilityRegistry;
use crate::context::{ContextChain, ContextItem, types};
use crate::error::{CapabilityError, MutationError, PluginError};
use crate::event::PlatformContext;
use crate::monitor::{MonitorBus, MonitorSnapshot};
use crate::pipeline::{MutationRequest, PipelineStep};

const NO_FAILURE_MESSAGE: &str = "executor reported failure without a message";

/// What an executor hands back to the pipeline.
///
/// `data` is loosely typed on purpose: its `type` and `content` keys become
/// the appended context item's type and content, a `pipeline_mutation` key
/// carries a [`MutationRequest`], and any other keys are kept as
/// type-specific fields on the item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorOutput {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutorOutput {
    pub fn success(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Successful output producing an item of `item_type` with `content`.
    pub fn item(item_type: &str, content: impl Into<String>) -> Self {
        Self::success(serde_json::json!({
            "type": item_type,
            "content": content.into(),
        }))
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Add a type-specific field to the produced item.
    pub fn with_field(mut self, key: &str, value: serde_json::Value) -> Self {
        let data = self
            .data
            .get_or_insert_with(|| serde_json::Value::Object(Default::default()));
        if let Some(map) = data.as_object_mut() {
            map.insert(key.to_string(), value);
        }
        self
    }

    /// Ask the executor to change the remaining pipeline.
    pub fn with_mutation(self, request: MutationRequest) -> Self {
        let value = serde_json::to_value(request).unwrap_or(serde_json::Value::Null);
        self.with_field(MutationRequest::DATA_KEY, value)
    }

    /// Decode the mutation instruction, if the output carries one.
    pub fn mutation(&self) -> Option<Result<MutationRequest, MutationError>> {
        self.data
            .as_ref()?
            .get(MutationRequest::DATA_KEY)
            .map(MutationRequest::from_value)
    }

    /// The failure message, with a fixed text when the executor gave none.
    pub fn failure_message(&self) -> String {
        self.error
            .clone()
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| NO_FAILURE_MESSAGE.into())
    }

    /// Build the context item this output contributes to the chain.
    pub fn to_context_item(&self, step: &PipelineStep) -> ContextItem {
        if !self.success {
            return ContextItem::error(&step.plugin_id, &step.executor, self.failure_message());
        }

        match &self.data {
            Some(serde_json::Value::Object(map)) => {
                let item_type = map
                    .get("type")
                    .and_then(|v| v.as_str())
                    .unwrap_or(types::RESULT);
                let content = match map.get("content") {
                    Some(serde_json::Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => serde_json::Value::Object(map.clone()).to_string(),
                };
                let mut item = ContextItem::new(&step.plugin_id, item_type, &step.executor, content);
                for (key, value) in map {
                    let reserved = ContextItem::RESERVED_KEYS.contains(&key.as_str());
                    if !reserved && key != MutationRequest::DATA_KEY {
                        item.fields.insert(key.clone(), value.clone());
                    }
                }
                item
            }
            Some(serde_json::Value::String(s)) => {
                ContextItem::new(&step.plugin_id, types::RESULT, &step.executor, s.clone())
            }
            Some(other) => {
                ContextItem::new(&step.plugin_id, types::RESULT, &step.executor, other.to_string())
            }
            None => ContextItem::new(&step.plugin_id, types::RESULT, &step.executor, ""),
        }
    }
}

/// Everything an executor can see and touch while it runs.
pub struct ExecutionContext<'a> {
    pub event_id: &'a str,
    pub step: &'a PipelineStep,
    pub platform: &'a PlatformContext,
    pub capabilities: &'a CapabilityRegistry,
    chain: &'a mut ContextChain,
    monitor: &'a MonitorBus,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        event_id: &'a str,
        step: &'a PipelineStep,
        platform: &'a PlatformContext,
        capabilities: &'a CapabilityRegistry,
        chain: &'a mut ContextChain,
        monitor: &'a MonitorBus,
    ) -> Self {
        Self {
            event_id,
            step,
            platform,
            capabilities,
            chain,
            monitor,
        }
    }

    pub fn chain(&self) -> &ContextChain {
        &*self.chain
    }

    /// Append an intermediate item; observers see the new chain immediately.
    pub fn append(&mut self, item: ContextItem) {
        self.chain.append(item);
        self.monitor.publish(MonitorSnapshot::context_chain(self.event_id, &*self.chain));
    }

    /// Shorthand for [`CapabilityRegistry::execute_capability`].
    pub async fn execute_capability(
        &self,
        id: &str,
        input: serde_json::Value,
        config: &serde_json::Value,
    ) -> Result<serde_json::Value, CapabilityError> {
        self.capabilities.execute_capability(id, input, config).await
    }
}

/// A named unit of plugin logic, invoked as one pipeline step.
#[async_trait]
pub trait Executor: Send + Sync {
    fn name(&self) -> &str;

    /// Sent to the planner so it can decide when to use this executor.
    fn description(&self) -> &str;

    async fn execute(&self, ctx: &mut ExecutionContext<'_>) -> ExecutorOutput;
}

/// How a trigger reaches the outside world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerKind {
    /// An HTTP route served by the gateway
    Http { method: String, path: String },
    /// A long-running listener (chat platform, file watcher, ...)
    Listener,
    /// A timer
    Schedule { interval_secs: u64 },
}

/// Describes an external entry point a plugin offers for creating events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerDescriptor {
    pub name: String,
    pub description: String,
    #[serde(flatten)]
    pub kind: TriggerKind,
}

/// A bundle of executors and triggers under one plugin id.
pub trait Plugin: Send + Sync {
    fn id(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn executors(&self) -> Vec<Arc<dyn Executor>>;

    fn triggers(&self) -> Vec<TriggerDescriptor> {
        Vec::new()
    }

    /// Plugins marked this way run at the head of every pipeline.
    fn always_run_first(&self) -> bool {
        false
    }
}

/// Planner-facing description of one registered executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorDescriptor {
    pub plugin_id: String,
    pub name: String,
    pub description: String,
}

impl ExecutorDescriptor {
    pub fn step(&self) -> PipelineStep {
        PipelineStep::new(&self.plugin_id, &self.name)
    }
}

struct RegisteredPlugin {
    id: String,
    description: String,
    always_first: bool,
    executors: Vec<ExecutorDescriptor>,
    triggers: Vec<TriggerDescriptor>,
}

/// Registry of every plugin's executors, keyed by `(pluginId, executorName)`.
///
/// Filled once during startup, then shared read-only behind an `Arc`.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<RegisteredPlugin>,
    executors: HashMap<(String, String), Arc<dyn Executor>>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.plugins.iter().map(|p| &p.id).collect::<Vec<_>>())
            .field("executors", &self.executors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin, checking that its ids and executor names are usable.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) -> Result<(), PluginError> {
        let plugin_id = plugin.id().to_string();
        if plugin_id.trim().is_empty() || plugin_id.contains('.') {
            return Err(PluginError::Invalid {
                plugin_id,
                reason: "plugin id must be non-empty and must not contain '.'".into(),
            });
        }
        if self.plugins.iter().any(|p| p.id == plugin_id) {
            return Err(PluginError::DuplicatePlugin(plugin_id));
        }

        let executors = plugin.executors();
        let mut descriptors = Vec::with_capacity(executors.len());
        let mut staged = HashMap::new();
        for executor in executors {
            let name = executor.name().to_string();
            if name.trim().is_empty() {
                return Err(PluginError::Invalid {
                    plugin_id,
                    reason: "executor name is empty".into(),
                });
            }
            let key = (plugin_id.clone(), name.clone());
            if staged.contains_key(&key) {
                return Err(PluginError::DuplicateExecutor {
                    plugin_id,
                    executor: name,
                });
            }
            descriptors.push(ExecutorDescriptor {
                plugin_id: plugin_id.clone(),
                name,
                description: executor.description().to_string(),
            });
            staged.insert(key, executor);
        }

        tracing::info!(
            plugin = %plugin_id,
            executors = descriptors.len(),
            always_first = plugin.always_run_first(),
            "Registered plugin"
        );
        self.executors.extend(staged);
        self.plugins.push(RegisteredPlugin {
            id: plugin_id,
            description: plugin.description().to_string(),
            always_first: plugin.always_run_first(),
            executors: descriptors,
            triggers: plugin.triggers(),
        });
        Ok(())
    }

    pub fn get(&self, step: &PipelineStep) -> Option<Arc<dyn Executor>> {
        self.executors
            .get(&(step.plugin_id.clone(), step.executor.clone()))
            .cloned()
    }

    pub fn contains(&self, step: &PipelineStep) -> bool {
        self.executors
            .contains_key(&(step.plugin_id.clone(), step.executor.clone()))
    }

    /// All executors in registration order.
    pub fn descriptors(&self) -> Vec<ExecutorDescriptor> {
        self.plugins
            .iter()
            .flat_map(|p| p.executors.iter().cloned())
            .collect()
    }

    /// Executors of plugins marked "always run first", in registration order.
    pub fn first_run_steps(&self) -> Vec<PipelineStep> {
        self.plugins
            .iter()
            .filter(|p| p.always_first)
            .flat_map(|p| p.executors.iter().map(ExecutorDescriptor::step))
            .collect()
    }

    /// All declared triggers as `(pluginId, trigger)` pairs.
    pub fn triggers(&self) -> Vec<(String, TriggerDescriptor)> {
        self.plugins
            .iter()
            .flat_map(|p| p.triggers.iter().map(|t| (p.id.clone(), t.clone())))
            .collect()
    }

    pub fn plugin_ids(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.id.as_str()).collect()
    }

    pub fn plugin_description(&self, plugin_id: &str) -> Option<&str> {
        self.plugins
            .iter()
            .find(|p| p.id == plugin_id)
            .map(|p| p.description.as_str())
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineMutation;

    struct Echo;

    #[async_trait]
    impl Executor for Echo {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes the last item"
        }
        async fn execute(&self, ctx: &mut ExecutionContext<'_>) -> ExecutorOutput {
            let content = ctx.chain().last().map(|i| i.content.clone()).unwrap_or_default();
            ExecutorOutput::item("echo", content)
        }
    }

    struct EchoPlugin {
        id: &'static str,
        first: bool,
    }

    impl Plugin for EchoPlugin {
        fn id(&self) -> &str {
            self.id
        }
        fn executors(&self) -> Vec<Arc<dyn Executor>> {
            vec![Arc::new(Echo)]
        }
        fn always_run_first(&self) -> bool {
            self.first
        }
    }

    struct Listening;

    impl Plugin for Listening {
        fn id(&self) -> &str {
            "listening"
        }
        fn executors(&self) -> Vec<Arc<dyn Executor>> {
            vec![Arc::new(Echo)]
        }
        fn triggers(&self) -> Vec<TriggerDescriptor> {
            vec![TriggerDescriptor {
                name: "inbox".into(),
                description: "Watches the inbox".into(),
                kind: TriggerKind::Listener,
            }]
        }
    }

    struct Doubled;

    impl Plugin for Doubled {
        fn id(&self) -> &str {
            "doubled"
        }
        fn executors(&self) -> Vec<Arc<dyn Executor>> {
            vec![Arc::new(Echo), Arc::new(Echo)]
        }
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = PluginRegistry::new();
        registry
            .register(Arc::new(EchoPlugin { id: "echo", first: false }))
            .unwrap();
        assert!(registry.get(&PipelineStep::new("echo", "echo")).is_some());
        assert!(registry.get(&PipelineStep::new("echo", "missing")).is_none());
        assert_eq!(registry.descriptors()[0].description, "Echoes the last item");
    }

    #[test]
    fn duplicate_plugin_and_executor_rejected() {
        let mut registry = PluginRegistry::new();
        registry
            .register(Arc::new(EchoPlugin { id: "echo", first: false }))
            .unwrap();
        assert_eq!(
            registry.register(Arc::new(EchoPlugin { id: "echo", first: false })),
            Err(PluginError::DuplicatePlugin("echo".into()))
        );
        assert!(matches!(
            registry.register(Arc::new(Doubled)),
            Err(PluginError::DuplicateExecutor { .. })
        ));
        assert!(registry.get(&PipelineStep::new("doubled", "echo")).is_none());
    }

    #[test]
    fn first_run_steps_follow_registration_order() {
        let mut registry = PluginRegistry::new();
        registry
            .register(Arc::new(EchoPlugin { id: "plain", first: false }))
            .unwrap();
        registry
            .register(Arc::new(EchoPlugin { id: "persona", first: true }))
            .unwrap();
        assert_eq!(
            registry.first_run_steps(),
            vec![PipelineStep::new("persona", "echo")]
        );
    }

    #[test]
    fn triggers_are_reported_with_their_plugin() {
        let mut registry = PluginRegistry::new();
        registry
            .register(Arc::new(EchoPlugin { id: "echo", first: false }))
            .unwrap();
        registry.register(Arc::new(Listening)).unwrap();

        let triggers = registry.triggers();
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].0, "listening");
        assert_eq!(triggers[0].1.kind, TriggerKind::Listener);

        let json = serde_json::to_value(&triggers[0].1).unwrap();
        assert_eq!(json["kind"], "listener");
        assert_eq!(json["name"], "inbox");
    }

    #[test]
    fn output_becomes_context_item() {
        let step = PipelineStep::new("text", "generate_text");
        let output = ExecutorOutput::item(types::GENERATED_TEXT, "hi there")
            .with_field("model", serde_json::json!("mock"))
            .with_mutation(MutationRequest::new(
                vec![PipelineMutation::Reorder { from: 2, to: 1 }],
                "why not",
            ));
        let item = output.to_context_item(&step);
        assert_eq!(item.item_type, types::GENERATED_TEXT);
        assert_eq!(item.content, "hi there");
        assert_eq!(item.action, "generate_text");
        assert_eq!(item.fields.get("model"), Some(&serde_json::json!("mock")));
        assert!(!item.fields.contains_key(MutationRequest::DATA_KEY));
        assert!(output.mutation().unwrap().is_ok());
    }

    #[test]
    fn data_cannot_shadow_item_fields() {
        let step = PipelineStep::new("search", "web");
        let output = ExecutorOutput::success(serde_json::json!({
            "type": "search_result",
            "content": "found it",
            "id": "spoofed",
            "pluginId": "other",
            "action": "other",
            "timestamp": "yesterday",
            "error": "nope",
            "url": "https://example.com",
        }));
        let item = output.to_context_item(&step);
        assert_eq!(item.fields.len(), 1);
        assert_eq!(item.plugin_id, "search");

        let line = serde_json::to_string(&item).unwrap();
        let back: ContextItem = serde_json::from_str(&line).unwrap();
        assert_eq!(back, item);
        assert_ne!(back.id, "spoofed");
        assert_eq!(back.fields.get("url"), Some(&serde_json::json!("https://example.com")));
    }

    #[test]
    fn failure_becomes_error_item() {
        let step = PipelineStep::new("search", "web");
        let item = ExecutorOutput::failure("x").to_context_item(&step);
        assert_eq!(item.item_type, types::ERROR);
        assert_eq!(item.content, "x");
    }
}
