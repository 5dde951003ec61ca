//! The runtime loop: one event at a time, from queue to response.
//!
//! Triggers hold a cloneable [`RuntimeHandle`] and call
//! [`RuntimeHandle::create_event`]; a single task running [`Runtime::run`]
//! pops events FIFO, plans and executes each pipeline to completion, and
//! delivers exactly one response per event. Nothing that goes wrong inside
//! an event (errors or panics) escapes the per-event boundary.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use conduit_config::RuntimeConfig;
use conduit_core::capability::CapabilityRegistry;
use conduit_core::context::ContextItem;
use conduit_core::error::{EnqueueError, Error};
use conduit_core::event::{
    AgentState, Event, EventId, EventResponse, OneshotResponder, PlatformContext,
};
use conduit_core::memory::{ConversationOptions, MemoryProvider, StoredContext};
use conduit_core::monitor::{MonitorBus, MonitorSnapshot};
use conduit_core::pipeline::PipelineState;
use conduit_core::plugin::PluginRegistry;
use futures::FutureExt;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::executor::{ExecutorSettings, PipelineExecutor};
use crate::planner::{PipelinePlanner, StaticPlanner, plan_with_fallback};
use crate::queue::EventQueue;
use crate::state::RuntimeState;

/// Builder for [`Runtime`].
pub struct RuntimeBuilder {
    plugins: PluginRegistry,
    capabilities: CapabilityRegistry,
    planner: Option<Arc<dyn PipelinePlanner>>,
    memory: Option<Arc<dyn MemoryProvider>>,
    monitor: Option<Arc<MonitorBus>>,
    config: RuntimeConfig,
}

impl RuntimeBuilder {
    pub fn plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn capabilities(mut self, capabilities: CapabilityRegistry) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn planner(mut self, planner: Arc<dyn PipelinePlanner>) -> Self {
        self.planner = Some(planner);
        self
    }

    pub fn memory(mut self, memory: Arc<dyn MemoryProvider>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn monitor(mut self, monitor: Arc<MonitorBus>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Runtime {
        let monitor = self.monitor.unwrap_or_default();
        let plugins = Arc::new(self.plugins);
        let capabilities = Arc::new(self.capabilities);
        let queue = Arc::new(EventQueue::new(self.config.max_queue_length, monitor.clone()));
        let executor = PipelineExecutor::new(
            plugins.clone(),
            capabilities.clone(),
            monitor.clone(),
            ExecutorSettings::from(&self.config),
        );

        Runtime {
            queue,
            executor,
            planner: self
                .planner
                .unwrap_or_else(|| Arc::new(StaticPlanner::new(vec![]))),
            plugins,
            capabilities,
            monitor,
            memory: self.memory,
        }
    }
}

pub struct Runtime {
    queue: Arc<EventQueue>,
    executor: PipelineExecutor,
    planner: Arc<dyn PipelinePlanner>,
    plugins: Arc<PluginRegistry>,
    capabilities: Arc<CapabilityRegistry>,
    monitor: Arc<MonitorBus>,
    memory: Option<Arc<dyn MemoryProvider>>,
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder {
            plugins: PluginRegistry::new(),
            capabilities: CapabilityRegistry::new(),
            planner: None,
            memory: None,
            monitor: None,
            config: RuntimeConfig::default(),
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            queue: self.queue.clone(),
            monitor: self.monitor.clone(),
            plugins: self.plugins.clone(),
            capabilities: self.capabilities.clone(),
        }
    }

    /// Spawn the loop on the current tokio runtime.
    pub fn start(self) -> (RuntimeHandle, JoinHandle<()>) {
        let handle = self.handle();
        let task = tokio::spawn(self.run());
        (handle, task)
    }

    /// Process events until the queue is closed and drained.
    pub async fn run(self) {
        info!(
            planner = self.planner.name(),
            executors = self.plugins.len(),
            "Runtime loop started"
        );

        while let Some(event) = self.queue.pop().await {
            self.process(event).await;
            self.queue.finish();
            self.monitor.publish(MonitorSnapshot::PipelineState(PipelineState::default()));
            self.monitor.publish(MonitorSnapshot::empty_chain());
        }

        info!("Runtime loop stopped");
    }

    /// The per-event boundary.
    async fn process(&self, event: Event) {
        let Event {
            id,
            initial_item,
            mut platform,
            enqueued_at,
        } = event;
        let waited_ms = (chrono::Utc::now() - enqueued_at).num_milliseconds();
        info!(event_id = %id, platform = %platform.platform, waited_ms, "Processing event");

        let conversation_id = self.remember_message(&initial_item, &mut platform).await;
        let mut state = RuntimeState::new(&id, initial_item, platform);
        self.monitor
            .publish(MonitorSnapshot::context_chain(&state.event_id, &state.chain));

        let outcome = AssertUnwindSafe(self.plan_and_execute(&mut state))
            .catch_unwind()
            .await;
        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!(event_id = %id, error = %e, "Event failed");
                EventResponse::error(e.kind(), e.to_string())
            }
            Err(_) => {
                error!(event_id = %id, "Event processing panicked");
                EventResponse::error("internal_error", "event processing panicked")
            }
        };

        if let Some(conversation_id) = conversation_id {
            self.remember_context(&state, &conversation_id).await;
        }

        let handler = state.platform.response_handler.clone();
        match self.guarded("respond", handler.respond(response)).await {
            Some(Ok(())) => debug!(event_id = %id, "Response delivered"),
            Some(Err(e)) => warn!(event_id = %id, error = %e, "Response delivery failed"),
            None => {}
        }
    }

    /// Run a call that leaves the runtime (memory, response delivery) under
    /// the step timeout and a panic boundary. `None` when it panicked or
    /// did not finish in time.
    async fn guarded<T>(&self, call: &'static str, fut: impl Future<Output = T>) -> Option<T> {
        let limit = self.executor.settings().step_timeout;
        match tokio::time::timeout(limit, AssertUnwindSafe(fut).catch_unwind()).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(_)) => {
                error!(call, "Call panicked");
                None
            }
            Err(_) => {
                warn!(call, timeout_ms = limit.as_millis() as u64, "Call timed out");
                None
            }
        }
    }

    async fn plan_and_execute(&self, state: &mut RuntimeState) -> Result<EventResponse, Error> {
        self.monitor
            .publish(MonitorSnapshot::PipelineState(state.pipeline.clone()));

        let plan = plan_with_fallback(
            self.planner.as_ref(),
            &state.chain,
            &self.plugins,
            &self.capabilities,
            self.executor.settings().max_pipeline_steps,
        )
        .await;
        state.pipeline.pipeline = plan.steps;
        state.pipeline.explanation = plan.explanation;

        self.executor.run(state).await
    }

    /// Store the inbound message, creating a conversation when the trigger
    /// did not name one. Returns the conversation id on success.
    async fn remember_message(
        &self,
        item: &ContextItem,
        platform: &mut PlatformContext,
    ) -> Option<String> {
        let memory = self.memory.as_ref()?;

        let conversation_id = match platform.conversation_id() {
            Some(id) => id.to_string(),
            None => {
                let opts = ConversationOptions {
                    platform: platform.platform.clone(),
                    ..ConversationOptions::default()
                };
                match self
                    .guarded("create_conversation", memory.create_conversation(opts))
                    .await?
                {
                    Ok(id) => {
                        platform
                            .metadata
                            .insert("conversation_id".into(), serde_json::Value::String(id.clone()));
                        id
                    }
                    Err(e) => {
                        warn!(memory = memory.name(), error = %e, "Failed to create conversation");
                        return None;
                    }
                }
            }
        };

        let stored = self
            .guarded("store_message", memory.store_message(item.clone(), &conversation_id))
            .await;
        if let Some(Err(e)) = stored {
            warn!(memory = memory.name(), error = %e, "Failed to store message");
        }
        Some(conversation_id)
    }

    async fn remember_context(&self, state: &RuntimeState, conversation_id: &str) {
        let Some(memory) = &self.memory else {
            return;
        };
        let context = StoredContext {
            conversation_id: conversation_id.to_string(),
            event_id: Some(state.event_id.clone()),
            chain: state.chain.clone(),
            stored_at: chrono::Utc::now(),
        };
        let stored = self
            .guarded("store_context", memory.store_context(context, conversation_id))
            .await;
        if let Some(Err(e)) = stored {
            warn!(memory = memory.name(), error = %e, "Failed to store context chain");
        }
    }
}

/// Cloneable producer-side handle to a running [`Runtime`].
#[derive(Clone)]
pub struct RuntimeHandle {
    queue: Arc<EventQueue>,
    monitor: Arc<MonitorBus>,
    plugins: Arc<PluginRegistry>,
    capabilities: Arc<CapabilityRegistry>,
}

impl RuntimeHandle {
    /// Enqueue one unit of work. Returns as soon as the event is queued.
    pub fn create_event(
        &self,
        initial_item: ContextItem,
        platform: PlatformContext,
    ) -> Result<EventId, EnqueueError> {
        let event = Event::new(initial_item, platform);
        let id = event.id.clone();
        self.queue.push(event)?;
        Ok(id)
    }

    /// Enqueue a message and get a receiver for its response.
    pub fn send(
        &self,
        initial_item: ContextItem,
        platform: &str,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(EventId, oneshot::Receiver<EventResponse>), EnqueueError> {
        let (handler, rx) = OneshotResponder::channel(platform);
        let mut context = PlatformContext::new(platform, handler);
        context.metadata = metadata;
        let id = self.create_event(initial_item, context)?;
        Ok((id, rx))
    }

    pub fn agent_state(&self) -> AgentState {
        self.queue.state()
    }

    pub fn watch_state(&self) -> watch::Receiver<AgentState> {
        self.queue.watch_state()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<MonitorSnapshot>> {
        self.monitor.subscribe()
    }

    pub fn monitor(&self) -> &Arc<MonitorBus> {
        &self.monitor
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    pub fn capabilities(&self) -> &CapabilityRegistry {
        &self.capabilities
    }

    /// Stop accepting events; the loop exits after draining the queue.
    pub fn shutdown(&self) {
        info!(pending = self.queue.len(), "Runtime shutting down");
        self.queue.close();
    }

    pub fn is_shut_down(&self) -> bool {
        self.queue.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{
        RecordingResponder, ScriptedPlugin, event, recorded_event, scripted_text_capability,
    };
    use conduit_config::FailurePolicy;
    use conduit_core::error::{MemoryError, ResponseDeliveryError};
    use conduit_core::event::ResponseHandler;
    use conduit_core::memory::{Conversation, MessageQuery, StoredMessage};
    use conduit_core::plugin::ExecutorOutput;
    use std::sync::Mutex;
    use std::time::Duration;

    fn text_plugins() -> PluginRegistry {
        let mut plugins = PluginRegistry::new();
        plugins
            .register(Arc::new(ScriptedPlugin::new("text").generator("generate_text")))
            .unwrap();
        plugins
    }

    fn runtime(plugins: PluginRegistry, steps: &[&str]) -> Runtime {
        Runtime::builder()
            .plugins(plugins)
            .capabilities(scripted_text_capability("hi there"))
            .planner(Arc::new(StaticPlanner::parse(steps).unwrap()))
            .build()
    }

    #[tokio::test]
    async fn hello_becomes_hi_there() {
        let (handle, task) = runtime(text_plugins(), &["text.generate_text"]).start();
        let recorder = Arc::new(RecordingResponder::default());
        handle.queue.push(recorded_event("hello", recorder.clone())).unwrap();

        handle.shutdown();
        task.await.unwrap();

        let responses = recorder.responses();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].text(), "hi there");
        match &responses[0] {
            EventResponse::Content { item: Some(item), .. } => {
                assert_eq!(item.item_type, "generated_text")
            }
            other => panic!("unexpected response {other:?}"),
        }
    }

    #[tokio::test]
    async fn events_processed_in_fifo_order() {
        let mut plugins = PluginRegistry::new();
        plugins
            .register(Arc::new(ScriptedPlugin::new("echo").executor("say", |chain| {
                let text = chain.first().map(|i| i.content.clone()).unwrap_or_default();
                ExecutorOutput::item("result", text)
            })))
            .unwrap();
        let (handle, task) = runtime(plugins, &["echo.say"]).start();

        let recorder = Arc::new(RecordingResponder::default());
        for text in ["one", "two", "three"] {
            handle.queue.push(recorded_event(text, recorder.clone())).unwrap();
        }
        handle.shutdown();
        task.await.unwrap();

        let texts: Vec<String> = recorder.responses().iter().map(|r| r.text().to_string()).collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
        assert_eq!(handle.agent_state().events_processed, 3);
        assert!(!handle.agent_state().is_running);
    }

    #[tokio::test]
    async fn panic_outside_steps_does_not_kill_loop() {
        struct PanickingPlanner;

        #[async_trait::async_trait]
        impl PipelinePlanner for PanickingPlanner {
            fn name(&self) -> &str {
                "panicking"
            }

            async fn plan(
                &self,
                _chain: &conduit_core::context::ContextChain,
                _executors: &[conduit_core::plugin::ExecutorDescriptor],
                _capabilities: &CapabilityRegistry,
            ) -> Result<crate::planner::Plan, Error> {
                panic!("planner exploded")
            }
        }

        let (handle, task) = Runtime::builder()
            .plugins(text_plugins())
            .capabilities(scripted_text_capability("hi there"))
            .planner(Arc::new(PanickingPlanner))
            .build()
            .start();

        let (ev1, rx1) = event("first");
        let (ev2, rx2) = event("second");
        handle.queue.push(ev1).unwrap();
        handle.queue.push(ev2).unwrap();

        let first = rx1.await.unwrap();
        assert!(first.is_error());
        let second = rx2.await.unwrap();
        assert!(second.is_error());

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn abort_sends_exactly_one_error() {
        let mut plugins = text_plugins();
        plugins
            .register(Arc::new(
                ScriptedPlugin::new("bad").executor("fail", |_| ExecutorOutput::failure("x")),
            ))
            .unwrap();
        let (handle, task) = Runtime::builder()
            .plugins(plugins)
            .capabilities(scripted_text_capability("hi there"))
            .planner(Arc::new(
                StaticPlanner::parse(&["bad.fail", "text.generate_text"]).unwrap(),
            ))
            .config(RuntimeConfig {
                failure_policy: FailurePolicy::Abort,
                ..RuntimeConfig::default()
            })
            .build()
            .start();

        let recorder = Arc::new(RecordingResponder::default());
        handle.queue.push(recorded_event("hello", recorder.clone())).unwrap();
        handle.shutdown();
        task.await.unwrap();

        let responses = recorder.responses();
        assert_eq!(responses.len(), 1);
        assert!(responses[0].is_error());
    }

    #[tokio::test]
    async fn delivery_failure_is_not_fatal() {
        struct Refusing;

        #[async_trait::async_trait]
        impl ResponseHandler for Refusing {
            async fn respond(&self, _response: EventResponse) -> Result<(), ResponseDeliveryError> {
                Err(ResponseDeliveryError::Rejected {
                    platform: "test".into(),
                    reason: "offline".into(),
                })
            }
        }

        let (handle, task) = runtime(text_plugins(), &["text.generate_text"]).start();
        handle
            .create_event(
                ContextItem::message("test", "one"),
                PlatformContext::new("test", Arc::new(Refusing)),
            )
            .unwrap();
        let (_, rx) = handle
            .send(ContextItem::message("test", "two"), "test", Default::default())
            .unwrap();
        assert_eq!(rx.await.unwrap().text(), "hi there");

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn running_state_visible_while_event_in_flight() {
        let mut plugins = PluginRegistry::new();
        plugins
            .register(Arc::new(
                ScriptedPlugin::new("slow").sleeper("nap", Duration::from_millis(100)),
            ))
            .unwrap();
        let (handle, task) = runtime(plugins, &["slow.nap"]).start();
        let mut state_rx = handle.watch_state();

        let (_, rx1) = handle
            .send(ContextItem::message("test", "a"), "test", Default::default())
            .unwrap();
        let (_, rx2) = handle
            .send(ContextItem::message("test", "b"), "test", Default::default())
            .unwrap();

        let busy = state_rx
            .wait_for(|s| s.is_running && s.queue_length == 1)
            .await
            .unwrap()
            .clone();
        assert!(busy.is_running);

        rx1.await.unwrap();
        rx2.await.unwrap();
        handle.shutdown();
        task.await.unwrap();
        assert_eq!(handle.agent_state().queue_length, 0);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_events() {
        let (handle, task) = runtime(text_plugins(), &["text.generate_text"]).start();
        handle.shutdown();
        task.await.unwrap();

        let err = handle
            .send(ContextItem::message("test", "late"), "test", Default::default())
            .unwrap_err();
        assert_eq!(err, EnqueueError::Closed);
        assert!(handle.is_shut_down());
    }

    #[derive(Default)]
    struct RecordingMemory {
        messages: Mutex<Vec<StoredMessage>>,
        contexts: Mutex<Vec<StoredContext>>,
    }

    #[async_trait::async_trait]
    impl MemoryProvider for RecordingMemory {
        fn name(&self) -> &str {
            "recording"
        }

        async fn create_conversation(&self, _opts: ConversationOptions) -> Result<String, MemoryError> {
            Ok("conv-new".into())
        }

        async fn store_message(&self, message: ContextItem, conversation_id: &str) -> Result<(), MemoryError> {
            self.messages.lock().unwrap().push(StoredMessage {
                conversation_id: conversation_id.into(),
                item: message,
            });
            Ok(())
        }

        async fn store_context(&self, context: StoredContext, _conversation_id: &str) -> Result<(), MemoryError> {
            self.contexts.lock().unwrap().push(context);
            Ok(())
        }

        async fn get_messages(&self, _query: MessageQuery) -> Result<Vec<StoredMessage>, MemoryError> {
            Ok(self.messages.lock().unwrap().clone())
        }

        async fn get_contexts(&self, _conversation_id: &str) -> Result<Vec<StoredContext>, MemoryError> {
            Ok(self.contexts.lock().unwrap().clone())
        }

        async fn get_conversation(&self, _id: &str) -> Result<Option<Conversation>, MemoryError> {
            Ok(None)
        }

        async fn delete_conversation(&self, _id: &str) -> Result<bool, MemoryError> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn memory_receives_message_and_final_chain() {
        let memory = Arc::new(RecordingMemory::default());
        let (handle, task) = Runtime::builder()
            .plugins(text_plugins())
            .capabilities(scripted_text_capability("hi there"))
            .planner(Arc::new(StaticPlanner::parse(&["text.generate_text"]).unwrap()))
            .memory(memory.clone())
            .build()
            .start();

        let mut metadata = serde_json::Map::new();
        metadata.insert("conversation_id".into(), serde_json::json!("conv-1"));
        let (_, rx1) = handle
            .send(ContextItem::message("test", "hello"), "test", metadata)
            .unwrap();
        let (_, rx2) = handle
            .send(ContextItem::message("test", "again"), "test", Default::default())
            .unwrap();
        rx1.await.unwrap();
        rx2.await.unwrap();
        handle.shutdown();
        task.await.unwrap();

        let messages = memory.messages.lock().unwrap().clone();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].conversation_id, "conv-1");
        assert_eq!(messages[1].conversation_id, "conv-new");

        let contexts = memory.contexts.lock().unwrap().clone();
        assert_eq!(contexts.len(), 2);
        assert_eq!(contexts[0].chain.len(), 2);
        assert_eq!(contexts[0].chain.last().unwrap().content, "hi there");
    }

    /// Memory that misbehaves on every write: panics or never returns.
    struct BrokenMemory {
        hang: bool,
    }

    impl BrokenMemory {
        async fn fail(&self) -> Result<(), MemoryError> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            panic!("memory backend exploded")
        }
    }

    #[async_trait::async_trait]
    impl MemoryProvider for BrokenMemory {
        fn name(&self) -> &str {
            "broken"
        }

        async fn create_conversation(&self, _opts: ConversationOptions) -> Result<String, MemoryError> {
            self.fail().await?;
            Ok("never".into())
        }

        async fn store_message(&self, _message: ContextItem, _conversation_id: &str) -> Result<(), MemoryError> {
            self.fail().await
        }

        async fn store_context(&self, _context: StoredContext, _conversation_id: &str) -> Result<(), MemoryError> {
            self.fail().await
        }

        async fn get_messages(&self, _query: MessageQuery) -> Result<Vec<StoredMessage>, MemoryError> {
            Ok(Vec::new())
        }

        async fn get_contexts(&self, _conversation_id: &str) -> Result<Vec<StoredContext>, MemoryError> {
            Ok(Vec::new())
        }

        async fn get_conversation(&self, _id: &str) -> Result<Option<Conversation>, MemoryError> {
            Ok(None)
        }

        async fn delete_conversation(&self, _id: &str) -> Result<bool, MemoryError> {
            Ok(false)
        }
    }

    fn runtime_with_memory(memory: BrokenMemory) -> Runtime {
        Runtime::builder()
            .plugins(text_plugins())
            .capabilities(scripted_text_capability("hi there"))
            .planner(Arc::new(StaticPlanner::parse(&["text.generate_text"]).unwrap()))
            .memory(Arc::new(memory))
            .config(RuntimeConfig {
                step_timeout_secs: 1,
                ..RuntimeConfig::default()
            })
            .build()
    }

    #[tokio::test]
    async fn panicking_memory_does_not_kill_loop() {
        let (handle, task) = runtime_with_memory(BrokenMemory { hang: false }).start();

        // Named conversation: skips create_conversation, panics in both stores.
        let mut metadata = serde_json::Map::new();
        metadata.insert("conversation_id".into(), serde_json::json!("conv-1"));
        let (_, rx1) = handle
            .send(ContextItem::message("test", "one"), "test", metadata)
            .unwrap();
        assert_eq!(rx1.await.unwrap().text(), "hi there");

        let (_, rx2) = handle
            .send(ContextItem::message("test", "two"), "test", Default::default())
            .unwrap();
        assert_eq!(rx2.await.unwrap().text(), "hi there");

        handle.shutdown();
        task.await.unwrap();
        assert_eq!(handle.agent_state().events_processed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_memory_times_out() {
        let (handle, task) = runtime_with_memory(BrokenMemory { hang: true }).start();

        let mut metadata = serde_json::Map::new();
        metadata.insert("conversation_id".into(), serde_json::json!("conv-1"));
        let (_, rx1) = handle
            .send(ContextItem::message("test", "one"), "test", metadata)
            .unwrap();
        let (_, rx2) = handle
            .send(ContextItem::message("test", "two"), "test", Default::default())
            .unwrap();
        assert_eq!(rx1.await.unwrap().text(), "hi there");
        assert_eq!(rx2.await.unwrap().text(), "hi there");

        handle.shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn panicking_responder_does_not_kill_loop() {
        struct Exploding;

        #[async_trait::async_trait]
        impl ResponseHandler for Exploding {
            async fn respond(&self, _response: EventResponse) -> Result<(), ResponseDeliveryError> {
                panic!("responder exploded")
            }
        }

        let (handle, task) = runtime(text_plugins(), &["text.generate_text"]).start();
        handle
            .create_event(
                ContextItem::message("test", "one"),
                PlatformContext::new("test", Arc::new(Exploding)),
            )
            .unwrap();
        let (_, rx) = handle
            .send(ContextItem::message("test", "two"), "test", Default::default())
            .unwrap();
        assert_eq!(rx.await.unwrap().text(), "hi there");

        handle.shutdown();
        task.await.unwrap();
    }
}
