//! Wiring: everything the runtime needs, built from [`AppConfig`].

use std::sync::Arc;
use std::time::Duration;

use conduit_config::{AppConfig, MemoryBackendKind, PlannerKind};
use conduit_core::capability::CapabilityRegistry;
use conduit_core::memory::MemoryProvider;
use conduit_core::monitor::MonitorBus;
use conduit_core::Result;
use conduit_memory::{FileBackend, InMemoryBackend};
use conduit_monitor::ConsoleMonitor;
use conduit_runtime::{LlmPlanner, PipelinePlanner, Runtime, StaticPlanner};
use tracing::info;

/// Capability registry with the configured timeout, aliases, and provider.
pub fn capabilities(config: &AppConfig) -> Result<CapabilityRegistry> {
    let mut registry = CapabilityRegistry::new()
        .with_timeout(Duration::from_secs(config.runtime.capability_timeout_secs))
        .with_alias_groups(config.capabilities.aliases.iter().cloned());
    conduit_providers::register_from_config(&mut registry, &config.provider)?;
    Ok(registry)
}

pub fn planner(config: &AppConfig) -> Result<Arc<dyn PipelinePlanner>> {
    Ok(match config.planner.kind {
        PlannerKind::Static => Arc::new(StaticPlanner::parse(&config.planner.steps)?),
        PlannerKind::Llm => Arc::new(LlmPlanner::new(&config.planner.capability)?),
    })
}

pub fn memory(config: &AppConfig) -> Option<Arc<dyn MemoryProvider>> {
    match config.memory.backend {
        MemoryBackendKind::None => None,
        MemoryBackendKind::InMemory => Some(Arc::new(InMemoryBackend::new())),
        MemoryBackendKind::File => Some(Arc::new(FileBackend::new(config.memory_dir()))),
    }
}

/// Build a runtime from configuration. Must be called inside a tokio
/// runtime when the console monitor is enabled.
pub fn build_runtime(config: &AppConfig) -> Result<Runtime> {
    let capabilities = capabilities(config)?;
    let plugins = conduit_plugins::default_registry(&config.plugins)?;
    let planner = planner(config)?;

    let monitor = Arc::new(MonitorBus::new(config.monitor.buffer));
    if config.monitor.console {
        conduit_monitor::attach(Arc::new(ConsoleMonitor), &monitor);
    }

    info!(
        planner = planner.name(),
        memory = ?config.memory.backend,
        failure_policy = ?config.runtime.failure_policy,
        "Runtime assembled"
    );

    let mut builder = Runtime::builder()
        .plugins(plugins)
        .capabilities(capabilities)
        .planner(planner)
        .monitor(monitor)
        .config(config.runtime.clone());
    if let Some(memory) = memory(config) {
        builder = builder.memory(memory);
    }
    Ok(builder.build())
}
