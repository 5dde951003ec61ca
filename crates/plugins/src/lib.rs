//! Built-in plugins for conduit.
//!
//! Plugins give the runtime something to plan with:
//! answer in text, draw an image, tell the time, and stay in character.
//! Model access goes through capabilities only, so every plugin works
//! with whichever provider is configured.

pub mod character;
pub mod image;
pub mod text;
pub mod time;

pub use character::CharacterPlugin;
pub use image::ImagePlugin;
pub use text::TextPlugin;
pub use time::TimePlugin;

use conduit_config::PluginsConfig;
use conduit_core::error::PluginError;
use conduit_core::plugin::{Plugin, PluginRegistry};
use std::sync::Arc;
use tracing::info;

/// Ids accepted in `plugins.enabled`.
pub const BUILT_IN: &[&str] = &["character", "text", "image", "time"];

/// Create a registry with the enabled built-in plugins.
///
/// The character plugin is registered whenever `[plugins.character]` is
/// configured, and always ahead of the others.
pub fn default_registry(config: &PluginsConfig) -> Result<PluginRegistry, PluginError> {
    let mut registry = PluginRegistry::new();

    if let Some(character) = &config.character {
        registry.register(Arc::new(CharacterPlugin::new(character)))?;
    } else if config.enabled.iter().any(|p| p == "character") {
        return Err(PluginError::Invalid {
            plugin_id: "character".into(),
            reason: "enabled without a [plugins.character] section".into(),
        });
    }

    for id in &config.enabled {
        let plugin: Arc<dyn Plugin> = match id.as_str() {
            "character" => continue,
            "text" => Arc::new(TextPlugin),
            "image" => Arc::new(ImagePlugin),
            "time" => Arc::new(TimePlugin),
            other => {
                return Err(PluginError::Invalid {
                    plugin_id: other.to_string(),
                    reason: format!("not a built-in plugin (expected one of {})", BUILT_IN.join(", ")),
                });
            }
        };
        registry.register(plugin)?;
    }

    info!(plugins = ?registry.plugin_ids(), executors = registry.len(), "Plugins ready");
    Ok(registry)
}

#[cfg(test)]
pub(crate) mod testing {
    use conduit_core::capability::{CapabilityRegistry, handler_fn, ids, schemas};
    use conduit_core::context::ContextChain;
    use conduit_core::event::{OneshotResponder, PlatformContext};
    use conduit_core::monitor::MonitorBus;
    use conduit_core::pipeline::PipelineStep;
    use conduit_core::plugin::{ExecutionContext, Executor, ExecutorOutput};
    use serde_json::json;

    /// Run one executor against `chain` outside the runtime.
    pub async fn run(
        executor: &dyn Executor,
        mut chain: ContextChain,
        capabilities: CapabilityRegistry,
    ) -> (ExecutorOutput, ContextChain) {
        let (responder, _rx) = OneshotResponder::channel("test");
        let platform = PlatformContext::new("test", responder);
        let monitor = MonitorBus::new(8);
        let step = PipelineStep::new("test", executor.name());
        let output = {
            let mut ctx =
                ExecutionContext::new("evt-test", &step, &platform, &capabilities, &mut chain, &monitor);
            executor.execute(&mut ctx).await
        };
        (output, chain)
    }

    /// `text-generation` that reports the system prompt and prompt it got.
    pub fn text_capability() -> CapabilityRegistry {
        let mut registry = CapabilityRegistry::new();
        registry
            .add_capability(
                ids::TEXT_GENERATION,
                schemas::text_generation_input(),
                schemas::text_generation_output(),
                handler_fn(|input, _| async move {
                    Ok(json!({
                        "text": format!(
                            "system={} prompt={}",
                            input["system"].as_str().unwrap_or_default(),
                            input["prompt"].as_str().unwrap_or_default()
                        ),
                        "model": "scripted",
                    }))
                }),
            )
            .unwrap();
        registry
    }

    /// `image-generation` that derives the URL from the prompt.
    pub fn image_capability() -> CapabilityRegistry {
        let mut registry = CapabilityRegistry::new();
        registry
            .add_capability(
                ids::IMAGE_GENERATION,
                schemas::image_generation_input(),
                schemas::image_generation_output(),
                handler_fn(|input, _| async move {
                    Ok(json!({
                        "url": format!("https://img.test/{}.png", input["prompt"].as_str().unwrap_or_default()),
                    }))
                }),
            )
            .unwrap();
        registry
    }
}
