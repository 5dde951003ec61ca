//! Capability providers for conduit.
//!
//! A provider backs the built-in capabilities (`text-generation` and
//! `image-generation`) in a [`CapabilityRegistry`]. Which one is used is a
//! configuration choice; plugins never see the difference.

pub mod echo;
pub mod openai_compat;

pub use echo::{EchoImage, EchoText};
pub use openai_compat::{OpenAiCompatClient, OpenAiImage, OpenAiText};

use conduit_config::{ProviderConfig, ProviderKind};
use conduit_core::capability::{CapabilityHandler, CapabilityRegistry, ids, schemas};
use conduit_core::error::CapabilityError;
use std::sync::Arc;
use tracing::info;

/// Register the built-in capabilities for the configured provider.
pub fn register_from_config(
    registry: &mut CapabilityRegistry,
    config: &ProviderConfig,
) -> Result<(), CapabilityError> {
    let (text, image): (Arc<dyn CapabilityHandler>, Arc<dyn CapabilityHandler>) = match config.kind {
        ProviderKind::Echo => (Arc::new(EchoText), Arc::new(EchoImage)),
        ProviderKind::Openai => {
            let client = OpenAiCompatClient::new(&config.api_url, config.api_key.clone(), &config.model)
                .map_err(|e| CapabilityError::Execution {
                    capability: ids::TEXT_GENERATION.into(),
                    reason: format!("Failed to build HTTP client: {e}"),
                })?
                .with_image_model(&config.image_model)
                .with_temperature(config.temperature);
            let client = Arc::new(client);
            (Arc::new(OpenAiText(client.clone())), Arc::new(OpenAiImage(client)))
        }
    };

    registry.add_capability(
        ids::TEXT_GENERATION,
        schemas::text_generation_input(),
        schemas::text_generation_output(),
        text,
    )?;
    registry.add_capability(
        ids::IMAGE_GENERATION,
        schemas::image_generation_input(),
        schemas::image_generation_output(),
        image,
    )?;

    info!(provider = ?config.kind, model = %config.model, "Capability provider ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[tokio::test]
    async fn echo_provider_backs_both_capabilities() {
        let mut registry = CapabilityRegistry::new();
        register_from_config(&mut registry, &ProviderConfig::default()).unwrap();

        let text = registry
            .execute_capability(ids::TEXT_GENERATION, json!({ "prompt": "ping" }), &Value::Null)
            .await
            .unwrap();
        assert_eq!(text["text"], "echo: ping");

        let image = registry
            .execute_capability(ids::IMAGE_GENERATION, json!({ "prompt": "crab" }), &Value::Null)
            .await
            .unwrap();
        assert_eq!(image["url"], "echo://image/crab");
    }

    #[test]
    fn openai_provider_registers_without_network() {
        let mut registry = CapabilityRegistry::new();
        let config = ProviderConfig {
            kind: ProviderKind::Openai,
            api_key: Some("sk-test".into()),
            ..ProviderConfig::default()
        };
        register_from_config(&mut registry, &config).unwrap();
        assert!(registry.contains(ids::TEXT_GENERATION));
        assert!(registry.contains(ids::IMAGE_GENERATION));
    }

    #[test]
    fn registering_twice_is_a_duplicate() {
        let mut registry = CapabilityRegistry::new();
        register_from_config(&mut registry, &ProviderConfig::default()).unwrap();
        let err = register_from_config(&mut registry, &ProviderConfig::default()).unwrap_err();
        assert!(matches!(err, CapabilityError::Duplicate(_)));
    }
}
