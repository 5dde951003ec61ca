//! Character plugin: injects a configured persona at the head of every
//! pipeline so later steps answer in character.

use async_trait::async_trait;
use conduit_config::CharacterConfig;
use conduit_core::plugin::{ExecutionContext, Executor, ExecutorOutput, Plugin};
use serde_json::json;
use std::sync::Arc;

/// Item type carrying the persona. The text plugin uses the latest one as
/// its system prompt.
pub const PERSONA: &str = "persona";

pub struct CharacterPlugin {
    inject: Arc<Inject>,
}

impl CharacterPlugin {
    pub fn new(config: &CharacterConfig) -> Self {
        Self {
            inject: Arc::new(Inject {
                name: config.name.clone(),
                persona: config.persona.clone(),
            }),
        }
    }
}

impl Plugin for CharacterPlugin {
    fn id(&self) -> &str {
        "character"
    }

    fn description(&self) -> &str {
        "Persona injection"
    }

    fn executors(&self) -> Vec<Arc<dyn Executor>> {
        vec![self.inject.clone() as Arc<dyn Executor>]
    }

    fn always_run_first(&self) -> bool {
        true
    }
}

pub struct Inject {
    name: String,
    persona: String,
}

#[async_trait]
impl Executor for Inject {
    fn name(&self) -> &str {
        "inject"
    }

    fn description(&self) -> &str {
        "Add the assistant's persona to the context. Runs automatically."
    }

    async fn execute(&self, _ctx: &mut ExecutionContext<'_>) -> ExecutorOutput {
        ExecutorOutput::item(PERSONA, format!("You are {}. {}", self.name, self.persona))
            .with_field("character", json!(self.name))
    }
}
