//! Text plugin: answers the conversation through `text-generation`.

use async_trait::async_trait;
use conduit_core::capability::ids;
use conduit_core::context::{ContextChain, types};
use conduit_core::plugin::{ExecutionContext, Executor, ExecutorOutput, Plugin};
use serde_json::{Value, json};
use std::sync::Arc;

use crate::character::PERSONA;

const DEFAULT_SYSTEM: &str =
    "You are a helpful assistant. Reply to the latest message in the conversation below.";

pub struct TextPlugin;

impl Plugin for TextPlugin {
    fn id(&self) -> &str {
        "text"
    }

    fn description(&self) -> &str {
        "Conversational text generation"
    }

    fn executors(&self) -> Vec<Arc<dyn Executor>> {
        vec![Arc::new(GenerateText)]
    }
}

pub struct GenerateText;

#[async_trait]
impl Executor for GenerateText {
    fn name(&self) -> &str {
        "generate_text"
    }

    fn description(&self) -> &str {
        "Write a natural-language reply to the user using everything gathered so far in the context."
    }

    async fn execute(&self, ctx: &mut ExecutionContext<'_>) -> ExecutorOutput {
        let input = json!({
            "prompt": conversation_prompt(ctx.chain()),
            "system": system_prompt(ctx.chain()),
        });

        match ctx
            .execute_capability(ids::TEXT_GENERATION, input, &Value::Null)
            .await
        {
            Ok(out) => {
                let text = out["text"].as_str().unwrap_or_default();
                let mut output = ExecutorOutput::item(types::GENERATED_TEXT, text);
                if let Some(model) = out.get("model") {
                    output = output.with_field("model", model.clone());
                }
                output
            }
            Err(e) => ExecutorOutput::failure(e.to_string()),
        }
    }
}

/// The chain as the model sees it: errors and persona items left out.
pub(crate) fn conversation_prompt(chain: &ContextChain) -> String {
    chain
        .iter()
        .filter(|i| !i.is_error() && i.item_type != PERSONA)
        .map(|i| format!("[{}/{}] {}", i.plugin_id, i.item_type, i.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The most recent persona, or the default assistant prompt.
fn system_prompt(chain: &ContextChain) -> String {
    chain
        .iter()
        .rev()
        .find(|i| i.item_type == PERSONA)
        .map(|i| i.content.clone())
        .unwrap_or_else(|| DEFAULT_SYSTEM.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{run, text_capability};
    use conduit_core::capability::CapabilityRegistry;
    use conduit_core::context::ContextItem;
    use conduit_core::pipeline::PipelineStep;

    #[tokio::test]
    async fn replies_with_generated_text() {
        let chain = ContextChain::with_initial(ContextItem::message("http", "hello"));
        let (output, _) = run(&GenerateText, chain, text_capability()).await;

        assert!(output.success);
        let item = output.to_context_item(&PipelineStep::new("text", "generate_text"));
        assert_eq!(item.item_type, types::GENERATED_TEXT);
        assert_eq!(item.content, "system=You are a helpful assistant. Reply to the latest message in the conversation below. prompt=[http/message] hello");
        assert_eq!(item.fields["model"], "scripted");
    }

    #[tokio::test]
    async fn persona_becomes_system_prompt() {
        let mut chain = ContextChain::with_initial(ContextItem::message("http", "hi"));
        chain.append(ContextItem::new("character", PERSONA, "inject", "You are Ferris."));
        chain.append(ContextItem::error("time", "current_time", "clock broke"));

        let (output, _) = run(&GenerateText, chain, text_capability()).await;
        let content = output.data.unwrap()["content"].as_str().unwrap().to_string();
        assert_eq!(content, "system=You are Ferris. prompt=[http/message] hi");
    }

    #[tokio::test]
    async fn missing_capability_is_a_failure() {
        let chain = ContextChain::with_initial(ContextItem::message("http", "hello"));
        let (output, _) = run(&GenerateText, chain, CapabilityRegistry::new()).await;
        assert!(!output.success);
        assert!(output.error.unwrap().contains("text-generation"));
    }
}
