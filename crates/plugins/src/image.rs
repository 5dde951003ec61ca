//! Image plugin: draws the user's request through `image-generation`.

use async_trait::async_trait;
use conduit_core::capability::ids;
use conduit_core::context::{ContextChain, types};
use conduit_core::plugin::{ExecutionContext, Executor, ExecutorOutput, Plugin};
use serde_json::{Value, json};
use std::sync::Arc;

pub struct ImagePlugin;

impl Plugin for ImagePlugin {
    fn id(&self) -> &str {
        "image"
    }

    fn description(&self) -> &str {
        "Image generation from the user's description"
    }

    fn executors(&self) -> Vec<Arc<dyn Executor>> {
        vec![Arc::new(GenerateImage)]
    }
}

pub struct GenerateImage;

#[async_trait]
impl Executor for GenerateImage {
    fn name(&self) -> &str {
        "generate_image"
    }

    fn description(&self) -> &str {
        "Create an image when the user asks for a picture, drawing, or illustration. Produces an image URL."
    }

    async fn execute(&self, ctx: &mut ExecutionContext<'_>) -> ExecutorOutput {
        let Some(prompt) = image_prompt(ctx.chain()) else {
            return ExecutorOutput::failure("nothing to draw: no message in context");
        };

        match ctx
            .execute_capability(ids::IMAGE_GENERATION, json!({ "prompt": prompt }), &Value::Null)
            .await
        {
            Ok(out) => {
                let url = out["url"].as_str().unwrap_or_default().to_string();
                let mut output = ExecutorOutput::item(types::GENERATED_IMAGE, url.clone())
                    .with_field("url", json!(url))
                    .with_field("prompt", json!(prompt));
                if let Some(revised) = out.get("revised_prompt") {
                    output = output.with_field("revised_prompt", revised.clone());
                }
                output
            }
            Err(e) => ExecutorOutput::failure(e.to_string()),
        }
    }
}

/// The latest user message, falling back to the initial item.
fn image_prompt(chain: &ContextChain) -> Option<String> {
    chain
        .iter()
        .rev()
        .find(|i| i.item_type == types::MESSAGE)
        .or_else(|| chain.first())
        .map(|i| i.content.trim().to_string())
        .filter(|p| !p.is_empty())
}
