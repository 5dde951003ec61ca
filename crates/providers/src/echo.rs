//! Offline provider: answers without any network access.
//!
//! Text generation echoes the last line of the prompt back; requests that
//! ask for JSON get an empty plan so the planner falls through to a direct
//! response. Image generation returns a placeholder URL.

use async_trait::async_trait;
use conduit_core::capability::CapabilityHandler;
use conduit_core::error::CapabilityError;
use serde_json::{Value, json};

pub struct EchoText;

#[async_trait]
impl CapabilityHandler for EchoText {
    async fn execute(&self, input: Value, _config: &Value) -> Result<Value, CapabilityError> {
        if input.get("json").and_then(Value::as_bool).unwrap_or(false) {
            return Ok(json!({
                "text": json!({ "steps": [], "explanation": "echo provider answers directly" }).to_string(),
                "model": "echo",
            }));
        }

        let prompt = input.get("prompt").and_then(Value::as_str).unwrap_or_default();
        let last = prompt
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .unwrap_or_default();
        let last = strip_render_prefix(last);
        Ok(json!({ "text": format!("echo: {last}"), "model": "echo" }))
    }
}

/// Rendered chains prefix each line with `[plugin/type]`.
fn strip_render_prefix(line: &str) -> &str {
    match (line.starts_with('['), line.find("] ")) {
        (true, Some(end)) => &line[end + 2..],
        _ => line,
    }
}

pub struct EchoImage;

#[async_trait]
impl CapabilityHandler for EchoImage {
    async fn execute(&self, input: Value, _config: &Value) -> Result<Value, CapabilityError> {
        let prompt = input.get("prompt").and_then(Value::as_str).unwrap_or_default();
        let slug: String = prompt
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
            .collect();
        Ok(json!({
            "url": format!("echo://image/{slug}"),
            "revised_prompt": prompt,
        }))
    }
}
