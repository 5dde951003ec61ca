//! OpenAI-compatible provider implementation.
//!
//! Works with: OpenAI, OpenRouter, Ollama, vLLM, Together AI, and any
//! endpoint exposing `/chat/completions` and `/images/generations`.
//!
//! Backs two capabilities:
//! - `text-generation` via chat completions
//! - `image-generation` via image generations

use async_trait::async_trait;
use conduit_core::capability::{CapabilityHandler, ids};
use conduit_core::error::CapabilityError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{debug, warn};

/// Connection details shared by both capabilities.
pub struct OpenAiCompatClient {
    base_url: String,
    api_key: Option<String>,
    model: String,
    image_model: String,
    temperature: f32,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            image_model: "dall-e-3".into(),
            temperature: 0.7,
            client,
        })
    }

    pub fn with_image_model(mut self, model: impl Into<String>) -> Self {
        self.image_model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Build the chat completion body for a text-generation input.
    fn chat_body(&self, input: &Value, config: &Value) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = input.get("system").and_then(Value::as_str) {
            messages.push(ApiMessage {
                role: "system".into(),
                content: Some(system.into()),
            });
        }
        messages.push(ApiMessage {
            role: "user".into(),
            content: input.get("prompt").and_then(Value::as_str).map(String::from),
        });

        let model = config
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(self.model.as_str());
        let temperature = input
            .get("temperature")
            .and_then(Value::as_f64)
            .unwrap_or(self.temperature as f64);

        let mut body = json!({
            "model": model,
            "messages": messages,
            "temperature": temperature,
            "stream": false,
        });
        if input.get("json").and_then(Value::as_bool).unwrap_or(false) {
            body["response_format"] = json!({ "type": "json_object" });
        }
        if let Some(max_tokens) = config.get("max_tokens") {
            body["max_tokens"] = max_tokens.clone();
        }
        body
    }

    async fn post(&self, capability: &str, path: &str, body: &Value) -> Result<Value, CapabilityError> {
        let url = format!("{}/{path}", self.base_url);
        let fail = |reason: String| CapabilityError::Execution {
            capability: capability.to_string(),
            reason,
        };

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(body);
        if let Some(key) = &self.api_key {
            request = request.header("Authorization", format!("Bearer {key}"));
        }

        let response = request.send().await.map_err(|e| fail(e.to_string()))?;
        let status = response.status().as_u16();

        if status == 429 {
            return Err(fail("rate limited by provider".into()));
        }
        if status == 401 || status == 403 {
            return Err(fail("invalid API key or insufficient permissions".into()));
        }
        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(fail(format!("HTTP {status}: {error_body}")));
        }

        response
            .json()
            .await
            .map_err(|e| fail(format!("Failed to parse response: {e}")))
    }

    pub async fn generate_text(&self, input: Value, config: &Value) -> Result<Value, CapabilityError> {
        let body = self.chat_body(&input, config);
        debug!(model = %body["model"], "Sending completion request");

        let raw = self.post(ids::TEXT_GENERATION, "chat/completions", &body).await?;
        let api: ApiResponse = serde_json::from_value(raw).map_err(|e| CapabilityError::Execution {
            capability: ids::TEXT_GENERATION.into(),
            reason: format!("Unexpected response shape: {e}"),
        })?;
        let choice = api
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| CapabilityError::Execution {
                capability: ids::TEXT_GENERATION.into(),
                reason: "No choices in response".into(),
            })?;

        Ok(json!({
            "text": choice.message.content.unwrap_or_default(),
            "model": api.model,
        }))
    }

    pub async fn generate_image(&self, input: Value, config: &Value) -> Result<Value, CapabilityError> {
        let mut body = json!({
            "model": config.get("model").and_then(Value::as_str).unwrap_or(self.image_model.as_str()),
            "prompt": input.get("prompt").cloned().unwrap_or(Value::Null),
            "n": 1,
        });
        if let Some(size) = input.get("size") {
            body["size"] = size.clone();
        }
        debug!(model = %body["model"], "Sending image request");

        let raw = self.post(ids::IMAGE_GENERATION, "images/generations", &body).await?;
        let image = raw["data"]
            .as_array()
            .and_then(|d| d.first())
            .ok_or_else(|| CapabilityError::Execution {
                capability: ids::IMAGE_GENERATION.into(),
                reason: "No image in response".into(),
            })?;

        let mut out = json!({ "url": image["url"].as_str().unwrap_or_default() });
        if let Some(revised) = image["revised_prompt"].as_str() {
            out["revised_prompt"] = json!(revised);
        }
        Ok(out)
    }
}

/// `text-generation` backed by chat completions.
pub struct OpenAiText(pub Arc<OpenAiCompatClient>);

#[async_trait]
impl CapabilityHandler for OpenAiText {
    async fn execute(&self, input: Value, config: &Value) -> Result<Value, CapabilityError> {
        self.0.generate_text(input, config).await
    }
}

/// `image-generation` backed by image generations.
pub struct OpenAiImage(pub Arc<OpenAiCompatClient>);

#[async_trait]
impl CapabilityHandler for OpenAiImage {
    async fn execute(&self, input: Value, config: &Value) -> Result<Value, CapabilityError> {
        self.0.generate_image(input, config).await
    }
}

// --- API types ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, routing::post};

    fn client(base_url: &str) -> OpenAiCompatClient {
        OpenAiCompatClient::new(base_url, Some("sk-test".into()), "gpt-4o-mini").unwrap()
    }

    async fn mock_server() -> String {
        let app = Router::new()
            .route(
                "/v1/chat/completions",
                post(|Json(body): Json<Value>| async move {
                    let prompt = body["messages"]
                        .as_array()
                        .and_then(|m| m.last())
                        .and_then(|m| m["content"].as_str())
                        .unwrap_or_default()
                        .to_string();
                    Json(json!({
                        "model": body["model"],
                        "choices": [{ "message": { "role": "assistant", "content": format!("re: {prompt}") } }]
                    }))
                }),
            )
            .route(
                "/v1/images/generations",
                post(|| async {
                    Json(json!({
                        "data": [{ "url": "https://img.example/1.png", "revised_prompt": "a crab, digital art" }]
                    }))
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}/v1")
    }

    #[test]
    fn base_url_trailing_slash_trimmed() {
        let c = client("https://api.openai.com/v1/");
        assert_eq!(c.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn chat_body_includes_system_and_json_mode() {
        let c = client("http://localhost");
        let body = c.chat_body(
            &json!({ "prompt": "hi", "system": "be brief", "json": true, "temperature": 0.0 }),
            &Value::Null,
        );
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["model"], "gpt-4o-mini");
    }

    #[test]
    fn config_overrides_model() {
        let c = client("http://localhost");
        let body = c.chat_body(&json!({ "prompt": "hi" }), &json!({ "model": "gpt-4o" }));
        assert_eq!(body["model"], "gpt-4o");
        assert!(body.get("response_format").is_none());
    }

    #[tokio::test]
    async fn text_round_trip_against_mock_server() {
        let base = mock_server().await;
        let out = client(&base)
            .generate_text(json!({ "prompt": "hello" }), &Value::Null)
            .await
            .unwrap();
        assert_eq!(out["text"], "re: hello");
        assert_eq!(out["model"], "gpt-4o-mini");
    }

    #[tokio::test]
    async fn image_round_trip_against_mock_server() {
        let base = mock_server().await;
        let out = client(&base)
            .generate_image(json!({ "prompt": "a crab" }), &Value::Null)
            .await
            .unwrap();
        assert_eq!(out["url"], "https://img.example/1.png");
        assert_eq!(out["revised_prompt"], "a crab, digital art");
    }

    #[tokio::test]
    async fn http_errors_become_capability_errors() {
        let base = mock_server().await;
        let c = OpenAiCompatClient::new(format!("{base}/missing"), None, "m").unwrap();
        let err = c
            .generate_text(json!({ "prompt": "hello" }), &Value::Null)
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Execution { .. }));
        assert!(err.to_string().contains("404"));
    }
}
