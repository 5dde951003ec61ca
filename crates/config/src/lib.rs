//! Configuration loading, validation, and management for conduit.
//!
//! Loads configuration from `~/.conduit/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.conduit/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Event loop and executor settings
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Pipeline planner settings
    #[serde(default)]
    pub planner: PlannerConfig,

    /// Capability alias groups
    #[serde(default)]
    pub capabilities: CapabilitiesConfig,

    /// Model provider backing the capabilities
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Conversation memory backend
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Monitor bus and observers
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// HTTP gateway
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Built-in plugins
    #[serde(default)]
    pub plugins: PluginsConfig,
}

/// What to do with the rest of a pipeline when a step fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop and answer the caller with the step's error
    #[default]
    Abort,
    /// Keep the error in the chain and run the next step
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    #[serde(default = "default_timeout_secs")]
    pub step_timeout_secs: u64,

    #[serde(default = "default_timeout_secs")]
    pub capability_timeout_secs: u64,

    /// 0 = unbounded
    #[serde(default)]
    pub max_queue_length: usize,

    #[serde(default = "default_max_pipeline_steps")]
    pub max_pipeline_steps: usize,
}

fn default_timeout_secs() -> u64 {
    60
}
fn default_max_pipeline_steps() -> usize {
    32
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            step_timeout_secs: default_timeout_secs(),
            capability_timeout_secs: default_timeout_secs(),
            max_queue_length: 0,
            max_pipeline_steps: default_max_pipeline_steps(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannerKind {
    /// Ask the text-generation capability for a plan
    #[default]
    Llm,
    /// Always run the configured steps
    Static,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default)]
    pub kind: PlannerKind,

    /// `plugin.executor` entries for the static planner
    #[serde(default)]
    pub steps: Vec<String>,

    /// Capability the LLM planner delegates to
    #[serde(default = "default_planner_capability")]
    pub capability: String,
}

fn default_planner_capability() -> String {
    "text-generation".into()
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            kind: PlannerKind::default(),
            steps: vec![],
            capability: default_planner_capability(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilitiesConfig {
    /// Each inner list names one capability under several ids
    #[serde(default = "default_aliases")]
    pub aliases: Vec<Vec<String>>,
}

fn default_aliases() -> Vec<Vec<String>> {
    vec![
        vec!["text-generation".into(), "generate_text".into()],
        vec!["image-generation".into(), "generate_image".into()],
    ]
}

impl Default for CapabilitiesConfig {
    fn default() -> Self {
        Self {
            aliases: default_aliases(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Offline provider that echoes the prompt back
    #[default]
    Echo,
    /// Any OpenAI-compatible HTTP endpoint
    Openai,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub kind: ProviderKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_image_model")]
    pub image_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_image_model() -> String {
    "dall-e-3".into()
}
fn default_temperature() -> f32 {
    0.7
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            api_key: None,
            api_url: default_api_url(),
            model: default_model(),
            image_model: default_image_model(),
            temperature: default_temperature(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("kind", &self.kind)
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("image_model", &self.image_model)
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryBackendKind {
    #[default]
    None,
    InMemory,
    File,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default)]
    pub backend: MemoryBackendKind,

    /// JSON-lines directory for the file backend (default `~/.conduit/memory`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Log snapshots through tracing
    #[serde(default = "default_true")]
    pub console: bool,

    /// How many snapshots a subscriber may fall behind before losing some
    #[serde(default = "default_monitor_buffer")]
    pub buffer: usize,
}

fn default_true() -> bool {
    true
}
fn default_monitor_buffer() -> usize {
    256
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            console: true,
            buffer: default_monitor_buffer(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// How long `POST /v1/events` waits for the event's response
    #[serde(default = "default_response_timeout")]
    pub response_timeout_secs: u64,
}

fn default_port() -> u16 {
    42618
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_response_timeout() -> u64 {
    300
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            response_timeout_secs: default_response_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// Built-in plugin ids to register
    #[serde(default = "default_plugins")]
    pub enabled: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character: Option<CharacterConfig>,
}

fn default_plugins() -> Vec<String> {
    vec!["text".into(), "image".into(), "time".into()]
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            enabled: default_plugins(),
            character: None,
        }
    }
}

/// Persona injected at the head of every pipeline by the `character` plugin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterConfig {
    pub name: String,
    pub persona: String,
}

impl AppConfig {
    /// Load configuration from the default path (~/.conduit/config.toml).
    ///
    /// Also checks environment variables:
    /// - `CONDUIT_API_KEY`, then `OPENAI_API_KEY`
    /// - `CONDUIT_PROVIDER` (`echo` | `openai`)
    /// - `CONDUIT_MODEL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if self.provider.api_key.is_none() {
            self.provider.api_key = lookup("CONDUIT_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(kind) = lookup("CONDUIT_PROVIDER") {
            self.provider.kind = match kind.as_str() {
                "echo" => ProviderKind::Echo,
                "openai" => ProviderKind::Openai,
                other => {
                    return Err(ConfigError::ValidationError(format!(
                        "CONDUIT_PROVIDER must be 'echo' or 'openai', got '{other}'"
                    )));
                }
            };
        }

        if let Some(model) = lookup("CONDUIT_MODEL") {
            self.provider.model = model;
        }
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".conduit")
    }

    /// Default directory for the file memory backend.
    pub fn memory_dir(&self) -> PathBuf {
        self.memory
            .path
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("memory"))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(ConfigError::ValidationError(
                "provider.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.runtime.step_timeout_secs == 0 || self.runtime.capability_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "runtime timeouts must be greater than zero".into(),
            ));
        }

        if self.runtime.max_pipeline_steps == 0 {
            return Err(ConfigError::ValidationError(
                "runtime.max_pipeline_steps must be greater than zero".into(),
            ));
        }

        if let Some(bad) = self.planner.steps.iter().find(|s| !is_step_ref(s)) {
            return Err(ConfigError::ValidationError(format!(
                "planner.steps entry '{bad}' is not of the form plugin.executor"
            )));
        }

        if self.planner.kind == PlannerKind::Static && self.planner.steps.is_empty() {
            return Err(ConfigError::ValidationError(
                "static planner needs at least one entry in planner.steps".into(),
            ));
        }

        if self.capabilities.aliases.iter().any(|g| g.is_empty()) {
            return Err(ConfigError::ValidationError(
                "capabilities.aliases must not contain empty groups".into(),
            ));
        }

        if self.monitor.buffer == 0 {
            return Err(ConfigError::ValidationError(
                "monitor.buffer must be greater than zero".into(),
            ));
        }

        if self.provider.kind == ProviderKind::Openai && self.provider.api_key.is_none() {
            tracing::warn!("provider.kind = openai but no API key is configured");
        }

        Ok(())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn is_step_ref(s: &str) -> bool {
    matches!(s.split_once('.'), Some((p, e)) if !p.is_empty() && !e.is_empty())
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
