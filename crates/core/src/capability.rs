//! Capabilities: named, schema-typed operations backed by one provider.
//!
//! Model providers register capabilities (text generation, image
//! generation, ...) here; plugins and the planner only ever reach them
//! through [`CapabilityRegistry::execute_capability`], which resolves
//! aliases and validates both directions against JSON Schema.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{CapabilityError, SchemaStage};

/// Canonical ids of the capabilities built-in plugins rely on.
pub mod ids {
    pub const TEXT_GENERATION: &str = "text-generation";
    pub const IMAGE_GENERATION: &str = "image-generation";
}

/// Schemas shared by providers and the plugins that call them.
pub mod schemas {
    use serde_json::{Value, json};

    pub fn text_generation_input() -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": { "type": "string" },
                "system": { "type": "string" },
                "temperature": { "type": "number", "minimum": 0, "maximum": 2 },
                "json": { "type": "boolean" }
            },
            "required": ["prompt"]
        })
    }

    pub fn text_generation_output() -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string" },
                "model": { "type": "string" }
            },
            "required": ["text"]
        })
    }

    pub fn image_generation_input() -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": { "type": "string", "minLength": 1 },
                "size": { "type": "string" }
            },
            "required": ["prompt"]
        })
    }

    pub fn image_generation_output() -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string" },
                "revised_prompt": { "type": "string" }
            },
            "required": ["url"]
        })
    }
}

/// The provider side of a capability.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    async fn execute(
        &self,
        input: serde_json::Value,
        config: &serde_json::Value,
    ) -> Result<serde_json::Value, CapabilityError>;
}

/// Adapts an async closure into a [`CapabilityHandler`].
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> CapabilityHandler for FnHandler<F>
where
    F: Fn(serde_json::Value, serde_json::Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<serde_json::Value, CapabilityError>> + Send,
{
    async fn execute(
        &self,
        input: serde_json::Value,
        config: &serde_json::Value,
    ) -> Result<serde_json::Value, CapabilityError> {
        (self.0)(input, config.clone()).await
    }
}

/// Wrap an async closure as a shareable handler.
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn CapabilityHandler>
where
    F: Fn(serde_json::Value, serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<serde_json::Value, CapabilityError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// A registered capability with its compiled schemas.
pub struct Capability {
    id: String,
    input_schema: serde_json::Value,
    output_schema: serde_json::Value,
    input_validator: jsonschema::Validator,
    output_validator: jsonschema::Validator,
    handler: Arc<dyn CapabilityHandler>,
}

impl Capability {
    pub fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self, stage: SchemaStage, value: &serde_json::Value) -> Result<(), CapabilityError> {
        let validator = match stage {
            SchemaStage::Input => &self.input_validator,
            SchemaStage::Output => &self.output_validator,
        };
        if validator.is_valid(value) {
            return Ok(());
        }
        let details: Vec<String> = validator.iter_errors(value).map(|e| e.to_string()).collect();
        Err(CapabilityError::Validation {
            capability: self.id.clone(),
            stage,
            details: details.join("; "),
        })
    }
}

/// Introspection view of a capability.
#[derive(Debug, Clone, Serialize)]
pub struct CapabilityDescriptor {
    pub id: String,
    pub aliases: Vec<String>,
    pub input_schema: serde_json::Value,
    pub output_schema: serde_json::Value,
}

fn compile(
    id: &str,
    stage: SchemaStage,
    schema: &serde_json::Value,
) -> Result<jsonschema::Validator, CapabilityError> {
    jsonschema::validator_for(schema).map_err(|e| CapabilityError::InvalidSchema {
        capability: id.to_string(),
        stage,
        reason: e.to_string(),
    })
}

/// Maps capability ids (and their aliases) to exactly one provider.
///
/// Populated during startup and then shared read-only.
#[derive(Default)]
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Capability>,
    alias_groups: Vec<Vec<String>>,
    timeout: Option<Duration>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound every capability call; expiry yields [`CapabilityError::Timeout`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_alias_groups<G, S>(mut self, groups: impl IntoIterator<Item = G>) -> Self
    where
        G: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for group in groups {
            self.add_alias_group(group);
        }
        self
    }

    /// Declare that all `members` name the same capability.
    ///
    /// Groups that share a member with an existing group are merged, so
    /// aliases always form equivalence classes.
    pub fn add_alias_group<S: Into<String>>(&mut self, members: impl IntoIterator<Item = S>) {
        let mut merged: Vec<String> = Vec::new();
        for member in members.into_iter().map(Into::into) {
            if !member.is_empty() && !merged.contains(&member) {
                merged.push(member);
            }
        }
        if merged.is_empty() {
            return;
        }

        let (overlapping, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.alias_groups)
            .into_iter()
            .partition(|g| g.iter().any(|m| merged.contains(m)));

        let mut group: Vec<String> = Vec::new();
        for member in overlapping.into_iter().flatten().chain(merged) {
            if !group.contains(&member) {
                group.push(member);
            }
        }

        let registered = group
            .iter()
            .filter(|m| self.capabilities.contains_key(*m))
            .count();
        if registered > 1 {
            warn!(aliases = ?group, "Alias group spans more than one registered capability");
        }

        self.alias_groups = rest;
        self.alias_groups.push(group);
    }

    fn group_of(&self, name: &str) -> Option<&Vec<String>> {
        self.alias_groups.iter().find(|g| g.iter().any(|m| m == name))
    }

    /// Canonical id for `name`.
    ///
    /// Inside an alias group the canonical id is the first member that is
    /// registered as a capability, or the first member if none is. Names
    /// outside every group resolve to themselves.
    pub fn resolve_alias(&self, name: &str) -> String {
        match self.group_of(name) {
            Some(group) => group
                .iter()
                .find(|m| self.capabilities.contains_key(*m))
                .or_else(|| group.first())
                .cloned()
                .unwrap_or_else(|| name.to_string()),
            None => name.to_string(),
        }
    }

    /// Register a provider for `id`.
    pub fn add_capability(
        &mut self,
        id: impl Into<String>,
        input_schema: serde_json::Value,
        output_schema: serde_json::Value,
        handler: Arc<dyn CapabilityHandler>,
    ) -> Result<(), CapabilityError> {
        let id = id.into();
        if self.capabilities.contains_key(&id) {
            return Err(CapabilityError::Duplicate(id));
        }
        let canonical = self.resolve_alias(&id);
        if canonical != id && self.capabilities.contains_key(&canonical) {
            return Err(CapabilityError::Duplicate(format!("{id} (alias of {canonical})")));
        }

        let input_validator = compile(&id, SchemaStage::Input, &input_schema)?;
        let output_validator = compile(&id, SchemaStage::Output, &output_schema)?;

        debug!(capability = %id, "Registered capability");
        self.capabilities.insert(
            id.clone(),
            Capability {
                id,
                input_schema,
                output_schema,
                input_validator,
                output_validator,
                handler,
            },
        );
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.capabilities.contains_key(&self.resolve_alias(id))
    }

    /// Resolve, validate input, execute, validate output.
    pub async fn execute_capability(
        &self,
        id: &str,
        input: serde_json::Value,
        config: &serde_json::Value,
    ) -> Result<serde_json::Value, CapabilityError> {
        let canonical = self.resolve_alias(id);
        let capability = self
            .capabilities
            .get(&canonical)
            .ok_or_else(|| CapabilityError::NotFound(id.to_string()))?;

        capability.validate(SchemaStage::Input, &input)?;

        debug!(capability = %canonical, requested = %id, "Executing capability");
        let call = capability.handler.execute(input, config);
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| CapabilityError::Timeout {
                    capability: canonical.clone(),
                    timeout_ms: limit.as_millis() as u64,
                })??,
            None => call.await?,
        };

        capability.validate(SchemaStage::Output, &output)?;
        Ok(output)
    }

    pub fn descriptors(&self) -> Vec<CapabilityDescriptor> {
        let mut out: Vec<CapabilityDescriptor> = self
            .capabilities
            .values()
            .map(|c| CapabilityDescriptor {
                id: c.id.clone(),
                aliases: self
                    .group_of(&c.id)
                    .map(|g| g.iter().filter(|m| **m != c.id).cloned().collect())
                    .unwrap_or_default(),
                input_schema: c.input_schema.clone(),
                output_schema: c.output_schema.clone(),
            })
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }
}
