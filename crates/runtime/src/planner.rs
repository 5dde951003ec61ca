//! Pipeline planning.
//!
//! A [`PipelinePlanner`] turns the context chain and the registered
//! executors into an ordered list of steps. [`plan_with_fallback`] wraps
//! any planner with validation against the [`PluginRegistry`] and the
//! fallback policy: when a plan is unusable, run only the always-first
//! plugin's executors (or nothing, letting the executor answer directly).

use async_trait::async_trait;
use conduit_core::capability::CapabilityRegistry;
use conduit_core::context::ContextChain;
use conduit_core::error::{Error, PlanValidationError};
use conduit_core::pipeline::PipelineStep;
use conduit_core::plugin::{ExecutorDescriptor, PluginRegistry};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

/// An ordered list of steps plus the planner's reasoning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub steps: Vec<PipelineStep>,
    pub explanation: String,
}

impl Plan {
    pub fn new(steps: Vec<PipelineStep>, explanation: impl Into<String>) -> Self {
        Self {
            steps,
            explanation: explanation.into(),
        }
    }
}

#[async_trait]
pub trait PipelinePlanner: Send + Sync {
    fn name(&self) -> &str;

    /// Propose a pipeline. Must not touch the chain.
    async fn plan(
        &self,
        chain: &ContextChain,
        executors: &[ExecutorDescriptor],
        capabilities: &CapabilityRegistry,
    ) -> Result<Plan, Error>;
}

/// Check every step resolves and the plan fits in `max_steps`.
pub fn validate_plan(
    plan: &Plan,
    registry: &PluginRegistry,
    max_steps: usize,
) -> Result<(), PlanValidationError> {
    if let Some(step) = plan.steps.iter().find(|s| !registry.contains(s)) {
        return Err(PlanValidationError::UnknownExecutor {
            plugin_id: step.plugin_id.clone(),
            executor: step.executor.clone(),
        });
    }
    if plan.steps.len() > max_steps {
        return Err(PlanValidationError::Malformed(format!(
            "plan has {} steps, limit is {max_steps}",
            plan.steps.len()
        )));
    }
    Ok(())
}

/// The pipeline used when planning fails.
pub fn fallback_plan(registry: &PluginRegistry) -> Plan {
    Plan::new(
        registry.first_run_steps(),
        "planner unavailable; running default pipeline",
    )
}

/// Plan, validate, and apply the always-run-first and fallback policies.
pub async fn plan_with_fallback(
    planner: &dyn PipelinePlanner,
    chain: &ContextChain,
    registry: &PluginRegistry,
    capabilities: &CapabilityRegistry,
    max_steps: usize,
) -> Plan {
    let descriptors = registry.descriptors();
    let planned = planner
        .plan(chain, &descriptors, capabilities)
        .await
        .and_then(|mut plan| {
            prepend_first_run(&mut plan, registry);
            validate_plan(&plan, registry, max_steps)?;
            Ok(plan)
        });

    match planned {
        Ok(plan) => {
            info!(
                planner = planner.name(),
                steps = plan.steps.len(),
                "Pipeline planned"
            );
            plan
        }
        Err(e) => {
            warn!(planner = planner.name(), error = %e, "Planning failed, using fallback pipeline");
            fallback_plan(registry)
        }
    }
}

/// Put the always-run-first steps the plan does not already name at its head.
fn prepend_first_run(plan: &mut Plan, registry: &PluginRegistry) {
    let first: Vec<PipelineStep> = registry
        .first_run_steps()
        .into_iter()
        .filter(|s| !plan.steps.contains(s))
        .collect();
    if !first.is_empty() {
        plan.steps.splice(0..0, first);
    }
}

/// Always proposes the same steps.
pub struct StaticPlanner {
    steps: Vec<PipelineStep>,
}

impl StaticPlanner {
    pub fn new(steps: Vec<PipelineStep>) -> Self {
        Self { steps }
    }

    /// Build from `plugin.executor` strings; malformed entries are an error.
    pub fn parse<S: AsRef<str>>(steps: &[S]) -> Result<Self, PlanValidationError> {
        let steps = steps
            .iter()
            .map(|s| {
                PipelineStep::parse(s.as_ref()).ok_or_else(|| {
                    PlanValidationError::Malformed(format!(
                        "'{}' is not of the form plugin.executor",
                        s.as_ref()
                    ))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(steps))
    }
}

#[async_trait]
impl PipelinePlanner for StaticPlanner {
    fn name(&self) -> &str {
        "static"
    }

    async fn plan(
        &self,
        _chain: &ContextChain,
        _executors: &[ExecutorDescriptor],
        _capabilities: &CapabilityRegistry,
    ) -> Result<Plan, Error> {
        Ok(Plan::new(self.steps.clone(), "static pipeline"))
    }
}

const PLANNER_SYSTEM_PROMPT: &str = "You plan how an assistant answers a request. \
Pick an ordered list of executors from the catalogue that together produce the answer. \
Use only executors listed in the catalogue. An empty list means answer directly. \
Reply with a single JSON object: {\"steps\": [\"plugin.executor\", ...], \"explanation\": \"...\"}";

/// Delegates planning to a text-generation capability.
pub struct LlmPlanner {
    capability: String,
    plan_validator: jsonschema::Validator,
}

/// Steps may be `"plugin.executor"` strings or `{pluginId, executor}` objects.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawStep {
    Shorthand(String),
    Full(PipelineStep),
}

#[derive(Deserialize)]
struct RawPlan {
    steps: Vec<RawStep>,
    #[serde(default)]
    explanation: String,
}

fn plan_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "steps": {
                "type": "array",
                "items": {
                    "oneOf": [
                        { "type": "string", "pattern": "^[^.]+\\..+$" },
                        {
                            "type": "object",
                            "properties": {
                                "pluginId": { "type": "string", "minLength": 1 },
                                "executor": { "type": "string", "minLength": 1 }
                            },
                            "required": ["pluginId", "executor"]
                        }
                    ]
                }
            },
            "explanation": { "type": "string" }
        },
        "required": ["steps"]
    })
}

impl LlmPlanner {
    pub fn new(capability: impl Into<String>) -> Result<Self, Error> {
        let plan_validator = jsonschema::validator_for(&plan_schema())
            .map_err(|e| Error::Internal(format!("plan schema does not compile: {e}")))?;
        Ok(Self {
            capability: capability.into(),
            plan_validator,
        })
    }

    pub fn capability(&self) -> &str {
        &self.capability
    }

    fn prompt(chain: &ContextChain, executors: &[ExecutorDescriptor]) -> String {
        let mut prompt = String::from("## Executors\n");
        for d in executors {
            prompt.push_str(&format!("- {}.{}: {}\n", d.plugin_id, d.name, d.description));
        }
        prompt.push_str("\n## Context\n");
        prompt.push_str(&chain.render());
        prompt.push_str("\n\nRespond with the JSON plan only.");
        prompt
    }

    /// Parse the model's reply into a plan.
    pub fn parse_plan(&self, text: &str) -> Result<Plan, PlanValidationError> {
        let json_text = extract_json_object(text)
            .ok_or_else(|| PlanValidationError::Malformed("no JSON object in reply".into()))?;
        let value: serde_json::Value = serde_json::from_str(json_text)
            .map_err(|e| PlanValidationError::Malformed(e.to_string()))?;

        if !self.plan_validator.is_valid(&value) {
            let details: Vec<String> = self
                .plan_validator
                .iter_errors(&value)
                .map(|e| e.to_string())
                .collect();
            return Err(PlanValidationError::Malformed(details.join("; ")));
        }

        let raw: RawPlan = serde_json::from_value(value)
            .map_err(|e| PlanValidationError::Malformed(e.to_string()))?;
        let steps = raw
            .steps
            .into_iter()
            .map(|s| match s {
                RawStep::Full(step) => Ok(step),
                RawStep::Shorthand(s) => PipelineStep::parse(&s).ok_or_else(|| {
                    PlanValidationError::Malformed(format!("'{s}' is not of the form plugin.executor"))
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Plan::new(steps, raw.explanation))
    }
}

/// The outermost `{ ... }` span, tolerating code fences and chatter around it.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

#[async_trait]
impl PipelinePlanner for LlmPlanner {
    fn name(&self) -> &str {
        "llm"
    }

    async fn plan(
        &self,
        chain: &ContextChain,
        executors: &[ExecutorDescriptor],
        capabilities: &CapabilityRegistry,
    ) -> Result<Plan, Error> {
        let input = json!({
            "prompt": Self::prompt(chain, executors),
            "system": PLANNER_SYSTEM_PROMPT,
            "temperature": 0.0,
            "json": true,
        });

        let output = capabilities
            .execute_capability(&self.capability, input, &serde_json::Value::Null)
            .await?;
        let text = output
            .get("text")
            .and_then(|t| t.as_str())
            .unwrap_or_default();
        debug!(capability = %self.capability, reply = %text, "Planner reply");

        Ok(self.parse_plan(text)?)
    }
}
