//! Pipeline steps, live pipeline state, and typed mutation instructions.
//!
//! Executors may ask for the remaining pipeline to be changed mid-run. The
//! request arrives as loosely-typed JSON in the executor's output and is
//! decoded into [`MutationRequest`]; [`PipelineState::apply`] validates it
//! against the live pipeline before touching anything.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MutationError;

/// A reference to one executor of one plugin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStep {
    pub plugin_id: String,
    pub executor: String,
}

impl PipelineStep {
    pub fn new(plugin_id: impl Into<String>, executor: impl Into<String>) -> Self {
        Self {
            plugin_id: plugin_id.into(),
            executor: executor.into(),
        }
    }

    /// Parse the `plugin.executor` shorthand used in configuration.
    pub fn parse(s: &str) -> Option<Self> {
        let (plugin_id, executor) = s.split_once('.')?;
        if plugin_id.is_empty() || executor.is_empty() {
            return None;
        }
        Some(Self::new(plugin_id, executor))
    }
}

impl std::fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.plugin_id, self.executor)
    }
}

/// One edit to the pending part of a pipeline.
///
/// Positions are absolute indices into the live pipeline and may only point
/// at steps that have not run yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum PipelineMutation {
    Insert { at: usize, step: PipelineStep },
    Remove { step: PipelineStep },
    Reorder { from: usize, to: usize },
}

/// A batch of mutations plus the executor's reason for them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRequest {
    pub mutations: Vec<PipelineMutation>,
    #[serde(default)]
    pub explanation: String,
}

impl MutationRequest {
    /// Key under which executors place a mutation request in their output data.
    pub const DATA_KEY: &'static str = "pipeline_mutation";

    pub fn new(mutations: Vec<PipelineMutation>, explanation: impl Into<String>) -> Self {
        Self {
            mutations,
            explanation: explanation.into(),
        }
    }

    /// Decode a loosely-typed JSON instruction.
    pub fn from_value(value: &serde_json::Value) -> Result<Self, MutationError> {
        serde_json::from_value(value.clone()).map_err(|e| MutationError::Malformed(e.to_string()))
    }
}

/// An applied mutation, kept in [`PipelineState::modified_steps`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationRecord {
    pub mutation: PipelineMutation,
    pub explanation: String,
    /// The step whose result asked for the change
    pub requested_by: PipelineStep,
    /// Index of the requesting step at the time of the change
    pub at_step: usize,
    pub timestamp: DateTime<Utc>,
}

/// Where an event is in its lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    /// No event is being processed
    #[default]
    Idle,
    Planning,
    Executing,
    Mutating,
    Completed,
    Aborted,
}

impl PipelinePhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, PipelinePhase::Completed | PipelinePhase::Aborted)
    }
}

/// Observable snapshot of planning and execution progress for one event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    pub pipeline: Vec<PipelineStep>,
    pub current_step: usize,
    pub modified_steps: Vec<MutationRecord>,
    pub explanation: String,
    pub phase: PipelinePhase,
}

impl PipelineState {
    /// Fresh state for an event entering the planner.
    pub fn planning(event_id: impl Into<String>) -> Self {
        Self {
            event_id: Some(event_id.into()),
            phase: PipelinePhase::Planning,
            ..Self::default()
        }
    }

    pub fn current(&self) -> Option<&PipelineStep> {
        self.pipeline.get(self.current_step)
    }

    /// Steps that have not started yet.
    pub fn pending(&self) -> &[PipelineStep] {
        let start = (self.current_step + 1).min(self.pipeline.len());
        &self.pipeline[start..]
    }

    /// Validate and apply a mutation request to the pending part of the pipeline.
    ///
    /// The request is applied atomically: if any mutation in it is invalid,
    /// the pipeline is left untouched. `is_registered` decides whether an
    /// inserted step resolves to a real executor.
    pub fn apply(
        &mut self,
        request: &MutationRequest,
        requested_by: &PipelineStep,
        max_steps: usize,
        is_registered: impl Fn(&PipelineStep) -> bool,
    ) -> Result<(), MutationError> {
        if request.mutations.is_empty() {
            return Err(MutationError::Malformed("no mutations given".into()));
        }

        let mut pipeline = self.pipeline.clone();
        let first_pending = self.current_step + 1;

        for mutation in &request.mutations {
            match mutation {
                PipelineMutation::Insert { at, step } => {
                    if *at < first_pending || *at > pipeline.len() {
                        return Err(MutationError::OutOfRange {
                            position: *at,
                            start: first_pending,
                            end: pipeline.len(),
                        });
                    }
                    if !is_registered(step) {
                        return Err(MutationError::UnknownStep(step.to_string()));
                    }
                    if pipeline.len() + 1 > max_steps {
                        return Err(MutationError::TooManySteps { max: max_steps });
                    }
                    pipeline.insert(*at, step.clone());
                }
                PipelineMutation::Remove { step } => {
                    let index = pipeline
                        .iter()
                        .enumerate()
                        .skip(first_pending)
                        .find(|(_, s)| *s == step)
                        .map(|(i, _)| i)
                        .ok_or_else(|| MutationError::StepNotPending(step.to_string()))?;
                    pipeline.remove(index);
                }
                PipelineMutation::Reorder { from, to } => {
                    let last = pipeline.len().saturating_sub(1);
                    for position in [*from, *to] {
                        if position < first_pending || position >= pipeline.len() {
                            return Err(MutationError::OutOfRange {
                                position,
                                start: first_pending,
                                end: last,
                            });
                        }
                    }
                    let step = pipeline.remove(*from);
                    pipeline.insert(*to, step);
                }
            }
        }

        self.pipeline = pipeline;
        let now = Utc::now();
        self.modified_steps
            .extend(request.mutations.iter().map(|m| MutationRecord {
                mutation: m.clone(),
                explanation: request.explanation.clone(),
                requested_by: requested_by.clone(),
                at_step: self.current_step,
                timestamp: now,
            }));
        Ok(())
    }
}
