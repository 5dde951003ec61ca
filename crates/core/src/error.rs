//! Error types for the conduit domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the top-level [`Error`]
//! wraps them so the per-event boundary in the runtime loop can catch
//! everything in one place.

use thiserror::Error;

/// The top-level error type for all conduit operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Enqueue error: {0}")]
    Enqueue(#[from] EnqueueError),

    #[error("Plan validation error: {0}")]
    Plan(#[from] PlanValidationError),

    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    #[error("Pipeline mutation error: {0}")]
    Mutation(#[from] MutationError),

    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("Response delivery error: {0}")]
    ResponseDelivery(#[from] ResponseDeliveryError),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Monitor error: {0}")]
    Monitor(#[from] MonitorError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Short machine-readable kind, used in error payloads sent to callers.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Enqueue(_) => "enqueue_error",
            Error::Plan(_) => "plan_validation_error",
            Error::Executor(ExecutorError::NotFound { .. }) => "executor_not_found",
            Error::Executor(_) => "executor_error",
            Error::Capability(CapabilityError::NotFound(_)) => "capability_not_found",
            Error::Capability(CapabilityError::Validation { .. }) => "capability_validation_error",
            Error::Capability(_) => "capability_error",
            Error::Mutation(_) => "mutation_error",
            Error::Plugin(_) => "plugin_error",
            Error::ResponseDelivery(_) => "response_delivery_error",
            Error::Memory(_) => "memory_error",
            Error::Monitor(_) => "monitor_error",
            Error::Config { .. } => "config_error",
            Error::Serialization(_) => "serialization_error",
            Error::Internal(_) => "internal_error",
        }
    }
}

// --- Bounded context errors ---

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnqueueError {
    #[error("Malformed context item: {0}")]
    MalformedItem(String),

    #[error("Event queue is full ({capacity} events waiting)")]
    QueueFull { capacity: usize },

    #[error("Event queue is closed")]
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanValidationError {
    #[error("Planner named an unregistered executor: {plugin_id}.{executor}")]
    UnknownExecutor { plugin_id: String, executor: String },

    #[error("Planner response is malformed: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Error)]
pub enum ExecutorError {
    #[error("Executor not found: {plugin_id}.{executor}")]
    NotFound { plugin_id: String, executor: String },

    #[error("Executor {step} failed: {message}")]
    Failed { step: String, message: String },

    #[error("Executor {step} timed out after {timeout_ms}ms")]
    Timeout { step: String, timeout_ms: u64 },

    #[error("Executor {step} panicked: {message}")]
    Panicked { step: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaStage {
    Input,
    Output,
}

impl std::fmt::Display for SchemaStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemaStage::Input => write!(f, "input"),
            SchemaStage::Output => write!(f, "output"),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum CapabilityError {
    #[error("Capability not found: {0}")]
    NotFound(String),

    #[error("Capability already registered: {0}")]
    Duplicate(String),

    #[error("Capability {capability} {stage} failed schema validation: {details}")]
    Validation {
        capability: String,
        stage: SchemaStage,
        details: String,
    },

    #[error("Capability {capability} has an invalid {stage} schema: {reason}")]
    InvalidSchema {
        capability: String,
        stage: SchemaStage,
        reason: String,
    },

    #[error("Capability {capability} failed: {reason}")]
    Execution { capability: String, reason: String },

    #[error("Capability {capability} timed out after {timeout_ms}ms")]
    Timeout { capability: String, timeout_ms: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
    #[error("Position {position} is out of range (pending window {start}..={end})")]
    OutOfRange {
        position: usize,
        start: usize,
        end: usize,
    },

    #[error("Step {0} is not pending in the pipeline")]
    StepNotPending(String),

    #[error("Inserted step {0} is not registered")]
    UnknownStep(String),

    #[error("Pipeline would exceed {max} steps")]
    TooManySteps { max: usize },

    #[error("Malformed mutation instruction: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    #[error("Plugin already registered: {0}")]
    DuplicatePlugin(String),

    #[error("Plugin {plugin_id} declares executor {executor} twice")]
    DuplicateExecutor { plugin_id: String, executor: String },

    #[error("Plugin {plugin_id} is invalid: {reason}")]
    Invalid { plugin_id: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResponseDeliveryError {
    #[error("Response receiver for platform {0} is gone")]
    ReceiverDropped(String),

    #[error("Response already delivered on platform {0}")]
    AlreadyDelivered(String),

    #[error("Platform {platform} rejected the response: {reason}")]
    Rejected { platform: String, reason: String },
}

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),
}

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Monitor {monitor} unavailable: {reason}")]
    Unavailable { monitor: String, reason: String },
}
