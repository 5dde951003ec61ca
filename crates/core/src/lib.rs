//! # conduit core
//!
//! Domain types, traits, and error definitions for the conduit agent runtime.
//! This crate has **no framework dependencies** beyond serde, tokio's sync
//! primitives, and JSON Schema validation.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the runtime is a trait here: plugin executors,
//! capability handlers, response handlers, memory and monitor providers.
//! Implementations live in their respective crates. The runtime loop only
//! ever sees these traits, so:
//! - plugins and providers are swapped via configuration
//! - the loop is tested with scripted stubs
//! - all crates depend inward on core

pub mod capability;
pub mod context;
pub mod error;
pub mod event;
pub mod memory;
pub mod monitor;
pub mod pipeline;
pub mod plugin;

// Re-export key types at crate root for ergonomics
pub use capability::{CapabilityHandler, CapabilityRegistry, handler_fn};
pub use context::{ContextChain, ContextItem};
pub use error::{Error, Result};
pub use event::{AgentState, Event, EventId, EventResponse, OneshotResponder, PlatformContext, ResponseHandler};
pub use memory::{MemoryProvider, MessageQuery, StoredContext, StoredMessage};
pub use monitor::{MonitorBus, MonitorProvider, MonitorSnapshot};
pub use pipeline::{MutationRequest, PipelineMutation, PipelinePhase, PipelineState, PipelineStep};
pub use plugin::{ExecutionContext, Executor, ExecutorOutput, Plugin, PluginRegistry};
