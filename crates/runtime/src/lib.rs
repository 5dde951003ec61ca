//! The conduit runtime: events in, one response out.
//!
//! Each event goes through the same cycle:
//!
//! 1. **Enqueue**: a trigger calls `create_event` on a [`RuntimeHandle`]
//! 2. **Plan**: the [`PipelinePlanner`] picks executors for the context chain
//! 3. **Execute**: the [`PipelineExecutor`] runs each step, appending to the
//!    chain and applying pipeline mutations as they are requested
//! 4. **Respond**: the terminal item (or an error) goes to the trigger's
//!    response handler, exactly once
//!
//! Only one event is in flight at a time; the queue is the sole point of
//! synchronization between triggers and the loop.

pub mod executor;
pub mod planner;
pub mod queue;
pub mod runtime_loop;
pub mod state;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use executor::{ExecutorSettings, PipelineExecutor};
pub use planner::{LlmPlanner, PipelinePlanner, Plan, StaticPlanner, plan_with_fallback};
pub use queue::EventQueue;
pub use runtime_loop::{Runtime, RuntimeBuilder, RuntimeHandle};
pub use state::RuntimeState;
