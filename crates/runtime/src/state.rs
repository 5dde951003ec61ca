//! Per-event state owned by the runtime loop.

use conduit_core::context::{ContextChain, ContextItem};
use conduit_core::event::{EventId, PlatformContext};
use conduit_core::pipeline::PipelineState;

/// Everything the planner and executor touch while one event is processed.
///
/// Created when the loop dequeues an event and dropped after the response
/// is delivered. Only the loop's task ever holds it, so the chain and
/// pipeline need no locking.
#[derive(Debug)]
pub struct RuntimeState {
    pub event_id: String,
    pub chain: ContextChain,
    pub pipeline: PipelineState,
    pub platform: PlatformContext,
}

impl RuntimeState {
    pub fn new(event_id: &EventId, initial_item: ContextItem, platform: PlatformContext) -> Self {
        Self {
            event_id: event_id.to_string(),
            chain: ContextChain::with_initial(initial_item),
            pipeline: PipelineState::planning(event_id.to_string()),
            platform,
        }
    }
}
