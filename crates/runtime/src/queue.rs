//! FIFO event queue shared between triggers (producers) and the runtime loop.
//!
//! Enqueue is the only operation that needs mutual exclusion. The queue's
//! lock also guards the coarse [`AgentState`], so `queue_length` and
//! `is_running` always change together and are never observed torn.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use conduit_core::error::EnqueueError;
use conduit_core::event::{AgentState, Event};
use conduit_core::monitor::{MonitorBus, MonitorSnapshot};
use tokio::sync::{Notify, watch};
use tracing::debug;

struct Inner {
    events: VecDeque<Event>,
    running: bool,
    closed: bool,
    processed: u64,
}

pub struct EventQueue {
    inner: Mutex<Inner>,
    notify: Notify,
    /// 0 = unbounded
    capacity: usize,
    state: watch::Sender<AgentState>,
    monitor: Arc<MonitorBus>,
}

impl EventQueue {
    pub fn new(capacity: usize, monitor: Arc<MonitorBus>) -> Self {
        let (state, _) = watch::channel(AgentState::default());
        Self {
            inner: Mutex::new(Inner {
                events: VecDeque::new(),
                running: false,
                closed: false,
                processed: 0,
            }),
            notify: Notify::new(),
            capacity,
            state,
            monitor,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Critical sections never panic midway, so a poisoned lock is still consistent
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Validate and append an event. Safe to call from many tasks at once.
    pub fn push(&self, event: Event) -> Result<(), EnqueueError> {
        event.initial_item.validate()?;

        {
            let mut inner = self.lock();
            if inner.closed {
                return Err(EnqueueError::Closed);
            }
            if self.capacity > 0 && inner.events.len() >= self.capacity {
                return Err(EnqueueError::QueueFull {
                    capacity: self.capacity,
                });
            }
            debug!(event_id = %event.id, platform = %event.platform.platform, "Event enqueued");
            inner.events.push_back(event);
            self.publish_state(&inner);
        }

        self.notify.notify_one();
        Ok(())
    }

    /// Wait for the next event and mark the runtime busy with it.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<Event> {
        loop {
            {
                let mut inner = self.lock();
                if let Some(event) = inner.events.pop_front() {
                    inner.running = true;
                    self.publish_state(&inner);
                    return Some(event);
                }
                if inner.closed {
                    return None;
                }
            }
            self.notify.notified().await;
        }
    }

    /// Mark the current event finished.
    pub fn finish(&self) {
        let mut inner = self.lock();
        inner.running = false;
        inner.processed += 1;
        self.publish_state(&inner);
    }

    /// Refuse further events; already queued ones are still handed out.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn state(&self) -> AgentState {
        self.state.borrow().clone()
    }

    pub fn watch_state(&self) -> watch::Receiver<AgentState> {
        self.state.subscribe()
    }

    fn publish_state(&self, inner: &Inner) {
        let state = AgentState {
            queue_length: inner.events.len(),
            is_running: inner.running,
            last_update: Utc::now(),
            events_processed: inner.processed,
        };
        self.state.send_replace(state.clone());
        self.monitor.publish(MonitorSnapshot::AgentState(state));
    }
}
