//! Process-wide event bus.
//!
//! A registry of `event name -> handlers`. Dispatch is synchronous: every
//! handler bound to the event's name runs on the dispatching thread, in the
//! order it was subscribed. No lock is held while handlers run, so a handler
//! may subscribe, dispatch or navigate without deadlocking.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{trace, warn};

use super::HostEvent;

/// A handler invoked for every dispatch of the event it is bound to.
pub type Handler = Arc<dyn Fn(&HostEvent) + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<String, Vec<(u64, Handler)>>>,
}

/// Cloneable handle to a shared event registry.
#[derive(Clone, Default)]
pub struct EventBus {
    registry: Arc<Registry>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self
            .registry
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut events: Vec<&String> = handlers.keys().collect();
        events.sort();
        f.debug_struct("EventBus").field("events", &events).finish()
    }
}

impl EventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to every future dispatch of `event`.
    ///
    /// The binding stays active until [`Subscription::unsubscribe`] is
    /// called; dropping the returned value does not remove it.
    pub fn subscribe<F>(&self, event: &str, handler: F) -> Subscription
    where
        F: Fn(&HostEvent) + Send + Sync + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        self.registry
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        trace!(event, id, "subscribed");

        Subscription {
            bus: self.clone(),
            event: event.to_string(),
            id,
        }
    }

    /// Deliver `event` to its handlers and return how many ran.
    ///
    /// A panicking handler is logged and skipped; the remaining handlers
    /// still run.
    pub fn dispatch(&self, event: &HostEvent) -> usize {
        let handlers: Vec<Handler> = {
            let registry = self
                .registry
                .handlers
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match registry.get(&event.name) {
                Some(bound) => bound.iter().map(|(_, h)| Arc::clone(h)).collect(),
                None => return 0,
            }
        };

        trace!(event = %event.name, handlers = handlers.len(), "dispatching");
        for handler in &handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                warn!(event = %event.name, "event handler panicked");
            }
        }
        handlers.len()
    }

    /// Number of handlers bound to `event`.
    #[must_use]
    pub fn handler_count(&self, event: &str) -> usize {
        self.registry
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map_or(0, Vec::len)
    }

    fn remove(&self, event: &str, id: u64) -> bool {
        let mut handlers = self
            .registry
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(bound) = handlers.get_mut(event) else {
            return false;
        };
        let before = bound.len();
        bound.retain(|(bound_id, _)| *bound_id != id);
        let removed = bound.len() != before;
        if bound.is_empty() {
            handlers.remove(event);
        }
        removed
    }
}

/// A handler binding on an [`EventBus`].
#[derive(Debug)]
#[must_use = "dropping a Subscription keeps the handler bound forever"]
pub struct Subscription {
    bus: EventBus,
    event: String,
    id: u64,
}

impl Subscription {
    /// The event name this binding listens to.
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Remove the binding. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        let removed = self.bus.remove(&self.event, self.id);
        trace!(event = %self.event, id = self.id, removed, "unsubscribed");
        removed
    }
}
