//! Navigation interception.
//!
//! Hosts change navigation state through `pushState` / `replaceState` without
//! publishing anything. [`create_history_event`] decorates such an entry
//! point so that every call also publishes a bus event named after it, which
//! the capture engine can then subscribe to.

use std::sync::Arc;

use tracing::debug;

use crate::host::{EntryPoint, EventBus, History, HistoryArgs, HistoryMethod, HostEvent};

/// Wrap `original` so that each call:
///
/// 1. invokes `original` with the same history and arguments,
/// 2. publishes a bus event named after `method`,
/// 3. returns exactly what `original` returned.
#[must_use]
pub fn create_history_event(method: HistoryMethod, original: EntryPoint, bus: EventBus) -> EntryPoint {
    Arc::new(move |history: &History, args: HistoryArgs| {
        let result = original(history, args);
        bus.dispatch(&HostEvent::new(method.as_str()));
        result
    })
}

/// Intercept both entry points of `history`, publishing on `bus`.
///
/// Returns `false` if `history` was already intercepted; wrapping twice would
/// publish every call twice.
pub fn install_history_interceptors(history: &History, bus: &EventBus) -> bool {
    let installed =
        history.intercept_with(|method, original| create_history_event(method, original, bus.clone()));
    if installed {
        debug!("history entry points intercepted");
    } else {
        debug!("history entry points already intercepted");
    }
    installed
}
