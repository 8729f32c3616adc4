//! Failure capture.
//!
//! Both failure channels of the host are reported in one shape:
//! `{event: "error", targetKey: "message", message}`. For an uncaught
//! synchronous failure `message` is its textual description; for an
//! unhandled rejection it is the rejected value itself, with its JSON type
//! preserved.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace};

use crate::capture::TrackEvent;
use crate::host::{EventBus, EventDetail, HostEvent, Subscription, ERROR_EVENT, REJECTION_EVENT};
use crate::report::Reporter;

/// `event` of every failure report.
pub const FAILURE_EVENT: &str = "error";

/// `targetKey` of every failure report.
pub const FAILURE_TARGET_KEY: &str = "message";

/// Normalize a failure-channel event into a report.
#[must_use]
pub fn failure_event(event: &HostEvent) -> TrackEvent {
    let message = match &event.detail {
        EventDetail::Error { message } => Some(Value::String(message.clone())),
        EventDetail::Rejection { reason } => Some(reason.clone()),
        EventDetail::None | EventDetail::State(_) => None,
    };
    TrackEvent::new(FAILURE_EVENT, FAILURE_TARGET_KEY).with_message(message)
}

/// Subscribe to uncaught failures and unhandled rejections.
pub fn capture_failures(bus: &EventBus, reporter: &Arc<Reporter>) -> Vec<Subscription> {
    debug!("capturing failures");
    [ERROR_EVENT, REJECTION_EVENT]
        .into_iter()
        .map(|name| {
            let reporter = Arc::clone(reporter);
            bus.subscribe(name, move |event: &HostEvent| {
                trace!(channel = %event.name, "captured failure");
                reporter.report(&failure_event(event));
            })
        })
        .collect()
}
