//! Event capture.
//!
//! Turns bus events into [`TrackEvent`]s and hands them to the [`Reporter`].
//! Two flavours exist: unconditional capture of a set of event names
//! (navigation and hash changes), and the interaction filter, which only
//! reports pointer events whose target opts in via the `target-key`
//! attribute.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::host::{EventBus, HostEvent, Subscription, HASHCHANGE_EVENT, POPSTATE_EVENT};
use crate::report::Reporter;

/// Events reported when navigation capture is on.
pub const HISTORY_EVENTS: [&str; 3] = ["pushState", "replaceState", POPSTATE_EVENT];

/// `targetKey` of navigation reports.
pub const HISTORY_TARGET_KEY: &str = "history-pv";

/// Events reported when hash capture is on.
pub const HASH_EVENTS: [&str; 1] = [HASHCHANGE_EVENT];

/// `targetKey` of hash reports.
pub const HASH_TARGET_KEY: &str = "hash-pv";

/// Pointer events inspected by the interaction filter.
pub const MOUSE_EVENTS: [&str; 8] = [
    "click",
    "dblclick",
    "contextmenu",
    "mousedown",
    "mouseup",
    "mouseenter",
    "mouseout",
    "mouseover",
];

/// Marker attribute that opts an element into interaction capture.
pub const TARGET_KEY_ATTRIBUTE: &str = "target-key";

/// An independently switchable group of subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureCategory {
    /// `pushState`, `replaceState`, `popstate`.
    Navigation,
    /// `hashchange`.
    Hash,
    /// Marked pointer events.
    Interaction,
    /// Uncaught failures and rejections.
    Failure,
}

impl CaptureCategory {
    /// Every category, in installation order.
    pub const ALL: [Self; 4] = [Self::Navigation, Self::Hash, Self::Interaction, Self::Failure];
}

impl fmt::Display for CaptureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Navigation => write!(f, "navigation"),
            Self::Hash => write!(f, "hash"),
            Self::Interaction => write!(f, "interaction"),
            Self::Failure => write!(f, "failure"),
        }
    }
}

/// A captured event, consumed immediately by the reporter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackEvent {
    /// Name of the event that fired.
    pub event: String,
    /// Semantic label for what was captured.
    pub target_key: String,
    /// Extra data attached at subscription time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Failure description or rejected value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Value>,
}

impl TrackEvent {
    /// An event with only a name and a target key.
    #[must_use]
    pub fn new(event: impl Into<String>, target_key: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            target_key: target_key.into(),
            data: None,
            message: None,
        }
    }

    /// Attach data.
    #[must_use]
    pub fn with_data(mut self, data: Option<Value>) -> Self {
        self.data = data;
        self
    }

    /// Attach a message.
    #[must_use]
    pub fn with_message(mut self, message: Option<Value>) -> Self {
        self.message = message;
        self
    }
}

/// Report every dispatch of each name in `events` as
/// `{event: <name>, targetKey, data}`, whatever the event's detail.
pub fn capture_events(
    bus: &EventBus,
    reporter: &Arc<Reporter>,
    events: &[&str],
    target_key: &str,
    data: Option<Value>,
) -> Vec<Subscription> {
    debug!(?events, target_key, "capturing events");
    events
        .iter()
        .map(|&name| {
            let reporter = Arc::clone(reporter);
            let target_key = target_key.to_string();
            let data = data.clone();
            bus.subscribe(name, move |event: &HostEvent| {
                trace!(event = %event.name, %target_key, "captured");
                reporter.report(
                    &TrackEvent::new(event.name.clone(), target_key.clone())
                        .with_data(data.clone()),
                );
            })
        })
        .collect()
}

/// The value of the marker attribute on the event's target, if it opted in.
///
/// An empty attribute value counts as absent.
#[must_use]
pub fn target_key(event: &HostEvent) -> Option<&str> {
    event
        .target
        .as_ref()
        .and_then(|target| target.attribute(TARGET_KEY_ATTRIBUTE))
        .filter(|key| !key.is_empty())
}

/// Report pointer events on marked elements as
/// `{event: <name>, targetKey: <attribute value>}`; ignore the rest.
pub fn target_key_report(bus: &EventBus, reporter: &Arc<Reporter>) -> Vec<Subscription> {
    debug!("capturing marked interactions");
    MOUSE_EVENTS
        .iter()
        .map(|&name| {
            let reporter = Arc::clone(reporter);
            bus.subscribe(name, move |event: &HostEvent| match target_key(event) {
                Some(key) => {
                    trace!(event = %event.name, target_key = key, "captured interaction");
                    reporter.report(&TrackEvent::new(event.name.clone(), key));
                }
                None => trace!(event = %event.name, "unmarked target ignored"),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Options, PartialOptions};
    use crate::host::{Element, Host};
    use crate::transport::MemoryTransport;
    use serde_json::json;

    fn reporter() -> (Arc<MemoryTransport>, Arc<Reporter>) {
        let transport = Arc::new(MemoryTransport::new());
        let options = Options::merge(PartialOptions::new("/t")).unwrap();
        let reporter = Arc::new(Reporter::new(options, transport.clone()));
        (transport, reporter)
    }

    #[test]
    fn test_capture_category_display() {
        assert_eq!(CaptureCategory::Navigation.to_string(), "navigation");
        assert_eq!(CaptureCategory::Hash.to_string(), "hash");
        assert_eq!(CaptureCategory::Interaction.to_string(), "interaction");
        assert_eq!(CaptureCategory::Failure.to_string(), "failure");
    }

    #[test]
    fn test_track_event_serializes_wire_names() {
        let event = TrackEvent::new("click", "buy");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"event": "click", "targetKey": "buy"}));

        let event = TrackEvent::new("error", "message").with_message(Some(json!("X")));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["message"], "X");
        assert!(value.get("data").is_none());
    }

    #[test]
    fn test_capture_events_reports_each_name() {
        let (transport, reporter) = reporter();
        let host = Host::new("/");
        let subs = capture_events(host.bus(), &reporter, &HISTORY_EVENTS, HISTORY_TARGET_KEY, None);
        assert_eq!(subs.len(), 3);

        host.dispatch(&HostEvent::new("pushState"));
        host.dispatch(&HostEvent::new("popstate"));

        let payloads = transport.payloads();
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[0]["event"], "pushState");
        assert_eq!(payloads[0]["targetKey"], "history-pv");
        assert_eq!(payloads[1]["event"], "popstate");
        assert!(payloads[0].get("data").is_none());
    }

    #[test]
    fn test_capture_events_attaches_data() {
        let (transport, reporter) = reporter();
        let host = Host::new("/");
        let _subs = capture_events(
            host.bus(),
            &reporter,
            &HASH_EVENTS,
            HASH_TARGET_KEY,
            Some(json!({"section": "docs"})),
        );

        host.history().set_hash("intro");

        let payloads = transport.payloads();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0]["event"], "hashchange");
        assert_eq!(payloads[0]["targetKey"], "hash-pv");
        assert_eq!(payloads[0]["data"], json!({"section": "docs"}));
    }

    #[test]
    fn test_interaction_reports_marked_target() {
        let (transport, reporter) = reporter();
        let host = Host::new("/");
        let subs = target_key_report(host.bus(), &reporter);
        assert_eq!(subs.len(), MOUSE_EVENTS.len());

        host.pointer("click", Element::new().with_attribute(TARGET_KEY_ATTRIBUTE, "foo"));

        let payloads = transport.payloads();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0]["event"], "click");
        assert_eq!(payloads[0]["targetKey"], "foo");
    }

    #[test]
    fn test_interaction_ignores_unmarked_target() {
        let (transport, reporter) = reporter();
        let host = Host::new("/");
        let _subs = target_key_report(host.bus(), &reporter);

        host.pointer("click", Element::new().with_attribute("id", "foo"));
        host.pointer("mouseover", Element::new().with_attribute(TARGET_KEY_ATTRIBUTE, ""));
        host.dispatch(&HostEvent::new("dblclick"));

        assert!(transport.is_empty());
    }

    #[test]
    fn test_interaction_ignores_other_event_names() {
        let (transport, reporter) = reporter();
        let host = Host::new("/");
        let _subs = target_key_report(host.bus(), &reporter);

        host.pointer("keydown", Element::new().with_attribute(TARGET_KEY_ATTRIBUTE, "foo"));
        assert!(transport.is_empty());
    }
}
