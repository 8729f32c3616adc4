//! In-process model of the embedding application.
//!
//! A [`Host`] bundles the process-wide [`EventBus`] with the session
//! [`History`] and exposes the channels the tracker listens on:
//!
//! - navigation: `pushState` / `replaceState` entry points, `popstate`, `hashchange`
//! - interaction: pointer events carrying a target [`Element`]
//! - failures: `error` (uncaught synchronous failure) and
//!   `unhandledrejection` (failed asynchronous work)
//!
//! # Example
//!
//! ```
//! use tracklet::host::{Element, Host, HistoryArgs};
//!
//! let host = Host::new("/");
//! host.history().push_state(HistoryArgs::url("/checkout"));
//! host.pointer("click", Element::new().with_attribute("target-key", "buy"));
//! host.raise_error("TypeError: x is undefined");
//! ```

mod bus;
mod history;

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic;
use std::sync::OnceLock;

use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub use bus::{EventBus, Handler, Subscription};
pub use history::{
    EntryPoint, History, HistoryArgs, HistoryEntry, HistoryMethod, HistoryState,
    HASHCHANGE_EVENT, POPSTATE_EVENT,
};

/// Event carrying an uncaught synchronous failure.
pub const ERROR_EVENT: &str = "error";

/// Event carrying a failed asynchronous operation.
pub const REJECTION_EVENT: &str = "unhandledrejection";

/// URL of the single entry in the global host's history.
const GLOBAL_LOCATION: &str = "/";

/// A node that can be the target of an interaction event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    attributes: HashMap<String, String>,
}

impl Element {
    /// An element without attributes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style attribute setter.
    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Read an attribute.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

impl From<HashMap<String, String>> for Element {
    fn from(attributes: HashMap<String, String>) -> Self {
        Self { attributes }
    }
}

/// Event-specific payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum EventDetail {
    /// Nothing beyond the name.
    #[default]
    None,
    /// History state of the entry navigated to.
    State(Value),
    /// An uncaught synchronous failure.
    Error {
        /// Textual description.
        message: String,
    },
    /// A failed asynchronous operation.
    Rejection {
        /// The rejected value.
        reason: Value,
    },
}

/// An event delivered on the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct HostEvent {
    /// Event name; handlers are bound by name.
    pub name: String,
    /// Element the event was fired on, if any.
    pub target: Option<Element>,
    /// Event-specific payload.
    pub detail: EventDetail,
}

impl HostEvent {
    /// An event with no target and no detail.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: None,
            detail: EventDetail::None,
        }
    }

    /// Set the target element.
    #[must_use]
    pub fn with_target(mut self, target: Element) -> Self {
        self.target = Some(target);
        self
    }

    /// Set the detail.
    #[must_use]
    pub fn with_detail(mut self, detail: EventDetail) -> Self {
        self.detail = detail;
        self
    }
}

/// The embedding application: an event bus plus session history.
#[derive(Debug, Clone)]
pub struct Host {
    bus: EventBus,
    history: History,
}

static GLOBAL: OnceLock<Host> = OnceLock::new();

impl Host {
    /// An isolated host whose history starts at `location`.
    #[must_use]
    pub fn new(location: &str) -> Self {
        let bus = EventBus::new();
        let history = History::new(bus.clone(), location);
        Self { bus, history }
    }

    /// The process-wide host, created on first use.
    #[must_use]
    pub fn global() -> Self {
        GLOBAL.get_or_init(|| Self::new(GLOBAL_LOCATION)).clone()
    }

    /// The event bus.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// The session history.
    #[must_use]
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Dispatch an arbitrary event. Returns the number of handlers that ran.
    pub fn dispatch(&self, event: &HostEvent) -> usize {
        self.bus.dispatch(event)
    }

    /// Fire an interaction event `name` on `target`.
    pub fn pointer(&self, name: &str, target: Element) -> usize {
        self.bus.dispatch(&HostEvent::new(name).with_target(target))
    }

    /// Publish an uncaught synchronous failure.
    pub fn raise_error(&self, message: impl Into<String>) -> usize {
        self.bus.dispatch(
            &HostEvent::new(ERROR_EVENT).with_detail(EventDetail::Error {
                message: message.into(),
            }),
        )
    }

    /// Publish a failed asynchronous operation with its rejected value.
    pub fn reject(&self, reason: Value) -> usize {
        self.bus
            .dispatch(&HostEvent::new(REJECTION_EVENT).with_detail(EventDetail::Rejection { reason }))
    }

    /// Publish every panic in the process as an uncaught synchronous failure.
    ///
    /// The previously installed hook still runs first. Handlers run inside
    /// the panic hook, where a further panic aborts the process.
    pub fn route_panics(&self) {
        let host = self.clone();
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            previous(info);
            host.raise_error(panic_message(info.payload()));
        }));
        debug!("panic routing installed");
    }

    /// Run `task` on the current tokio runtime and publish its error, if any,
    /// as an unhandled rejection carrying the serialized error value.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn observe<F, T, E>(&self, task: F) -> JoinHandle<Option<T>>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Serialize + Send + 'static,
    {
        let host = self.clone();
        tokio::spawn(async move {
            match task.await {
                Ok(value) => Some(value),
                Err(err) => {
                    let reason = serde_json::to_value(&err).unwrap_or_else(|e| {
                        warn!(error = %e, "rejected value is not serializable");
                        Value::Null
                    });
                    host.reject(reason);
                    None
                }
            }
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn record(host: &Host, event: &str) -> Arc<Mutex<Vec<HostEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _ = host.bus().subscribe(event, move |e: &HostEvent| {
            sink.lock().unwrap().push(e.clone());
        });
        seen
    }

    #[test]
    fn test_element_attributes() {
        let element = Element::new().with_attribute("target-key", "buy");
        assert_eq!(element.attribute("target-key"), Some("buy"));
        assert_eq!(element.attribute("id"), None);
    }

    #[test]
    fn test_element_from_map() {
        let mut attributes = HashMap::new();
        attributes.insert("target-key".to_string(), "nav".to_string());
        let element = Element::from(attributes);
        assert_eq!(element.attribute("target-key"), Some("nav"));
    }

    #[test]
    fn test_pointer_carries_target() {
        let host = Host::new("/");
        let seen = record(&host, "click");

        host.pointer("click", Element::new().with_attribute("target-key", "x"));
        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].target.as_ref().and_then(|t| t.attribute("target-key")),
            Some("x")
        );
    }

    #[test]
    fn test_raise_error_detail() {
        let host = Host::new("/");
        let seen = record(&host, ERROR_EVENT);

        host.raise_error("boom");
        assert_eq!(
            seen.lock().unwrap()[0].detail,
            EventDetail::Error {
                message: "boom".to_string()
            }
        );
    }

    #[test]
    fn test_reject_detail() {
        let host = Host::new("/");
        let seen = record(&host, REJECTION_EVENT);

        host.reject(json!({"code": 503}));
        assert_eq!(
            seen.lock().unwrap()[0].detail,
            EventDetail::Rejection {
                reason: json!({"code": 503})
            }
        );
    }

    #[test]
    fn test_hosts_are_isolated() {
        let a = Host::new("/");
        let b = Host::new("/");
        let seen = record(&a, "click");

        b.pointer("click", Element::new());
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_global_host_is_shared() {
        let a = Host::global();
        let b = Host::global();
        let seen = record(&a, "tracklet-test-global");

        b.dispatch(&HostEvent::new("tracklet-test-global"));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_observe_publishes_error_as_rejection() {
        let host = Host::new("/");
        let seen = record(&host, REJECTION_EVENT);

        let result = host
            .observe(async { Err::<(), _>(json!({"status": "timeout"})) })
            .await
            .unwrap();
        assert!(result.is_none());
        assert_eq!(
            seen.lock().unwrap()[0].detail,
            EventDetail::Rejection {
                reason: json!({"status": "timeout"})
            }
        );
    }

    #[tokio::test]
    async fn test_observe_passes_success_through() {
        let host = Host::new("/");
        let seen = record(&host, REJECTION_EVENT);

        let result = host.observe(async { Ok::<_, String>(7) }).await.unwrap();
        assert_eq!(result, Some(7));
        assert!(seen.lock().unwrap().is_empty());
    }
}
