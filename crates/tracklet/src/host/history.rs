//! Session navigation history owned by the host.
//!
//! `push_state` and `replace_state` are routed through replaceable
//! [`EntryPoint`]s so that an observer can wrap them the way a page script
//! wraps `history.pushState`. Cursor moves (`back`, `forward`, `go`) and
//! fragment navigation publish `popstate` / `hashchange` on the bus.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde_json::Value;
use tracing::debug;

use super::bus::EventBus;
use super::{EventDetail, HostEvent};

/// Event published when the cursor moves to another entry.
pub const POPSTATE_EVENT: &str = "popstate";

/// Event published when the URL fragment changes.
pub const HASHCHANGE_EVENT: &str = "hashchange";

/// The two state-mutating navigation entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HistoryMethod {
    /// Append a new entry.
    PushState,
    /// Overwrite the current entry.
    ReplaceState,
}

impl HistoryMethod {
    /// Both methods.
    pub const ALL: [Self; 2] = [Self::PushState, Self::ReplaceState];

    /// The host-facing method name, also used as the synthetic event name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PushState => "pushState",
            Self::ReplaceState => "replaceState",
        }
    }
}

impl fmt::Display for HistoryMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arguments accepted by `push_state` / `replace_state`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryArgs {
    /// Opaque state object stored with the entry.
    pub state: Value,
    /// Entry title.
    pub title: String,
    /// New URL; `None` keeps the current one.
    pub url: Option<String>,
}

impl HistoryArgs {
    /// Arguments that navigate to `url` with a null state.
    #[must_use]
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }
}

/// One session history entry.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// State object.
    pub state: Value,
    /// Title.
    pub title: String,
    /// URL.
    pub url: String,
}

/// Entries plus the index of the current one.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryState {
    entries: Vec<HistoryEntry>,
    index: usize,
}

impl HistoryState {
    fn new(url: &str) -> Self {
        Self {
            entries: vec![HistoryEntry {
                state: Value::Null,
                title: String::new(),
                url: url.to_string(),
            }],
            index: 0,
        }
    }

    /// All entries, oldest first.
    #[must_use]
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Index of the current entry.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// The current entry.
    #[must_use]
    pub fn current(&self) -> &HistoryEntry {
        &self.entries[self.index]
    }

    fn push(&mut self, entry: HistoryEntry) -> usize {
        self.entries.truncate(self.index + 1);
        self.entries.push(entry);
        self.index = self.entries.len() - 1;
        self.entries.len()
    }

    fn replace(&mut self, entry: HistoryEntry) -> usize {
        self.entries[self.index] = entry;
        self.entries.len()
    }

    fn entry_from(&self, args: HistoryArgs) -> HistoryEntry {
        HistoryEntry {
            state: args.state,
            title: args.title,
            url: args.url.unwrap_or_else(|| self.current().url.clone()),
        }
    }
}

/// A navigation entry point. Receives the history it was called on and
/// returns the history length after the call.
pub type EntryPoint = Arc<dyn Fn(&History, HistoryArgs) -> usize + Send + Sync>;

struct EntryPoints {
    push_state: EntryPoint,
    replace_state: EntryPoint,
    intercepted: bool,
}

struct Inner {
    bus: EventBus,
    state: Mutex<HistoryState>,
    entry_points: RwLock<EntryPoints>,
}

/// Cloneable handle to a host's session history.
#[derive(Clone)]
pub struct History {
    inner: Arc<Inner>,
}

impl fmt::Debug for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("History")
            .field("state", &self.snapshot())
            .field("intercepted", &self.is_intercepted())
            .finish_non_exhaustive()
    }
}

impl History {
    /// Create a history with a single entry at `url`, publishing on `bus`.
    #[must_use]
    pub fn new(bus: EventBus, url: &str) -> Self {
        Self {
            inner: Arc::new(Inner {
                bus,
                state: Mutex::new(HistoryState::new(url)),
                entry_points: RwLock::new(EntryPoints {
                    push_state: Arc::new(Self::native_push_state),
                    replace_state: Arc::new(Self::native_replace_state),
                    intercepted: false,
                }),
            }),
        }
    }

    /// Append an entry through the current `pushState` entry point.
    pub fn push_state(&self, args: HistoryArgs) -> usize {
        let entry = self.entry_point(HistoryMethod::PushState);
        entry(self, args)
    }

    /// Overwrite the current entry through the current `replaceState` entry point.
    pub fn replace_state(&self, args: HistoryArgs) -> usize {
        let entry = self.entry_point(HistoryMethod::ReplaceState);
        entry(self, args)
    }

    /// Move one entry back. Returns `false` at the start of history.
    pub fn back(&self) -> bool {
        self.go(-1)
    }

    /// Move one entry forward. Returns `false` at the end of history.
    pub fn forward(&self) -> bool {
        self.go(1)
    }

    /// Move the cursor by `delta` entries and publish `popstate`.
    ///
    /// Out-of-range or zero moves change nothing and publish nothing.
    pub fn go(&self, delta: isize) -> bool {
        let state = {
            let mut history = self.lock_state();
            let Some(target) = history.index.checked_add_signed(delta) else {
                return false;
            };
            if delta == 0 || target >= history.entries.len() {
                return false;
            }
            history.index = target;
            history.current().state.clone()
        };

        debug!(delta, "history traversal");
        self.inner.bus.dispatch(&HostEvent {
            name: POPSTATE_EVENT.to_string(),
            target: None,
            detail: EventDetail::State(state),
        });
        true
    }

    /// Navigate to `#fragment` on the current URL.
    ///
    /// Like a browser fragment navigation this appends an entry and publishes
    /// `popstate` followed by `hashchange`. Navigating to the fragment already
    /// shown does nothing.
    pub fn set_hash(&self, fragment: &str) -> bool {
        let fragment = fragment.trim_start_matches('#');
        {
            let mut history = self.lock_state();
            let current = history.current().url.clone();
            let base = current.split('#').next().unwrap_or_default();
            let url = format!("{base}#{fragment}");
            if url == current {
                return false;
            }
            history.push(HistoryEntry {
                state: Value::Null,
                title: String::new(),
                url,
            });
        }

        debug!(fragment, "fragment navigation");
        self.inner.bus.dispatch(&HostEvent {
            name: POPSTATE_EVENT.to_string(),
            target: None,
            detail: EventDetail::State(Value::Null),
        });
        self.inner.bus.dispatch(&HostEvent::new(HASHCHANGE_EVENT));
        true
    }

    /// Copy of the current history state.
    #[must_use]
    pub fn snapshot(&self) -> HistoryState {
        self.lock_state().clone()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock_state().entries.len()
    }

    /// Always `false`; a history has at least one entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock_state().entries.is_empty()
    }

    /// URL of the current entry.
    #[must_use]
    pub fn current_url(&self) -> String {
        self.lock_state().current().url.clone()
    }

    /// The bus this history publishes on.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    /// The entry point currently installed for `method`.
    #[must_use]
    pub fn entry_point(&self, method: HistoryMethod) -> EntryPoint {
        let entry_points = self
            .inner
            .entry_points
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        match method {
            HistoryMethod::PushState => Arc::clone(&entry_points.push_state),
            HistoryMethod::ReplaceState => Arc::clone(&entry_points.replace_state),
        }
    }

    /// Replace the entry point for `method`.
    pub fn set_entry_point(&self, method: HistoryMethod, entry: EntryPoint) {
        let mut entry_points = self
            .inner
            .entry_points
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        match method {
            HistoryMethod::PushState => entry_points.push_state = entry,
            HistoryMethod::ReplaceState => entry_points.replace_state = entry,
        }
    }

    /// Whether the entry points have been wrapped by an interceptor.
    #[must_use]
    pub fn is_intercepted(&self) -> bool {
        self.inner
            .entry_points
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .intercepted
    }

    /// Wrap both entry points with `wrap` unless that already happened.
    ///
    /// Returns `false` if the history was already intercepted.
    pub fn intercept_with<F>(&self, wrap: F) -> bool
    where
        F: Fn(HistoryMethod, EntryPoint) -> EntryPoint,
    {
        let mut entry_points = self
            .inner
            .entry_points
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if entry_points.intercepted {
            return false;
        }
        entry_points.push_state = wrap(
            HistoryMethod::PushState,
            Arc::clone(&entry_points.push_state),
        );
        entry_points.replace_state = wrap(
            HistoryMethod::ReplaceState,
            Arc::clone(&entry_points.replace_state),
        );
        entry_points.intercepted = true;
        true
    }

    fn native_push_state(history: &History, args: HistoryArgs) -> usize {
        let mut state = history.lock_state();
        let entry = state.entry_from(args);
        state.push(entry)
    }

    fn native_replace_state(history: &History, args: HistoryArgs) -> usize {
        let mut state = history.lock_state();
        let entry = state.entry_from(args);
        state.replace(entry)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, HistoryState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    fn recorder(bus: &EventBus, events: &[&str]) -> Arc<StdMutex<Vec<String>>> {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        for event in events {
            let seen = Arc::clone(&seen);
            let _ = bus.subscribe(event, move |e: &HostEvent| {
                seen.lock().unwrap().push(e.name.clone());
            });
        }
        seen
    }

    #[test]
    fn test_new_history_has_one_entry() {
        let history = History::new(EventBus::new(), "/");
        assert_eq!(history.len(), 1);
        assert!(!history.is_empty());
        assert_eq!(history.current_url(), "/");
    }

    #[test]
    fn test_push_state_appends_and_returns_length() {
        let history = History::new(EventBus::new(), "/");
        assert_eq!(history.push_state(HistoryArgs::url("/a")), 2);
        assert_eq!(history.push_state(HistoryArgs::url("/b")), 3);
        assert_eq!(history.current_url(), "/b");
        assert_eq!(history.snapshot().index(), 2);
    }

    #[test]
    fn test_push_state_truncates_forward_entries() {
        let history = History::new(EventBus::new(), "/");
        history.push_state(HistoryArgs::url("/a"));
        history.push_state(HistoryArgs::url("/b"));
        assert!(history.back());

        assert_eq!(history.push_state(HistoryArgs::url("/c")), 3);
        let urls: Vec<_> = history
            .snapshot()
            .entries()
            .iter()
            .map(|e| e.url.clone())
            .collect();
        assert_eq!(urls, vec!["/", "/a", "/c"]);
    }

    #[test]
    fn test_replace_state_keeps_length() {
        let history = History::new(EventBus::new(), "/");
        let args = HistoryArgs {
            state: json!({"page": 1}),
            title: "home".to_string(),
            url: None,
        };
        assert_eq!(history.replace_state(args), 1);

        let snapshot = history.snapshot();
        assert_eq!(snapshot.current().url, "/");
        assert_eq!(snapshot.current().state, json!({"page": 1}));
        assert_eq!(snapshot.current().title, "home");
    }

    #[test]
    fn test_native_entry_points_publish_nothing() {
        let bus = EventBus::new();
        let seen = recorder(&bus, &["pushState", "replaceState", POPSTATE_EVENT]);
        let history = History::new(bus, "/");

        history.push_state(HistoryArgs::url("/a"));
        history.replace_state(HistoryArgs::url("/b"));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_traversal_publishes_popstate() {
        let bus = EventBus::new();
        let seen = recorder(&bus, &[POPSTATE_EVENT]);
        let history = History::new(bus, "/");
        history.push_state(HistoryArgs::url("/a"));

        assert!(history.back());
        assert!(!history.back());
        assert!(history.forward());
        assert!(!history.forward());
        assert!(!history.go(0));
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_set_hash_publishes_popstate_then_hashchange() {
        let bus = EventBus::new();
        let seen = recorder(&bus, &[POPSTATE_EVENT, HASHCHANGE_EVENT]);
        let history = History::new(bus, "/page");

        assert!(history.set_hash("#top"));
        assert_eq!(history.current_url(), "/page#top");
        assert!(!history.set_hash("top"));
        assert!(history.set_hash("bottom"));
        assert_eq!(history.current_url(), "/page#bottom");

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["popstate", "hashchange", "popstate", "hashchange"]
        );
    }

    #[test]
    fn test_intercept_with_only_once() {
        let history = History::new(EventBus::new(), "/");
        assert!(!history.is_intercepted());

        assert!(history.intercept_with(|_, original| original));
        assert!(history.is_intercepted());
        assert!(!history.intercept_with(|_, original| original));
    }

    #[test]
    fn test_set_entry_point_replaces_behavior() {
        let history = History::new(EventBus::new(), "/");
        history.set_entry_point(HistoryMethod::PushState, Arc::new(|_: &History, _: HistoryArgs| 42));

        assert_eq!(history.push_state(HistoryArgs::url("/a")), 42);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_history_method_names() {
        assert_eq!(HistoryMethod::PushState.as_str(), "pushState");
        assert_eq!(HistoryMethod::ReplaceState.to_string(), "replaceState");
    }
}
