//! Scripted host activity.
//!
//! A replay script is JSON lines, one [`ReplayStep`] per line, tagged by
//! `type`. Blank lines and lines starting with `#` are skipped.
//!
//! ```text
//! # land, browse, buy
//! {"type": "identify", "uuid": "u-42"}
//! {"type": "pushState", "url": "/products"}
//! {"type": "hash", "fragment": "reviews"}
//! {"type": "pointer", "event": "click", "attributes": {"target-key": "buy"}}
//! {"type": "rejection", "reason": {"status": 502}}
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::host::{Element, HistoryArgs};
use crate::tracker::Tracker;

/// One scripted action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ReplayStep {
    /// Call the `pushState` entry point.
    PushState {
        /// New URL; `None` keeps the current one.
        #[serde(default)]
        url: Option<String>,
        /// State object.
        #[serde(default)]
        state: Value,
        /// Title argument.
        #[serde(default)]
        title: String,
    },
    /// Call the `replaceState` entry point.
    ReplaceState {
        /// New URL; `None` keeps the current one.
        #[serde(default)]
        url: Option<String>,
        /// State object.
        #[serde(default)]
        state: Value,
        /// Title argument.
        #[serde(default)]
        title: String,
    },
    /// Traverse one entry back.
    Back,
    /// Traverse one entry forward.
    Forward,
    /// Traverse `delta` entries.
    Go {
        /// Signed offset.
        delta: isize,
    },
    /// Navigate to a fragment.
    Hash {
        /// Fragment, with or without `#`.
        fragment: String,
    },
    /// Fire a pointer event.
    Pointer {
        /// Event name, e.g. `click`.
        event: String,
        /// Attributes of the target element.
        #[serde(default)]
        attributes: HashMap<String, String>,
    },
    /// Raise an uncaught failure.
    Error {
        /// Description.
        message: String,
    },
    /// Reject asynchronous work.
    Rejection {
        /// Rejected value.
        reason: Value,
    },
    /// `set_user_id`.
    Identify {
        /// User identity.
        uuid: String,
    },
    /// `set_extra`.
    Extra {
        /// Passthrough context.
        extra: Map<String, Value>,
    },
    /// `send_tracker`.
    Custom {
        /// Caller data.
        data: Value,
    },
}

impl ReplayStep {
    /// The `type` tag of this step.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PushState { .. } => "pushState",
            Self::ReplaceState { .. } => "replaceState",
            Self::Back => "back",
            Self::Forward => "forward",
            Self::Go { .. } => "go",
            Self::Hash { .. } => "hash",
            Self::Pointer { .. } => "pointer",
            Self::Error { .. } => "error",
            Self::Rejection { .. } => "rejection",
            Self::Identify { .. } => "identify",
            Self::Extra { .. } => "extra",
            Self::Custom { .. } => "custom",
        }
    }
}

/// Parse a script into steps.
///
/// # Errors
///
/// Returns [`Error::Replay`] naming the first malformed line (1-based).
pub fn parse_script(text: &str) -> Result<Vec<ReplayStep>> {
    let mut steps = Vec::new();
    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let step = serde_json::from_str(line).map_err(|e| Error::replay(index + 1, e.to_string()))?;
        steps.push(step);
    }
    debug!(steps = steps.len(), "parsed replay script");
    Ok(steps)
}

/// Perform one step against the tracker's host.
pub fn apply(tracker: &Tracker, step: &ReplayStep) {
    trace!(step = step.kind(), "replaying");
    let host = tracker.host();
    match step {
        ReplayStep::PushState { url, state, title } => {
            host.history().push_state(HistoryArgs {
                state: state.clone(),
                title: title.clone(),
                url: url.clone(),
            });
        }
        ReplayStep::ReplaceState { url, state, title } => {
            host.history().replace_state(HistoryArgs {
                state: state.clone(),
                title: title.clone(),
                url: url.clone(),
            });
        }
        ReplayStep::Back => {
            host.history().back();
        }
        ReplayStep::Forward => {
            host.history().forward();
        }
        ReplayStep::Go { delta } => {
            host.history().go(*delta);
        }
        ReplayStep::Hash { fragment } => {
            host.history().set_hash(fragment);
        }
        ReplayStep::Pointer { event, attributes } => {
            host.pointer(event, Element::from(attributes.clone()));
        }
        ReplayStep::Error { message } => {
            host.raise_error(message.clone());
        }
        ReplayStep::Rejection { reason } => {
            host.reject(reason.clone());
        }
        ReplayStep::Identify { uuid } => tracker.set_user_id(uuid.clone()),
        ReplayStep::Extra { extra } => tracker.set_extra(extra.clone()),
        ReplayStep::Custom { data } => tracker.send_tracker(data),
    }
}

/// Parse `text` and apply every step in order. Returns the number of steps.
///
/// # Errors
///
/// Returns [`Error::Replay`] if the script is malformed; nothing is applied
/// in that case.
pub fn run_script(tracker: &Tracker, text: &str) -> Result<usize> {
    let steps = parse_script(text)?;
    for step in &steps {
        apply(tracker, step);
    }
    Ok(steps.len())
}

/// Read a script from `path` and run it.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be read, or [`Error::Replay`]
/// if it is malformed.
pub fn run_file(tracker: &Tracker, path: &Path) -> Result<usize> {
    let text = fs::read_to_string(path)?;
    debug!(path = %path.display(), "replaying script file");
    run_script(tracker, &text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PartialOptions;
    use crate::host::Host;
    use crate::transport::MemoryTransport;
    use serde_json::json;
    use std::sync::Arc;

    fn tracker() -> (Arc<MemoryTransport>, Tracker) {
        let transport = Arc::new(MemoryTransport::new());
        let tracker = Tracker::builder(PartialOptions {
            history_tracker: Some(true),
            hash_tracker: Some(true),
            dom_tracker: Some(true),
            js_error: Some(true),
            ..PartialOptions::new("https://collect.example.com/t")
        })
        .host(Host::new("/"))
        .transport(transport.clone())
        .build()
        .unwrap();
        (transport, tracker)
    }

    #[test]
    fn test_parse_skips_blank_and_comment_lines() {
        let script = "# header\n\n{\"type\": \"back\"}\n   \n{\"type\": \"go\", \"delta\": -2}\n";
        let steps = parse_script(script).unwrap();
        assert_eq!(steps, vec![ReplayStep::Back, ReplayStep::Go { delta: -2 }]);
    }

    #[test]
    fn test_parse_defaults_optional_fields() {
        let steps = parse_script(r#"{"type": "pushState"}"#).unwrap();
        assert_eq!(
            steps[0],
            ReplayStep::PushState {
                url: None,
                state: Value::Null,
                title: String::new(),
            }
        );
    }

    #[test]
    fn test_parse_reports_line_number() {
        let script = "{\"type\": \"back\"}\n# fine\n{\"type\": \"teleport\"}\n";
        let err = parse_script(script).unwrap_err();
        assert!(matches!(err, Error::Replay { line: 3, .. }));
    }

    #[test]
    fn test_parse_rejects_invalid_json() {
        let err = parse_script("{not json").unwrap_err();
        assert!(matches!(err, Error::Replay { line: 1, .. }));
    }

    #[test]
    fn test_step_kind_matches_tag() {
        let step = ReplayStep::Identify {
            uuid: "u".to_string(),
        };
        let value = serde_json::to_value(&step).unwrap();
        assert_eq!(value["type"], step.kind());
    }

    #[test]
    fn test_run_script_drives_every_channel() {
        let (transport, tracker) = tracker();
        let script = r##"
# session
{"type": "identify", "uuid": "u-42"}
{"type": "pushState", "url": "/products"}
{"type": "hash", "fragment": "#reviews"}
{"type": "pointer", "event": "click", "attributes": {"target-key": "buy"}}
{"type": "pointer", "event": "click", "attributes": {"id": "plain"}}
{"type": "error", "message": "X"}
{"type": "rejection", "reason": {"status": 502}}
{"type": "custom", "data": {"step": "done"}}
"##;

        let applied = run_script(&tracker, script).unwrap();
        assert_eq!(applied, 8);

        let payloads = transport.payloads();
        let pairs: Vec<(Value, Value)> = payloads
            .iter()
            .filter(|p| p.get("event").is_some())
            .map(|p| (p["event"].clone(), p["targetKey"].clone()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                (json!("pushState"), json!("history-pv")),
                (json!("popstate"), json!("history-pv")),
                (json!("hashchange"), json!("hash-pv")),
                (json!("click"), json!("buy")),
                (json!("error"), json!("message")),
                (json!("error"), json!("message")),
            ]
        );
        assert!(payloads.iter().all(|p| p["uuid"] == "u-42"));
        assert_eq!(payloads[5]["message"], json!({"status": 502}));
        assert_eq!(payloads.last().unwrap()["step"], "done");
    }

    #[test]
    fn test_run_script_applies_nothing_when_malformed() {
        let (transport, tracker) = tracker();
        let script = "{\"type\": \"pushState\", \"url\": \"/a\"}\n{\"type\": 1}\n";

        assert!(run_script(&tracker, script).is_err());
        assert!(transport.is_empty());
        assert_eq!(tracker.host().history().current_url(), "/");
    }

    #[test]
    fn test_run_file_missing_is_io_error() {
        let (_transport, tracker) = tracker();
        let err = run_file(&tracker, Path::new("/nonexistent/tracklet/session.jsonl")).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_run_file_reads_script() {
        let (transport, tracker) = tracker();
        let path = std::env::temp_dir().join(format!("tracklet-replay-{}.jsonl", std::process::id()));
        fs::write(&path, "{\"type\": \"error\", \"message\": \"from file\"}\n").unwrap();

        let applied = run_file(&tracker, &path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(applied, 1);
        assert_eq!(transport.payloads()[0]["message"], "from file");
    }

    #[test]
    fn test_apply_extra_and_traversal() {
        let (transport, tracker) = tracker();
        let mut extra = Map::new();
        extra.insert("plan".to_string(), json!("pro"));

        apply(&tracker, &ReplayStep::Extra { extra });
        apply(
            &tracker,
            &ReplayStep::ReplaceState {
                url: Some("/x".to_string()),
                state: json!({"k": 1}),
                title: String::new(),
            },
        );
        apply(&tracker, &ReplayStep::Forward);

        let payloads = transport.payloads();
        assert_eq!(payloads.len(), 1);
        assert_eq!(payloads[0]["event"], "replaceState");
        assert_eq!(payloads[0]["extra"]["plan"], "pro");
    }
}
