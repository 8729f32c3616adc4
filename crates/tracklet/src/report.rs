//! Report assembly.
//!
//! A report payload is one flat JSON object built from, in order (later keys
//! win): the current [`Options`], the captured event's fields, and `time` in
//! epoch milliseconds.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{trace, warn};

use crate::config::Options;
use crate::error::Result;
use crate::transport::Transport;

/// Payload key holding the report timestamp.
pub const TIME_KEY: &str = "time";

/// Key used for caller data that is not a JSON object.
pub const DATA_KEY: &str = "data";

/// The unit actually transmitted.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportPayload(Map<String, Value>);

impl ReportPayload {
    /// Merge `options`, then `event`, then `time`.
    ///
    /// Object events contribute their fields; any other value is placed
    /// under [`DATA_KEY`].
    ///
    /// # Errors
    ///
    /// Returns an error if the options cannot be serialized.
    pub fn assemble(options: &Options, event: Value, time: i64) -> Result<Self> {
        let mut payload = match serde_json::to_value(options)? {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        match event {
            Value::Object(fields) => payload.extend(fields),
            Value::Null => {}
            other => {
                payload.insert(DATA_KEY.to_string(), other);
            }
        }
        payload.insert(TIME_KEY.to_string(), Value::from(time));

        Ok(Self(payload))
    }

    /// Look up a field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Serialize to the wire body.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.0)?)
    }
}

/// Current epoch time in milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Holds the live configuration and hands finished payloads to a transport.
///
/// Shared by every capture handler; setters and report assembly each take
/// the options lock once, so a report sees either the old or the new value.
#[derive(Debug)]
pub struct Reporter {
    options: RwLock<Options>,
    transport: Arc<dyn Transport>,
}

impl Reporter {
    /// Create a reporter.
    #[must_use]
    pub fn new(options: Options, transport: Arc<dyn Transport>) -> Self {
        Self {
            options: RwLock::new(options),
            transport,
        }
    }

    /// Snapshot of the current options.
    #[must_use]
    pub fn options(&self) -> Options {
        self.options
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Mutate the options in place.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&mut Options),
    {
        let mut options = self.options.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut options);
    }

    /// The transport reports are handed to.
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Build a payload from `event` and queue one send.
    ///
    /// Never fails past this point: an unserializable event is logged and
    /// dropped, and the transport outcome is ignored.
    pub fn report<T>(&self, event: &T)
    where
        T: Serialize + ?Sized,
    {
        let event = match serde_json::to_value(event) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "dropping report: event is not serializable");
                return;
            }
        };

        let options = self.options();
        let body = match ReportPayload::assemble(&options, event, now_millis())
            .and_then(|payload| payload.to_vec())
        {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "dropping report: payload assembly failed");
                return;
            }
        };

        let queued = self.transport.send_beacon(&options.request_url, body);
        trace!(queued, url = %options.request_url, "report handed to transport");
    }
}
