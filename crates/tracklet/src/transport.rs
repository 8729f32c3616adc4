//! Report delivery.
//!
//! A [`Transport`] takes a serialized payload and queues exactly one send.
//! It answers only whether the send was queued; delivery success or failure
//! is never observable by the caller.

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Url;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Content type of the beacon body.
pub const BEACON_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Default per-request timeout for [`BeaconTransport`].
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// A best-effort, non-blocking sender.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Queue one send of `body` to `url`. Returns whether it was queued.
    ///
    /// Must not block and must not panic.
    fn send_beacon(&self, url: &str, body: Vec<u8>) -> bool;

    /// Wait until previously queued sends have finished, whatever their
    /// outcome. The default does nothing.
    async fn flush(&self) {}
}

/// HTTP transport: one POST per report, spawned on the current tokio runtime.
#[derive(Debug)]
pub struct BeaconTransport {
    client: reqwest::Client,
    base_url: Option<Url>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl BeaconTransport {
    /// Create a transport with the default timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a transport with a custom per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::transport(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: None,
            in_flight: Mutex::new(Vec::new()),
        })
    }

    /// Create a transport that can reach `request_url`.
    ///
    /// A relative `request_url` (`/api/track`) is resolved against
    /// `base_url`, which must then be given.
    ///
    /// # Errors
    ///
    /// Returns a transport error if `base_url` is not a valid absolute URL,
    /// if `request_url` cannot be resolved, or if the HTTP client cannot be
    /// built.
    pub fn for_endpoint(request_url: &str, base_url: Option<&str>) -> Result<Self> {
        let mut transport = Self::new()?;
        if let Some(base) = base_url {
            let base = Url::parse(base)
                .map_err(|e| Error::transport(format!("invalid base URL {base:?}: {e}")))?;
            transport = transport.with_base_url(base);
        }
        if transport.resolve(request_url).is_none() {
            return Err(Error::transport(format!(
                "request URL {request_url:?} is relative and no base URL is set"
            )));
        }
        Ok(transport)
    }

    /// Resolve relative request URLs (`/api/track`) against `base`.
    #[must_use]
    pub fn with_base_url(mut self, base: Url) -> Self {
        self.base_url = Some(base);
        self
    }

    /// Resolve `url` to an absolute URL, if possible.
    #[must_use]
    pub fn resolve(&self, url: &str) -> Option<Url> {
        Url::parse(url)
            .ok()
            .or_else(|| self.base_url.as_ref().and_then(|base| base.join(url).ok()))
    }

    /// Number of sends that have been queued and not yet reaped.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.retain(|handle| !handle.is_finished());
        in_flight.len()
    }
}

#[async_trait]
impl Transport for BeaconTransport {
    fn send_beacon(&self, url: &str, body: Vec<u8>) -> bool {
        let Some(target) = self.resolve(url) else {
            warn!(url, "dropping report: request URL cannot be resolved");
            return false;
        };
        let Ok(runtime) = Handle::try_current() else {
            warn!(url, "dropping report: no async runtime");
            return false;
        };

        let request = self
            .client
            .post(target)
            .header(CONTENT_TYPE, BEACON_CONTENT_TYPE)
            .body(body);
        let handle = runtime.spawn(async move {
            match request.send().await {
                Ok(response) => debug!(status = %response.status(), "beacon delivered"),
                Err(e) => debug!(error = %e, "beacon failed"),
            }
        });

        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.retain(|handle| !handle.is_finished());
        in_flight.push(handle);
        true
    }

    async fn flush(&self) {
        let pending: Vec<JoinHandle<()>> = {
            let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
            in_flight.drain(..).collect()
        };
        debug!(pending = pending.len(), "flushing beacons");
        for handle in pending {
            let _ = handle.await;
        }
    }
}

/// A send recorded by [`MemoryTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Beacon {
    /// Destination.
    pub url: String,
    /// Serialized payload.
    pub body: Vec<u8>,
}

impl Beacon {
    /// Parse the body as JSON.
    #[must_use]
    pub fn payload(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

/// Transport that keeps every send in memory instead of delivering it.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    beacons: Mutex<Vec<Beacon>>,
}

impl MemoryTransport {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded sends, oldest first.
    #[must_use]
    pub fn beacons(&self) -> Vec<Beacon> {
        self.lock().clone()
    }

    /// All recorded payloads parsed as JSON, oldest first.
    #[must_use]
    pub fn payloads(&self) -> Vec<Value> {
        self.lock().iter().filter_map(Beacon::payload).collect()
    }

    /// Number of recorded sends.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing has been sent.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Forget recorded sends.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Beacon>> {
        self.beacons.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn send_beacon(&self, url: &str, body: Vec<u8>) -> bool {
        self.lock().push(Beacon {
            url: url.to_string(),
            body,
        });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_transport_records() {
        let transport = MemoryTransport::new();
        assert!(transport.is_empty());

        assert!(transport.send_beacon("/t", br#"{"a":1}"#.to_vec()));
        assert_eq!(transport.len(), 1);
        assert_eq!(transport.beacons()[0].url, "/t");
        assert_eq!(transport.payloads(), vec![json!({"a": 1})]);

        transport.clear();
        assert!(transport.is_empty());
    }

    #[test]
    fn test_beacon_payload_invalid_json() {
        let beacon = Beacon {
            url: "/t".to_string(),
            body: b"not json".to_vec(),
        };
        assert!(beacon.payload().is_none());
    }

    #[test]
    fn test_resolve_absolute_url() {
        let transport = BeaconTransport::new().unwrap();
        let url = transport.resolve("https://collect.example.com/t").unwrap();
        assert_eq!(url.as_str(), "https://collect.example.com/t");
    }

    #[test]
    fn test_resolve_relative_url_needs_base() {
        let transport = BeaconTransport::new().unwrap();
        assert!(transport.resolve("/api/track").is_none());

        let transport =
            transport.with_base_url(Url::parse("https://shop.example.com/cart").unwrap());
        let url = transport.resolve("/api/track").unwrap();
        assert_eq!(url.as_str(), "https://shop.example.com/api/track");
    }

    #[test]
    fn test_send_without_runtime_is_dropped() {
        crate::logging::init_test_logging();
        let transport = BeaconTransport::new().unwrap();
        assert!(!transport.send_beacon("http://127.0.0.1:9/t", b"{}".to_vec()));
        assert_eq!(transport.in_flight(), 0);
    }

    #[test]
    fn test_send_unresolvable_url_is_dropped() {
        crate::logging::init_test_logging();
        let transport = BeaconTransport::new().unwrap();
        assert!(!transport.send_beacon("relative/path", b"{}".to_vec()));
    }

    #[test]
    fn test_for_endpoint_accepts_absolute_url() {
        let transport = BeaconTransport::for_endpoint("https://collect.example.com/t", None).unwrap();
        assert!(transport.resolve("https://collect.example.com/t").is_some());
    }

    #[test]
    fn test_for_endpoint_resolves_relative_url_against_base() {
        let transport =
            BeaconTransport::for_endpoint("/api/track", Some("https://shop.example.com/")).unwrap();
        let url = transport.resolve("/api/track").unwrap();
        assert_eq!(url.as_str(), "https://shop.example.com/api/track");
    }

    #[test]
    fn test_for_endpoint_rejects_relative_url_without_base() {
        let err = BeaconTransport::for_endpoint("/api/track", None).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        assert!(err.to_string().contains("/api/track"));
    }

    #[test]
    fn test_for_endpoint_rejects_invalid_base() {
        let err = BeaconTransport::for_endpoint("/api/track", Some("not a url")).unwrap_err();
        assert!(err.to_string().contains("invalid base URL"));
    }

    #[tokio::test]
    async fn test_send_is_queued_and_failure_is_silent() {
        let transport = BeaconTransport::with_timeout(Duration::from_millis(500)).unwrap();

        // Nothing listens on the discard port; the failure must stay invisible
        assert!(transport.send_beacon("http://127.0.0.1:9/t", b"{}".to_vec()));
        transport.flush().await;
        assert_eq!(transport.in_flight(), 0);
    }
}
