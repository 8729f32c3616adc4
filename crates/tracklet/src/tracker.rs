//! The tracker: configuration, installation and the public reporting API.
//!
//! Construction walks `Unconfigured -> Configured -> Installed` exactly once:
//!
//! 1. merge the user options over the defaults (fails without `request_url`)
//!    and intercept the host's navigation entry points, whatever the flags say;
//! 2. for each enabled capture category, register its subscriptions.
//!
//! Categories left off never gain subscriptions. There is no way back to an
//! earlier state; [`Tracker::dispose`] removes every subscription and
//! consumes the tracker.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tracklet::host::{Element, Host};
//! use tracklet::{MemoryTransport, PartialOptions, Tracker};
//!
//! let host = Host::new("/");
//! let transport = Arc::new(MemoryTransport::new());
//! let tracker = Tracker::builder(PartialOptions {
//!     dom_tracker: Some(true),
//!     ..PartialOptions::new("https://collect.example.com/t")
//! })
//! .host(host.clone())
//! .transport(transport.clone())
//! .build()?;
//!
//! tracker.set_user_id("u1");
//! host.pointer("click", Element::new().with_attribute("target-key", "buy"));
//! assert_eq!(transport.payloads()[0]["uuid"], "u1");
//! # Ok::<(), tracklet::Error>(())
//! ```

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::capture::{
    capture_events, target_key_report, CaptureCategory, HASH_EVENTS, HASH_TARGET_KEY,
    HISTORY_EVENTS, HISTORY_TARGET_KEY,
};
use crate::config::{Options, PartialOptions};
use crate::error::Result;
use crate::failure::capture_failures;
use crate::host::{Host, Subscription};
use crate::navigation::install_history_interceptors;
use crate::report::Reporter;
use crate::transport::{BeaconTransport, Transport};

/// Lifecycle of a tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallState {
    /// Nothing merged yet.
    Unconfigured,
    /// Options merged and navigation intercepted.
    Configured,
    /// Category subscriptions registered.
    Installed,
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconfigured => write!(f, "unconfigured"),
            Self::Configured => write!(f, "configured"),
            Self::Installed => write!(f, "installed"),
        }
    }
}

/// Builder for [`Tracker`].
#[derive(Debug)]
pub struct TrackerBuilder {
    options: PartialOptions,
    host: Option<Host>,
    transport: Option<Arc<dyn Transport>>,
}

impl TrackerBuilder {
    /// Observe `host` instead of the process-wide one.
    #[must_use]
    pub fn host(mut self, host: Host) -> Self {
        self.host = Some(host);
        self
    }

    /// Deliver reports through `transport` instead of a [`BeaconTransport`].
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Merge options, intercept navigation and install enabled categories.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::MissingRequestUrl`] if no endpoint was given,
    /// or a transport error if the default transport cannot be built.
    pub fn build(self) -> Result<Tracker> {
        let host = self.host.unwrap_or_else(Host::global);
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(BeaconTransport::new()?),
        };

        let mut tracker = Tracker::configure(host, self.options, transport)?;
        tracker.install();
        Ok(tracker)
    }
}

/// Behavioral telemetry tracker bound to one host.
pub struct Tracker {
    host: Host,
    reporter: Arc<Reporter>,
    bindings: Vec<(CaptureCategory, Subscription)>,
    state: InstallState,
}

impl fmt::Debug for Tracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracker")
            .field("state", &self.state)
            .field("categories", &self.installed_categories())
            .field("subscriptions", &self.bindings.len())
            .finish_non_exhaustive()
    }
}

impl Tracker {
    /// Build a tracker on the process-wide host with a [`BeaconTransport`].
    ///
    /// # Errors
    ///
    /// See [`TrackerBuilder::build`].
    pub fn new(options: PartialOptions) -> Result<Self> {
        Self::builder(options).build()
    }

    /// Start building a tracker.
    #[must_use]
    pub fn builder(options: PartialOptions) -> TrackerBuilder {
        TrackerBuilder {
            options,
            host: None,
            transport: None,
        }
    }

    /// `Unconfigured -> Configured`.
    fn configure(
        host: Host,
        partial: PartialOptions,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        debug!(state = %InstallState::Unconfigured, "configuring tracker");
        let options = Options::merge(partial)?;
        install_history_interceptors(host.history(), host.bus());

        let tracker = Self {
            host,
            reporter: Arc::new(Reporter::new(options, transport)),
            bindings: Vec::new(),
            state: InstallState::Configured,
        };
        debug!(state = %tracker.state, "tracker configured");
        Ok(tracker)
    }

    /// `Configured -> Installed`.
    fn install(&mut self) {
        if self.state != InstallState::Configured {
            return;
        }
        let reporter = Arc::clone(&self.reporter);
        let options = reporter.options();
        let bus = self.host.bus().clone();

        for category in options.enabled_categories() {
            let subscriptions = match category {
                CaptureCategory::Navigation => {
                    capture_events(&bus, &reporter, &HISTORY_EVENTS, HISTORY_TARGET_KEY, None)
                }
                CaptureCategory::Hash => {
                    capture_events(&bus, &reporter, &HASH_EVENTS, HASH_TARGET_KEY, None)
                }
                CaptureCategory::Interaction => target_key_report(&bus, &reporter),
                CaptureCategory::Failure => capture_failures(&bus, &reporter),
            };
            self.bindings
                .extend(subscriptions.into_iter().map(|sub| (category, sub)));
        }

        self.state = InstallState::Installed;
        info!(
            categories = ?self.installed_categories(),
            subscriptions = self.bindings.len(),
            "tracker installed"
        );
    }

    fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> InstallState {
        self.state
    }

    /// The host this tracker observes.
    #[must_use]
    pub fn host(&self) -> &Host {
        &self.host
    }

    /// Snapshot of the merged options, including setter changes.
    #[must_use]
    pub fn options(&self) -> Options {
        self.reporter().options()
    }

    /// Categories with at least one subscription, in installation order.
    #[must_use]
    pub fn installed_categories(&self) -> Vec<CaptureCategory> {
        let mut categories: Vec<CaptureCategory> = Vec::new();
        for (category, _) in &self.bindings {
            if !categories.contains(category) {
                categories.push(*category);
            }
        }
        categories
    }

    /// Event names this tracker is subscribed to.
    #[must_use]
    pub fn subscribed_events(&self) -> Vec<&str> {
        self.bindings.iter().map(|(_, sub)| sub.event()).collect()
    }

    /// Set the user identity carried by every later report.
    pub fn set_user_id(&self, uuid: impl Into<String>) {
        let uuid = uuid.into();
        debug!(%uuid, "user id set");
        self.reporter().update(|options| options.uuid = Some(uuid));
    }

    /// Remove the user identity from later reports.
    pub fn clear_user_id(&self) {
        self.reporter().update(|options| options.uuid = None);
    }

    /// Replace the passthrough context carried by every later report.
    pub fn set_extra(&self, extra: Map<String, Value>) {
        debug!(keys = extra.len(), "extra set");
        self.reporter().update(|options| options.extra = Some(extra));
    }

    /// Remove the passthrough context from later reports.
    pub fn clear_extra(&self) {
        self.reporter().update(|options| options.extra = None);
    }

    /// Report caller-supplied data, whatever categories are enabled.
    ///
    /// Object fields are merged into the payload; any other value lands
    /// under `data`.
    pub fn send_tracker<T>(&self, data: &T)
    where
        T: Serialize + ?Sized,
    {
        self.reporter().report(data);
    }

    /// Wait for queued sends to finish. Delivery outcome stays unobservable.
    pub async fn flush(&self) {
        self.reporter().transport().flush().await;
    }

    /// Remove every subscription this tracker registered.
    ///
    /// Navigation interception stays in place; it belongs to the host.
    pub fn dispose(self) {
        let count = self.bindings.len();
        for (_, subscription) in self.bindings {
            subscription.unsubscribe();
        }
        debug!(subscriptions = count, "tracker disposed");
    }
}
