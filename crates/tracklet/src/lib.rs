//! `tracklet` - Behavioral telemetry for an embedding application
//!
//! A [`Tracker`] observes a [`host::Host`] (its event bus and session history)
//! and reports navigation changes, fragment changes, marked pointer
//! interactions and uncaught failures to a collection endpoint. Every report
//! is a flat JSON object built from the current options, the captured event
//! and a timestamp, handed to a fire-and-forget [`Transport`].

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod capture;
pub mod cli;
pub mod config;
pub mod error;
pub mod failure;
pub mod host;
pub mod logging;
pub mod navigation;
pub mod replay;
pub mod report;
pub mod tracker;
pub mod transport;

pub use capture::{CaptureCategory, TrackEvent};
pub use config::{Options, PartialOptions, SDK_VERSION};
pub use error::{Error, Result};
pub use host::Host;
pub use logging::init_logging;
pub use report::{ReportPayload, Reporter};
pub use tracker::{InstallState, Tracker, TrackerBuilder};
pub use transport::{BeaconTransport, MemoryTransport, Transport};
