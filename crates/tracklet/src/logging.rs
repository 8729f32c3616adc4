//! Logging configuration for tracklet.
//!
//! The library itself only emits `tracing` events under the `tracklet`
//! target. Embedding applications bring their own subscriber; the `tracklet`
//! binary installs the one built here.
//!
//! Log lines always go to stderr. `tracklet replay --dry-run` prints one JSON
//! payload per line on stdout, and that stream must stay parseable whatever
//! the verbosity.

use std::io;

use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Target prefix of every event this crate emits.
pub const LOG_TARGET: &str = "tracklet";

/// Verbosity level for logging output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Errors only.
    Quiet,
    /// Installation and configuration (info and above).
    #[default]
    Normal,
    /// Dropped reports, transport outcomes and lifecycle steps (debug).
    Verbose,
    /// One line per dispatch and per captured event (trace).
    Trace,
}

impl Verbosity {
    /// Map `-q` and the `-v` count to a level. `quiet` wins.
    #[must_use]
    pub fn from_flags(verbose: u8, quiet: bool) -> Self {
        match (quiet, verbose) {
            (true, _) => Self::Quiet,
            (false, 0) => Self::Normal,
            (false, 1) => Self::Verbose,
            (false, _) => Self::Trace,
        }
    }

    /// Convert verbosity to tracing level filter.
    #[must_use]
    pub fn to_level_filter(&self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }

    /// Filter directive used when `RUST_LOG` is unset.
    ///
    /// Only this crate's events pass; the HTTP stack underneath stays silent.
    #[must_use]
    pub fn directive(&self) -> String {
        format!("{LOG_TARGET}={}", self.to_level_filter())
    }
}

fn subscriber<W>(filter: EnvFilter, writer: W) -> impl Subscriber + Send + Sync + 'static
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .with_ansi(false)
            .with_writer(writer),
    )
}

/// Initialize the logging system, writing to stderr.
///
/// `RUST_LOG` takes precedence over `verbosity` when set.
///
/// # Examples
///
/// ```no_run
/// use tracklet::{init_logging, logging::Verbosity};
///
/// init_logging(Verbosity::Verbose);
/// ```
pub fn init_logging(verbosity: Verbosity) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.directive()));

    // Ignore the error if a subscriber is already set
    let _ = subscriber(env_filter, io::stderr).try_init();
}

/// Initialize logging for tests: warnings from this crate, captured per test.
#[cfg(test)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(format!("{LOG_TARGET}=warn"))
        .with_test_writer()
        .try_init();
}
