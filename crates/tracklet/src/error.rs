//! Error types for tracklet.
//!
//! Only configuration and tooling paths return these errors. The capture and
//! reporting paths never propagate failures past their own boundary; they log
//! and drop instead.

use thiserror::Error;

/// The main error type for tracklet operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    /// The collection endpoint was not provided.
    #[error("requestUrl is required")]
    MissingRequestUrl,

    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    // === Transport Errors ===
    /// The transport could not be constructed.
    #[error("transport error: {0}")]
    Transport(String),

    // === Replay Errors ===
    /// A replay script line could not be parsed.
    #[error("replay script line {line}: {message}")]
    Replay {
        /// 1-based line number in the script.
        line: usize,
        /// Description of what went wrong.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A specialized Result type for tracklet operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create a replay error for the given line.
    #[must_use]
    pub fn replay(line: usize, message: impl Into<String>) -> Self {
        Self::Replay {
            line,
            message: message.into(),
        }
    }
}
