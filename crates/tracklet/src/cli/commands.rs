//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand};

/// Send command arguments.
#[derive(Debug, Args)]
pub struct SendCommand {
    /// Report data as JSON (objects are merged into the payload)
    pub json: String,

    /// Override the configured request URL
    #[arg(short, long, value_name = "URL")]
    pub url: Option<String>,
}

/// Replay command arguments.
#[derive(Debug, Args)]
pub struct ReplayCommand {
    /// JSON-lines script of host activity
    pub file: PathBuf,

    /// Print payloads instead of sending them
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Override the configured request URL
    #[arg(short, long, value_name = "URL")]
    pub url: Option<String>,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective tracker options
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the default configuration file path
    Path,

    /// Validate a configuration file
    Validate {
        /// Path to config file (default: standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
