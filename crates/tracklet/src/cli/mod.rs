//! Command-line interface for tracklet.
//!
//! This module provides the CLI structure for the `tracklet` binary.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::{ConfigCommand, ReplayCommand, SendCommand};

/// tracklet - Behavioral telemetry for navigation, interaction and failures
///
/// Sends manual reports or replays scripted host activity through a tracker,
/// using the options from the configuration file and `TRACKLET_*` variables.
#[derive(Debug, Parser)]
#[command(name = "tracklet")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to custom configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Base URL that a relative request URL is resolved against
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,

    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send one manual report
    Send(SendCommand),

    /// Replay a script of host activity
    Replay(ReplayCommand),

    /// View or validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

impl Cli {
    /// Get the verbosity level based on flags.
    #[must_use]
    pub fn verbosity(&self) -> crate::logging::Verbosity {
        crate::logging::Verbosity::from_flags(self.verbose, self.quiet)
    }
}
