//! `tracklet` - CLI for the tracklet telemetry core
//!
//! Sends manual reports and replays scripted host activity through a tracker.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use serde_json::Value;

use tracklet::cli::{Cli, Command, ConfigCommand, ReplayCommand, SendCommand};
use tracklet::{
    init_logging, replay, BeaconTransport, MemoryTransport, Options, PartialOptions, Tracker,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let partial = PartialOptions::load_from(cli.config.clone()).with_context(|| {
        format!(
            "failed to load {}",
            cli.config
                .clone()
                .unwrap_or_else(PartialOptions::default_config_path)
                .display()
        )
    })?;

    let base_url = cli.base_url.as_deref();
    match cli.command {
        Command::Send(cmd) => handle_send(partial, base_url, cmd).await,
        Command::Replay(cmd) => handle_replay(partial, base_url, cmd).await,
        Command::Config(cmd) => handle_config(partial, cmd),
    }
}

fn with_url(mut partial: PartialOptions, url: Option<String>) -> PartialOptions {
    if url.is_some() {
        partial.request_url = url;
    }
    partial
}

/// Refuse to start when reports could never leave the process.
fn beacon_transport(
    partial: &PartialOptions,
    base_url: Option<&str>,
) -> anyhow::Result<Arc<BeaconTransport>> {
    let options = Options::merge(partial.clone())?;
    let transport = BeaconTransport::for_endpoint(&options.request_url, base_url)
        .context("reports would be dropped; pass an absolute URL or --base-url")?;
    Ok(Arc::new(transport))
}

async fn handle_send(
    partial: PartialOptions,
    base_url: Option<&str>,
    cmd: SendCommand,
) -> anyhow::Result<()> {
    let data: Value = serde_json::from_str(&cmd.json).context("report data is not valid JSON")?;

    let partial = with_url(partial, cmd.url);
    let tracker = Tracker::builder(partial.clone())
        .transport(beacon_transport(&partial, base_url)?)
        .build()?;
    tracker.send_tracker(&data);
    tracker.flush().await;
    Ok(())
}

async fn handle_replay(
    partial: PartialOptions,
    base_url: Option<&str>,
    cmd: ReplayCommand,
) -> anyhow::Result<()> {
    let partial = with_url(partial, cmd.url);

    if cmd.dry_run {
        let transport = Arc::new(MemoryTransport::new());
        let tracker = Tracker::builder(partial)
            .transport(transport.clone())
            .build()?;
        let steps = replay::run_file(&tracker, &cmd.file)
            .with_context(|| format!("replay of {} failed", cmd.file.display()))?;
        for payload in transport.payloads() {
            println!("{}", serde_json::to_string(&payload)?);
        }
        eprintln!("{steps} steps, {} reports (dry run)", transport.len());
        tracker.dispose();
    } else {
        let tracker = Tracker::builder(partial.clone())
            .transport(beacon_transport(&partial, base_url)?)
            .build()?;
        let steps = replay::run_file(&tracker, &cmd.file)
            .with_context(|| format!("replay of {} failed", cmd.file.display()))?;
        tracker.flush().await;
        eprintln!("{steps} steps replayed");
        tracker.dispose();
    }
    Ok(())
}

fn handle_config(partial: PartialOptions, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            let options = Options::merge(partial)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&options)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("  Request URL:        {}", options.request_url);
                println!("  SDK version:        {}", options.sdk_version);
                println!("  User id:            {}", options.uuid.as_deref().unwrap_or("-"));
                println!(
                    "  Extra keys:         {}",
                    options.extra.as_ref().map_or(0, serde_json::Map::len)
                );
                println!();
                println!("[Capture]");
                println!("  History:            {}", options.history_tracker);
                println!("  Hash:               {}", options.hash_tracker);
                println!("  DOM:                {}", options.dom_tracker);
                println!("  JS errors:          {}", options.js_error);
            }
        }
        ConfigCommand::Path => {
            println!("{}", PartialOptions::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(PartialOptions::default_config_path);
            println!("Validating configuration: {}", path.display());
            match PartialOptions::load_from(Some(path)).and_then(Options::merge) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
