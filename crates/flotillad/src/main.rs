//! flotillad: the flotilla scheduler daemon.
//!
//! # Usage
//!
//! ```text
//! flotillad replay --config flotilla.toml --events events.jsonl
//! flotillad config-init > flotilla.toml
//! ```
//!
//! Logs go to stderr; stdout carries only outbound calls.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::io::BufReader;
use tokio::sync::watch;
use tracing::info;

use flotilla_core::config::FlotillaConfig;
use flotillad::{LineTransport, replay};

#[derive(Parser)]
#[command(
    name = "flotillad",
    about = "Flotilla: offer-driven task scheduler",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Drive the scheduler from a JSON-lines event log.
    Replay {
        /// Configuration file. Defaults apply when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Event log, one master event per line; `-` reads stdin.
        #[arg(short, long, default_value = "-")]
        events: String,
    },
    /// Print the default configuration as TOML.
    ConfigInit,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new("info,flotilla=debug"))?,
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Replay { config, events } => run_replay(config, &events).await,
        Command::ConfigInit => {
            print!("{}", FlotillaConfig::default().to_toml_string()?);
            Ok(())
        }
    }
}

async fn run_replay(config_path: Option<PathBuf>, events: &str) -> anyhow::Result<()> {
    let config = match &config_path {
        Some(path) => FlotillaConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => FlotillaConfig::default(),
    };
    info!(config = ?config_path, tasks = config.tasks.len(), "config loaded");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    let transport = Arc::new(LineTransport::new(io::stdout()));
    if events == "-" {
        replay(&config, BufReader::new(tokio::io::stdin()), transport, shutdown_rx).await?;
    } else {
        let file = tokio::fs::File::open(events)
            .await
            .with_context(|| format!("opening event log {events}"))?;
        replay(&config, BufReader::new(file), transport, shutdown_rx).await?;
    }
    Ok(())
}
