//! evq command line entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse arguments** with `clap` and load the optional TOML
//!    configuration file.
//! 2. **Wire logging**: a `tracing-subscriber` formatter on stderr, text or
//!    JSON, filtered by `RUST_LOG` (default `warn`). Spans and events from
//!    every crate in the workspace flow through it.
//! 3. **Construct infrastructure**: the Win32 transport, wrapped in a
//!    [`client::Client`] configured from the `[client]` table.
//! 4. **Dispatch** the subcommand. A search runs on a blocking thread while
//!    the runtime watches for Ctrl-C and cancels it cooperatively.
//!
//! Exit status is 0 on success, 2 when the search service is not running and
//! 1 for any other failure.

#![cfg_attr(not(windows), allow(dead_code))]

mod args;
mod commands;
mod config;
mod output;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use protocol::ClientError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::args::{Cli, LogFormat};
use crate::config::Config;

const EXIT_SERVICE_NOT_FOUND: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => match err.downcast_ref::<ClientError>() {
            Some(ClientError::NotFound) => {
                tracing::warn!("Search service not found");
                eprintln!("evq: {err}");
                ExitCode::from(EXIT_SERVICE_NOT_FOUND)
            }
            _ => {
                tracing::error!(error = %format!("{err:#}"), "Command failed");
                eprintln!("evq: {err:#}");
                ExitCode::FAILURE
            }
        },
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}

#[cfg(windows)]
async fn run(cli: Cli) -> Result<()> {
    use std::sync::Arc;

    use anyhow::Context;

    let config = Config::load(cli.config.as_deref())?;
    let transport = win32::Win32Transport::new()
        .context("Failed to set up the native transport")?;
    let client = Arc::new(client::Client::with_config(transport, config.client.clone()));

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    commands::dispatch(client, cli.command, &config, &mut out).await
}

#[cfg(not(windows))]
async fn run(cli: Cli) -> Result<()> {
    Config::load(cli.config.as_deref())?;
    anyhow::bail!("evq requires Windows: the search service is reached through Win32 window messages")
}
