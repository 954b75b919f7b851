//! EcoMetrics CLI - record and review power, water and electricity price
//! metrics, offline against the local cache or online against the backend.

mod cli;
mod commands;

use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use ecometrics_core::{Config, MetricsSource, Session};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::{Cli, Command};

/// Log file prefix inside the configured log directory
const LOG_FILE_PREFIX: &str = "ecometrics.log";

/// Initialize the tracing subscriber for logging.
///
/// Use RUST_LOG to control the level (e.g., RUST_LOG=debug). When a log
/// directory is configured, events are also written to a daily rolling file;
/// keep the returned guard alive so buffered lines are flushed on exit.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let mut config = Config::load().context("Failed to load config")?;
    config.apply_env()?;
    cli.apply_to(&mut config);

    let _guard = init_tracing(config.log_dir.as_deref());
    info!(mode = %config.mode, "EcoMetrics starting");

    let mut session = Session::new(config.data_dir()?);
    if let Err(e) = session.load() {
        warn!(error = %e, "Ignoring unreadable session file");
    }

    match cli.command {
        Command::Login { username } => commands::login(&config, &mut session, username).await,
        Command::Logout => commands::logout(&config, &mut session).await,
        command => {
            let mut source = MetricsSource::from_config(&config, &session)?;
            commands::run(command, &mut source, &config, &session).await
        }
    }
}
