//! Log sinks for the daemon
//!
//! Every record goes to two places: the log file (appended, no colours) and
//! the console. The result is a [`Dispatch`] handed to the caller rather than
//! a process-wide default, so whoever runs the daemon decides where it applies.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::Dispatch;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Builds the file + console subscriber
///
/// `RUST_LOG` takes precedence over `level` when set.
///
/// # Errors
/// Fails if the log file cannot be opened for appending, or if `level` is
/// not a valid filter directive.
pub fn build_dispatch(level: &str, log_file: &Path) -> Result<Dispatch> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("Failed to open log file {}", log_file.display()))?;

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("Invalid log level '{level}'"))?,
    };

    let file_layer = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(Mutex::new(file));

    let console_layer = fmt::layer().with_target(false);

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer);

    Ok(Dispatch::new(subscriber))
}
