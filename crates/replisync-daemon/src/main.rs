//! Replisync Daemon - periodic one-way directory mirror
//!
//! This binary keeps a replica directory an exact copy of a source
//! directory:
//! - One reconciliation pass right away, then one every interval
//! - Failed passes are logged and retried on the next interval
//! - Graceful shutdown on SIGTERM/SIGINT between passes
//!
//! # Architecture
//!
//! Startup resolves the configuration (flags over config file over
//! defaults), opens the log sinks, and checks the two roots. Anything wrong
//! at that point is fatal. After that the [`Scheduler`] owns the loop until
//! a `CancellationToken` is triggered by a signal.

mod cli;
mod logging;

use std::{
    path::Path,
    process::ExitCode,
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use clap::Parser;
use replisync_core::{
    config::{Config, ConfigBuilder},
    domain::newtypes::TreeRoot,
};
use replisync_sync::{
    BackoffPolicy, LocalFileSystemAdapter, ReconcileOptions, Reconciler, Scheduler,
    TracingSyncObserver,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument::WithSubscriber, warn};

use crate::cli::Cli;

// ============================================================================
// Settings resolution
// ============================================================================

/// Everything the daemon needs once flags and config file are merged
#[derive(Debug)]
struct DaemonSettings {
    config: Config,
    source: TreeRoot,
    replica: TreeRoot,
}

/// Loads the config file, applies flags, validates, and anchors the roots
fn resolve_settings(cli: &Cli, cwd: &Path) -> Result<DaemonSettings> {
    let file_config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?,
        None => {
            let default_path = Config::default_path();
            if default_path.exists() {
                Config::load(&default_path).with_context(|| {
                    format!("Failed to load config file {}", default_path.display())
                })?
            } else {
                Config::default()
            }
        }
    };

    let config = match cli
        .apply(ConfigBuilder::from_config(file_config))
        .build_validated()
    {
        Ok(config) => config,
        Err(errors) => {
            let details: Vec<String> = errors.iter().map(ToString::to_string).collect();
            bail!("Invalid configuration: {}", details.join("; "));
        }
    };

    let (Some(source), Some(replica)) = (&config.sync.source, &config.sync.replica) else {
        bail!("Invalid configuration: source and replica are required");
    };
    let source = anchor_root(source, cwd).context("Invalid source root")?;
    let replica = anchor_root(replica, cwd).context("Invalid replica root")?;

    Ok(DaemonSettings {
        config,
        source,
        replica,
    })
}

/// Makes `path` absolute and, when it already exists, resolves symlinks in it
fn anchor_root(path: &Path, cwd: &Path) -> Result<TreeRoot> {
    let root = TreeRoot::resolve(path, cwd)?;
    match std::fs::canonicalize(root.as_path()) {
        Ok(canonical) => Ok(TreeRoot::new(canonical)?),
        Err(_) => Ok(root),
    }
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) -> Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;

    #[cfg(unix)]
    let terminate = sigterm.recv();

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Option<()>>();

    tokio::select! {
        result = ctrl_c => {
            result.context("Failed to install Ctrl+C handler")?;
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
    Ok(())
}

// ============================================================================
// Daemon
// ============================================================================

/// Runs the daemon until shutdown (or after one pass with `once`)
///
/// # Errors
/// Unusable roots, or a failed pass when `once` is set.
async fn run(settings: DaemonSettings, once: bool) -> Result<()> {
    info!(
        source = %settings.source,
        replica = %settings.replica,
        interval_minutes = settings.config.sync.interval_minutes,
        compare = %settings.config.sync.compare,
        prune_directories = settings.config.sync.prune_directories,
        "Replisync daemon starting (replisyncd)"
    );

    let observer = Arc::new(TracingSyncObserver::new());
    let reconciler = Reconciler::new(
        settings.source,
        settings.replica,
        ReconcileOptions::from(&settings.config.sync),
        Arc::new(LocalFileSystemAdapter::new()),
        observer.clone(),
    );

    reconciler
        .check_roots()
        .await
        .context("Cannot start synchronization")?;

    let scheduler = Scheduler::new(
        settings.config.sync.interval(),
        BackoffPolicy::from_cap(settings.config.sync.backoff_cap()),
        observer,
    );

    if once {
        scheduler.run_once(&reconciler).await?;
        return Ok(());
    }

    let shutdown_token = CancellationToken::new();
    let signal_token = shutdown_token.clone();
    tokio::spawn(
        async move {
            if let Err(e) = shutdown_signal(signal_token).await {
                warn!(error = %e, "Signal handling unavailable; stop the daemon by killing it");
            }
        }
        .with_current_subscriber(),
    );

    scheduler.run_forever(&reconciler, shutdown_token).await;
    Ok(())
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(e) => {
            eprintln!("replisyncd: cannot determine working directory: {e}");
            return ExitCode::FAILURE;
        }
    };

    let settings = match resolve_settings(&cli, &cwd) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("replisyncd: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let level = cli.log_level(&settings.config.logging.level);
    let dispatch = match logging::build_dispatch(level, &settings.config.logging.file) {
        Ok(dispatch) => dispatch,
        Err(e) => {
            eprintln!("replisyncd: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    async move {
        match run(settings, cli.once).await {
            Ok(()) => {
                info!("Replisync daemon shut down gracefully");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %format!("{e:#}"), "Replisync daemon exiting with error");
                ExitCode::FAILURE
            }
        }
    }
    .with_subscriber(dispatch)
    .await
}

// ============================================================================
// Tests
// ============================================================================
