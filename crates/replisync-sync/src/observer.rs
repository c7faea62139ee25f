//! Tracing-backed sync observer
//!
//! [`TracingSyncObserver`] is the production [`ISyncObserver`]: every callback
//! becomes exactly one `tracing` record with structured fields. Where those
//! records end up (file, console) is decided by whoever installs the
//! subscriber, not here.

use std::error::Error;
use std::path::Path;
use std::time::Duration;

use replisync_core::{
    domain::{
        newtypes::{PathPair, TreeRoot},
        pass::PassReport,
    },
    ports::sync_observer::ISyncObserver,
};
use tracing::{debug, error, info};

/// Observer that emits one tracing event per reconciler/scheduler event
#[derive(Debug, Clone, Default)]
pub struct TracingSyncObserver;

impl TracingSyncObserver {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Renders an error and all of its sources as `outer: inner: root`
pub fn error_chain(err: &(dyn Error + 'static)) -> String {
    let mut rendered = err.to_string();
    let mut current = err.source();
    while let Some(cause) = current {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        current = cause.source();
    }
    rendered
}

impl ISyncObserver for TracingSyncObserver {
    fn on_pass_started(&self, source: &TreeRoot, replica: &TreeRoot) {
        info!(source = %source, replica = %replica, "Synchronization pass started");
    }

    fn on_directory_created(&self, pair: &PathPair) {
        info!(
            replica = %pair.replica.display(),
            relative = %pair.relative,
            "Created folder"
        );
    }

    fn on_file_copied(&self, pair: &PathPair, bytes: u64) {
        info!(
            source = %pair.source.display(),
            replica = %pair.replica.display(),
            bytes,
            "Copied file"
        );
    }

    fn on_file_skipped(&self, pair: &PathPair) {
        debug!(relative = %pair.relative, "File unchanged, skipping copy");
    }

    fn on_file_removed(&self, pair: &PathPair) {
        info!(
            replica = %pair.replica.display(),
            "Removed file (does not exist in source)"
        );
    }

    fn on_directory_removed(&self, pair: &PathPair) {
        info!(
            replica = %pair.replica.display(),
            "Removed folder (does not exist in source)"
        );
    }

    fn on_entry_ignored(&self, path: &Path) {
        debug!(path = %path.display(), "Ignoring entry that is neither file nor folder");
    }

    fn on_pass_completed(&self, report: &PassReport) {
        info!(
            directories_created = report.directories_created,
            files_copied = report.files_copied,
            files_skipped = report.files_skipped,
            files_removed = report.files_removed,
            directories_removed = report.directories_removed,
            bytes_copied = report.bytes_copied,
            duration_ms = report.duration_ms(),
            "Synchronization completed successfully"
        );
    }

    fn on_pass_failed(&self, err: &(dyn Error + 'static)) {
        error!(error = %error_chain(err), "Error during synchronization");
    }

    fn on_waiting(&self, delay: Duration, consecutive_failures: u32) {
        info!(
            next_pass_in_secs = delay.as_secs(),
            consecutive_failures,
            "Waiting for next synchronization pass"
        );
    }

    fn on_scheduler_stopped(&self) {
        info!("Synchronization loop stopped");
    }
}
