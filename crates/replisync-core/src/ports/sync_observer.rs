//! Sync observer port (driven/secondary port)
//!
//! The reconciler and scheduler report every significant action through an
//! [`ISyncObserver`] handle they are given at construction, instead of
//! writing to a process-wide logger. The production implementation turns
//! these callbacks into `tracing` records; tests can record them.
//!
//! ## Design Notes
//!
//! - Callbacks are synchronous and infallible: observing must never change
//!   the outcome of a pass.
//! - Every method has an empty default body so implementations only need
//!   to override the events they care about.

use std::error::Error;
use std::path::Path;
use std::time::Duration;

use crate::domain::{
    newtypes::{PathPair, TreeRoot},
    pass::PassReport,
};

/// Observer for reconciler and scheduler events
///
/// ## Threading
///
/// Implementations are shared behind an `Arc` and must be thread-safe even
/// though the daemon only ever calls them from one task.
pub trait ISyncObserver: Send + Sync {
    /// A pass is about to start
    fn on_pass_started(&self, _source: &TreeRoot, _replica: &TreeRoot) {}

    /// A directory was created in the replica
    fn on_directory_created(&self, _pair: &PathPair) {}

    /// A file was copied from source to replica
    fn on_file_copied(&self, _pair: &PathPair, _bytes: u64) {}

    /// A file was left alone because the replica copy already matches
    fn on_file_skipped(&self, _pair: &PathPair) {}

    /// An orphan file was removed from the replica
    fn on_file_removed(&self, _pair: &PathPair) {}

    /// An orphan directory was removed from the replica
    fn on_directory_removed(&self, _pair: &PathPair) {}

    /// An entry that is neither a file nor a directory was ignored
    fn on_entry_ignored(&self, _path: &Path) {}

    /// A pass finished successfully
    fn on_pass_completed(&self, _report: &PassReport) {}

    /// A pass was aborted by its first error
    fn on_pass_failed(&self, _error: &(dyn Error + 'static)) {}

    /// The scheduler is going to sleep before the next pass
    fn on_waiting(&self, _delay: Duration, _consecutive_failures: u32) {}

    /// The scheduler loop has stopped after a shutdown request
    fn on_scheduler_stopped(&self) {}
}
