//! Replisync Sync - one-way mirror engine
//!
//! Provides:
//! - Two-phase reconciliation (propagate, then prune)
//! - Periodic scheduling with failure isolation
//! - Local filesystem adapter (atomic copies, SHA-256 hashing)
//!
//! ## Modules
//!
//! - [`reconciler`] - Makes the replica tree an exact copy of the source tree
//! - [`scheduler`] - Runs passes forever at a fixed interval
//! - [`filesystem`] - `ILocalFileSystem` implementation on `tokio::fs`
//! - [`observer`] - `ISyncObserver` implementation on `tracing`
//! - [`error`] - Pass errors and their classification

pub mod error;
pub mod filesystem;
pub mod observer;
pub mod reconciler;
pub mod scheduler;

pub use error::{ErrorKind, FsOperation, ReconcileError};
pub use filesystem::LocalFileSystemAdapter;
pub use observer::TracingSyncObserver;
pub use reconciler::{ReconcileOptions, Reconciler};
pub use scheduler::{BackoffPolicy, Scheduler, SchedulerStats};
