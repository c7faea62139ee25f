//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the reconciler
//! depends on, but whose implementations live in the sync crate.
//!
//! ## Ports Overview
//!
//! - [`ILocalFileSystem`] - Inspecting and mutating the source and replica trees
//! - [`ISyncObserver`] - Receiving reconciler and scheduler events (logging)

pub mod local_filesystem;
pub mod sync_observer;

pub use local_filesystem::{DirEntryInfo, EntryKind, FileSystemState, ILocalFileSystem};
pub use sync_observer::ISyncObserver;
