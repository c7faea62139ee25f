//! Local filesystem port (driven/secondary port)
//!
//! This module defines the interface the reconciler uses to inspect and
//! mutate the source and replica trees.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because filesystem errors are adapter-specific;
//!   the reconciler attaches path context and classifies them.
//! - Entries are inspected without following symbolic links. Anything that
//!   is neither a regular file nor a directory is reported as
//!   [`EntryKind::Other`] and left alone by the reconciler.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::domain::newtypes::FileHash;

// ============================================================================
// EntryKind
// ============================================================================

/// The type of a directory entry, determined without following symlinks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    /// Symlinks, FIFOs, sockets, device nodes
    Other,
}

// ============================================================================
// FileSystemState
// ============================================================================

/// Snapshot of a path's state on the local filesystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSystemState {
    /// Whether anything exists at the path
    pub exists: bool,
    /// Entry type (meaningless when `exists` is false)
    pub kind: EntryKind,
    /// Size in bytes (0 for directories or non-existent paths)
    pub size: u64,
    /// Last modification time (None if not available or path doesn't exist)
    pub modified: Option<DateTime<Utc>>,
}

impl FileSystemState {
    /// Returns a state representing a non-existent path
    pub fn not_found() -> Self {
        Self {
            exists: false,
            kind: EntryKind::Other,
            size: 0,
            modified: None,
        }
    }

    /// Returns true if the path exists and is a regular file
    pub fn is_regular_file(&self) -> bool {
        self.exists && self.kind == EntryKind::File
    }

    /// Returns true if the path exists and is a directory
    pub fn is_directory(&self) -> bool {
        self.exists && self.kind == EntryKind::Directory
    }
}

// ============================================================================
// DirEntryInfo
// ============================================================================

/// One entry returned by [`ILocalFileSystem::list_directory`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    /// File name of the entry (a single path component)
    pub name: OsString,
    pub kind: EntryKind,
}

// ============================================================================
// ILocalFileSystem trait
// ============================================================================

/// Port trait for local filesystem operations
///
/// ## Implementation Notes
///
/// - All paths are absolute.
/// - `copy_file` must never leave a partially written target behind on
///   success, and must carry the source's modification time over.
/// - `list_directory` returns entries sorted by file name so walks are
///   deterministic.
#[async_trait::async_trait]
pub trait ILocalFileSystem: Send + Sync {
    /// Gets the current state of a file or directory
    ///
    /// Returns `FileSystemState::not_found()` if the path doesn't exist
    /// (does not return an error for missing paths).
    async fn get_state(&self, path: &Path) -> anyhow::Result<FileSystemState>;

    /// Lists the immediate children of a directory, sorted by name
    ///
    /// # Errors
    /// Returns an error if the directory doesn't exist or cannot be read
    async fn list_directory(&self, path: &Path) -> anyhow::Result<Vec<DirEntryInfo>>;

    /// Creates a directory and all parent directories as needed
    ///
    /// This is equivalent to `mkdir -p` behavior.
    async fn create_directory(&self, path: &Path) -> anyhow::Result<()>;

    /// Copies a file's bytes and timestamps, replacing any existing target
    ///
    /// # Returns
    /// Number of bytes copied
    async fn copy_file(&self, from: &Path, to: &Path) -> anyhow::Result<u64>;

    /// Deletes a single file
    async fn remove_file(&self, path: &Path) -> anyhow::Result<()>;

    /// Deletes a directory and everything below it
    async fn remove_directory(&self, path: &Path) -> anyhow::Result<()>;

    /// Computes the SHA-256 digest of a file's contents
    async fn compute_hash(&self, path: &Path) -> anyhow::Result<FileHash>;

    /// Resolves symlinks in `path`, which does not have to exist yet
    ///
    /// The longest existing prefix is canonicalized and the missing tail is
    /// appended unchanged.
    async fn resolve_path(&self, path: &Path) -> anyhow::Result<PathBuf>;
}
