//! Error types for the reconciler
//!
//! Every failure carries the path(s) involved so the log line alone tells
//! the operator what went wrong where.

use std::fmt::{self, Display, Formatter};
use std::io;
use std::path::PathBuf;

use replisync_core::domain::DomainError;
use thiserror::Error;

/// Filesystem operation that failed during a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsOperation {
    Inspect,
    ListDirectory,
    CreateDirectory,
    RemoveFile,
    RemoveDirectory,
    Hash,
}

impl Display for FsOperation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            FsOperation::Inspect => "inspect",
            FsOperation::ListDirectory => "list directory",
            FsOperation::CreateDirectory => "create directory",
            FsOperation::RemoveFile => "remove file",
            FsOperation::RemoveDirectory => "remove directory",
            FsOperation::Hash => "hash",
        };
        f.write_str(s)
    }
}

/// Coarse classification used by the daemon and the logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operator error: the pass cannot succeed until the setup is fixed
    Configuration,
    PermissionDenied,
    /// Something vanished between enumeration and use
    NotFound,
    StorageFull,
    Other,
}

/// Errors that abort a reconciliation pass
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The source root does not exist
    #[error("Source root does not exist: {0}")]
    SourceMissing(PathBuf),

    /// The source root exists but is not a directory
    #[error("Source root is not a directory: {0}")]
    SourceNotDirectory(PathBuf),

    /// The replica root exists as a file, symlink, or other non-directory
    #[error("Replica root exists but is not a directory: {0}")]
    ReplicaNotDirectory(PathBuf),

    /// One root lies inside the other
    #[error("Source root {source_root} and replica root {replica_root} overlap")]
    OverlappingRoots {
        source_root: PathBuf,
        replica_root: PathBuf,
    },

    /// A single filesystem operation failed
    #[error("Failed to {operation} {path}")]
    Filesystem {
        operation: FsOperation,
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// Copying a file from source to replica failed
    #[error("Failed to copy {from} to {to}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// A directory entry could not be mapped to a relative path
    #[error("Invalid entry: {0}")]
    InvalidEntry(#[from] DomainError),
}

impl ReconcileError {
    pub(crate) fn filesystem(
        operation: FsOperation,
        path: impl Into<PathBuf>,
        source: anyhow::Error,
    ) -> Self {
        Self::Filesystem {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Classifies the error for reporting
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SourceMissing(_)
            | Self::SourceNotDirectory(_)
            | Self::ReplicaNotDirectory(_)
            | Self::OverlappingRoots { .. } => ErrorKind::Configuration,
            Self::Filesystem { source, .. } | Self::Copy { source, .. } => classify_io(source),
            Self::InvalidEntry(_) => ErrorKind::Other,
        }
    }

    /// Whether this is an operator error rather than a transient failure
    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }
}

/// Looks for an `io::Error` anywhere in the chain and maps its kind
fn classify_io(err: &anyhow::Error) -> ErrorKind {
    let Some(io_err) = err.chain().find_map(|e| e.downcast_ref::<io::Error>()) else {
        return ErrorKind::Other;
    };

    match io_err.kind() {
        io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
        io::ErrorKind::NotFound => ErrorKind::NotFound,
        // ENOSPC, EDQUOT
        _ if matches!(io_err.raw_os_error(), Some(28) | Some(122)) && cfg!(unix) => {
            ErrorKind::StorageFull
        }
        _ => ErrorKind::Other,
    }
}
