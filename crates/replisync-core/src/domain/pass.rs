//! Pass-level domain types
//!
//! A *pass* is one complete propagate + prune run of the reconciler. Nothing
//! in this module outlives a single pass except the scheduler state, which
//! simply alternates between running and waiting.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// CompareMode
// ============================================================================

/// How the propagate phase decides whether a source file must be copied
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareMode {
    /// Copy every source file on every pass
    #[default]
    Always,
    /// Skip files whose replica copy has the same size and modification time
    SizeAndMtime,
    /// Skip files whose replica copy has the same size and SHA-256 digest
    Checksum,
}

impl CompareMode {
    pub const ALL: [CompareMode; 3] = [
        CompareMode::Always,
        CompareMode::SizeAndMtime,
        CompareMode::Checksum,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareMode::Always => "always",
            CompareMode::SizeAndMtime => "size_and_mtime",
            CompareMode::Checksum => "checksum",
        }
    }
}

impl Display for CompareMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CompareMode {
    type Err = DomainError;

    /// Accepts both `size_and_mtime` and the CLI spelling `size-and-mtime`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.replace('-', "_").as_str() {
            "always" => Ok(CompareMode::Always),
            "size_and_mtime" => Ok(CompareMode::SizeAndMtime),
            "checksum" => Ok(CompareMode::Checksum),
            other => Err(DomainError::ValidationFailed(format!(
                "unknown compare mode '{other}'"
            ))),
        }
    }
}

// ============================================================================
// PassPhase
// ============================================================================

/// The two ordered phases of a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassPhase {
    /// Source → replica: create directories and copy files
    Propagate,
    /// Replica → source: remove orphans
    Prune,
}

impl Display for PassPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PassPhase::Propagate => f.write_str("propagate"),
            PassPhase::Prune => f.write_str("prune"),
        }
    }
}

// ============================================================================
// PassReport
// ============================================================================

/// Summary of one successful pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Directories created under the replica root (including the root itself)
    pub directories_created: u64,
    /// Files copied from source to replica
    pub files_copied: u64,
    /// Files left alone because the replica copy already matched
    pub files_skipped: u64,
    /// Orphan files removed from the replica
    pub files_removed: u64,
    /// Orphan directories removed from the replica
    pub directories_removed: u64,
    /// Total bytes written to the replica
    pub bytes_copied: u64,
    /// Wall-clock duration of the pass
    pub duration: Duration,
}

impl PassReport {
    /// Whether the pass changed anything in the replica
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.directories_created > 0
            || self.files_copied > 0
            || self.files_removed > 0
            || self.directories_removed > 0
    }

    #[must_use]
    pub fn duration_ms(&self) -> u64 {
        u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)
    }
}

// ============================================================================
// SchedulerState
// ============================================================================

/// The scheduler alternates between these two states forever
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SchedulerState {
    /// A pass is in progress
    RunningSync,
    /// Sleeping until the next pass
    #[default]
    Waiting,
}

impl Display for SchedulerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerState::RunningSync => f.write_str("running_sync"),
            SchedulerState::Waiting => f.write_str("waiting"),
        }
    }
}
