//! One-way tree reconciler
//!
//! The [`Reconciler`] makes the replica tree an exact copy of the source tree
//! in a single *pass* made of two strictly ordered phases:
//!
//! 1. **Propagate** (source → replica): create every missing directory and
//!    copy every file that is new or changed.
//! 2. **Prune** (replica → source): remove every replica file (and, when
//!    enabled, every replica directory) with no counterpart in source.
//!
//! Because prune runs after propagate, a file that appeared in source before
//! the pass started is already in the replica when prune checks for orphans,
//! so it is never removed by the same pass.
//!
//! The first failing filesystem operation aborts the pass. The error is
//! reported to the observer and returned; nothing is retried here.
//!
//! Only paths under the replica root are ever mutated.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use replisync_core::config::SyncConfig;
use replisync_core::domain::{
    newtypes::{FileHash, PathPair, RelativePath, TreeRoot},
    pass::{CompareMode, PassPhase, PassReport},
};
use replisync_core::ports::{
    local_filesystem::{EntryKind, FileSystemState, ILocalFileSystem},
    sync_observer::ISyncObserver,
};
use tracing::{debug, instrument};

use crate::error::{FsOperation, ReconcileError};

// ============================================================================
// ReconcileOptions
// ============================================================================

/// Tunables for a reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// How to decide whether a source file must be copied
    pub compare: CompareMode,
    /// Remove replica directories that have no directory counterpart in source
    ///
    /// When false, orphan directories stay in place (only the files inside
    /// them are removed).
    pub prune_directories: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            compare: CompareMode::Always,
            prune_directories: true,
        }
    }
}

impl From<&SyncConfig> for ReconcileOptions {
    fn from(config: &SyncConfig) -> Self {
        Self {
            compare: config.compare,
            prune_directories: config.prune_directories,
        }
    }
}

// ============================================================================
// Reconciler
// ============================================================================

/// Mirrors one source tree into one replica tree
///
/// ## Dependencies
///
/// - `filesystem`: every read and mutation goes through this port
/// - `observer`: receives one event per significant action (logging)
pub struct Reconciler {
    source_root: TreeRoot,
    replica_root: TreeRoot,
    options: ReconcileOptions,
    filesystem: Arc<dyn ILocalFileSystem>,
    observer: Arc<dyn ISyncObserver>,
}

impl Reconciler {
    pub fn new(
        source_root: TreeRoot,
        replica_root: TreeRoot,
        options: ReconcileOptions,
        filesystem: Arc<dyn ILocalFileSystem>,
        observer: Arc<dyn ISyncObserver>,
    ) -> Self {
        Self {
            source_root,
            replica_root,
            options,
            filesystem,
            observer,
        }
    }

    /// Verifies the roots can be reconciled, without touching the replica
    ///
    /// Overlap is checked twice: on the paths as given, then with symlinks
    /// resolved, so a replica reached through a link into the source is
    /// caught too. The replica root itself is never followed: if it exists
    /// it must be a real directory, not a symlink to one.
    ///
    /// # Errors
    /// - [`ReconcileError::OverlappingRoots`] if one root contains the other
    /// - [`ReconcileError::SourceMissing`] if the source root does not exist
    /// - [`ReconcileError::SourceNotDirectory`] if it is not a directory
    /// - [`ReconcileError::ReplicaNotDirectory`] if the replica root exists
    ///   as anything but a directory
    pub async fn check_roots(&self) -> Result<(), ReconcileError> {
        let overlapping = || ReconcileError::OverlappingRoots {
            source_root: self.source_root.as_path().to_path_buf(),
            replica_root: self.replica_root.as_path().to_path_buf(),
        };

        if self.source_root.overlaps(&self.replica_root) {
            return Err(overlapping());
        }
        let resolved_source = self.resolved(&self.source_root).await?;
        let resolved_replica = self.resolved(&self.replica_root).await?;
        if resolved_source.overlaps(&resolved_replica) {
            return Err(overlapping());
        }

        let state = self
            .filesystem
            .get_state(self.source_root.as_path())
            .await
            .map_err(|e| ReconcileError::filesystem(FsOperation::Inspect, self.source_root.as_path(), e))?;

        if !state.exists {
            return Err(ReconcileError::SourceMissing(
                self.source_root.as_path().to_path_buf(),
            ));
        }
        if !state.is_directory() {
            return Err(ReconcileError::SourceNotDirectory(
                self.source_root.as_path().to_path_buf(),
            ));
        }

        let replica = self.state_of(self.replica_root.as_path()).await?;
        if replica.exists && !replica.is_directory() {
            return Err(ReconcileError::ReplicaNotDirectory(
                self.replica_root.as_path().to_path_buf(),
            ));
        }

        Ok(())
    }

    /// `root` with every symlink in its existing prefix resolved
    async fn resolved(&self, root: &TreeRoot) -> Result<TreeRoot, ReconcileError> {
        let path = self
            .filesystem
            .resolve_path(root.as_path())
            .await
            .map_err(|e| ReconcileError::filesystem(FsOperation::Inspect, root.as_path(), e))?;
        Ok(TreeRoot::new(path)?)
    }

    /// Runs one full pass: propagate, then prune
    ///
    /// # Errors
    /// Returns the first error encountered; the pass stops at that point.
    #[instrument(skip(self), fields(source = %self.source_root, replica = %self.replica_root))]
    pub async fn reconcile(&self) -> Result<PassReport, ReconcileError> {
        self.observer
            .on_pass_started(&self.source_root, &self.replica_root);

        let started = Instant::now();
        let mut report = PassReport::default();

        let outcome = async {
            self.check_roots().await?;
            self.propagate(&mut report).await?;
            self.prune(&mut report).await
        }
        .await;

        match outcome {
            Ok(()) => {
                report.duration = started.elapsed();
                self.observer.on_pass_completed(&report);
                Ok(report)
            }
            Err(err) => {
                self.observer.on_pass_failed(&err);
                Err(err)
            }
        }
    }

    fn root_pair(&self) -> PathPair {
        PathPair::new(&self.source_root, &self.replica_root, RelativePath::root())
    }

    async fn state_of(&self, path: &Path) -> Result<FileSystemState, ReconcileError> {
        self.filesystem
            .get_state(path)
            .await
            .map_err(|e| ReconcileError::filesystem(FsOperation::Inspect, path, e))
    }

    // ========================================================================
    // Phase A: propagate
    // ========================================================================

    /// Walks the source tree depth-first, in name order
    async fn propagate(&self, report: &mut PassReport) -> Result<(), ReconcileError> {
        debug!(phase = %PassPhase::Propagate, "Phase started");
        let mut pending = vec![self.root_pair()];

        while let Some(dir) = pending.pop() {
            self.ensure_replica_directory(&dir, report).await?;

            let entries = self
                .filesystem
                .list_directory(&dir.source)
                .await
                .map_err(|e| ReconcileError::filesystem(FsOperation::ListDirectory, &dir.source, e))?;

            let mut subdirectories = Vec::new();
            for entry in entries {
                let child = dir.child(&entry.name)?;
                match entry.kind {
                    EntryKind::File => self.propagate_file(&child, report).await?,
                    EntryKind::Directory => subdirectories.push(child),
                    EntryKind::Other => self.observer.on_entry_ignored(&child.source),
                }
            }

            // Reversed so the stack pops them in name order
            pending.extend(subdirectories.into_iter().rev());
        }

        Ok(())
    }

    /// Makes sure `pair.replica` is a directory, replacing anything else there
    async fn ensure_replica_directory(
        &self,
        pair: &PathPair,
        report: &mut PassReport,
    ) -> Result<(), ReconcileError> {
        let state = self.state_of(&pair.replica).await?;
        if state.is_directory() {
            return Ok(());
        }

        if state.exists {
            self.remove_replica_file(pair, report).await?;
        }

        self.filesystem
            .create_directory(&pair.replica)
            .await
            .map_err(|e| ReconcileError::filesystem(FsOperation::CreateDirectory, &pair.replica, e))?;

        report.directories_created += 1;
        self.observer.on_directory_created(pair);
        Ok(())
    }

    async fn propagate_file(
        &self,
        pair: &PathPair,
        report: &mut PassReport,
    ) -> Result<(), ReconcileError> {
        let replica_state = self.state_of(&pair.replica).await?;

        if replica_state.is_directory() {
            self.remove_replica_directory(pair, report).await?;
        } else if self.is_up_to_date(pair, &replica_state).await? {
            report.files_skipped += 1;
            self.observer.on_file_skipped(pair);
            return Ok(());
        }

        let bytes = self
            .filesystem
            .copy_file(&pair.source, &pair.replica)
            .await
            .map_err(|e| ReconcileError::Copy {
                from: pair.source.clone(),
                to: pair.replica.clone(),
                source: e,
            })?;

        report.files_copied += 1;
        report.bytes_copied += bytes;
        self.observer.on_file_copied(pair, bytes);
        Ok(())
    }

    /// Whether the replica file already matches its source under the
    /// configured comparison mode
    async fn is_up_to_date(
        &self,
        pair: &PathPair,
        replica_state: &FileSystemState,
    ) -> Result<bool, ReconcileError> {
        if self.options.compare == CompareMode::Always || !replica_state.is_regular_file() {
            return Ok(false);
        }

        let source_state = self.state_of(&pair.source).await?;
        if source_state.size != replica_state.size {
            return Ok(false);
        }

        match self.options.compare {
            CompareMode::Always => Ok(false),
            CompareMode::SizeAndMtime => Ok(match (source_state.modified, replica_state.modified) {
                (Some(src), Some(dst)) => src.timestamp() == dst.timestamp(),
                _ => false,
            }),
            CompareMode::Checksum => {
                let source_hash = self.hash_of(&pair.source).await?;
                let replica_hash = self.hash_of(&pair.replica).await?;
                Ok(source_hash == replica_hash)
            }
        }
    }

    async fn hash_of(&self, path: &Path) -> Result<FileHash, ReconcileError> {
        self.filesystem
            .compute_hash(path)
            .await
            .map_err(|e| ReconcileError::filesystem(FsOperation::Hash, path, e))
    }

    // ========================================================================
    // Phase B: prune
    // ========================================================================

    /// Walks the replica tree and removes entries with no source counterpart
    async fn prune(&self, report: &mut PassReport) -> Result<(), ReconcileError> {
        debug!(phase = %PassPhase::Prune, "Phase started");
        let mut pending = vec![self.root_pair()];

        while let Some(dir) = pending.pop() {
            let entries = self
                .filesystem
                .list_directory(&dir.replica)
                .await
                .map_err(|e| ReconcileError::filesystem(FsOperation::ListDirectory, &dir.replica, e))?;

            let mut subdirectories = Vec::new();
            for entry in entries {
                let child = dir.child(&entry.name)?;
                match entry.kind {
                    EntryKind::File => {
                        if !self.state_of(&child.source).await?.is_regular_file() {
                            self.remove_replica_file(&child, report).await?;
                        }
                    }
                    EntryKind::Directory => {
                        let in_source = self.state_of(&child.source).await?.is_directory();
                        if !in_source && self.options.prune_directories {
                            self.remove_replica_directory(&child, report).await?;
                        } else {
                            subdirectories.push(child);
                        }
                    }
                    EntryKind::Other => self.observer.on_entry_ignored(&child.replica),
                }
            }

            pending.extend(subdirectories.into_iter().rev());
        }

        Ok(())
    }

    async fn remove_replica_file(
        &self,
        pair: &PathPair,
        report: &mut PassReport,
    ) -> Result<(), ReconcileError> {
        self.filesystem
            .remove_file(&pair.replica)
            .await
            .map_err(|e| ReconcileError::filesystem(FsOperation::RemoveFile, &pair.replica, e))?;

        report.files_removed += 1;
        self.observer.on_file_removed(pair);
        Ok(())
    }

    async fn remove_replica_directory(
        &self,
        pair: &PathPair,
        report: &mut PassReport,
    ) -> Result<(), ReconcileError> {
        self.filesystem
            .remove_directory(&pair.replica)
            .await
            .map_err(|e| ReconcileError::filesystem(FsOperation::RemoveDirectory, &pair.replica, e))?;

        report.directories_removed += 1;
        self.observer.on_directory_removed(pair);
        Ok(())
    }
}

// ============================================================================
// Unit tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;

    use replisync_core::ports::local_filesystem::DirEntryInfo;
    use tempfile::TempDir;

    use super::*;
    use crate::error::ErrorKind;
    use crate::filesystem::LocalFileSystemAdapter;

    /// Delegates to the real adapter but fails copies into paths ending in `poison`
    struct PoisonedFileSystem {
        inner: LocalFileSystemAdapter,
        poison: &'static str,
    }

    #[async_trait::async_trait]
    impl ILocalFileSystem for PoisonedFileSystem {
        async fn get_state(&self, path: &Path) -> anyhow::Result<FileSystemState> {
            self.inner.get_state(path).await
        }
        async fn list_directory(&self, path: &Path) -> anyhow::Result<Vec<DirEntryInfo>> {
            self.inner.list_directory(path).await
        }
        async fn create_directory(&self, path: &Path) -> anyhow::Result<()> {
            self.inner.create_directory(path).await
        }
        async fn copy_file(&self, from: &Path, to: &Path) -> anyhow::Result<u64> {
            if to.ends_with(self.poison) {
                return Err(std::io::Error::from(std::io::ErrorKind::PermissionDenied).into());
            }
            self.inner.copy_file(from, to).await
        }
        async fn remove_file(&self, path: &Path) -> anyhow::Result<()> {
            self.inner.remove_file(path).await
        }
        async fn remove_directory(&self, path: &Path) -> anyhow::Result<()> {
            self.inner.remove_directory(path).await
        }
        async fn compute_hash(&self, path: &Path) -> anyhow::Result<FileHash> {
            self.inner.compute_hash(path).await
        }
        async fn resolve_path(&self, path: &Path) -> anyhow::Result<PathBuf> {
            self.inner.resolve_path(path).await
        }
    }

    #[derive(Default)]
    struct RecordingObserver {
        events: Mutex<Vec<String>>,
    }

    impl RecordingObserver {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
        fn push(&self, event: String) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl ISyncObserver for RecordingObserver {
        fn on_directory_created(&self, pair: &PathPair) {
            self.push(format!("mkdir {}", pair.relative));
        }
        fn on_file_copied(&self, pair: &PathPair, _bytes: u64) {
            self.push(format!("copy {}", pair.relative));
        }
        fn on_file_removed(&self, pair: &PathPair) {
            self.push(format!("rm {}", pair.relative));
        }
        fn on_pass_failed(&self, _error: &(dyn std::error::Error + 'static)) {
            self.push("failed".to_string());
        }
    }

    fn roots(tmp: &TempDir) -> (TreeRoot, TreeRoot) {
        let source = TreeRoot::new(tmp.path().join("source")).unwrap();
        let replica = TreeRoot::new(tmp.path().join("replica")).unwrap();
        (source, replica)
    }

    fn write(root: &TreeRoot, rel: &str, content: &str) {
        let path = root.as_path().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_options_from_config() {
        let config = SyncConfig {
            compare: CompareMode::Checksum,
            prune_directories: false,
            ..SyncConfig::default()
        };
        let options = ReconcileOptions::from(&config);
        assert_eq!(options.compare, CompareMode::Checksum);
        assert!(!options.prune_directories);
        assert_eq!(ReconcileOptions::default().compare, CompareMode::Always);
    }

    #[tokio::test]
    async fn test_events_follow_walk_order() {
        let tmp = TempDir::new().unwrap();
        let (source, replica) = roots(&tmp);
        write(&source, "b/y.txt", "world");
        write(&source, "a/x.txt", "hello");
        write(&source, "top.txt", "!");

        let observer = Arc::new(RecordingObserver::default());
        let reconciler = Reconciler::new(
            source,
            replica,
            ReconcileOptions::default(),
            Arc::new(LocalFileSystemAdapter::new()),
            observer.clone(),
        );

        reconciler.reconcile().await.unwrap();

        assert_eq!(
            observer.events(),
            vec![
                "mkdir .",
                "copy top.txt",
                "mkdir a",
                "copy a/x.txt",
                "mkdir b",
                "copy b/y.txt",
            ]
        );
    }

    #[tokio::test]
    async fn test_first_error_aborts_pass() {
        let tmp = TempDir::new().unwrap();
        let (source, replica) = roots(&tmp);
        write(&source, "a/poison", "nope");
        write(&source, "b/later.txt", "never copied");
        std::fs::create_dir_all(replica.as_path()).unwrap();
        write(&replica, "orphan.txt", "survives the failed pass");

        let observer = Arc::new(RecordingObserver::default());
        let reconciler = Reconciler::new(
            source,
            replica.clone(),
            ReconcileOptions::default(),
            Arc::new(PoisonedFileSystem {
                inner: LocalFileSystemAdapter::new(),
                poison: "poison",
            }),
            observer.clone(),
        );

        let err = reconciler.reconcile().await.unwrap_err();
        assert!(matches!(err, ReconcileError::Copy { .. }));
        assert_eq!(err.kind(), ErrorKind::PermissionDenied);

        // Walk stopped at the failure: b/ was never reached, prune never ran
        assert!(!replica.as_path().join("b").exists());
        assert!(replica.as_path().join("orphan.txt").exists());
        assert_eq!(observer.events().last().map(String::as_str), Some("failed"));
    }

    #[tokio::test]
    async fn test_check_roots_rejects_nested_replica() {
        let tmp = TempDir::new().unwrap();
        let source = TreeRoot::new(tmp.path().to_path_buf()).unwrap();
        let replica = TreeRoot::new(tmp.path().join("inside")).unwrap();

        let reconciler = Reconciler::new(
            source,
            replica.clone(),
            ReconcileOptions::default(),
            Arc::new(LocalFileSystemAdapter::new()),
            Arc::new(RecordingObserver::default()),
        );

        let err = reconciler.reconcile().await.unwrap_err();
        assert!(matches!(err, ReconcileError::OverlappingRoots { .. }));
        assert!(!replica.as_path().exists());
    }

    #[tokio::test]
    async fn test_check_roots_rejects_file_source() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("not-a-dir");
        std::fs::write(&file, "x").unwrap();

        let reconciler = Reconciler::new(
            TreeRoot::new(file).unwrap(),
            TreeRoot::new(tmp.path().join("replica")).unwrap(),
            ReconcileOptions::default(),
            Arc::new(LocalFileSystemAdapter::new()),
            Arc::new(RecordingObserver::default()),
        );

        let err = reconciler.check_roots().await.unwrap_err();
        assert!(matches!(err, ReconcileError::SourceNotDirectory(p) if p == tmp.path().join("not-a-dir")));
    }

    #[tokio::test]
    async fn test_check_roots_rejects_file_replica() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("source")).unwrap();
        std::fs::write(tmp.path().join("replica"), "x").unwrap();

        let reconciler = Reconciler::new(
            TreeRoot::new(tmp.path().join("source")).unwrap(),
            TreeRoot::new(tmp.path().join("replica")).unwrap(),
            ReconcileOptions::default(),
            Arc::new(LocalFileSystemAdapter::new()),
            Arc::new(RecordingObserver::default()),
        );

        let err = reconciler.reconcile().await.unwrap_err();
        assert!(matches!(err, ReconcileError::ReplicaNotDirectory(_)));
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(std::fs::read(tmp.path().join("replica")).unwrap(), b"x");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_check_roots_rejects_symlinked_replica() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("source")).unwrap();
        std::fs::create_dir(tmp.path().join("elsewhere")).unwrap();
        std::fs::write(tmp.path().join("elsewhere/keep.txt"), "keep").unwrap();
        std::os::unix::fs::symlink(tmp.path().join("elsewhere"), tmp.path().join("replica"))
            .unwrap();

        let reconciler = Reconciler::new(
            TreeRoot::new(tmp.path().join("source")).unwrap(),
            TreeRoot::new(tmp.path().join("replica")).unwrap(),
            ReconcileOptions::default(),
            Arc::new(LocalFileSystemAdapter::new()),
            Arc::new(RecordingObserver::default()),
        );

        let err = reconciler.reconcile().await.unwrap_err();
        assert!(matches!(err, ReconcileError::ReplicaNotDirectory(_)));
        // Neither the link nor its target was touched
        assert!(std::fs::symlink_metadata(tmp.path().join("replica"))
            .unwrap()
            .file_type()
            .is_symlink());
        assert_eq!(
            std::fs::read_to_string(tmp.path().join("elsewhere/keep.txt")).unwrap(),
            "keep"
        );
    }
}
