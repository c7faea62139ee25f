//! Local filesystem adapter (secondary/driven adapter)
//!
//! Implements [`ILocalFileSystem`] using `tokio::fs` for async file operations.
//!
//! ## Design Decisions
//!
//! - **Atomic copies**: Copies go to a hidden, uniquely named temporary
//!   sibling which is then renamed over the target, so a replica file is
//!   never half-written. The temporary file is created exclusively, so it can
//!   never clobber an existing entry, whatever that entry is called.
//! - **Timestamps**: Modified and accessed times are carried over from the
//!   source, on a blocking thread via `std::fs::File::set_times`.
//! - **No link following**: Entries are inspected with `symlink_metadata`, so
//!   a symlink is reported as [`EntryKind::Other`] rather than its target.
//! - **SHA-256**: Content digests are streamed through `sha2` in fixed-size
//!   chunks, so hashing large files does not load them into memory.

use std::ffi::OsString;
use std::fs::{File, FileTimes};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use chrono::DateTime;
use replisync_core::{
    domain::newtypes::FileHash,
    ports::local_filesystem::{DirEntryInfo, EntryKind, FileSystemState, ILocalFileSystem},
};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument};

/// Read buffer size used when hashing
const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// Prefix of in-flight copy targets
const TEMP_PREFIX: &str = ".replisync-";

// ============================================================================
// LocalFileSystemAdapter struct
// ============================================================================

/// Adapter that bridges the [`ILocalFileSystem`] port to the real filesystem.
///
/// This is a zero-sized struct because all operations derive their context
/// from the path arguments. The roots being mirrored live in the reconciler.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystemAdapter;

impl LocalFileSystemAdapter {
    /// Create a new `LocalFileSystemAdapter`.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn entry_kind(file_type: std::fs::FileType) -> EntryKind {
    if file_type.is_file() {
        EntryKind::File
    } else if file_type.is_dir() {
        EntryKind::Directory
    } else {
        EntryKind::Other
    }
}

/// Copies `from` into a fresh temporary file next to `to`, then renames it
/// over `to`
///
/// Bytes go first, then timestamps, then permissions, so a read-only source
/// does not stop us from setting times on the copy. The temporary file is
/// removed if any step fails.
fn copy_atomically(from: &Path, to: &Path) -> io::Result<u64> {
    let parent = to.parent().ok_or_else(|| {
        io::Error::new(
            ErrorKind::InvalidInput,
            format!("copy target has no parent directory: {}", to.display()),
        )
    })?;

    let metadata = std::fs::metadata(from)?;
    let mut reader = File::open(from)?;
    let mut temp = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(".tmp")
        .tempfile_in(parent)?;
    debug!(tmp_path = %temp.path().display(), "copying to temporary file");

    let bytes = io::copy(&mut reader, temp.as_file_mut())?;

    let mut times = FileTimes::new().set_modified(metadata.modified()?);
    if let Ok(accessed) = metadata.accessed() {
        times = times.set_accessed(accessed);
    }
    temp.as_file().set_times(times)?;
    std::fs::set_permissions(temp.path(), metadata.permissions())?;

    // Same directory, so the rename is atomic.
    temp.persist(to).map_err(|e| e.error)?;
    Ok(bytes)
}

// ============================================================================
// ILocalFileSystem implementation
// ============================================================================

#[async_trait::async_trait]
impl ILocalFileSystem for LocalFileSystemAdapter {
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn get_state(&self, path: &Path) -> anyhow::Result<FileSystemState> {
        let metadata = match tokio::fs::symlink_metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("path not found");
                return Ok(FileSystemState::not_found());
            }
            Err(e) => return Err(e.into()),
        };

        let kind = entry_kind(metadata.file_type());
        let size = if kind == EntryKind::File {
            metadata.len()
        } else {
            0
        };

        // Convert system modified time to DateTime<Utc>.
        let modified = metadata.modified().ok().and_then(|st| {
            st.duration_since(std::time::UNIX_EPOCH)
                .ok()
                .and_then(|dur| DateTime::from_timestamp(dur.as_secs() as i64, dur.subsec_nanos()))
        });

        debug!(?kind, size, "state retrieved");

        Ok(FileSystemState {
            exists: true,
            kind,
            size,
            modified,
        })
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn list_directory(&self, path: &Path) -> anyhow::Result<Vec<DirEntryInfo>> {
        let mut entries = tokio::fs::read_dir(path).await?;
        let mut listed = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            // DirEntry::file_type does not follow symlinks
            let file_type = entry.file_type().await?;
            listed.push(DirEntryInfo {
                name: entry.file_name(),
                kind: entry_kind(file_type),
            });
        }

        listed.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(entries = listed.len(), "directory listed");
        Ok(listed)
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn create_directory(&self, path: &Path) -> anyhow::Result<()> {
        debug!("creating directory");
        tokio::fs::create_dir_all(path).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(from = %from.display(), to = %to.display()))]
    async fn copy_file(&self, from: &Path, to: &Path) -> anyhow::Result<u64> {
        let (src, dst) = (from.to_path_buf(), to.to_path_buf());
        let bytes = tokio::task::spawn_blocking(move || copy_atomically(&src, &dst)).await??;

        debug!(bytes, "copy complete");
        Ok(bytes)
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn remove_file(&self, path: &Path) -> anyhow::Result<()> {
        debug!("removing file");
        tokio::fs::remove_file(path).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn remove_directory(&self, path: &Path) -> anyhow::Result<()> {
        debug!("removing directory recursively");
        tokio::fs::remove_dir_all(path).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn compute_hash(&self, path: &Path) -> anyhow::Result<FileHash> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; HASH_CHUNK_SIZE];

        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        let hash = FileHash::from_digest(&hasher.finalize())?;
        debug!(hash = %hash, "hash computed");
        Ok(hash)
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn resolve_path(&self, path: &Path) -> anyhow::Result<PathBuf> {
        let mut existing = path.to_path_buf();
        let mut missing: Vec<OsString> = Vec::new();

        loop {
            match tokio::fs::canonicalize(&existing).await {
                Ok(mut resolved) => {
                    resolved.extend(missing.iter().rev());
                    debug!(resolved = %resolved.display(), "path resolved");
                    return Ok(resolved);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    let Some(name) = existing.file_name().map(OsString::from) else {
                        return Err(e.into());
                    };
                    missing.push(name);
                    existing.pop();
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

// ============================================================================
// Unit tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime};

    use tempfile::TempDir;

    use super::*;

    fn write(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
        let p = dir.path().join(name);
        if let Some(parent) = p.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&p, content).unwrap();
        p
    }

    /// Names of in-flight copy files left in `dir`
    fn leftover_temp_files(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(TEMP_PREFIX))
            .collect()
    }

    // ------------------------------------------------------------------
    // get_state
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_get_state_existing_file() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystemAdapter::new();
        let path = write(&dir, "state.txt", b"twelve bytes");

        let state = fs.get_state(&path).await.unwrap();
        assert!(state.exists);
        assert!(state.is_regular_file());
        assert_eq!(state.size, 12);
        assert!(state.modified.is_some());
    }

    #[tokio::test]
    async fn test_get_state_existing_directory() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystemAdapter::new();

        let state = fs.get_state(dir.path()).await.unwrap();
        assert!(state.is_directory());
        assert_eq!(state.size, 0);
    }

    #[tokio::test]
    async fn test_get_state_not_found() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystemAdapter::new();

        let state = fs.get_state(&dir.path().join("nonexistent.txt")).await.unwrap();
        assert_eq!(state, FileSystemState::not_found());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_get_state_does_not_follow_symlinks() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystemAdapter::new();
        let target = write(&dir, "target.txt", b"data");
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let state = fs.get_state(&link).await.unwrap();
        assert!(state.exists);
        assert_eq!(state.kind, EntryKind::Other);
    }

    // ------------------------------------------------------------------
    // list_directory
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_list_directory_sorted_with_kinds() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystemAdapter::new();
        write(&dir, "b.txt", b"b");
        write(&dir, "a.txt", b"a");
        std::fs::create_dir(dir.path().join("c")).unwrap();

        let entries = fs.list_directory(dir.path()).await.unwrap();
        let names: Vec<_> = entries
            .iter()
            .map(|e| e.name.to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c"]);
        assert_eq!(entries[0].kind, EntryKind::File);
        assert_eq!(entries[2].kind, EntryKind::Directory);
    }

    #[tokio::test]
    async fn test_list_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystemAdapter::new();

        assert!(fs.list_directory(&dir.path().join("gone")).await.is_err());
    }

    // ------------------------------------------------------------------
    // copy_file
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_copy_file_copies_bytes() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystemAdapter::new();
        let src = write(&dir, "src.txt", b"hello");
        let dst = dir.path().join("dst.txt");

        let bytes = fs.copy_file(&src, &dst).await.unwrap();
        assert_eq!(bytes, 5);
        assert_eq!(std::fs::read(&dst).unwrap(), b"hello");
        assert!(leftover_temp_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_copy_file_overwrites_existing() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystemAdapter::new();
        let src = write(&dir, "src.txt", b"second");
        let dst = write(&dir, "dst.txt", b"first, and longer");

        fs.copy_file(&src, &dst).await.unwrap();
        assert_eq!(std::fs::read(&dst).unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_copy_file_preserves_mtime() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystemAdapter::new();
        let src = write(&dir, "old.txt", b"aged");
        let past = SystemTime::now() - Duration::from_secs(86_400 * 30);
        File::options()
            .write(true)
            .open(&src)
            .unwrap()
            .set_modified(past)
            .unwrap();
        let dst = dir.path().join("copy.txt");

        fs.copy_file(&src, &dst).await.unwrap();

        let src_mtime = std::fs::metadata(&src).unwrap().modified().unwrap();
        let dst_mtime = std::fs::metadata(&dst).unwrap().modified().unwrap();
        assert_eq!(src_mtime, dst_mtime);
    }

    #[tokio::test]
    async fn test_copy_missing_source_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystemAdapter::new();
        let dst = dir.path().join("dst.txt");

        assert!(fs.copy_file(&dir.path().join("missing"), &dst).await.is_err());
        assert!(!dst.exists());
        assert!(leftover_temp_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_copy_never_touches_sibling_with_temp_like_name() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystemAdapter::new();
        let src = write(&dir, "src/foo", b"foo");
        let bystanders = [
            write(&dir, "dst/.foo.replisync-tmp", b"keep me"),
            write(&dir, "dst/.replisync-.tmp", b"keep me too"),
        ];

        fs.copy_file(&src, &dir.path().join("dst/foo")).await.unwrap();

        assert_eq!(std::fs::read(dir.path().join("dst/foo")).unwrap(), b"foo");
        assert_eq!(std::fs::read(&bystanders[0]).unwrap(), b"keep me");
        assert_eq!(std::fs::read(&bystanders[1]).unwrap(), b"keep me too");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_copy_carries_read_only_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystemAdapter::new();
        let src = write(&dir, "ro.txt", b"locked");
        std::fs::set_permissions(&src, std::fs::Permissions::from_mode(0o444)).unwrap();
        let dst = dir.path().join("ro-copy.txt");

        fs.copy_file(&src, &dst).await.unwrap();

        let mode = std::fs::metadata(&dst).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o444);
    }

    // ------------------------------------------------------------------
    // remove
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_remove_file() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystemAdapter::new();
        let path = write(&dir, "to_delete.txt", b"bye");

        fs.remove_file(&path).await.unwrap();
        assert!(!fs.get_state(&path).await.unwrap().exists);
    }

    #[tokio::test]
    async fn test_remove_directory_recursively() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystemAdapter::new();
        write(&dir, "sub/deeper/file.txt", b"data");
        let sub = dir.path().join("sub");

        fs.remove_directory(&sub).await.unwrap();
        assert!(!fs.get_state(&sub).await.unwrap().exists);
    }

    // ------------------------------------------------------------------
    // create_directory
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_create_directory_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystemAdapter::new();
        let path = dir.path().join("new/deep/dir");

        fs.create_directory(&path).await.unwrap();
        fs.create_directory(&path).await.unwrap();
        assert!(fs.get_state(&path).await.unwrap().is_directory());
    }

    // ------------------------------------------------------------------
    // compute_hash
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_compute_hash_known_value() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystemAdapter::new();
        let path = write(&dir, "empty.txt", b"");

        let hash = fs.compute_hash(&path).await.unwrap();
        assert_eq!(
            hash.as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[tokio::test]
    async fn test_compute_hash_different_for_different_content() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystemAdapter::new();
        let p1 = write(&dir, "a.txt", b"aaa");
        let p2 = write(&dir, "b.txt", b"bbb");

        let h1 = fs.compute_hash(&p1).await.unwrap();
        let h2 = fs.compute_hash(&p2).await.unwrap();
        assert_ne!(h1, h2);
        assert_eq!(h1, fs.compute_hash(&p1).await.unwrap());
    }

    // ------------------------------------------------------------------
    // resolve_path
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_resolve_path_keeps_missing_tail() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystemAdapter::new();
        let base = std::fs::canonicalize(dir.path()).unwrap();

        let resolved = fs
            .resolve_path(&dir.path().join("not/yet/there"))
            .await
            .unwrap();
        assert_eq!(resolved, base.join("not/yet/there"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolve_path_follows_symlinked_ancestor() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFileSystemAdapter::new();
        std::fs::create_dir(dir.path().join("real")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("link")).unwrap();
        let base = std::fs::canonicalize(dir.path()).unwrap();

        let resolved = fs
            .resolve_path(&dir.path().join("link/mirror"))
            .await
            .unwrap();
        assert_eq!(resolved, base.join("real/mirror"));
    }
}
