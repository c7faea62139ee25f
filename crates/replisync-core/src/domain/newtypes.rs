//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for the paths and values the
//! reconciler works with. Each newtype ensures data validity at construction time.

use std::ffi::OsStr;
use std::fmt::{self, Display, Formatter};
use std::path::{Component, Path, PathBuf};

use super::errors::DomainError;

// ============================================================================
// Tree roots
// ============================================================================

/// A validated absolute path naming the root of a directory tree
///
/// TreeRoot ensures the path is:
/// - Absolute (starts with /)
/// - Normalized (no . or .. components)
///
/// The directory itself does not have to exist: a replica root is created
/// on the first pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TreeRoot(PathBuf);

impl TreeRoot {
    /// Create a new TreeRoot, validating it is absolute
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPath` if the path is not absolute or
    /// escapes the filesystem root via `..`
    pub fn new(path: PathBuf) -> Result<Self, DomainError> {
        if !path.is_absolute() {
            return Err(DomainError::InvalidPath(format!(
                "Path must be absolute: {}",
                path.display()
            )));
        }

        // We don't use fs::canonicalize() as the path might not exist yet
        let normalized = normalize_path(&path)?;
        Ok(Self(normalized))
    }

    /// Create a TreeRoot from a possibly relative path, anchoring it at `base`
    ///
    /// # Errors
    /// Returns error if the anchored path cannot be normalized
    pub fn resolve(path: &Path, base: &Path) -> Result<Self, DomainError> {
        if path.is_absolute() {
            Self::new(path.to_path_buf())
        } else {
            Self::new(base.join(path))
        }
    }

    /// Get the inner path reference
    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Absolute path of `relative` inside this tree
    #[must_use]
    pub fn join(&self, relative: &RelativePath) -> PathBuf {
        if relative.is_root() {
            self.0.clone()
        } else {
            self.0.join(relative.as_path())
        }
    }

    /// Whether `other` is this root or lies anywhere beneath it
    #[must_use]
    pub fn contains(&self, other: &TreeRoot) -> bool {
        other.0.starts_with(&self.0)
    }

    /// Whether walking one of the two trees would also walk the other
    #[must_use]
    pub fn overlaps(&self, other: &TreeRoot) -> bool {
        self.contains(other) || other.contains(self)
    }
}

impl Display for TreeRoot {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl AsRef<Path> for TreeRoot {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

/// Normalize an absolute path by resolving . and .. components
fn normalize_path(path: &Path) -> Result<PathBuf, DomainError> {
    let mut normalized = PathBuf::new();

    for component in path.components() {
        match component {
            Component::Prefix(p) => normalized.push(p.as_os_str()),
            Component::RootDir => normalized.push(Component::RootDir.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(DomainError::InvalidPath(
                        "Path escapes root via ..".to_string(),
                    ));
                }
            }
            Component::Normal(c) => normalized.push(c),
        }
    }

    Ok(normalized)
}

// ============================================================================
// Relative paths
// ============================================================================

/// A path relative to a tree root
///
/// Never absolute and never contains `..`, so joining it onto any
/// [`TreeRoot`] stays inside that root. The empty relative path denotes
/// the root itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RelativePath(PathBuf);

impl RelativePath {
    /// Create a new RelativePath
    ///
    /// # Errors
    /// Returns `DomainError::InvalidPath` if the path is absolute or
    /// contains a `..` component
    pub fn new(path: PathBuf) -> Result<Self, DomainError> {
        let mut normalized = PathBuf::new();

        for component in path.components() {
            match component {
                Component::CurDir => {}
                Component::Normal(c) => normalized.push(c),
                Component::ParentDir => {
                    return Err(DomainError::InvalidPath(format!(
                        "Relative path must not contain '..': {}",
                        path.display()
                    )));
                }
                Component::Prefix(_) | Component::RootDir => {
                    return Err(DomainError::InvalidPath(format!(
                        "Relative path must not be absolute: {}",
                        path.display()
                    )));
                }
            }
        }

        Ok(Self(normalized))
    }

    /// The relative path of a tree root itself
    #[must_use]
    pub fn root() -> Self {
        Self(PathBuf::new())
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.as_os_str().is_empty()
    }

    #[must_use]
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Append a single directory entry name
    ///
    /// # Errors
    /// Returns error if `name` is not a single normal path component
    pub fn child(&self, name: &OsStr) -> Result<Self, DomainError> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(c)), None) => Ok(Self(self.0.join(c))),
            _ => Err(DomainError::InvalidPath(format!(
                "Invalid entry name: {}",
                Path::new(name).display()
            ))),
        }
    }
}

impl Display for RelativePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, ".")
        } else {
            write!(f, "{}", self.0.display())
        }
    }
}

impl TryFrom<PathBuf> for RelativePath {
    type Error = DomainError;

    fn try_from(path: PathBuf) -> Result<Self, Self::Error> {
        Self::new(path)
    }
}

// ============================================================================
// Path pairs
// ============================================================================

/// Corresponding locations of one relative path in the source and replica trees
///
/// Derived purely by joining the same relative path onto both roots; nothing
/// about the pairing is stored between passes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPair {
    pub relative: RelativePath,
    pub source: PathBuf,
    pub replica: PathBuf,
}

impl PathPair {
    #[must_use]
    pub fn new(source_root: &TreeRoot, replica_root: &TreeRoot, relative: RelativePath) -> Self {
        Self {
            source: source_root.join(&relative),
            replica: replica_root.join(&relative),
            relative,
        }
    }

    /// Pair for the entry `name` inside this pair's directory
    ///
    /// # Errors
    /// Returns error if `name` is not a single path component
    pub fn child(&self, name: &OsStr) -> Result<Self, DomainError> {
        let relative = self.relative.child(name)?;
        Ok(Self {
            source: self.source.join(name),
            replica: self.replica.join(name),
            relative,
        })
    }
}

// ============================================================================
// Content hashes
// ============================================================================

/// SHA-256 content digest in lowercase hexadecimal
///
/// Used by the checksum comparison mode to decide whether a replica file
/// already matches its source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileHash(String);

impl FileHash {
    /// Length of a hex-encoded SHA-256 digest
    const HEX_LEN: usize = 64;

    /// Create a new FileHash
    ///
    /// # Errors
    /// Returns error if the hash is not 64 lowercase hex characters
    pub fn new(hash: String) -> Result<Self, DomainError> {
        if hash.len() != Self::HEX_LEN {
            return Err(DomainError::InvalidHash(format!(
                "Hash has wrong length: expected {} characters, got {}",
                Self::HEX_LEN,
                hash.len()
            )));
        }

        if !hash
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        {
            return Err(DomainError::InvalidHash(format!(
                "Hash is not lowercase hex: {hash}"
            )));
        }

        Ok(Self(hash))
    }

    /// Build a FileHash from raw digest bytes
    ///
    /// # Errors
    /// Returns error if `digest` is not 32 bytes long
    pub fn from_digest(digest: &[u8]) -> Result<Self, DomainError> {
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        Self::new(hex)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FileHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
