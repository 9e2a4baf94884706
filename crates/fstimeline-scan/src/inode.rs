//! Directory identity for symlink cycle detection.
//!
//! A walk that follows symlinks compares the [`DirKey`] of each directory it
//! enters against the keys of that directory's ancestors.

use std::fs::Metadata;
use std::path::{Path, PathBuf};

/// Identity of a visited directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DirKey {
    /// Device and inode pair.
    Inode { device: u64, inode: u64 },
    /// Canonical path, where inodes are unavailable.
    Path(PathBuf),
}

impl DirKey {
    /// Build the key for a directory.
    #[cfg(unix)]
    pub fn of(_path: &Path, metadata: &Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self::Inode {
            device: metadata.dev(),
            inode: metadata.ino(),
        }
    }

    /// Build the key for a directory.
    #[cfg(not(unix))]
    pub fn of(path: &Path, _metadata: &Metadata) -> Self {
        Self::Path(path.canonicalize().unwrap_or_else(|_| path.to_path_buf()))
    }
}
