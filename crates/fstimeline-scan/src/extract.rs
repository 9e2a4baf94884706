//! Per-file metadata extraction.

use std::fs::{self, Metadata};
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Local};
use compact_str::CompactString;
use tracing::debug;

use fstimeline_core::{
    FileEvent, ScanConfig, ScanError, UNKNOWN_OWNER, extension_of, owner_note, processed_note,
};

use crate::owner::{OwnerResolver, default_resolver};

/// Builds one [`FileEvent`] from a single metadata read.
#[derive(Clone)]
pub struct MetadataExtractor {
    resolver: Arc<dyn OwnerResolver>,
    follow_symlinks: bool,
}

impl MetadataExtractor {
    /// Create an extractor using the given owner resolver.
    pub fn new(resolver: Arc<dyn OwnerResolver>, follow_symlinks: bool) -> Self {
        Self {
            resolver,
            follow_symlinks,
        }
    }

    /// Create an extractor for a scan configuration, with the platform resolver.
    pub fn from_config(config: &ScanConfig) -> Self {
        Self::new(default_resolver(config), config.follow_symlinks)
    }

    /// The owner resolver in use.
    pub fn resolver(&self) -> &dyn OwnerResolver {
        self.resolver.as_ref()
    }

    /// Extract the record for a regular file.
    pub fn extract(&self, path: &Path) -> Result<FileEvent, ScanError> {
        let metadata = if self.follow_symlinks {
            fs::metadata(path)
        } else {
            fs::symlink_metadata(path)
        }
        .map_err(|e| ScanError::io(path, e))?;

        self.extract_with(path, &metadata)
    }

    /// Build the record from metadata the caller already holds.
    pub fn extract_with(&self, path: &Path, metadata: &Metadata) -> Result<FileEvent, ScanError> {
        if !metadata.is_file() {
            return Err(ScanError::NotAFile {
                path: path.to_path_buf(),
            });
        }

        let owner = match self.resolver.resolve(path, metadata) {
            Ok(owner) => owner,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "owner unresolved");
                UNKNOWN_OWNER.to_string()
            }
        };

        let name = path
            .file_name()
            .map(|n| CompactString::new(n.to_string_lossy()))
            .unwrap_or_default();

        let events = vec![processed_note(Local::now()), owner_note(&owner)];

        Ok(FileEvent {
            name,
            path: path.to_string_lossy().into_owned(),
            size: metadata.len(),
            extension: extension_of(path),
            creation_date: local(metadata.created()),
            last_modified_date: local(metadata.modified()),
            last_accessed_date: local(metadata.accessed()),
            owner,
            events,
        })
    }
}

fn local(time: std::io::Result<SystemTime>) -> Option<DateTime<Local>> {
    time.ok().map(DateTime::<Local>::from)
}
