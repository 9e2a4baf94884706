//! Scan result container and statistics.

use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::error::ScanWarning;
use crate::event::FileEvent;

/// Summary statistics for a timeline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineStats {
    /// Total number of file records.
    pub total_files: u64,
    /// Total number of directories traversed (including the root).
    pub total_dirs: u64,
    /// Sum of all file sizes in bytes.
    pub total_size: u64,
    /// Deepest directory level reached (root = 0).
    pub max_depth: u32,
    /// Records whose owner could not be resolved.
    pub unknown_owners: u64,
    /// Largest file (path, size).
    pub largest_file: Option<(String, u64)>,
    /// Earliest modification time seen.
    pub earliest_modified: Option<DateTime<Local>>,
    /// Latest modification time seen.
    pub latest_modified: Option<DateTime<Local>>,
    /// Number of isolated failures recorded.
    pub warning_count: u64,
}

impl TimelineStats {
    /// Create new empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Update stats with a file record.
    pub fn record_file(&mut self, event: &FileEvent) {
        self.total_files += 1;
        self.total_size += event.size;
        if event.owner_unknown() {
            self.unknown_owners += 1;
        }

        if self.largest_file.as_ref().is_none_or(|(_, s)| event.size > *s) {
            self.largest_file = Some((event.path.clone(), event.size));
        }

        if let Some(modified) = event.last_modified_date {
            if self.earliest_modified.is_none_or(|t| modified < t) {
                self.earliest_modified = Some(modified);
            }
            if self.latest_modified.is_none_or(|t| modified > t) {
                self.latest_modified = Some(modified);
            }
        }
    }

    /// Record traversed directories and the deepest level reached.
    pub fn record_dirs(&mut self, count: u64, max_depth: u32) {
        self.total_dirs += count;
        self.max_depth = self.max_depth.max(max_depth);
    }
}

/// Complete result of one scan: the forensic timeline plus its diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeline {
    /// Root path that was scanned.
    pub root: PathBuf,

    /// When this scan finished.
    pub scanned_at: SystemTime,

    /// Duration of the scan.
    pub scan_duration: Duration,

    /// One record per regular file, in no particular order.
    pub events: Vec<FileEvent>,

    /// Isolated failures encountered during the scan.
    pub warnings: Vec<ScanWarning>,

    /// Summary statistics.
    pub stats: TimelineStats,

    /// Whether the scan was cancelled before completing.
    pub cancelled: bool,
}

impl Timeline {
    /// Create a new timeline, computing file statistics from the events.
    pub fn new(
        root: PathBuf,
        events: Vec<FileEvent>,
        warnings: Vec<ScanWarning>,
        scan_duration: Duration,
        cancelled: bool,
    ) -> Self {
        let mut stats = TimelineStats::new();
        for event in &events {
            stats.record_file(event);
        }
        stats.warning_count = warnings.len() as u64;

        Self {
            root,
            scanned_at: SystemTime::now(),
            scan_duration,
            events,
            warnings,
            stats,
            cancelled,
        }
    }

    /// Get the total number of file records.
    pub fn total_files(&self) -> u64 {
        self.stats.total_files
    }

    /// Get the total size of all files.
    pub fn total_size(&self) -> u64 {
        self.stats.total_size
    }

    /// Check if there were any warnings during scanning.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Whether every reachable file was visited.
    pub fn is_complete(&self) -> bool {
        !self.cancelled
    }

    /// Sort records by path for stable output.
    pub fn sort_by_path(&mut self) {
        self.events.sort_by(|a, b| a.path.cmp(&b.path));
    }

    /// Find a record by its path.
    pub fn find(&self, path: &str) -> Option<&FileEvent> {
        self.events.iter().find(|e| e.path == path)
    }
}
