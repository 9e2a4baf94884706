//! Timeline record types.

use std::path::Path;

use chrono::{DateTime, Local};
use compact_str::CompactString;
use serde::{Deserialize, Serialize};

/// Owner value recorded when the owning principal cannot be resolved.
pub const UNKNOWN_OWNER: &str = "unknown";

/// A point-in-time record describing one regular file.
///
/// Field names serialize in PascalCase so the JSON output matches the
/// `fileEvents.json` format consumed by the timeline viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileEvent {
    /// Base name of the file.
    pub name: CompactString,

    /// Absolute path of the file.
    pub path: String,

    /// Length in bytes.
    pub size: u64,

    /// Extension including the leading dot, empty if the file has none.
    #[serde(rename = "Type")]
    pub extension: CompactString,

    /// Creation (birth) time, if the filesystem reports one.
    pub creation_date: Option<DateTime<Local>>,

    /// Last modification time.
    pub last_modified_date: Option<DateTime<Local>>,

    /// Last access time.
    pub last_accessed_date: Option<DateTime<Local>>,

    /// Resolved owner, or [`UNKNOWN_OWNER`].
    pub owner: String,

    /// Audit notes describing how this record was produced.
    pub events: Vec<String>,
}

impl FileEvent {
    /// Whether the owner could not be resolved for this file.
    pub fn owner_unknown(&self) -> bool {
        self.owner == UNKNOWN_OWNER
    }
}

/// Execution event shape carried by the timeline format.
///
/// Scans never produce these; the type exists so consumers of the format can
/// share one definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExecutionEvent {
    pub time: DateTime<Local>,
    pub file_name: String,
    pub executing_user: String,
    pub command_line: String,
    pub process_id: String,
    pub parent_process_id: String,
}

/// Extension token of a file name, including the leading dot.
///
/// Dotfiles such as `.bashrc` have no extension.
pub fn extension_of(path: &Path) -> CompactString {
    match path.extension() {
        Some(ext) if !ext.is_empty() => {
            let mut token = CompactString::new(".");
            token.push_str(&ext.to_string_lossy());
            token
        }
        _ => CompactString::default(),
    }
}

/// Audit note recording when a file was processed.
pub fn processed_note(at: DateTime<Local>) -> String {
    format!("File processed at {}", at.format("%Y-%m-%d %H:%M:%S"))
}

/// Audit note recording the resolved owner.
pub fn owner_note(owner: &str) -> String {
    format!("Owner retrieved: {owner}")
}
