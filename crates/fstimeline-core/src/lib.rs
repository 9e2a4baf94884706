//! Core types for fstimeline.
//!
//! This crate provides the data structures shared across the fstimeline
//! workspace: the per-file [`FileEvent`] record, the [`Timeline`] produced by a
//! scan, scan configuration, error types, and the JSON export format.

mod config;
mod error;
mod event;
pub mod export;
mod timeline;

pub use config::{ScanConfig, ScanConfigBuilder};
pub use error::{ExportError, ScanError, ScanWarning, WarningKind};
pub use event::{ExecutionEvent, FileEvent, UNKNOWN_OWNER, extension_of, owner_note, processed_note};
pub use export::{DEFAULT_OUTPUT_FILE, default_output_path, read_events, write_events};
pub use timeline::{Timeline, TimelineStats};
