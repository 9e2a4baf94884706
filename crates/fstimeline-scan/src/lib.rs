//! File system traversal engine for fstimeline.
//!
//! This crate walks a directory tree in parallel and turns every regular file
//! into a [`FileEvent`] carrying its size, timestamps and owner.
//!
//! # Overview
//!
//! - **Parallel traversal** on a fixed rayon pool fed by a frontier of directory jobs
//! - **Owner resolution** behind the [`OwnerResolver`] trait
//! - **Failure isolation**: unreadable files and directories become warnings
//! - **Progress updates** via broadcast channels
//! - **Cancellation** via [`CancellationToken`](tokio_util::sync::CancellationToken)
//!   or a configured timeout
//!
//! # Example
//!
//! ```rust,no_run
//! use fstimeline_scan::{ScanConfig, Walker};
//!
//! let config = ScanConfig::new("/path/to/scan");
//! let walker = Walker::new(config).unwrap();
//! let timeline = walker.scan().unwrap();
//!
//! println!("Files: {}", timeline.total_files());
//! println!("Warnings: {}", timeline.warnings.len());
//! ```
//!
//! # Progress Monitoring
//!
//! ```rust,no_run
//! use fstimeline_scan::{ScanConfig, Walker};
//!
//! let walker = Walker::new(ScanConfig::new("/srv")).unwrap();
//! let mut progress_rx = walker.subscribe();
//!
//! std::thread::spawn(move || {
//!     while let Ok(progress) = progress_rx.blocking_recv() {
//!         println!("Scanned {} files", progress.files_scanned);
//!     }
//! });
//! ```

mod aggregate;
mod extract;
mod inode;
pub mod owner;
mod progress;
mod walker;

pub use aggregate::{Aggregator, AggregatorSink};
pub use extract::MetadataExtractor;
pub use inode::DirKey;
pub use owner::{NoopOwnerResolver, OwnerError, OwnerResolver, default_resolver};
pub use progress::ScanProgress;
pub use walker::Walker;

// Re-export core types for convenience
pub use fstimeline_core::{
    FileEvent, ScanConfig, ScanError, ScanWarning, Timeline, TimelineStats, WarningKind,
};
