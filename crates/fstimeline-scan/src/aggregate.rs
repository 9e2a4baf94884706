//! Result aggregation.
//!
//! Workers never share a locked vector. Each one holds an [`AggregatorSink`]
//! and pushes records and warnings into a channel; the [`Aggregator`] drains
//! it once the walk has finished.

use crossbeam_channel::{Receiver, Sender, unbounded};

use fstimeline_core::{FileEvent, ScanWarning};

/// One item produced by a worker.
#[derive(Debug)]
enum Collected {
    Record(Box<FileEvent>),
    Warning(ScanWarning),
}

/// Collects records and warnings from any number of workers.
#[derive(Debug)]
pub struct Aggregator {
    tx: Sender<Collected>,
    rx: Receiver<Collected>,
}

/// Cloneable handle workers use to submit results.
#[derive(Debug, Clone)]
pub struct AggregatorSink {
    tx: Sender<Collected>,
}

impl Aggregator {
    /// Create an empty aggregator.
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Get a sink for a worker.
    pub fn sink(&self) -> AggregatorSink {
        AggregatorSink {
            tx: self.tx.clone(),
        }
    }

    /// Drain everything submitted so far.
    ///
    /// Every sink must have been dropped first; the call returns once the
    /// channel is disconnected.
    pub fn finish(self) -> (Vec<FileEvent>, Vec<ScanWarning>) {
        let Self { tx, rx } = self;
        drop(tx);

        let mut records = Vec::with_capacity(rx.len());
        let mut warnings = Vec::new();
        for item in rx {
            match item {
                Collected::Record(event) => records.push(*event),
                Collected::Warning(warning) => warnings.push(warning),
            }
        }
        (records, warnings)
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl AggregatorSink {
    /// Submit a file record.
    pub fn record(&self, event: FileEvent) {
        // The receiver lives in the aggregator, which outlives every sink.
        let _ = self.tx.send(Collected::Record(Box::new(event)));
    }

    /// Submit a warning.
    pub fn warn(&self, warning: ScanWarning) {
        let _ = self.tx.send(Collected::Warning(warning));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use fstimeline_core::WarningKind;

    fn event(path: &str) -> FileEvent {
        FileEvent {
            name: path.rsplit('/').next().unwrap_or(path).into(),
            path: path.to_string(),
            size: 1,
            extension: "".into(),
            creation_date: None,
            last_modified_date: Some(Local::now()),
            last_accessed_date: None,
            owner: "unknown".to_string(),
            events: Vec::new(),
        }
    }

    #[test]
    fn test_collects_from_many_threads() {
        let aggregator = Aggregator::new();

        std::thread::scope(|scope| {
            for t in 0..4 {
                let sink = aggregator.sink();
                scope.spawn(move || {
                    for i in 0..250 {
                        sink.record(event(&format!("/t{t}/f{i}")));
                    }
                    sink.warn(ScanWarning::permission_denied(format!("/t{t}/locked")));
                });
            }
        });

        let (records, warnings) = aggregator.finish();
        assert_eq!(records.len(), 1000);
        assert_eq!(warnings.len(), 4);
        assert!(warnings.iter().all(|w| w.kind == WarningKind::PermissionDenied));

        let mut paths: Vec<_> = records.iter().map(|r| r.path.as_str()).collect();
        paths.sort_unstable();
        paths.dedup();
        assert_eq!(paths.len(), 1000);
    }

    #[test]
    fn test_empty_finish() {
        let (records, warnings) = Aggregator::new().finish();
        assert!(records.is_empty());
        assert!(warnings.is_empty());
    }
}
