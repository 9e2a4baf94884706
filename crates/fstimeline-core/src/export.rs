//! JSON export of timeline records.
//!
//! The output is a pretty-printed JSON array of [`FileEvent`] objects, the
//! format read back by the serving mode and any other consumer.

use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::ExportError;
use crate::event::FileEvent;

/// File name of the timeline output.
pub const DEFAULT_OUTPUT_FILE: &str = "fileEvents.json";

/// Default output location for a scan root.
pub fn default_output_path(root: &Path) -> PathBuf {
    root.join(DEFAULT_OUTPUT_FILE)
}

/// Write events as an indented JSON array.
///
/// The data is written to a temporary sibling first and renamed into place, so
/// a failed write never leaves a truncated timeline behind.
pub fn write_events(events: &[FileEvent], path: &Path) -> Result<(), ExportError> {
    let io_err = |source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    };

    let tmp_path = temp_path(path);
    let file = fs::File::create(&tmp_path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);

    let result = serde_json::to_writer_pretty(&mut writer, events)
        .map_err(|source| ExportError::Serialize {
            path: path.to_path_buf(),
            source,
        })
        .and_then(|()| writer.flush().map_err(io_err));

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp_path);
        return Err(e);
    }
    drop(writer);

    fs::rename(&tmp_path, path).map_err(|source| {
        let _ = fs::remove_file(&tmp_path);
        io_err(source)
    })
}

/// Read events previously written by [`write_events`].
pub fn read_events(path: &Path) -> Result<Vec<FileEvent>, ExportError> {
    let file = fs::File::open(path).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| ExportError::Serialize {
        path: path.to_path_buf(),
        source,
    })
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use compact_str::CompactString;
    use tempfile::TempDir;

    fn sample() -> FileEvent {
        FileEvent {
            name: CompactString::new("a.txt"),
            path: "/scan/a.txt".to_string(),
            size: 10,
            extension: CompactString::new(".txt"),
            creation_date: None,
            last_modified_date: Some(chrono::Local::now()),
            last_accessed_date: Some(chrono::Local::now()),
            owner: "alice".to_string(),
            events: vec!["Owner retrieved: alice".to_string()],
        }
    }

    #[test]
    fn test_write_uses_pascal_case_fields() {
        let temp = TempDir::new().unwrap();
        let out = default_output_path(temp.path());

        write_events(&[sample()], &out).unwrap();
        let text = fs::read_to_string(&out).unwrap();

        for field in [
            "\"Name\"",
            "\"Path\"",
            "\"Size\"",
            "\"Type\"",
            "\"CreationDate\"",
            "\"LastModifiedDate\"",
            "\"LastAccessedDate\"",
            "\"Owner\"",
            "\"Events\"",
        ] {
            assert!(text.contains(field), "missing {field}");
        }
        // Indented output
        assert!(text.contains("\n  "));
        assert!(!temp_path(&out).exists());
    }

    #[test]
    fn test_empty_array() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("empty.json");

        write_events(&[], &out).unwrap();
        assert_eq!(fs::read_to_string(&out).unwrap().trim(), "[]");
        assert!(read_events(&out).unwrap().is_empty());
    }

    #[test]
    fn test_read_back() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("events.json");
        let event = sample();

        write_events(std::slice::from_ref(&event), &out).unwrap();
        let back = read_events(&out).unwrap();
        assert_eq!(back, vec![event]);
    }

    #[test]
    fn test_write_to_missing_dir_reports_path() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("missing").join("events.json");

        let err = write_events(&[sample()], &out).unwrap_err();
        assert_eq!(err.path(), &out);
    }
}
