use fstimeline_core::{
    ExecutionEvent, FileEvent, ScanConfig, ScanError, ScanWarning, Timeline, UNKNOWN_OWNER,
    WarningKind, extension_of, owner_note, processed_note, read_events, write_events,
};
use chrono::Local;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

fn file_event(path: &str, size: u64, owner: &str) -> FileEvent {
    let p = Path::new(path);
    FileEvent {
        name: p.file_name().unwrap().to_string_lossy().as_ref().into(),
        path: path.to_string(),
        size,
        extension: extension_of(p),
        creation_date: Some(Local::now()),
        last_modified_date: Some(Local::now()),
        last_accessed_date: Some(Local::now()),
        owner: owner.to_string(),
        events: vec![processed_note(Local::now()), owner_note(owner)],
    }
}

#[test]
fn test_file_event_json_shape() {
    let event = file_event("/evidence/report.pdf", 2048, "alice");
    let value = serde_json::to_value(&event).unwrap();
    let object = value.as_object().unwrap();

    let mut keys: Vec<&str> = object.keys().map(|k| k.as_str()).collect();
    keys.sort_unstable();
    assert_eq!(
        keys,
        vec![
            "CreationDate",
            "Events",
            "LastAccessedDate",
            "LastModifiedDate",
            "Name",
            "Owner",
            "Path",
            "Size",
            "Type",
        ]
    );
    assert_eq!(object["Type"], ".pdf");
    assert_eq!(object["Size"], 2048);
    assert_eq!(object["Events"][1], "Owner retrieved: alice");
}

#[test]
fn test_missing_timestamp_serializes_as_null() {
    let mut event = file_event("/evidence/no_birth", 0, UNKNOWN_OWNER);
    event.creation_date = None;

    let value = serde_json::to_value(&event).unwrap();
    assert!(value["CreationDate"].is_null());
    assert_eq!(value["Type"], "");
    assert!(event.owner_unknown());
}

#[test]
fn test_execution_event_shape() {
    let event = ExecutionEvent {
        time: Local::now(),
        file_name: "tool.exe".to_string(),
        executing_user: "CORP\\bob".to_string(),
        command_line: "tool.exe --run".to_string(),
        process_id: "4242".to_string(),
        parent_process_id: "1".to_string(),
    };

    let value = serde_json::to_value(&event).unwrap();
    for key in [
        "Time",
        "FileName",
        "ExecutingUser",
        "CommandLine",
        "ProcessId",
        "ParentProcessId",
    ] {
        assert!(value.get(key).is_some(), "missing {key}");
    }
}

#[test]
fn test_export_roundtrip_preserves_identity_fields() {
    let temp = TempDir::new().unwrap();
    let out = temp.path().join("fileEvents.json");
    let events = vec![
        file_event("/scan/a.txt", 10, "alice"),
        file_event("/scan/b.txt", 0, "bob"),
        file_event("/scan/sub/c.txt", 5, UNKNOWN_OWNER),
    ];

    write_events(&events, &out).unwrap();
    let back = read_events(&out).unwrap();

    let identity = |e: &FileEvent| (e.name.to_string(), e.path.clone(), e.size, e.extension.to_string());
    assert_eq!(
        back.iter().map(identity).collect::<Vec<_>>(),
        events.iter().map(identity).collect::<Vec<_>>()
    );
}

#[test]
fn test_timeline_with_warnings() {
    let warnings = vec![
        ScanWarning::permission_denied("/scan/locked"),
        ScanError::NotFound {
            path: PathBuf::from("/scan/vanished.txt"),
        }
        .into_warning("/scan"),
    ];
    let timeline = Timeline::new(
        PathBuf::from("/scan"),
        vec![file_event("/scan/a.txt", 10, "alice")],
        warnings,
        Duration::from_millis(5),
        false,
    );

    assert!(timeline.has_warnings());
    assert_eq!(timeline.warnings[1].kind, WarningKind::NotFound);
    assert_eq!(timeline.total_files(), 1);
    assert_eq!(timeline.total_size(), 10);
}

#[test]
fn test_scan_config_builder() {
    let config = ScanConfig::builder()
        .root("/test/path")
        .max_depth(Some(5))
        .include_hidden(false)
        .follow_symlinks(true)
        .resolve_owners(false)
        .timeout(Some(Duration::from_secs(30)))
        .ignore_patterns(vec!["*.tmp".to_string(), ".DS_Store".to_string()])
        .exclude_paths(vec![PathBuf::from("/test/path/fileEvents.json")])
        .build()
        .unwrap();

    assert_eq!(config.root.to_str().unwrap(), "/test/path");
    assert_eq!(config.max_depth, Some(5));
    assert!(!config.include_hidden);
    assert!(config.follow_symlinks);
    assert!(!config.resolve_owners);
    assert_eq!(config.timeout, Some(Duration::from_secs(30)));

    let matcher = config.ignore_matcher().unwrap();
    assert!(matcher.is_match("file.tmp"));
    assert!(matcher.is_match(".DS_Store"));
    assert!(!matcher.is_match("normal.txt"));
    assert!(config.is_excluded(Path::new("/test/path/fileEvents.json")));

    let default_config = ScanConfig::new("/default");
    assert_eq!(default_config.max_depth, None);
    assert!(default_config.include_hidden);
    assert!(!default_config.follow_symlinks);
    assert!(default_config.resolve_owners);
}

#[test]
fn test_scan_config_serde_defaults() {
    let config: ScanConfig = serde_json::from_str(r#"{ "root": "/srv" }"#).unwrap();
    assert_eq!(config.root, PathBuf::from("/srv"));
    assert!(config.include_hidden);
    assert!(config.resolve_owners);
    assert!(config.ignore_patterns.is_empty());
}
