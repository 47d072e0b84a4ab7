use metafiler::engine::tools::path_to_db_string;
use metafiler::engine::{
    FieldFilter, FileInfoExtractor, FilteredExtractor, MetadataExtractor, PathFilter, glob_match,
};
use metafiler::utils::{
    Config, IndexerConfig, StorageConfig, apply_env_overrides, is_valid_collection_name,
    parse_config, parse_rename, workers_within,
};
use metafiler::{LiveDispatch, Metadata, MetafilerError, RegisterMsg};
use notify::event::{
    AccessKind, AccessMode, CreateKind, DataChange, EventKind, MetadataKind, ModifyKind,
    RemoveKind, RenameMode,
};
use notify::Event;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

fn event(kind: EventKind, paths: &[&str]) -> Event {
    paths
        .iter()
        .fold(Event::new(kind), |ev, p| ev.add_path(PathBuf::from(p)))
}

fn meta(pairs: &[(&str, &str)]) -> Metadata {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

// --- glob_match ---

#[test]
fn test_glob_match_star_and_question() {
    assert!(glob_match("*.dcm", "scan.dcm"));
    assert!(!glob_match("*.dcm", "scan.txt"));
    assert!(glob_match("img_??.png", "img_01.png"));
    assert!(!glob_match("img_??.png", "img_1.png"));
    assert!(glob_match("*", ""));
    assert!(glob_match("a*b*c", "a-xx-b-yy-c"));
}

// --- PathFilter ---

#[test]
fn test_path_filter_empty_accepts_everything_but_os_junk() {
    let filter = PathFilter::default();
    assert!(filter.accepts_file(Path::new("/data/a.dcm")));
    assert!(!filter.accepts_file(Path::new("/data/.DS_Store")));
    assert!(!filter.accepts_file(Path::new("/data/._a.dcm")));
    assert!(filter.accepts_dir(Path::new("/data/sub"), Path::new("/data")));
}

#[test]
fn test_path_filter_includes_and_excludes() {
    let filter = PathFilter {
        file_includes: vec!["*.dcm".into()],
        file_excludes: vec!["*_tmp.dcm".into()],
        ..PathFilter::default()
    };
    assert!(filter.accepts_file(Path::new("/data/a.dcm")));
    assert!(!filter.accepts_file(Path::new("/data/a.txt")));
    assert!(!filter.accepts_file(Path::new("/data/a_tmp.dcm")));
}

#[test]
fn test_path_filter_directory_excludes_never_reject_root() {
    let filter = PathFilter {
        directory_excludes: vec![".git".into(), "data".into()],
        ..PathFilter::default()
    };
    let root = Path::new("/data");
    assert!(filter.accepts_dir(root, root));
    assert!(!filter.accepts_dir(Path::new("/data/.git"), root));
    assert!(filter.accepts_dir(Path::new("/data/src"), root));
}

#[test]
fn test_path_filter_full_path_pattern() {
    let filter = PathFilter {
        file_excludes: vec!["/data/private/*".into()],
        ..PathFilter::default()
    };
    assert!(!filter.accepts_file(Path::new("/data/private/a.dcm")));
    assert!(filter.accepts_file(Path::new("/data/public/a.dcm")));
}

#[test]
fn test_path_filter_ignores_database_and_sidecars() {
    let mut filter = PathFilter::default();
    filter.ignore_database(Path::new("/data/metafiler.db"));
    assert!(!filter.accepts_file(Path::new("/data/metafiler.db")));
    assert!(!filter.accepts_file(Path::new("/data/metafiler.db-wal")));
    assert!(!filter.accepts_file(Path::new("/data/metafiler.db-shm")));
    assert!(filter.accepts_file(Path::new("/data/other.db")));
}

#[test]
fn test_path_to_db_string_normalizes_backslashes() {
    assert_eq!(
        path_to_db_string(&PathBuf::from("data\\a.dcm")),
        "data/a.dcm"
    );
}

// --- RegisterMsg ---

#[test]
fn test_scan_sentinel() {
    assert!(RegisterMsg::scan_sentinel().is_scan_sentinel());
    assert!(!RegisterMsg::initial_scan(PathBuf::from("/a")).is_scan_sentinel());
    assert!(!RegisterMsg::default().is_scan_sentinel());
}

#[test]
fn test_from_event_create_and_remove() {
    let msgs = RegisterMsg::from_event(&event(EventKind::Create(CreateKind::File), &["/a"]));
    assert_eq!(
        msgs,
        vec![RegisterMsg {
            path: PathBuf::from("/a"),
            is_created: true,
            ..RegisterMsg::default()
        }]
    );

    let msgs = RegisterMsg::from_event(&event(EventKind::Remove(RemoveKind::Any), &["/a"]));
    assert_eq!(msgs.len(), 1);
    assert!(msgs[0].is_deleted);
    assert!(!msgs[0].is_created && !msgs[0].is_written);
}

#[test]
fn test_from_event_write_and_chmod() {
    let written = RegisterMsg::from_event(&event(
        EventKind::Modify(ModifyKind::Data(DataChange::Content)),
        &["/a"],
    ));
    assert!(written[0].is_written);
    assert!(!written[0].is_chmoded);

    let closed = RegisterMsg::from_event(&event(
        EventKind::Access(AccessKind::Close(AccessMode::Write)),
        &["/a"],
    ));
    assert!(closed[0].is_written);

    let chmod = RegisterMsg::from_event(&event(
        EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
        &["/a"],
    ));
    assert!(chmod[0].is_chmoded);
    assert!(!chmod[0].is_written);
}

#[test]
fn test_from_event_access_and_other_are_ignored() {
    assert!(
        RegisterMsg::from_event(&event(
            EventKind::Access(AccessKind::Close(AccessMode::Read)),
            &["/a"]
        ))
        .is_empty()
    );
    assert!(RegisterMsg::from_event(&event(EventKind::Other, &["/a"])).is_empty());
}

#[test]
fn test_from_event_one_message_per_path() {
    let msgs = RegisterMsg::from_event(&event(
        EventKind::Create(CreateKind::Any),
        &["/a", "/b", "/c"],
    ));
    let paths: Vec<_> = msgs.iter().map(|m| m.path.clone()).collect();
    assert_eq!(
        paths,
        vec![
            PathBuf::from("/a"),
            PathBuf::from("/b"),
            PathBuf::from("/c")
        ]
    );
    assert!(msgs.iter().all(|m| m.is_created));
}

#[test]
fn test_from_event_rename_both_splits() {
    let msgs = RegisterMsg::from_event(&event(
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
        &["/old.dcm", "/new.dcm"],
    ));
    assert_eq!(msgs.len(), 2);
    assert_eq!(msgs[0].path, PathBuf::from("/old.dcm"));
    assert!(msgs[0].is_renamed && msgs[0].is_deleted);
    assert_eq!(msgs[1].path, PathBuf::from("/new.dcm"));
    assert!(msgs[1].is_renamed && msgs[1].is_created && msgs[1].is_written);
}

#[test]
fn test_from_event_rename_halves() {
    let from = RegisterMsg::from_event(&event(
        EventKind::Modify(ModifyKind::Name(RenameMode::From)),
        &["/old"],
    ));
    assert!(from[0].is_deleted && from[0].is_renamed);
    assert_eq!(from[0].path, PathBuf::from("/old"));

    let to = RegisterMsg::from_event(&event(
        EventKind::Modify(ModifyKind::Name(RenameMode::To)),
        &["/new"],
    ));
    assert!(to[0].is_created && to[0].is_written);
    assert_eq!(to[0].path, PathBuf::from("/new"));
}

#[test]
fn test_register_msg_display() {
    let msg = RegisterMsg {
        path: PathBuf::from("/a/b.dcm"),
        is_created: true,
        is_written: true,
        ..RegisterMsg::default()
    };
    assert_eq!(msg.to_string(), "/a/b.dcm CREATED WRITTEN");
    assert_eq!(
        RegisterMsg::initial_scan(PathBuf::from("/x")).to_string(),
        "/x INITIALSCAN"
    );
}

// --- FieldFilter / extractors ---

#[test]
fn test_field_filter_includes_excludes_renames() {
    let filter = FieldFilter::from(&IndexerConfig {
        field_includes: vec!["PatientID".into(), "Modality".into(), "size".into()],
        field_excludes: vec!["size".into()],
        field_renames: vec!["PatientID=patient".into()],
        hash: false,
    });
    let out = filter.apply(meta(&[
        ("PatientID", "123"),
        ("Modality", "CT"),
        ("size", "10"),
        ("other", "x"),
    ]));
    assert_eq!(out, meta(&[("patient", "123"), ("Modality", "CT")]));
}

#[test]
fn test_field_filter_noop_passes_through() {
    let filter = FieldFilter::default();
    assert!(filter.is_noop());
    let m = meta(&[("a", "1")]);
    assert_eq!(filter.apply(m.clone()), m);
}

#[test]
fn test_file_info_extractor_fields() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Scan.DCM");
    std::fs::write(&path, b"hello").unwrap();

    let out = FileInfoExtractor::new(false).extract(&path).unwrap();
    assert_eq!(out.get("file_name").map(String::as_str), Some("Scan.DCM"));
    assert_eq!(out.get("extension").map(String::as_str), Some("dcm"));
    assert_eq!(out.get("size").map(String::as_str), Some("5"));
    assert!(out.contains_key("modified"));
    assert!(!out.contains_key("blake3"));

    let hashed = FileInfoExtractor::new(true).extract(&path).unwrap();
    let expected = blake3::hash(b"hello").to_hex().to_string();
    assert_eq!(hashed.get("blake3"), Some(&expected));
}

#[test]
fn test_file_info_extractor_missing_file_is_cannot_index() {
    let dir = tempfile::tempdir().unwrap();
    let err = FileInfoExtractor::default()
        .extract(&dir.path().join("gone.dcm"))
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<MetafilerError>(),
        Some(MetafilerError::CannotIndex { .. })
    ));
}

#[test]
fn test_filtered_extractor_applies_filter() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.txt");
    std::fs::write(&path, b"abc").unwrap();

    let extractor = FilteredExtractor::new(
        FileInfoExtractor::default(),
        FieldFilter {
            includes: vec!["size".into()],
            renames: vec![("size".into(), "bytes".into())],
            ..FieldFilter::default()
        },
    );
    let out = extractor.extract(&path).unwrap();
    assert_eq!(out, meta(&[("bytes", "3")]));
}

// --- Config ---

#[test]
fn test_parse_config_empty_uses_defaults() {
    let cfg = parse_config("").unwrap();
    assert!(cfg.filesystem.recursive);
    assert_eq!(cfg.filesystem.path, PathBuf::from("."));
    assert_eq!(cfg.storage.collection, "doc");
    assert_eq!(cfg.storage.timeout_ms, 3000);
    assert_eq!(cfg.storage.database, PathBuf::from("metafiler.db"));
    assert_eq!(cfg.pipeline.live_dispatch, LiveDispatch::Inline);
    assert!(cfg.pipeline.workers >= 1);
    assert!(cfg.storage.pool_size >= 1);
    cfg.validate().unwrap();
}

#[test]
fn test_parse_config_sections() {
    let cfg = parse_config(
        r#"
[filesystem]
path = "/data/archive"
recursive = false
file_includes = ["*.dcm"]
directory_excludes = [".git"]

[pipeline]
workers = 16
queue_capacity = 500
live_dispatch = "pool"

[storage]
database = "/var/lib/metafiler/index.db"
collection = "studies"
pool_size = 3
timeout_ms = 250
drop_on_start = true

[indexer]
field_renames = ["file_name=FileName"]
hash = true
"#,
    )
    .unwrap();
    assert_eq!(cfg.filesystem.path, PathBuf::from("/data/archive"));
    assert!(!cfg.filesystem.recursive);
    assert_eq!(cfg.filesystem.file_includes, vec!["*.dcm".to_string()]);
    assert_eq!(cfg.pipeline.workers, 16);
    assert_eq!(cfg.pipeline.queue_capacity, 500);
    assert_eq!(cfg.pipeline.live_dispatch, LiveDispatch::Pool);
    assert_eq!(cfg.storage.collection, "studies");
    assert_eq!(cfg.storage.pool_size, 3);
    assert!(cfg.storage.drop_on_start);
    assert!(cfg.indexer.hash);
    // Timeouts below the floor are raised.
    assert_eq!(cfg.storage.timeout(), Duration::from_millis(1000));
    cfg.validate().unwrap();
}

#[test]
fn test_parse_config_rejects_bad_toml() {
    assert!(parse_config("[pipeline]\nworkers = \"many\"").is_err());
}

#[test]
fn test_validate_rejects_bad_values() {
    let mut cfg = Config::default();
    cfg.pipeline.workers = 0;
    assert!(matches!(cfg.validate(), Err(MetafilerError::Config(_))));

    let mut cfg = Config::default();
    cfg.storage.pool_size = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = Config::default();
    cfg.storage.collection = "doc; DROP TABLE doc".into();
    assert!(cfg.validate().is_err());

    let mut cfg = Config::default();
    cfg.indexer.field_renames = vec!["no_equals".into()];
    assert!(cfg.validate().is_err());
}

#[test]
fn test_collection_name_and_rename_rules() {
    assert!(is_valid_collection_name("doc"));
    assert!(is_valid_collection_name("studies_2024"));
    assert!(!is_valid_collection_name(""));
    assert!(!is_valid_collection_name("a-b"));
    assert!(!is_valid_collection_name("123"));
    assert!(!is_valid_collection_name("9lives"));
    assert!(is_valid_collection_name("_scratch"));
    assert!(is_valid_collection_name("order"));

    assert_eq!(parse_rename("old=new"), Some(("old", "new")));
    assert_eq!(parse_rename(" old = new "), Some(("old", "new")));
    assert_eq!(parse_rename("old="), None);
    assert_eq!(parse_rename("old"), None);
}

#[test]
fn test_env_overrides() {
    let env: HashMap<&str, &str> = HashMap::from([
        ("METAFILER_DATABASE", "/tmp/other.db"),
        ("METAFILER_COLLECTION", "studies"),
        ("METAFILER_PATH", "  "),
    ]);
    let mut cfg = Config::default();
    apply_env_overrides(&mut cfg, |k| env.get(k).map(|v| v.to_string()));
    assert_eq!(cfg.storage.database, PathBuf::from("/tmp/other.db"));
    assert_eq!(cfg.storage.collection, "studies");
    // Blank values don't override.
    assert_eq!(cfg.filesystem.path, PathBuf::from("."));
}

#[test]
fn test_storage_timeout_default() {
    assert_eq!(
        StorageConfig::default().timeout(),
        Duration::from_millis(3000)
    );
}

#[test]
fn test_worker_budget_leaves_room_for_storage() {
    // 1024 - 4 connections * 3 = 1012; 80% = 809; 2 per worker.
    assert_eq!(workers_within(1024, 4), 404);
    assert_eq!(workers_within(1024, 0), 409);
    // Storage alone exhausts the limit: still one worker.
    assert_eq!(workers_within(8, 4), 1);
    assert_eq!(workers_within(0, 0), 1);
    assert!(workers_within(u64::MAX, 16) > 1_000_000);
}
