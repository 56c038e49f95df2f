use dirindex::{IndexConfig, IndexService, PragmaConfig, Storage};
use std::fs;
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;
use tempfile::tempdir;

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Helper to create a service with its index directory nested under the root.
fn service_for(root: &Path) -> IndexService {
    init_tracing();
    let mut config = IndexConfig::new(root);
    config.index_output_directory = root.join("indexes");
    IndexService::open(config).unwrap()
}

#[test]
fn test_index_and_search_roundtrip() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "the quick brown fox").unwrap();
    fs::write(dir.path().join("b.md"), "jumps over the lazy dog").unwrap();
    let service = service_for(dir.path());

    let outcome = service.refresh_index(None, false).unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.files_processed, 2);
    assert_eq!(outcome.files_added, 2);

    let stats = service.get_index_stats().unwrap();
    assert_eq!(stats.indexed_files, 2);

    let fox = service.search("fox", Some(10)).unwrap();
    assert_eq!(fox.len(), 1);
    assert_eq!(fox[0].path, "a.txt");

    let the = service.search("the", Some(10)).unwrap();
    assert_eq!(the.len(), 2);
}

#[test]
fn test_second_refresh_is_a_no_op() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "stable content").unwrap();
    fs::write(dir.path().join("b.txt"), "more stable content").unwrap();
    let service = service_for(dir.path());

    service.refresh_index(None, false).unwrap();
    let second = service.refresh_index(None, false).unwrap();
    assert!(second.success);
    assert_eq!(second.files_processed, 0);
    assert_eq!(second.files_added, 0);
    assert_eq!(second.files_updated, 0);
    assert_eq!(second.files_removed, 0);
}

#[test]
fn test_snippet_is_drawn_from_content() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("essay.txt"),
        "Filler sentences keep the interesting part away from the start. \
         The archipelago stretched beyond the horizon in every direction. \
         More filler text follows the part that matters.",
    )
    .unwrap();
    let service = service_for(dir.path());
    service.refresh_index(None, false).unwrap();

    let results = service.search("archipelago", None).unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].snippet.contains("<mark>archipelago</mark>"));
    assert!(results[0].snippet.contains("horizon"));
    assert!(results[0].score > 0.0);
}

#[test]
fn test_deleting_file_decrements_indexed_files() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("keep.txt"), "kept words").unwrap();
    fs::write(dir.path().join("drop.txt"), "dropped words").unwrap();
    let service = service_for(dir.path());
    service.refresh_index(None, false).unwrap();

    let before = service.get_index_stats().unwrap();
    assert_eq!(before.indexed_files, 2);

    fs::remove_file(dir.path().join("drop.txt")).unwrap();
    let outcome = service.refresh_index(None, false).unwrap();
    assert_eq!(outcome.files_removed, 1);

    let after = service.get_index_stats().unwrap();
    assert_eq!(after.indexed_files, 1);
    assert!(service.search("dropped", None).unwrap().is_empty());
}

#[test]
fn test_oversized_file_is_audited_never_searchable() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("huge.txt"), "enormous payload").unwrap();

    init_tracing();
    let mut config = IndexConfig::new(dir.path());
    config.index_output_directory = dir.path().join("indexes");
    config.max_file_size_mb = 0.000_001;
    let db_path = config.db_path();
    let service = IndexService::open(config).unwrap();

    let outcome = service.refresh_index(None, false).unwrap();
    assert!(!outcome.success);
    assert!(outcome.errors[0].contains("File too large"));
    assert_eq!(outcome.files_processed, 0);

    let stats = service.get_index_stats().unwrap();
    assert_eq!(stats.total_documents, 0);
    assert_eq!(stats.errors_encountered, 1);
    assert!(service.search("enormous", None).unwrap().is_empty());

    let storage = Storage::open(&db_path, &PragmaConfig::default()).unwrap();
    let record = storage.get_record("huge.txt").unwrap().unwrap();
    assert!(record.error.unwrap().contains("File too large"));
}

#[test]
fn test_refresh_rejects_paths_outside_root() {
    let dir = tempdir().unwrap();
    let service = service_for(dir.path());

    let outcome = service.refresh_index(Some("../secrets.txt"), false).unwrap();
    assert!(!outcome.success);
    assert!(outcome.errors[0].contains("outside source directory"));

    let outcome = service.refresh_index(Some("indexes/search.db"), false).unwrap();
    assert!(!outcome.success);
    assert!(outcome.errors[0].contains("inside index directory"));
}

#[test]
fn test_corrupted_store_rebuilds_on_read_then_reindexes() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "alpha body").unwrap();
    fs::write(dir.path().join("b.txt"), "beta body").unwrap();

    init_tracing();
    let mut config = IndexConfig::new(dir.path());
    config.index_output_directory = dir.path().join("indexes");
    let db_path = config.db_path();
    let service = IndexService::open(config).unwrap();

    service.refresh_index(None, false).unwrap();
    assert_eq!(service.get_index_stats().unwrap().indexed_files, 2);

    // Scribble over every page after the first. The header stays valid, so
    // the damage only surfaces once a query walks the table btrees.
    let mut file = fs::OpenOptions::new().write(true).open(&db_path).unwrap();
    let len = file.metadata().unwrap().len();
    assert!(len > 8192);
    file.seek(SeekFrom::Start(4096)).unwrap();
    file.write_all(&vec![0xFF; usize::try_from(len - 4096).unwrap()]).unwrap();
    drop(file);

    let stats = service.get_index_stats().unwrap();
    assert_eq!(stats.indexed_files, 0);
    assert_eq!(stats.last_scan, "Never");

    let outcome = service.refresh_index(None, false).unwrap();
    assert!(outcome.success);
    assert_eq!(service.get_index_stats().unwrap().indexed_files, 2);
    assert_eq!(service.search("alpha", None).unwrap().len(), 1);
}

#[test]
fn test_search_by_path_lists_matching_documents() {
    let dir = tempdir().unwrap();
    fs::create_dir(dir.path().join("docs")).unwrap();
    fs::write(dir.path().join("docs").join("guide.md"), "guide text").unwrap();
    fs::write(dir.path().join("docs").join("api.md"), "api text").unwrap();
    fs::write(dir.path().join("readme.md"), "readme text").unwrap();
    let service = service_for(dir.path());
    service.refresh_index(None, false).unwrap();

    let results = service.search_by_path("docs/%", None).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].path, "docs/api.md");
    assert_eq!(results[1].path, "docs/guide.md");
}

#[test]
fn test_wire_shapes_carry_original_field_names() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.txt"), "wire format check").unwrap();
    let service = service_for(dir.path());

    let outcome = service.refresh_index(None, false).unwrap();
    let outcome_json = serde_json::to_value(&outcome).unwrap();
    let outcome_obj = outcome_json.as_object().unwrap();
    for key in [
        "success",
        "files_processed",
        "files_added",
        "files_updated",
        "files_removed",
        "duration_seconds",
        "errors",
    ] {
        assert!(outcome_obj.contains_key(key), "missing refresh field {key}");
    }
    assert_eq!(outcome_obj.len(), 7);

    let stats = service.get_index_stats().unwrap();
    let stats_json = serde_json::to_value(&stats).unwrap();
    let stats_obj = stats_json.as_object().unwrap();
    for key in
        ["indexed_files", "last_scan", "index_size_mb", "total_documents", "errors_encountered"]
    {
        assert!(stats_obj.contains_key(key), "missing stats field {key}");
    }
    assert_eq!(stats_obj.len(), 5);

    let results = service.search("wire", None).unwrap();
    let result_json = serde_json::to_value(&results[0]).unwrap();
    let result_obj = result_json.as_object().unwrap();
    for key in ["path", "snippet", "score", "last_modified"] {
        assert!(result_obj.contains_key(key), "missing search field {key}");
    }
    assert_eq!(result_obj.len(), 4);
}

#[test]
fn test_index_database_is_never_self_indexed() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("real.txt"), "real content").unwrap();
    let service = service_for(dir.path());

    service.refresh_index(None, false).unwrap();
    // The database lives under the source root; a later scan must not pick
    // it up or report it as a change.
    let second = service.refresh_index(None, false).unwrap();
    assert!(second.success);
    assert_eq!(second.files_processed, 0);

    let stats = service.get_index_stats().unwrap();
    assert_eq!(stats.indexed_files, 1);
}
