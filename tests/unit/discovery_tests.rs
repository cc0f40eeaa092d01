//! Unit tests for work-item discovery over temporary directories.

use std::path::Path;
use std::sync::Arc;

use proc_warden::config::HostConfig;
use proc_warden::discovery::{discover, work_item_paths};
use proc_warden::events::{EventSink, MemoryEventSink};
use proc_warden::AppError;

fn touch(path: &Path) {
    std::fs::write(path, b"").expect("create file");
}

fn config_for(executable: &Path, items: &Path) -> HostConfig {
    let toml = format!(
        "[[worker_set]]\nexecutable = '{}'\nwork_item_dir = '{}'\n",
        executable.display(),
        items.display()
    );
    HostConfig::from_toml_str(&toml).expect("valid config")
}

#[test]
fn finds_matching_files_in_sorted_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let exe = dir.path().join("worker");
    touch(&exe);
    touch(&dir.path().join("beta.conf"));
    touch(&dir.path().join("alpha.conf"));
    touch(&dir.path().join("notes.txt"));
    std::fs::create_dir(dir.path().join("dir.conf")).expect("create dir");

    let config = config_for(&exe, dir.path());
    let paths = work_item_paths(&config.resolved_sets()[0]).expect("scan");

    let names: Vec<_> = paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["alpha.conf", "beta.conf"]);
}

#[test]
fn discover_pairs_items_with_shared_config() {
    let dir = tempfile::tempdir().expect("tempdir");
    let exe = dir.path().join("worker");
    touch(&exe);
    touch(&dir.path().join("a.conf"));
    touch(&dir.path().join("b.conf"));

    let memory = Arc::new(MemoryEventSink::new());
    let sink: Arc<dyn EventSink> = Arc::clone(&memory) as Arc<dyn EventSink>;
    let items = discover(&config_for(&exe, dir.path()), &sink).expect("discover");

    assert_eq!(items.len(), 2);
    assert!(Arc::ptr_eq(&items[0].0, &items[1].0));
    assert_eq!(items[0].0.log_dir, dir.path().join("logs"));
    assert!(memory.messages().is_empty());
}

#[test]
fn set_with_missing_executable_is_skipped() {
    let dir = tempfile::tempdir().expect("tempdir");
    touch(&dir.path().join("a.conf"));

    let memory = Arc::new(MemoryEventSink::new());
    let sink: Arc<dyn EventSink> = Arc::clone(&memory) as Arc<dyn EventSink>;
    let config = config_for(&dir.path().join("missing-worker"), dir.path());
    let items = discover(&config, &sink).expect("discover");

    assert!(items.is_empty());
    assert_eq!(memory.count_containing("skipping worker set"), 1);
}

#[test]
fn empty_directory_yields_no_items() {
    let dir = tempfile::tempdir().expect("tempdir");
    let exe = dir.path().join("worker");
    touch(&exe);
    let items_dir = dir.path().join("items");
    std::fs::create_dir(&items_dir).expect("create items dir");

    let sink: Arc<dyn EventSink> = Arc::new(MemoryEventSink::new());
    let items = discover(&config_for(&exe, &items_dir), &sink).expect("discover");
    assert!(items.is_empty());
}

#[test]
fn directory_with_glob_metacharacters_matches_literally() {
    let dir = tempfile::tempdir().expect("tempdir");
    let exe = dir.path().join("worker");
    touch(&exe);
    let items_dir = dir.path().join("site[1]*?");
    std::fs::create_dir(&items_dir).expect("create items dir");
    touch(&items_dir.join("a.conf"));

    let config = config_for(&exe, &items_dir);
    let paths = work_item_paths(&config.resolved_sets()[0]).expect("scan");
    assert_eq!(paths, vec![items_dir.join("a.conf")]);
}

#[test]
fn missing_work_item_dir_is_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let exe = dir.path().join("worker");
    touch(&exe);

    let sink: Arc<dyn EventSink> = Arc::new(MemoryEventSink::new());
    let config = config_for(&exe, &dir.path().join("no-such-items"));
    let result = discover(&config, &sink);
    assert!(
        matches!(result, Err(AppError::Config(ref msg)) if msg.contains("no-such-items")),
        "{result:?}"
    );
}

#[test]
fn work_item_dir_that_is_a_file_is_config_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let exe = dir.path().join("worker");
    touch(&exe);
    let not_a_dir = dir.path().join("items.txt");
    touch(&not_a_dir);

    let config = config_for(&exe, &not_a_dir);
    let result = work_item_paths(&config.resolved_sets()[0]);
    assert!(matches!(result, Err(AppError::Config(_))));
}
