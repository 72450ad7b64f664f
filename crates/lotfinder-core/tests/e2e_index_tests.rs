use crossbeam_channel::Receiver;
use lotfinder_core::config::{AllowedDirectory, AppConfig};
use lotfinder_core::storage::Database;
use lotfinder_core::{Error, IndexStatus, IndexStore, JobController, JobEvent, SearchService};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::tempdir;

/// Share layout used across these tests:
///   root/
///     videos/
///       21156281_polish.mp4
///       21156281_rough.mp4
///       30000001_polish.mp4
///     scans/
///       21156281_scan_1.jpg
///       scan_21156281_2.jpg
///     advisor/
///       30000001.pdf
///     readme.txt            <- no lot number, never indexed
fn create_test_tree(root: &Path) {
    let videos = root.join("videos");
    let scans = root.join("scans");
    let advisor = root.join("advisor");
    fs::create_dir_all(&videos).unwrap();
    fs::create_dir_all(&scans).unwrap();
    fs::create_dir_all(&advisor).unwrap();

    fs::write(videos.join("21156281_polish.mp4"), "polish frames").unwrap();
    fs::write(videos.join("21156281_rough.mp4"), "rough frames").unwrap();
    fs::write(videos.join("30000001_polish.mp4"), "other lot").unwrap();
    fs::write(scans.join("21156281_scan_1.jpg"), "scan one").unwrap();
    fs::write(scans.join("scan_21156281_2.jpg"), "scan two").unwrap();
    fs::write(advisor.join("30000001.pdf"), "advisor report").unwrap();
    fs::write(root.join("readme.txt"), "no lot here").unwrap();
}

fn config_for_root(root: &Path) -> AppConfig {
    AppConfig {
        allowed_directories: vec![AllowedDirectory {
            root_path: root.to_string_lossy().into_owned(),
            category_hint: None,
            enabled: true,
        }],
        search_timeout_ms: 10_000,
        ..AppConfig::default()
    }
}

fn setup(root: &Path) -> (Arc<IndexStore>, Arc<AppConfig>, JobController) {
    let config = Arc::new(config_for_root(root));
    let store = Arc::new(IndexStore::open(Database::open_in_memory().unwrap()).unwrap());
    let controller = JobController::new(Arc::clone(&store), Arc::clone(&config)).unwrap();
    (store, config, controller)
}

fn wait_terminal(events: &Receiver<JobEvent>) -> JobEvent {
    loop {
        let event = events
            .recv_timeout(Duration::from_secs(30))
            .expect("job did not finish in time");
        match event {
            JobEvent::Completed { .. } | JobEvent::Cancelled { .. } | JobEvent::Failed { .. } => {
                return event;
            }
            _ => {}
        }
    }
}

#[test]
fn test_full_reindex_then_cached_search() {
    let tmp = tempdir().unwrap();
    create_test_tree(tmp.path());
    let (store, _config, controller) = setup(tmp.path());

    let events = controller.subscribe();
    let ack = controller.trigger_full().unwrap();
    assert!(ack.accepted);

    let terminal = wait_terminal(&events);
    assert!(matches!(terminal, JobEvent::Completed { records: 6, .. }));

    let result = store.lookup("21156281");
    assert!(result.has_results);
    assert!(result.polish_video.is_some());
    assert!(result.rough_video.is_some());
    assert!(result.tension_video.is_none());
    assert!(result.advisor_files.is_empty());
    assert_eq!(result.scan_files.len(), 2);

    let other = store.lookup("30000001");
    assert!(other.polish_video.is_some());
    assert_eq!(other.advisor_files.len(), 1);

    // Controller settles back to idle with a recorded full-index time.
    let state = controller.state();
    assert_eq!(state.status, IndexStatus::Idle);
    assert_eq!(state.progress_percent, 100);
    assert!(state.last_full_index_at.is_some());
}

#[test]
fn test_full_reindex_is_idempotent() {
    let tmp = tempdir().unwrap();
    create_test_tree(tmp.path());
    let (store, _config, controller) = setup(tmp.path());

    let events = controller.subscribe();
    controller.trigger_full().unwrap();
    wait_terminal(&events);
    let first = index_contents(&store);

    controller.trigger_full().unwrap();
    wait_terminal(&events);
    let second = index_contents(&store);

    assert_eq!(first, second);
}

/// Everything except `indexed_at`, which necessarily differs per run.
fn index_contents(store: &IndexStore) -> Vec<(String, String, String, u64, i64)> {
    let snapshot = store.snapshot();
    let mut contents: Vec<_> = snapshot
        .values()
        .flatten()
        .map(|r| {
            (
                r.lot_number.clone(),
                r.category.as_str().to_string(),
                r.absolute_path.clone(),
                r.size_bytes,
                r.modified_at,
            )
        })
        .collect();
    contents.sort();
    contents
}

#[test]
fn test_live_search_aggregates_per_category() {
    let tmp = tempdir().unwrap();
    create_test_tree(tmp.path());
    let (store, config, _controller) = setup(tmp.path());

    // Nothing indexed; only the live path can find these files.
    let service = SearchService::new(Arc::clone(&store), config);
    let result = service.search_all_files("21156281", false, Duration::from_secs(10));

    assert!(result.has_results);
    assert!(result.polish_video.is_some());
    assert!(result.rough_video.is_some());
    assert!(result.tension_video.is_none());
    assert!(result.advisor_files.is_empty());
    assert_eq!(result.scan_files.len(), 2);
}

#[test]
fn test_live_search_backfills_the_index() {
    let tmp = tempdir().unwrap();
    create_test_tree(tmp.path());
    let (store, config, _controller) = setup(tmp.path());

    let service = SearchService::new(Arc::clone(&store), config);
    let result = service.search_all_files("21156281", false, Duration::from_secs(10));
    assert!(result.has_results);

    // Backfill is detached and best-effort; poll briefly.
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if store.lookup("21156281").has_results {
            break;
        }
        assert!(Instant::now() < deadline, "backfill never reached the index");
        thread::sleep(Duration::from_millis(50));
    }
}

#[test]
fn test_cached_search_is_stale_and_live_search_is_current() {
    let tmp = tempdir().unwrap();
    create_test_tree(tmp.path());
    let (store, config, controller) = setup(tmp.path());

    let events = controller.subscribe();
    controller.trigger_full().unwrap();
    wait_terminal(&events);

    // Mutate the share after indexing.
    fs::remove_file(tmp.path().join("scans/21156281_scan_1.jpg")).unwrap();
    fs::write(tmp.path().join("scans/scan_21156281_3.jpg"), "scan three").unwrap();

    let service = SearchService::new(Arc::clone(&store), config);

    // The cache answers from the snapshot alone: the deleted file is
    // still reported, the new one is absent.
    let cached = service.search_all_files("21156281", true, Duration::from_secs(10));
    assert_eq!(cached.scan_files.len(), 2);
    assert!(cached
        .scan_files
        .iter()
        .any(|r| r.absolute_path.ends_with("21156281_scan_1.jpg")));

    // The live path reflects the filesystem as it is now.
    let live = service.search_all_files("21156281", false, Duration::from_secs(10));
    assert_eq!(live.scan_files.len(), 2);
    assert!(live
        .scan_files
        .iter()
        .any(|r| r.absolute_path.ends_with("scan_21156281_3.jpg")));
    assert!(!live
        .scan_files
        .iter()
        .any(|r| r.absolute_path.ends_with("21156281_scan_1.jpg")));
}

#[test]
fn test_competing_trigger_is_locked_out() {
    let tmp = tempdir().unwrap();
    create_test_tree(tmp.path());
    // Pad the tree so the first job is still running when the second
    // trigger lands.
    for dir_index in 0..40 {
        let dir = tmp.path().join(format!("scans/batch_{dir_index}"));
        fs::create_dir_all(&dir).unwrap();
        for file_index in 0..5 {
            fs::write(
                dir.join(format!("2115628{file_index}_scan_{dir_index}.jpg")),
                "x",
            )
            .unwrap();
        }
    }
    let (_store, _config, controller) = setup(tmp.path());

    let events = controller.subscribe();
    let ack = controller.trigger_full().unwrap();
    assert!(ack.accepted);

    let second = controller.trigger_incremental();
    assert!(matches!(second, Err(Error::IndexLocked)));

    wait_terminal(&events);

    // Once idle again, a new trigger is accepted.
    let third = controller.trigger_incremental().unwrap();
    assert!(third.accepted);
    wait_terminal(&events);
}

#[test]
fn test_cancel_without_running_job_is_a_no_op() {
    let tmp = tempdir().unwrap();
    create_test_tree(tmp.path());
    let (_store, _config, controller) = setup(tmp.path());
    assert!(!controller.cancel());
}

#[test]
fn test_cancelled_job_leaves_index_untouched() {
    let tmp = tempdir().unwrap();
    create_test_tree(tmp.path());
    for dir_index in 0..40 {
        let dir = tmp.path().join(format!("videos/batch_{dir_index}"));
        fs::create_dir_all(&dir).unwrap();
        for file_index in 0..5 {
            fs::write(dir.join(format!("3000000{file_index}_polish.mp4")), "x").unwrap();
        }
    }
    let (store, _config, controller) = setup(tmp.path());

    let events = controller.subscribe();
    controller.trigger_full().unwrap();
    assert!(controller.cancel());

    let terminal = wait_terminal(&events);
    assert!(matches!(terminal, JobEvent::Cancelled { .. }));

    // Whatever the walk collected was discarded; the store still holds
    // its last consistent snapshot (here: empty).
    assert!(!store.lookup("21156281").has_results);
    assert_eq!(controller.state().status, IndexStatus::Idle);
}

#[test]
fn test_validation_prunes_deleted_files() {
    let tmp = tempdir().unwrap();
    create_test_tree(tmp.path());
    let (store, _config, controller) = setup(tmp.path());

    let events = controller.subscribe();
    controller.trigger_full().unwrap();
    wait_terminal(&events);

    fs::remove_file(tmp.path().join("videos/21156281_rough.mp4")).unwrap();

    let report = controller.run_validation().unwrap();
    assert_eq!(report.removed_count, 1);

    let result = store.lookup("21156281");
    assert!(result.rough_video.is_none());
    assert!(result.polish_video.is_some());
}

#[test]
fn test_incremental_reindex_merges_new_files() {
    let tmp = tempdir().unwrap();
    create_test_tree(tmp.path());
    let (store, _config, controller) = setup(tmp.path());

    let events = controller.subscribe();
    controller.trigger_full().unwrap();
    wait_terminal(&events);

    // Let the clock tick past the recorded index time before touching
    // the share; mtimes are second-granular.
    thread::sleep(Duration::from_millis(2100));
    let late = tmp.path().join("advisor/late_batch");
    fs::create_dir_all(&late).unwrap();
    fs::write(late.join("21156281.pdf"), "late advisor report").unwrap();

    controller.trigger_incremental().unwrap();
    let terminal = wait_terminal(&events);
    assert!(matches!(terminal, JobEvent::Completed { .. }));

    let result = store.lookup("21156281");
    assert_eq!(result.advisor_files.len(), 1);
    // The earlier records are still there: merge, not replace.
    assert!(result.polish_video.is_some());
    assert_eq!(result.scan_files.len(), 2);
}

#[test]
fn test_unreachable_roots_fail_the_run() {
    let tmp = tempdir().unwrap();
    let missing = tmp.path().join("not_mounted");
    let (_store, _config, controller) = setup(&missing);

    let events = controller.subscribe();
    let ack = controller.trigger_full().unwrap();
    assert!(ack.accepted);

    let terminal = wait_terminal(&events);
    assert!(matches!(terminal, JobEvent::Failed { .. }));
    assert_eq!(terminal.percent(), -1);

    let state = controller.state();
    assert!(matches!(state.status, IndexStatus::Failed(_)));

    assert!(controller.acknowledge_failure());
    assert_eq!(controller.state().status, IndexStatus::Idle);
}

#[test]
fn test_search_unknown_lot_is_empty_not_an_error() {
    let tmp = tempdir().unwrap();
    create_test_tree(tmp.path());
    let (store, config, controller) = setup(tmp.path());

    let events = controller.subscribe();
    controller.trigger_full().unwrap();
    wait_terminal(&events);

    let service = SearchService::new(store, config);
    let result = service.search_all_files("77777777", true, Duration::from_secs(10));
    assert!(!result.has_results);
    assert!(result.scan_files.is_empty());

    let blank = service.search_all_files("  ", true, Duration::from_secs(10));
    assert!(!blank.has_results);
}
