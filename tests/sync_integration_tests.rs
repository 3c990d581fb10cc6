//! End-to-end integration tests against the public `SyncEngine` surface
//! (§8: version selection, directory creation, ignored names,
//! strict/lenient failure handling, cancellation, and resume).

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use lempicka_sync::control::RunOptions;
use lempicka_sync::runner::Phase;
use lempicka_sync::{ProgressEvent, SyncEngine, SyncError};
use tempfile::TempDir;

fn noop_progress() -> Arc<dyn Fn(&ProgressEvent) + Send + Sync> {
    Arc::new(|_| {})
}

fn journal_path(dir: &TempDir) -> PathBuf {
    dir.path().join("run.journal.json")
}

#[tokio::test]
async fn version_selection_copies_highest_version_over_stale_destination() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let journal_dir = TempDir::new().unwrap();

    fs::create_dir_all(src.path().join("folder")).unwrap();
    fs::write(src.path().join("folder/doc_v1.txt"), b"one").unwrap();
    fs::write(src.path().join("folder/doc_v3.txt"), b"three").unwrap();
    fs::create_dir_all(dst.path().join("folder")).unwrap();
    fs::write(dst.path().join("folder/doc.txt"), b"old").unwrap();

    let engine = SyncEngine::new();
    let plan = engine.build_compare_plan(src.path(), dst.path()).unwrap();
    assert_eq!(plan.plan.len(), 1);
    assert_eq!(plan.plan[0].source_relative_path, PathBuf::from("folder/doc_v3.txt"));
    assert_eq!(plan.plan[0].target_relative_path, PathBuf::from("folder/doc.txt"));
    assert_eq!(plan.plan[0].version, 3);

    let summary = engine
        .sync(journal_path(&journal_dir), plan, RunOptions::default(), noop_progress())
        .await
        .expect("sync succeeds");

    assert_eq!(summary.copied, 1);
    assert_eq!(fs::read(dst.path().join("folder/doc.txt")).unwrap(), b"three");
}

#[tokio::test]
async fn directory_creation_for_missing_nested_destination() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let journal_dir = TempDir::new().unwrap();

    fs::create_dir_all(src.path().join("alpha/beta")).unwrap();
    fs::write(src.path().join("alpha/beta/file_v1.txt"), b"hello").unwrap();

    let engine = SyncEngine::new();
    let plan = engine.build_compare_plan(src.path(), dst.path()).unwrap();
    assert_eq!(plan.directories_to_create, vec![PathBuf::from("alpha"), PathBuf::from("alpha/beta")]);

    engine
        .sync(journal_path(&journal_dir), plan, RunOptions::default(), noop_progress())
        .await
        .expect("sync succeeds");

    assert_eq!(fs::read(dst.path().join("alpha/beta/file.txt")).unwrap(), b"hello");
}

#[tokio::test]
async fn ignored_names_are_excluded_from_the_plan() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();

    fs::create_dir_all(src.path().join(".hidden")).unwrap();
    fs::write(src.path().join(".hidden/file_v1.txt"), b"nope").unwrap();
    fs::write(src.path().join(".DS_Store"), b"nope").unwrap();
    fs::write(src.path().join("Thumbs.db"), b"nope").unwrap();
    fs::write(src.path().join("desktop.ini"), b"nope").unwrap();
    fs::write(src.path().join("notes_v3"), b"noext").unwrap();
    fs::create_dir_all(src.path().join("visible")).unwrap();
    fs::write(src.path().join("visible/readme_v2.txt"), b"hello").unwrap();

    let engine = SyncEngine::new();
    let plan = engine.build_compare_plan(src.path(), dst.path()).unwrap();

    assert_eq!(plan.plan.len(), 1);
    assert_eq!(plan.plan[0].target_relative_path, PathBuf::from("visible/readme.txt"));
}

#[tokio::test]
async fn strict_mode_aborts_on_first_missing_source_leaving_first_item_written() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let journal_dir = TempDir::new().unwrap();

    fs::write(src.path().join("first_v1.txt"), b"first").unwrap();
    fs::write(src.path().join("second_v1.txt"), b"second").unwrap();

    let engine = SyncEngine::new();
    let plan = engine.build_compare_plan(src.path(), dst.path()).unwrap();
    assert_eq!(plan.plan.len(), 2);

    // Remove the second source file between compare and sync.
    fs::remove_file(src.path().join("second_v1.txt")).unwrap();

    let mut options = RunOptions::default();
    options.continue_on_error = false;

    let result = engine.sync(journal_path(&journal_dir), plan, options, noop_progress()).await;
    assert!(result.is_err());
    assert_eq!(fs::read(dst.path().join("first.txt")).unwrap(), b"first");
    assert!(!dst.path().join("second.txt").exists());
}

#[tokio::test]
async fn lenient_mode_records_failure_and_keeps_going() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let journal_dir = TempDir::new().unwrap();

    fs::write(src.path().join("first_v1.txt"), b"first").unwrap();
    fs::write(src.path().join("second_v1.txt"), b"second").unwrap();

    let engine = SyncEngine::new();
    let plan = engine.build_compare_plan(src.path(), dst.path()).unwrap();

    fs::remove_file(src.path().join("second_v1.txt")).unwrap();

    let mut options = RunOptions::default();
    options.continue_on_error = true;

    let summary = engine.sync(journal_path(&journal_dir), plan, options, noop_progress()).await.expect("run completes");
    assert_eq!(summary.copied, 1);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].target_relative_path, PathBuf::from("second.txt"));
}

#[tokio::test]
async fn cancel_during_copy_rolls_back_and_leaves_no_temp_files() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let journal_dir = TempDir::new().unwrap();

    fs::write(src.path().join("clip_v2.txt"), vec![7u8; 8 * 1024 * 1024]).unwrap();
    fs::write(dst.path().join("clip.txt"), b"old-destination-content").unwrap();

    let engine = Arc::new(SyncEngine::new());
    let plan = engine.build_compare_plan(src.path(), dst.path()).unwrap();

    let seen_copying = Arc::new(AtomicUsize::new(0));
    let seen_copying_for_cb = Arc::clone(&seen_copying);
    let engine_for_cb = Arc::clone(&engine);
    let on_progress: Arc<dyn Fn(&ProgressEvent) + Send + Sync> = Arc::new(move |event| {
        if matches!(event.phase, Phase::Copying) && seen_copying_for_cb.fetch_add(1, Ordering::SeqCst) == 0 {
            engine_for_cb.cancel_sync();
        }
    });

    let result = engine.sync(journal_path(&journal_dir), plan, RunOptions::default(), on_progress).await;
    assert!(matches!(result, Err(SyncError::SyncCancelled { .. })));

    assert_eq!(fs::read(dst.path().join("clip.txt")).unwrap(), b"old-destination-content");
    let leftovers: Vec<_> = fs::read_dir(dst.path())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.contains("lempicka-"))
        .collect();
    assert!(leftovers.is_empty(), "leftover temp files: {:?}", leftovers);
}

#[tokio::test]
async fn journal_records_active_entry_with_backup_path_while_copy_is_in_flight() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let journal_dir = TempDir::new().unwrap();

    fs::write(src.path().join("clip_v2.txt"), vec![7u8; 8 * 1024 * 1024]).unwrap();
    fs::write(dst.path().join("clip.txt"), b"old-destination-content").unwrap();

    let engine = Arc::new(SyncEngine::new());
    let plan = engine.build_compare_plan(src.path(), dst.path()).unwrap();
    let path = journal_path(&journal_dir);

    let seen_active_entry = Arc::new(AtomicUsize::new(0));
    let seen_active_entry_for_cb = Arc::clone(&seen_active_entry);
    let path_for_cb = path.clone();
    let on_progress: Arc<dyn Fn(&ProgressEvent) + Send + Sync> = Arc::new(move |event| {
        if matches!(event.phase, Phase::Copying) {
            if let Some(state) = engine_recovery_peek(&path_for_cb) {
                if state.active_entries.len() == 1 {
                    let entry = state.active_entries.values().next().unwrap();
                    assert_eq!(entry.target_relative_path, PathBuf::from("clip.txt"));
                    assert!(!entry.backup_path.is_empty(), "backup path should be recorded before the write begins");
                    seen_active_entry_for_cb.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
    });

    engine.sync(path.clone(), plan, RunOptions::default(), on_progress).await.expect("sync succeeds");

    assert!(seen_active_entry.load(Ordering::SeqCst) > 0, "expected to observe an in-flight active_entries snapshot");
    assert!(!path.exists());
}

/// Read the journal straight off disk, the way a crash-recovery tool would
/// — without going through `SyncEngine`, which only exposes a summary.
fn engine_recovery_peek(path: &std::path::Path) -> Option<lempicka_sync::JournalState> {
    let bytes = fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[tokio::test]
async fn resume_after_cancel_completes_remaining_work() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let journal_dir = TempDir::new().unwrap();

    fs::write(src.path().join("a_v1.txt"), b"a-contents").unwrap();
    fs::write(src.path().join("b_v1.txt"), b"b-contents").unwrap();

    let engine = Arc::new(SyncEngine::new());
    let plan = engine.build_compare_plan(src.path(), dst.path()).unwrap();
    assert_eq!(plan.plan.len(), 2);
    let path = journal_path(&journal_dir);

    let completed = Arc::new(AtomicUsize::new(0));
    let completed_for_cb = Arc::clone(&completed);
    let engine_for_cb = Arc::clone(&engine);
    let on_progress: Arc<dyn Fn(&ProgressEvent) + Send + Sync> = Arc::new(move |event| {
        if matches!(event.phase, Phase::Copying) && event.completed >= 1 && completed_for_cb.fetch_add(1, Ordering::SeqCst) == 0 {
            engine_for_cb.cancel_sync();
        }
    });

    let mut options = RunOptions::default();
    options.continue_on_error = false;
    let first_run = engine.sync(path.clone(), plan, options, on_progress).await;
    assert!(first_run.is_err());
    assert!(path.exists());

    let summary_before_resume = engine.recovery_summary(&path).unwrap().expect("journal present");
    assert_eq!(summary_before_resume.pending_count, 1);

    let resumed = engine.resume(path.clone(), RunOptions::default(), noop_progress()).await.expect("resume completes");
    assert_eq!(resumed.copied, 1);
    assert!(resumed.resumed_from_journal);
    assert!(!path.exists());

    assert_eq!(fs::read(dst.path().join("a.txt")).unwrap(), b"a-contents");
    assert_eq!(fs::read(dst.path().join("b.txt")).unwrap(), b"b-contents");
}

#[tokio::test]
async fn idempotent_second_sync_has_nothing_to_do() {
    let src = TempDir::new().unwrap();
    let dst = TempDir::new().unwrap();
    let journal_dir = TempDir::new().unwrap();

    fs::write(src.path().join("a_v2.txt"), b"hello").unwrap();

    let engine = SyncEngine::new();
    let plan = engine.build_compare_plan(src.path(), dst.path()).unwrap();
    assert_eq!(plan.plan.len(), 1);

    engine
        .sync(journal_path(&journal_dir), plan, RunOptions::default(), noop_progress())
        .await
        .expect("first sync succeeds");

    let plan2 = engine.build_compare_plan(src.path(), dst.path()).unwrap();
    assert!(plan2.plan.is_empty());
    assert_eq!(plan2.total_candidates, 1);
}
