//! Sync runner (C7): bounded-parallel execution of a plan, with the
//! journal kept current at every transition so a crash mid-run is
//! recoverable. Generalizes the teacher crate's `executor::pool`
//! dispatcher/worker scaffold — which only counted jobs — into one that
//! actually drives `transaction::CopyTransaction` under the `kernel`
//! retry/cancel/pause tokens.

mod history;
pub mod progress;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::journal::{self, JournalQueue};
use crate::kernel::{retry_with_backoff, CancelToken, PauseToken, RetryConfig};
use crate::transaction::CopyTransaction;
use crate::types::{ActiveEntry, FailedEntry, JournalState, PlanItem, SyncError};

pub use history::HistoryLog;
pub use progress::{Phase, ProgressEmitter, ProgressEvent};

/// Tunables for one run, independent of the plan itself (§6 `SyncOptions`).
#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub cancel: CancelToken,
    pub pause: PauseToken,
    pub continue_on_error: bool,
    pub retry_count: u32,
    pub retry_base_delay_ms: u64,
    pub small_file_threshold_bytes: u64,
    pub max_parallel_small_files: usize,
    pub history_log_path: Option<PathBuf>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            cancel: CancelToken::new(),
            pause: PauseToken::new(),
            continue_on_error: false,
            retry_count: 2,
            retry_base_delay_ms: 300,
            small_file_threshold_bytes: 4 * 1024 * 1024,
            max_parallel_small_files: 3,
            history_log_path: None,
        }
    }
}

/// Result of a completed or aborted run (§6).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub copied: usize,
    pub total: usize,
    pub bytes_copied: u64,
    pub total_bytes: u64,
    pub failed: Vec<FailedEntry>,
    pub succeeded_relative_paths: Vec<PathBuf>,
    pub duration_ms: u64,
    pub average_throughput_bps: f64,
    pub left_root: PathBuf,
    pub right_root: PathBuf,
    pub resumed_from_journal: bool,
}

type ProgressFn = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Drive `journal_state`'s pending items to completion, persisting progress
/// into the journal at `journal_path` as it goes (§4.7).
pub async fn run_sync(
    journal_path: PathBuf,
    mut journal_state: JournalState,
    options: SyncOptions,
    on_progress: ProgressFn,
) -> Result<RunSummary, SyncError> {
    let started_at = Instant::now();
    let resumed_from_journal = !journal_state.completed_target_paths.is_empty() || !journal_state.failed.is_empty();

    let journal_queue = Arc::new(JournalQueue::new(journal_path.clone()));
    let history = Arc::new(HistoryLog::new(options.history_log_path.clone()));
    let retry_config = RetryConfig::new(options.retry_count, options.retry_base_delay_ms);

    create_planned_directories(&mut journal_state, &journal_queue, &options).await?;

    let pending = journal_state.pending_items();
    let emitter = Arc::new(tokio::sync::Mutex::new(ProgressEmitter::new(journal_state.plan.len(), journal_state.total_bytes)));

    let (small, large): (Vec<PlanItem>, Vec<PlanItem>) = pending.into_iter().partition(|item| item.source_size < options.small_file_threshold_bytes);

    let state = Arc::new(tokio::sync::Mutex::new(journal_state));
    let mut aborted: Option<SyncError> = None;

    // Large files always run one at a time: their size makes concurrent
    // transfers fight over disk bandwidth for no benefit.
    for item in large {
        match run_one(&item, &state, &journal_queue, &history, &retry_config, &options, &emitter, &on_progress).await {
            Ok(()) => {}
            Err(err) => {
                if !options.continue_on_error {
                    aborted = Some(err);
                    break;
                }
            }
        }
        if options.cancel.is_cancelled() {
            break;
        }
    }

    if aborted.is_none() && !options.cancel.is_cancelled() {
        if options.continue_on_error {
            aborted = run_small_parallel(small, &state, &journal_queue, &history, &retry_config, &options, &emitter, &on_progress).await;
        } else {
            for item in small {
                if let Err(err) = run_one(&item, &state, &journal_queue, &history, &retry_config, &options, &emitter, &on_progress).await {
                    aborted = Some(err);
                    break;
                }
                if options.cancel.is_cancelled() {
                    break;
                }
            }
        }
    }

    // All tasks touching `state` have already been joined above, so this
    // lock never contends; cloning out avoids an async-context
    // `Arc::try_unwrap`/`blocking_lock` dance.
    let final_state = state.lock().await.clone();

    let summary = build_summary(&final_state, started_at, resumed_from_journal);

    if options.cancel.is_cancelled() {
        journal_queue.persist(final_state).await?;
        on_progress(&emitter.lock().await.on_complete());
        return Err(SyncError::SyncCancelled {
            partial_result: Box::new(summary),
        });
    }

    if let Some(err) = aborted {
        journal_queue.persist(final_state).await?;
        return Err(SyncError::Aborted {
            message: err.to_string(),
            partial_result: Box::new(summary),
        });
    }

    if summary.failed.is_empty() {
        journal_queue.delete().await?;
    } else {
        journal_queue.persist(final_state).await?;
    }

    on_progress(&emitter.lock().await.on_complete());
    Ok(summary)
}

async fn create_planned_directories(journal_state: &mut JournalState, journal_queue: &Arc<JournalQueue>, options: &SyncOptions) -> Result<(), SyncError> {
    let right_root = journal_state.right_root.clone();
    let dirs = journal_state.directories_to_create.clone();
    let retry_config = RetryConfig::new(options.retry_count, options.retry_base_delay_ms);

    for dir in &dirs {
        if options.cancel.is_cancelled() {
            return Ok(());
        }
        let absolute = right_root.join(dir);
        retry_with_backoff(
            &retry_config,
            &options.cancel,
            || std::fs::create_dir_all(&absolute).map_err(|err| SyncError::from_io("creating directory", absolute.clone(), &err)),
            |_, _, _| {},
        )?;
    }

    journal_state.updated_at = chrono::Utc::now();
    journal_queue.persist(journal_state.clone()).await?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_small_parallel(
    items: Vec<PlanItem>,
    state: &Arc<tokio::sync::Mutex<JournalState>>,
    journal_queue: &Arc<JournalQueue>,
    history: &Arc<HistoryLog>,
    retry_config: &RetryConfig,
    options: &SyncOptions,
    emitter: &Arc<tokio::sync::Mutex<ProgressEmitter>>,
    on_progress: &ProgressFn,
) -> Option<SyncError> {
    let semaphore = Arc::new(Semaphore::new(options.max_parallel_small_files.max(1)));
    let mut handles = Vec::with_capacity(items.len());

    for item in items {
        let semaphore = Arc::clone(&semaphore);
        let state = Arc::clone(state);
        let journal_queue = Arc::clone(journal_queue);
        let history = Arc::clone(history);
        let retry_config = *retry_config;
        let options = options.clone();
        let emitter = Arc::clone(emitter);
        let on_progress = Arc::clone(on_progress);

        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire().await.expect("semaphore not closed");
            run_one(&item, &state, &journal_queue, &history, &retry_config, &options, &emitter, &on_progress).await
        }));
    }

    let mut first_error = None;
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
            Err(join_err) => {
                if first_error.is_none() {
                    first_error = Some(SyncError::SyncCopyFailed {
                        path: PathBuf::new(),
                        message: join_err.to_string(),
                    });
                }
            }
        }
    }
    first_error
}

#[allow(clippy::too_many_arguments)]
async fn run_one(
    item: &PlanItem,
    state: &Arc<tokio::sync::Mutex<JournalState>>,
    journal_queue: &Arc<JournalQueue>,
    history: &Arc<HistoryLog>,
    retry_config: &RetryConfig,
    options: &SyncOptions,
    emitter: &Arc<tokio::sync::Mutex<ProgressEmitter>>,
    on_progress: &ProgressFn,
) -> Result<(), SyncError> {
    let item = item.clone();
    let cancel = options.cancel.clone();
    let pause = options.pause.clone();
    let retry_config = *retry_config;

    if pause.is_paused() {
        on_progress(&emitter.lock().await.on_paused(true));
    }

    let active_count = 1usize;
    let target_rel = item.target_relative_path.clone();
    let target_rel_for_task = target_rel.clone();
    let total_bytes = item.source_size;
    let emitter_for_chunks = Arc::clone(emitter);
    let on_progress_for_chunks = Arc::clone(on_progress);

    // Mark this target as in-flight before anything touches disk, so a
    // crash between here and commit leaves a journal entry `recover_active`
    // can use to clean up — not just the in-process cancel/rollback path.
    //
    // The `state` lock is held across the persist call itself (not just the
    // mutation): two concurrent small-file tasks must enqueue their journal
    // writes in the same order they captured their snapshots, or an older
    // snapshot can land after a newer one and undo its progress.
    {
        let mut guard = state.lock().await;
        guard.active_entries.insert(
            item.target_path.clone(),
            ActiveEntry {
                source_path: item.source_path.clone(),
                target_path: item.target_path.clone(),
                source_relative_path: item.source_relative_path.clone(),
                target_relative_path: item.target_relative_path.clone(),
                backup_path: String::new(),
                started_at: chrono::Utc::now(),
                attempt: 0,
            },
        );
        guard.updated_at = chrono::Utc::now();
        let snapshot = guard.clone();
        journal_queue.persist(snapshot).await?;
    }

    let runtime_handle = tokio::runtime::Handle::current();
    let state_for_task = Arc::clone(state);
    let journal_queue_for_task = Arc::clone(journal_queue);

    let attempt_result = tokio::task::spawn_blocking(move || {
        let target_rel = target_rel_for_task;
        let mut txn = CopyTransaction::new(&item);
        let outcome = retry_with_backoff(
            &retry_config,
            &cancel,
            || {
                txn.plan()?;
                txn.back_up()?;

                // Record the backup path (if any) before the destructive
                // write begins, so a crash mid-write can still be rolled
                // back on the next resume.
                let backup_path_str = txn.backup_path_str();
                runtime_handle.block_on(async {
                    let mut guard = state_for_task.lock().await;
                    if let Some(active) = guard.active_entries.get_mut(&item.target_path) {
                        active.backup_path = backup_path_str.clone();
                    }
                    guard.updated_at = chrono::Utc::now();
                    let snapshot = guard.clone();
                    journal_queue_for_task.persist(snapshot).await
                })?;

                let bytes = txn.write(
                    &cancel,
                    &pause,
                    |written| {
                        if let Ok(mut guard) = emitter_for_chunks.try_lock() {
                            if let Some(event) = guard.on_chunk(0, &target_rel, written, total_bytes, active_count) {
                                on_progress_for_chunks(&event);
                            }
                        }
                    },
                    || {
                        if let Ok(guard) = emitter_for_chunks.try_lock() {
                            let event = guard.on_paused(true);
                            on_progress_for_chunks(&event);
                        }
                    },
                )?;
                txn.commit()?;
                Ok(bytes)
            },
            |attempt, _delay, _err| {
                if let Ok(guard) = emitter_for_chunks.try_lock() {
                    on_progress_for_chunks(&guard.on_retry(&target_rel, attempt + 1));
                }
            },
        );

        match &outcome {
            Ok(_) => {}
            Err(_) => {
                let _ = txn.rollback();
            }
        }

        (outcome, txn.backup_path_str(), item)
    })
    .await
    .map_err(|join_err| SyncError::SyncCopyFailed {
        path: target_rel.clone(),
        message: join_err.to_string(),
    })?;

    let (outcome, _backup_path, item) = attempt_result;

    match outcome {
        Ok(bytes) => {
            {
                let mut guard = state.lock().await;
                guard.completed_target_paths.push(item.target_path.clone());
                guard.bytes_transferred = guard.bytes_transferred.saturating_add(bytes);
                guard.active_entries.remove(&item.target_path);
                guard.updated_at = chrono::Utc::now();
                let snapshot = guard.clone();
                journal_queue.persist(snapshot).await?;
            }
            history.record(&item.source_path, &item.target_path).await?;
            let event = emitter.lock().await.on_file_done(&item.target_relative_path, bytes);
            on_progress(&event);
            Ok(())
        }
        Err(err) => {
            // A cancellation is not a failure: the item must stay pending so
            // `resume()` picks it back up. Recording it in `failed` would
            // make `pending_items()` skip it and let `resume()` delete the
            // journal out from under an unsynced file.
            let cancelled = matches!(err, SyncError::SyncCancelled { .. }) || options.cancel.is_cancelled();

            let mut guard = state.lock().await;
            guard.active_entries.remove(&item.target_path);
            if !cancelled {
                guard.failed.push(FailedEntry {
                    target_path: item.target_path.clone(),
                    target_relative_path: item.target_relative_path.clone(),
                    code: err.code().as_str().to_string(),
                    message: err.to_string(),
                    at: chrono::Utc::now(),
                });
            }
            guard.updated_at = chrono::Utc::now();
            let snapshot = guard.clone();
            journal_queue.persist(snapshot).await?;

            if cancelled {
                return Err(err);
            }

            let event = emitter.lock().await.on_file_failed(&item.target_relative_path, &err.to_string());
            on_progress(&event);

            if options.continue_on_error {
                Ok(())
            } else {
                Err(err)
            }
        }
    }
}

fn build_summary(state: &JournalState, started_at: Instant, resumed_from_journal: bool) -> RunSummary {
    let duration = started_at.elapsed();
    let duration_ms = duration.as_millis() as u64;
    let average_throughput_bps = if duration.as_secs_f64() > 0.0 {
        state.bytes_transferred as f64 / duration.as_secs_f64()
    } else {
        0.0
    };

    RunSummary {
        copied: state.completed_target_paths.len(),
        total: state.plan.len(),
        bytes_copied: state.bytes_transferred,
        total_bytes: state.total_bytes,
        failed: state.failed.clone(),
        succeeded_relative_paths: state
            .plan
            .iter()
            .filter(|item| state.completed_target_paths.contains(&item.target_path))
            .map(|item| item.target_relative_path.clone())
            .collect(),
        duration_ms,
        average_throughput_bps,
        left_root: state.left_root.clone(),
        right_root: state.right_root.clone(),
        resumed_from_journal,
    }
}

// Recovery of interrupted transactions lives in `journal::recover_active`;
// re-exported here so callers driving a resume only need `crate::runner`.
pub use journal::recover_active;

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn plan_item(source: PathBuf, target: PathBuf, size: u64) -> PlanItem {
        PlanItem {
            source_relative_path: PathBuf::from(source.file_name().unwrap()),
            target_relative_path: PathBuf::from(target.file_name().unwrap()),
            source_path: source,
            source_size: size,
            target_path: target,
            version: 1,
            destination_exists: false,
            destination_size: None,
        }
    }

    #[tokio::test]
    async fn run_sync_copies_pending_items_and_clears_journal() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let journal_dir = TempDir::new().unwrap();

        let source = src_dir.path().join("doc_v1.txt");
        fs::write(&source, b"hello world").unwrap();
        let target = dst_dir.path().join("doc.txt");

        let item = plan_item(source, target.clone(), 11);
        let journal_path = journal_dir.path().join("journal.json");
        let journal_state = JournalState::new(src_dir.path().to_path_buf(), dst_dir.path().to_path_buf(), vec![], vec![item], chrono::Utc::now());

        let options = SyncOptions::default();
        let summary = run_sync(journal_path.clone(), journal_state, options, Arc::new(|_| {})).await.expect("run succeeds");

        assert_eq!(summary.copied, 1);
        assert_eq!(fs::read(&target).unwrap(), b"hello world");
        assert!(!journal_path.exists());
    }

    #[tokio::test]
    async fn strict_mode_stops_at_first_failure_and_persists_journal() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let journal_dir = TempDir::new().unwrap();

        let missing_source = src_dir.path().join("missing_v1.txt");
        let target = dst_dir.path().join("missing.txt");
        let item = plan_item(missing_source, target, 5);

        let journal_path = journal_dir.path().join("journal.json");
        let journal_state = JournalState::new(src_dir.path().to_path_buf(), dst_dir.path().to_path_buf(), vec![], vec![item], chrono::Utc::now());

        let mut options = SyncOptions::default();
        options.continue_on_error = false;

        let result = run_sync(journal_path.clone(), journal_state, options, Arc::new(|_| {})).await;
        assert!(result.is_err());
        assert!(journal_path.exists());
    }

    #[tokio::test]
    async fn continue_on_error_records_failure_but_completes_run() {
        let src_dir = TempDir::new().unwrap();
        let dst_dir = TempDir::new().unwrap();
        let journal_dir = TempDir::new().unwrap();

        let missing_source = src_dir.path().join("missing_v1.txt");
        let target = dst_dir.path().join("missing.txt");
        let item = plan_item(missing_source, target, 5);

        let good_source = src_dir.path().join("good_v1.txt");
        fs::write(&good_source, b"ok").unwrap();
        let good_target = dst_dir.path().join("good.txt");
        let good_item = plan_item(good_source, good_target.clone(), 2);

        let journal_path = journal_dir.path().join("journal.json");
        let journal_state = JournalState::new(
            src_dir.path().to_path_buf(),
            dst_dir.path().to_path_buf(),
            vec![],
            vec![item, good_item],
            chrono::Utc::now(),
        );

        let mut options = SyncOptions::default();
        options.continue_on_error = true;

        let summary = run_sync(journal_path.clone(), journal_state, options, Arc::new(|_| {})).await.expect("run completes");
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.copied, 1);
        assert!(fs::metadata(&good_target).is_ok());
        // Journal persists because there were failures to report later.
        assert!(journal_path.exists());
    }
}
