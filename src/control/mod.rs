//! Control surface (C8): the one public entry point library consumers and
//! the CLI both drive. Owns the "one sync at a time" guard and wires C3's
//! plan into C7's runner, resuming from a recovery journal when asked.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::journal;
use crate::kernel::{CancelToken, PauseToken};
use crate::planner::{build_plan, validate_plan_items};
use crate::runner::{run_sync, ProgressEvent, RunSummary, SyncOptions};
use crate::types::{JournalState, JournalSummary, PlanBundle, SyncError};

/// A sync engine instance. Cheap to construct; intended to be kept around
/// for the lifetime of a process (CLI) or held by a long-lived library
/// consumer (an editor plugin, a service).
pub struct SyncEngine {
    running: Arc<AtomicBool>,
    cancel: CancelToken,
    pause: PauseToken,
}

impl Default for SyncEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncEngine {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            cancel: CancelToken::new(),
            pause: PauseToken::new(),
        }
    }

    /// Build a plan without running it — the `--dry-run` / preview path.
    pub fn build_compare_plan(&self, left_root: &Path, right_root: &Path) -> Result<PlanBundle, SyncError> {
        let plan = build_plan(left_root, right_root)?;
        Ok(PlanBundle {
            left_root: plan.left_root,
            right_root: plan.right_root,
            pending_count: plan.items.len(),
            plan: plan.items,
            directories_to_create: plan.directories_to_create,
            total_candidates: plan.total_candidates,
        })
    }

    /// Read a previously written journal's summary, without touching it.
    pub fn recovery_summary(&self, journal_path: &Path) -> Result<Option<JournalSummary>, SyncError> {
        Ok(journal::read(journal_path)?.map(|state| journal::summary(&state)))
    }

    /// Run a fresh sync from a `PlanBundle` (§6). Only one sync may run at
    /// a time per engine instance; a concurrent call is rejected rather
    /// than queued.
    pub async fn sync(
        &self,
        journal_path: PathBuf,
        plan: PlanBundle,
        run_options: RunOptions,
        on_progress: Arc<dyn Fn(&ProgressEvent) + Send + Sync>,
    ) -> Result<RunSummary, SyncError> {
        self.acquire_run_guard()?;
        let result = async {
            validate_plan_items(&plan.plan, &plan.right_root)?;
            let journal_state = JournalState::new(plan.left_root, plan.right_root, plan.directories_to_create, plan.plan, chrono::Utc::now());
            let options = self.build_sync_options(run_options);
            run_sync(journal_path, journal_state, options, on_progress).await
        }
        .await;
        self.release_run_guard();
        result
    }

    /// Resume an interrupted sync from its journal (§4.4 / §6): undo any
    /// in-flight transaction left behind, persist the cleaned-up state,
    /// then continue with whatever is still pending.
    pub async fn resume(&self, journal_path: PathBuf, run_options: RunOptions, on_progress: Arc<dyn Fn(&ProgressEvent) + Send + Sync>) -> Result<RunSummary, SyncError> {
        self.acquire_run_guard()?;
        let result = async {
            let mut state = journal::read(&journal_path)?.ok_or_else(|| SyncError::NoRecoveryJournal { path: journal_path.clone() })?;
            validate_plan_items(&state.plan, &state.right_root)?;
            journal::recover_active(&mut state)?;
            journal::write(&journal_path, &state)?;

            if state.pending_items().is_empty() {
                journal::remove(&journal_path)?;
                return Ok(RunSummary {
                    total: state.plan.len(),
                    copied: state.completed_target_paths.len(),
                    failed: state.failed,
                    left_root: state.left_root,
                    right_root: state.right_root,
                    resumed_from_journal: true,
                    ..Default::default()
                });
            }

            let options = self.build_sync_options(run_options);
            run_sync(journal_path, state, options, on_progress).await
        }
        .await;
        self.release_run_guard();
        result
    }

    pub fn cancel_sync(&self) {
        self.cancel.cancel();
    }

    /// Flip the pause flag, returning the new state.
    pub fn toggle_pause(&self) -> bool {
        self.pause.toggle()
    }

    pub fn is_paused(&self) -> bool {
        self.pause.is_paused()
    }

    fn acquire_run_guard(&self) -> Result<(), SyncError> {
        if self.running.swap(true, Ordering::SeqCst) {
            Err(SyncError::AlreadyRunning)
        } else {
            Ok(())
        }
    }

    fn release_run_guard(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn build_sync_options(&self, run_options: RunOptions) -> SyncOptions {
        SyncOptions {
            cancel: self.cancel.clone(),
            pause: self.pause.clone(),
            continue_on_error: run_options.continue_on_error,
            retry_count: run_options.retry_count,
            retry_base_delay_ms: run_options.retry_base_delay_ms,
            small_file_threshold_bytes: run_options.small_file_threshold_bytes,
            max_parallel_small_files: run_options.max_parallel_small_files,
            history_log_path: run_options.history_log_path,
        }
    }
}

/// The subset of `SyncOptions` a caller chooses per run; `cancel`/`pause`
/// are owned by the engine instance instead, so every run started from the
/// same `SyncEngine` shares one set of control tokens.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub continue_on_error: bool,
    pub retry_count: u32,
    pub retry_base_delay_ms: u64,
    pub small_file_threshold_bytes: u64,
    pub max_parallel_small_files: usize,
    pub history_log_path: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        let defaults = SyncOptions::default();
        Self {
            continue_on_error: defaults.continue_on_error,
            retry_count: defaults.retry_count,
            retry_base_delay_ms: defaults.retry_base_delay_ms,
            small_file_threshold_bytes: defaults.small_file_threshold_bytes,
            max_parallel_small_files: defaults.max_parallel_small_files,
            history_log_path: None,
        }
    }
}
