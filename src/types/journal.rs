//! Recovery journal state (C4) — the durable, versioned JSON record of an
//! in-progress sync.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::plan::PlanItem;

pub const JOURNAL_SCHEMA_VERSION: u32 = 1;

/// An in-flight transaction's journal record (§3 `active_entries`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveEntry {
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub source_relative_path: PathBuf,
    pub target_relative_path: PathBuf,
    /// Empty string when no prior destination existed (invariant #3).
    pub backup_path: String,
    pub started_at: DateTime<Utc>,
    pub attempt: u32,
}

/// A failed plan item, recorded when `continue_on_error` keeps a run going.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedEntry {
    pub target_path: PathBuf,
    pub target_relative_path: PathBuf,
    pub code: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// The full persisted journal (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalState {
    pub version: u32,
    pub left_root: PathBuf,
    pub right_root: PathBuf,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub total_bytes: u64,
    pub directories_to_create: Vec<PathBuf>,
    pub plan: Vec<PlanItem>,
    pub completed_target_paths: Vec<PathBuf>,
    pub failed: Vec<FailedEntry>,
    pub active_entries: HashMap<PathBuf, ActiveEntry>,
    pub bytes_transferred: u64,
}

impl JournalState {
    pub fn new(
        left_root: PathBuf,
        right_root: PathBuf,
        directories_to_create: Vec<PathBuf>,
        plan: Vec<PlanItem>,
        now: DateTime<Utc>,
    ) -> Self {
        let total_bytes = plan.iter().map(|item| item.source_size).sum();
        Self {
            version: JOURNAL_SCHEMA_VERSION,
            left_root,
            right_root,
            started_at: now,
            updated_at: now,
            total_bytes,
            directories_to_create,
            plan,
            completed_target_paths: Vec::new(),
            failed: Vec::new(),
            active_entries: HashMap::new(),
            bytes_transferred: 0,
        }
    }

    pub fn completed_set(&self) -> HashSet<PathBuf> {
        self.completed_target_paths.iter().cloned().collect()
    }

    /// Items that are neither completed nor recorded as failed — the "pending"
    /// state from invariant #2.
    pub fn pending_items(&self) -> Vec<PlanItem> {
        let completed = self.completed_set();
        let failed: HashSet<&PathBuf> = self.failed.iter().map(|f| &f.target_path).collect();
        self.plan
            .iter()
            .filter(|item| !completed.contains(&item.target_path) && !failed.contains(&item.target_path))
            .cloned()
            .collect()
    }
}

/// Summary view for display / the control surface's `recovery_summary` (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalSummary {
    pub left_root: PathBuf,
    pub right_root: PathBuf,
    pub total: usize,
    pub completed: usize,
    pub pending_count: usize,
    pub failed_count: usize,
    pub active_count: usize,
    pub updated_at: DateTime<Utc>,
}

impl From<&JournalState> for JournalSummary {
    fn from(state: &JournalState) -> Self {
        let pending = state.pending_items().len();
        Self {
            left_root: state.left_root.clone(),
            right_root: state.right_root.clone(),
            total: state.plan.len(),
            completed: state.completed_target_paths.len(),
            pending_count: pending,
            failed_count: state.failed.len(),
            active_count: state.active_entries.len(),
            updated_at: state.updated_at,
        }
    }
}
