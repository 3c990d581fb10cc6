//! Plan item / plan types produced by the planner (C3) and carried through
//! the journal (C4) and runner (C7).

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One planned copy: the highest-version source candidate for a given
/// destination-relative path, plus whatever the planner already knows
/// about the destination side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanItem {
    pub source_path: PathBuf,
    pub source_relative_path: PathBuf,
    pub source_size: u64,
    pub target_path: PathBuf,
    pub target_relative_path: PathBuf,
    pub version: u64,
    pub destination_exists: bool,
    pub destination_size: Option<u64>,
}

impl PlanItem {
    /// Invariant #1 key: every plan item is keyed by its target path.
    pub fn key(&self) -> &PathBuf {
        &self.target_path
    }
}

/// Ordered plan plus the directories that must be created before any copy
/// runs. `directories_to_create` and `plan` are both sorted lexicographically
/// by relative path (§3).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub left_root: PathBuf,
    pub right_root: PathBuf,
    pub items: Vec<PlanItem>,
    pub directories_to_create: Vec<PathBuf>,
    /// Total number of distinct targets resolved from the source tree,
    /// including ones already up to date and therefore absent from `items`.
    pub total_candidates: usize,
}

impl Plan {
    pub fn total_bytes(&self) -> u64 {
        self.items.iter().map(|item| item.source_size).sum()
    }
}

/// The bundle returned to external callers by `build_compare_plan` (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanBundle {
    pub left_root: PathBuf,
    pub right_root: PathBuf,
    pub plan: Vec<PlanItem>,
    pub directories_to_create: Vec<PathBuf>,
    pub total_candidates: usize,
    pub pending_count: usize,
}
