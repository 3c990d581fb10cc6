//! # lempicka-sync — versioned-file sync engine
//!
//! Scans a source tree of versioned files (`doc_v3.txt`), resolves the
//! highest version per target, and copies stale or missing files into a
//! destination tree atomically, resumably, and cancellably.

pub mod config;
pub mod control;
pub mod hash;
pub mod journal;
pub mod kernel;
pub mod pathutil;
pub mod planner;
pub mod runner;
pub mod scanner;
pub mod transaction;
pub mod types;
pub mod ui;

pub use control::{RunOptions, SyncEngine};
pub use runner::{ProgressEvent, RunSummary, SyncOptions};
pub use types::{ErrorCode, FileRecord, JournalState, JournalSummary, Plan, PlanBundle, PlanItem, SyncError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
