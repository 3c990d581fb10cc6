//! Core type definitions for the sync engine

mod entry;
mod error;
mod journal;
mod plan;

pub use entry::FileRecord;
pub use error::{fs_hint, is_recoverable_os_code, ErrorCode, SyncError};
pub use journal::{ActiveEntry, FailedEntry, JournalState, JournalSummary, JOURNAL_SCHEMA_VERSION};
pub use plan::{Plan, PlanBundle, PlanItem};
