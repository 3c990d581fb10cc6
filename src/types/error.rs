//! Error types for the sync engine

use std::path::PathBuf;
use thiserror::Error;

use crate::runner::RunSummary;

/// Stable error codes from the error-handling design, attached to every
/// `SyncError` so callers can match on them without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidDirectory,
    FilesystemError,
    DestinationPathConflict,
    SourceUnavailable,
    DestinationUnavailable,
    SyncCopyFailed,
    BackupCleanupFailed,
    RestoreFailed,
    SyncLogError,
    SyncCancelled,
    InvalidPlan,
    InvalidPlanItem,
    NoRecoveryJournal,
    AlreadyRunning,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidDirectory => "INVALID_DIRECTORY",
            ErrorCode::FilesystemError => "FILESYSTEM_ERROR",
            ErrorCode::DestinationPathConflict => "DESTINATION_PATH_CONFLICT",
            ErrorCode::SourceUnavailable => "SOURCE_UNAVAILABLE",
            ErrorCode::DestinationUnavailable => "DESTINATION_UNAVAILABLE",
            ErrorCode::SyncCopyFailed => "SYNC_COPY_FAILED",
            ErrorCode::BackupCleanupFailed => "BACKUP_CLEANUP_FAILED",
            ErrorCode::RestoreFailed => "RESTORE_FAILED",
            ErrorCode::SyncLogError => "SYNC_LOG_ERROR",
            ErrorCode::SyncCancelled => "SYNC_CANCELLED",
            ErrorCode::InvalidPlan => "INVALID_PLAN",
            ErrorCode::InvalidPlanItem => "INVALID_PLAN_ITEM",
            ErrorCode::NoRecoveryJournal => "NO_RECOVERY_JOURNAL",
            ErrorCode::AlreadyRunning => "SYNC_ALREADY_RUNNING",
        }
    }
}

/// Errors produced by the sync engine.
///
/// Every variant maps 1:1 onto a stable error code from the design. The
/// `partial_result` carried by `SyncCancelled`/`Aborted` lets a caller
/// report how much of a run actually landed before it gave up.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{path} is not a directory")]
    InvalidDirectory { path: PathBuf },

    #[error("{action} failed for {path}: {message}")]
    Filesystem {
        action: &'static str,
        path: PathBuf,
        message: String,
        os_code: Option<i32>,
    },

    #[error("{path} exists but is not the kind of entry required here")]
    DestinationPathConflict { path: PathBuf },

    #[error("source file unavailable: {path}")]
    SourceUnavailable { path: PathBuf },

    #[error("destination unavailable: {path}: {message}")]
    DestinationUnavailable { path: PathBuf, message: String },

    #[error("copy failed for {path}: {message}")]
    SyncCopyFailed { path: PathBuf, message: String },

    #[error("transaction committed but backup cleanup failed for {path}: {message}")]
    BackupCleanupFailed { path: PathBuf, message: String },

    #[error("could not restore backup for {path}: {message} (data may be at risk)")]
    RestoreFailed { path: PathBuf, message: String },

    #[error("history log error at {path}: {message}")]
    SyncLogError { path: PathBuf, message: String },

    #[error("sync cancelled")]
    SyncCancelled { partial_result: Box<RunSummary> },

    #[error("invalid plan: {message}")]
    InvalidPlan { message: String },

    #[error("invalid plan item: {message}")]
    InvalidPlanItem { message: String },

    #[error("no recovery journal found at {path}")]
    NoRecoveryJournal { path: PathBuf },

    #[error("a sync is already running")]
    AlreadyRunning,

    #[error("run aborted: {message}")]
    Aborted {
        message: String,
        partial_result: Box<RunSummary>,
    },
}

impl SyncError {
    pub fn code(&self) -> ErrorCode {
        match self {
            SyncError::InvalidDirectory { .. } => ErrorCode::InvalidDirectory,
            SyncError::Filesystem { .. } => ErrorCode::FilesystemError,
            SyncError::DestinationPathConflict { .. } => ErrorCode::DestinationPathConflict,
            SyncError::SourceUnavailable { .. } => ErrorCode::SourceUnavailable,
            SyncError::DestinationUnavailable { .. } => ErrorCode::DestinationUnavailable,
            SyncError::SyncCopyFailed { .. } => ErrorCode::SyncCopyFailed,
            SyncError::BackupCleanupFailed { .. } => ErrorCode::BackupCleanupFailed,
            SyncError::RestoreFailed { .. } => ErrorCode::RestoreFailed,
            SyncError::SyncLogError { .. } => ErrorCode::SyncLogError,
            SyncError::SyncCancelled { .. } => ErrorCode::SyncCancelled,
            SyncError::InvalidPlan { .. } => ErrorCode::InvalidPlan,
            SyncError::InvalidPlanItem { .. } => ErrorCode::InvalidPlanItem,
            SyncError::NoRecoveryJournal { .. } => ErrorCode::NoRecoveryJournal,
            SyncError::AlreadyRunning => ErrorCode::AlreadyRunning,
            SyncError::Aborted { .. } => ErrorCode::SyncCopyFailed,
        }
    }

    /// Build a `Filesystem` error from a raw `io::Error`, tagging which
    /// action (`"reading directory"`, `"reading file metadata"`, ...) failed.
    pub fn from_io(action: &'static str, path: PathBuf, err: &std::io::Error) -> Self {
        SyncError::Filesystem {
            action,
            path,
            message: format!("{}{}", err, fs_hint(err.raw_os_error())),
            os_code: err.raw_os_error(),
        }
    }
}

/// A short, human-readable hint derived from a raw OS error code, appended
/// to filesystem error messages per the error-handling design.
pub fn fs_hint(os_code: Option<i32>) -> String {
    match os_code {
        Some(28) => " (No space left on destination device.)".to_string(),
        Some(13) => " (Permission denied.)".to_string(),
        Some(2) => " (No such file or directory.)".to_string(),
        Some(16) => " (Device or resource busy.)".to_string(),
        Some(24) => " (Too many open files.)".to_string(),
        Some(5) => " (I/O error.)".to_string(),
        _ => String::new(),
    }
}

/// Recoverable OS error codes per the retry kernel design (§4.6).
pub fn is_recoverable_os_code(os_code: Option<i32>) -> bool {
    matches!(
        os_code,
        Some(16)  // EBUSY
            | Some(24) // EMFILE
            | Some(23) // ENFILE
            | Some(5) // EIO
            | Some(2) // ENOENT
            | Some(107) // ENOTCONN
            | Some(11) // EAGAIN
            | Some(110) // ETIMEDOUT
    )
}
