//! Recovery journal (C4)
//!
//! Durable record of plan + progress + in-flight transactions; read/write/
//! replay. Writes are serialized through `JournalQueue`, a single-consumer
//! FIFO the runner (C7) awaits before any irreversible next step — the
//! async analogue of the teacher crate's dispatcher/worker inbox design in
//! `executor::pool`, narrowed here to one writer instead of many.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::types::{JournalState, JournalSummary, SyncError};

/// Read a journal file. `Ok(None)` means "no sync in progress" (absent
/// file); malformed JSON is a hard error.
pub fn read(path: &Path) -> Result<Option<JournalState>, SyncError> {
    match std::fs::read(path) {
        Ok(bytes) => {
            let state: JournalState = serde_json::from_slice(&bytes).map_err(|err| SyncError::Filesystem {
                action: "parsing recovery journal",
                path: path.to_path_buf(),
                message: err.to_string(),
                os_code: None,
            })?;
            Ok(Some(state))
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(SyncError::from_io("reading recovery journal", path.to_path_buf(), &err)),
    }
}

/// Persist `state` to `path`, creating parent directories as needed.
/// Writes go through a sibling temp file and a rename so a crash mid-write
/// never leaves a truncated journal behind.
pub fn write(path: &Path, state: &JournalState) -> Result<(), SyncError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|err| SyncError::from_io("writing recovery journal", parent.to_path_buf(), &err))?;
        }
    }

    let bytes = serde_json::to_vec_pretty(state).map_err(|err| SyncError::Filesystem {
        action: "serializing recovery journal",
        path: path.to_path_buf(),
        message: err.to_string(),
        os_code: None,
    })?;

    let tmp_path = path.with_extension("journal.tmp");
    std::fs::write(&tmp_path, &bytes).map_err(|err| SyncError::from_io("writing recovery journal", tmp_path.clone(), &err))?;
    std::fs::rename(&tmp_path, path).map_err(|err| SyncError::from_io("writing recovery journal", path.to_path_buf(), &err))?;
    Ok(())
}

/// Delete the journal file. Absence is success (invariant #6).
pub fn remove(path: &Path) -> Result<(), SyncError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(SyncError::from_io("removing recovery journal", path.to_path_buf(), &err)),
    }
}

pub fn summary(state: &JournalState) -> JournalSummary {
    JournalSummary::from(state)
}

/// Undo every in-flight transaction left behind by an interrupted run
/// (§4.4). For each active entry: delete the (possibly partial) live
/// destination if present, and if a backup was taken, rename it back into
/// place. `active_entries` is cleared on return.
pub fn recover_active(state: &mut JournalState) -> Result<(), SyncError> {
    let entries: Vec<_> = state.active_entries.values().cloned().collect();

    for entry in entries {
        match std::fs::remove_file(&entry.target_path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(SyncError::from_io("removing partial file", entry.target_path.clone(), &err));
            }
        }

        if !entry.backup_path.is_empty() {
            let backup = PathBuf::from(&entry.backup_path);
            match std::fs::rename(&backup, &entry.target_path) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(SyncError::RestoreFailed {
                        path: entry.target_path.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }
    }

    state.active_entries.clear();
    state.updated_at = Utc::now();
    Ok(())
}

/// Single-consumer serialized journal writer. Every mutation that affects
/// user-visible progress goes through `persist`; the internal `tokio::Mutex`
/// gives FIFO ordering across concurrently-awaiting callers without a
/// hand-rolled channel actor.
pub struct JournalQueue {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl JournalQueue {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Serialize and write `state`. Blocking I/O is pushed onto the
    /// blocking pool so the async caller isn't starved.
    pub async fn persist(&self, state: JournalState) -> Result<(), SyncError> {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write(&path, &state))
            .await
            .map_err(|join_err| SyncError::SyncLogError {
                path: PathBuf::new(),
                message: join_err.to_string(),
            })?
    }

    pub async fn delete(&self) -> Result<(), SyncError> {
        let _guard = self.lock.lock().await;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || remove(&path))
            .await
            .map_err(|join_err| SyncError::SyncLogError {
                path: PathBuf::new(),
                message: join_err.to_string(),
            })?
    }
}
