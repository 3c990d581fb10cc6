//! Atomic copy transaction (C5)
//!
//! One plan item, taken through `IDLE -> PLANNED -> BACKED_UP -> WRITTEN ->
//! COMMITTED`, with rollback on any failure or cancellation along the way.
//! The actual byte-moving loop — temp sibling file, full-buffer writes,
//! `sync_all` before rename — is the same write-then-rename shape the
//! teacher crate's `executor::copy::copy_file_atomic` uses; this module
//! generalizes it to also take a backup of any prior destination so a
//! failed write can be undone instead of merely cleaned up.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::kernel::CancelToken;
use crate::types::{PlanItem, SyncError};

/// Streaming copy buffer size (§4.5 reference value).
const COPY_BUFFER_BYTES: usize = 256 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Idle,
    Planned,
    BackedUp,
    Written,
    Committed,
}

/// Drives one `PlanItem` through the copy state machine. Callers persist a
/// journal `ActiveEntry` after `back_up` succeeds (so `backup_path` is known
/// before any destructive write) and clear it after `commit` or `rollback`.
pub struct CopyTransaction<'a> {
    item: &'a PlanItem,
    state: TransactionState,
    backup_path: Option<PathBuf>,
    write_path: Option<PathBuf>,
}

impl<'a> CopyTransaction<'a> {
    pub fn new(item: &'a PlanItem) -> Self {
        Self {
            item,
            state: TransactionState::Idle,
            backup_path: None,
            write_path: None,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Empty string when no backup was taken — the journal's
    /// `ActiveEntry::backup_path` convention for "nothing to restore".
    pub fn backup_path_str(&self) -> String {
        self.backup_path
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// `IDLE -> PLANNED`: confirm the source is still there.
    pub fn plan(&mut self) -> Result<(), SyncError> {
        match fs::metadata(&self.item.source_path) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                return Err(SyncError::SourceUnavailable {
                    path: self.item.source_path.clone(),
                })
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(SyncError::SourceUnavailable {
                    path: self.item.source_path.clone(),
                })
            }
            Err(err) => return Err(SyncError::from_io("reading file metadata", self.item.source_path.clone(), &err)),
        }
        self.state = TransactionState::Planned;
        Ok(())
    }

    /// `PLANNED -> BACKED_UP`: move any existing destination file aside.
    /// No-op (still transitions) when there is nothing at the destination —
    /// invariant #3 of the journal (`backup_path` stays empty).
    pub fn back_up(&mut self) -> Result<(), SyncError> {
        if let Some(parent) = self.item.target_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| SyncError::from_io("creating directory", parent.to_path_buf(), &err))?;
            }
        }

        if self.item.target_path.exists() {
            let backup = unique_sibling_path(&self.item.target_path, "lempicka-tmp")?;
            fs::rename(&self.item.target_path, &backup).map_err(|err| SyncError::from_io("backing up destination", self.item.target_path.clone(), &err))?;
            self.backup_path = Some(backup);
        }
        self.state = TransactionState::BackedUp;
        Ok(())
    }

    /// `BACKED_UP -> WRITTEN`: stream the source into a staging file next
    /// to the destination, fsync it, then rename into place. `on_chunk` is
    /// invoked after each buffer write with the bytes written so far, and
    /// is also where the caller should check `cancel`/pause checkpoints.
    /// `on_pause_tick` fires once per poll interval while suspended mid-file
    /// (§4.6), so callers can keep emitting `paused` progress events rather
    /// than going silent between the start-of-item pause check and commit.
    pub fn write(
        &mut self,
        cancel: &CancelToken,
        pause: &crate::kernel::PauseToken,
        mut on_chunk: impl FnMut(u64),
        mut on_pause_tick: impl FnMut(),
    ) -> Result<u64, SyncError> {
        let write_path = unique_sibling_path(&self.item.target_path, "lempicka-write")?;
        self.write_path = Some(write_path.clone());

        let copy_result = (|| -> Result<u64, SyncError> {
            let mut source = File::open(&self.item.source_path).map_err(|err| SyncError::from_io("reading source file", self.item.source_path.clone(), &err))?;
            let mut staging = File::create(&write_path).map_err(|err| SyncError::from_io("writing destination file", write_path.clone(), &err))?;

            let mut buffer = vec![0u8; COPY_BUFFER_BYTES];
            let mut total = 0u64;

            loop {
                crate::kernel::wait_while_paused(pause, cancel, &mut on_pause_tick);
                if cancel.is_cancelled() {
                    return Err(SyncError::SyncCancelled {
                        partial_result: Box::default(),
                    });
                }

                let read = source.read(&mut buffer).map_err(|err| SyncError::from_io("reading source file", self.item.source_path.clone(), &err))?;
                if read == 0 {
                    break;
                }
                staging.write_all(&buffer[..read]).map_err(|err| SyncError::from_io("writing destination file", write_path.clone(), &err))?;
                total += read as u64;
                on_chunk(total);
            }

            staging.sync_all().map_err(|err| SyncError::from_io("writing destination file", write_path.clone(), &err))?;
            drop(staging);

            preserve_mtime(&self.item.source_path, &write_path);

            fs::rename(&write_path, &self.item.target_path).map_err(|err| SyncError::from_io("writing destination file", self.item.target_path.clone(), &err))?;

            Ok(total)
        })();

        if copy_result.is_err() {
            let _ = fs::remove_file(&write_path);
            self.write_path = None;
        } else {
            self.state = TransactionState::Written;
        }
        copy_result
    }

    /// `WRITTEN -> COMMITTED`: drop the backup. A failure here does not
    /// undo the already-landed write; it surfaces as `BackupCleanupFailed`
    /// so the caller can report a file-level warning without rolling back.
    pub fn commit(&mut self) -> Result<(), SyncError> {
        if let Some(backup) = self.backup_path.take() {
            if let Err(err) = fs::remove_file(&backup) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    self.state = TransactionState::Committed;
                    return Err(SyncError::BackupCleanupFailed {
                        path: backup,
                        message: err.to_string(),
                    });
                }
            }
        }
        self.state = TransactionState::Committed;
        Ok(())
    }

    /// Undo whatever has happened so far: remove a half-written staging
    /// file, and restore a backup if one was taken. Safe to call from any
    /// state, including `Idle`.
    pub fn rollback(&mut self) -> Result<(), SyncError> {
        if let Some(write_path) = self.write_path.take() {
            let _ = fs::remove_file(&write_path);
        }

        if matches!(self.state, TransactionState::Written) {
            let _ = fs::remove_file(&self.item.target_path);
        }

        if let Some(backup) = self.backup_path.take() {
            fs::rename(&backup, &self.item.target_path).map_err(|err| SyncError::RestoreFailed {
                path: self.item.target_path.clone(),
                message: err.to_string(),
            })?;
        }

        self.state = TransactionState::Idle;
        Ok(())
    }
}

/// Best-effort source mtime preservation (§4.5). A failure here must never
/// affect the transaction's result, so errors are swallowed.
fn preserve_mtime(source: &Path, staging: &Path) {
    if let Ok(metadata) = fs::metadata(source) {
        if let Ok(modified) = metadata.modified() {
            let _ = filetime::set_file_mtime(staging, filetime::FileTime::from_system_time(modified));
        }
    }
}

/// Build a sibling path of the form `.<basename>.<infix>-<epoch_ms>-<pid>-<rand6>`,
/// regenerating the random suffix on the rare collision.
fn unique_sibling_path(target: &Path, infix: &str) -> Result<PathBuf, SyncError> {
    let basename = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "lempicka".to_string());

    for _ in 0..8 {
        let epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        let pid = std::process::id();
        let rand6: String = rand::thread_rng().sample_iter(&Alphanumeric).take(6).map(char::from).collect();

        let name = format!(".{}.{}-{}-{}-{}", basename, infix, epoch_ms, pid, rand6);
        let candidate = target.with_file_name(name);
        if !candidate.exists() {
            return Ok(candidate);
        }
    }

    Err(SyncError::Filesystem {
        action: "staging temporary file",
        path: target.to_path_buf(),
        message: "could not allocate a unique temporary file name".to_string(),
        os_code: None,
    })
}
