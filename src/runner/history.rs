//! History log: one line per completed copy, for human review after a run.
//! Writes are serialized behind a `tokio::Mutex` the same way the journal
//! queue is (§4.7) — a single append-only file, never read back by the
//! engine itself.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;

use crate::types::SyncError;

pub struct HistoryLog {
    path: Option<PathBuf>,
    lock: tokio::sync::Mutex<()>,
}

impl HistoryLog {
    /// `path: None` disables history logging entirely (the left_root-empty
    /// case mentioned in the design: nothing to log if there's no run to
    /// attribute lines to).
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub async fn record(&self, source_path: &Path, target_path: &Path) -> Result<(), SyncError> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };

        let _guard = self.lock.lock().await;
        let line = format!(
            "{}\t{}\t{}\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            source_path.display(),
            target_path.display()
        );
        let path = path.clone();

        tokio::task::spawn_blocking(move || append_line(&path, &line))
            .await
            .map_err(|join_err| SyncError::SyncLogError {
                path: PathBuf::new(),
                message: join_err.to_string(),
            })?
    }
}

fn append_line(path: &Path, line: &str) -> Result<(), SyncError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|err| SyncError::SyncLogError {
                path: parent.to_path_buf(),
                message: err.to_string(),
            })?;
        }
    }

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|err| SyncError::SyncLogError {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;

    file.write_all(line.as_bytes()).map_err(|err| SyncError::SyncLogError {
        path: path.to_path_buf(),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn records_a_tab_separated_line() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("history.log");
        let log = HistoryLog::new(Some(log_path.clone()));

        log.record(Path::new("/left/a.txt"), Path::new("/right/a.txt")).await.unwrap();

        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert!(contents.contains("/left/a.txt"));
        assert!(contents.contains("/right/a.txt"));
        assert_eq!(contents.matches('\t').count(), 2);
    }

    #[tokio::test]
    async fn disabled_log_is_a_no_op() {
        let log = HistoryLog::new(None);
        assert!(log.record(Path::new("/left/a.txt"), Path::new("/right/a.txt")).await.is_ok());
    }

    #[tokio::test]
    async fn appends_across_multiple_records() {
        let dir = TempDir::new().unwrap();
        let log_path = dir.path().join("history.log");
        let log = HistoryLog::new(Some(log_path.clone()));

        log.record(Path::new("/left/a.txt"), Path::new("/right/a.txt")).await.unwrap();
        log.record(Path::new("/left/b.txt"), Path::new("/right/b.txt")).await.unwrap();

        let contents = std::fs::read_to_string(&log_path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
