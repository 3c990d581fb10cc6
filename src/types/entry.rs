//! FileRecord - a single scanned file, as produced by the tree scanner (C2)

use std::path::{Path, PathBuf};

/// One entry produced by scanning a root: an absolute path, its path
/// relative to the scan root, and the size captured at scan time.
///
/// Size is the sole equality signal the planner uses (see Non-goals);
/// capturing it here means the scanner and the planner never re-stat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub full_path: PathBuf,
    pub relative_path: PathBuf,
    pub size_bytes: u64,
}

impl FileRecord {
    pub fn new(full_path: PathBuf, relative_path: PathBuf, size_bytes: u64) -> Self {
        Self {
            full_path,
            relative_path,
            size_bytes,
        }
    }

    pub fn basename(&self) -> &str {
        self.relative_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    pub fn dirname(&self) -> &Path {
        self.relative_path.parent().unwrap_or_else(|| Path::new(""))
    }
}
