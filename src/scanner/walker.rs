//! Tree scanner (C2)

use std::path::Path;

use crate::pathutil::{has_usable_extension, is_ignored};
use crate::types::{FileRecord, SyncError};

/// Recursively enumerate `root_path`, returning an ordered sequence of
/// `FileRecord`s for every accepted regular file.
///
/// Filtering, in order:
/// - entries named per `is_ignored` are skipped (directories included, so
///   their whole subtree goes with them)
/// - symbolic links are skipped unconditionally, file or directory
/// - accepted files without a usable extension are skipped
///
/// Directory-read and stat failures are propagated as
/// `SyncError::Filesystem` rather than silently skipped, per §4.2.
pub fn scan_tree(root_path: &Path) -> Result<Vec<FileRecord>, SyncError> {
    let mut records = Vec::new();

    let walker = ignore::WalkBuilder::new(root_path)
        .standard_filters(false)
        .hidden(false)
        .follow_links(false)
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                return Err(SyncError::Filesystem {
                    action: "reading directory",
                    path: root_path.to_path_buf(),
                    message: err.to_string(),
                    os_code: err.io_error().and_then(|e| e.raw_os_error()),
                });
            }
        };

        if entry.path() == root_path {
            continue;
        }

        let name = match entry.file_name().to_str() {
            Some(n) => n,
            None => {
                eprintln!("Warning: skipping non-UTF-8 file name under {}", entry.path().display());
                continue;
            }
        };
        if is_ignored(name) {
            continue;
        }

        let file_type = match entry.file_type() {
            Some(ft) => ft,
            None => continue,
        };

        if file_type.is_symlink() || file_type.is_dir() || !file_type.is_file() {
            continue;
        }
        if !has_usable_extension(name) {
            continue;
        }

        let relative_path = match entry.path().strip_prefix(root_path) {
            Ok(p) => p.to_path_buf(),
            Err(_) => {
                eprintln!(
                    "Warning: failed to calculate relative path for {}; this may indicate a symlink pointing outside the scan root. File will be skipped.",
                    entry.path().display()
                );
                continue;
            }
        };

        let metadata = entry.metadata().map_err(|err| SyncError::Filesystem {
            action: "reading file metadata",
            path: entry.path().to_path_buf(),
            message: err.to_string(),
            os_code: err.io_error().and_then(|e| e.raw_os_error()),
        })?;

        records.push(FileRecord::new(
            entry.path().to_path_buf(),
            relative_path,
            metadata.len(),
        ));
    }

    Ok(records)
}
