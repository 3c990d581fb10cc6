//! Planner (C3)

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::pathutil::{check_root_safety, is_path_within, parse_versioned_name};
use crate::scanner::scan_tree;
use crate::types::{FileRecord, Plan, PlanItem, SyncError};

/// Build a copy plan from two scanned roots (§4.3).
///
/// Preconditions (all fatal): both roots exist, are directories, are
/// readable, and pass the root-safety checks of §4.1.
pub fn build_plan(left_root: &Path, right_root: &Path) -> Result<Plan, SyncError> {
    validate_root(left_root)?;
    validate_root(right_root)?;
    check_root_safety(left_root, right_root).map_err(|_| SyncError::InvalidPlan {
        message: format!(
            "source {:?} and destination {:?} are equal, nested, a filesystem root, or a symlink root",
            left_root, right_root
        ),
    })?;

    let left_records = scan_tree(left_root)?;
    let right_records = scan_tree(right_root)?;

    let right_size_by_rel: HashMap<PathBuf, u64> = right_records
        .iter()
        .map(|r| (r.relative_path.clone(), r.size_bytes))
        .collect();

    let mut best_by_target: HashMap<PathBuf, (u64, FileRecord)> = HashMap::new();
    for record in left_records {
        let basename = record.basename().to_string();
        let parsed = parse_versioned_name(&basename);
        let target_rel = normalize_join(record.dirname(), &parsed.target_file_name);

        match best_by_target.get(&target_rel) {
            None => {
                best_by_target.insert(target_rel, (parsed.version, record));
            }
            Some((best_version, best_record)) => {
                // Tie-break: deterministic by source relative path, lex order.
                let replace = parsed.version > *best_version
                    || (parsed.version == *best_version
                        && record.relative_path < best_record.relative_path);
                if replace {
                    best_by_target.insert(target_rel, (parsed.version, record));
                }
            }
        }
    }

    let total_candidates = best_by_target.len();

    let mut items: Vec<PlanItem> = Vec::new();
    for (target_rel, (version, record)) in best_by_target {
        let destination_size = right_size_by_rel.get(&target_rel).copied();
        let destination_exists = destination_size.is_some();
        let stale = match destination_size {
            None => true,
            Some(size) => size != record.size_bytes,
        };
        if !stale {
            continue;
        }

        let target_path = right_root.join(&target_rel);
        items.push(PlanItem {
            source_path: record.full_path,
            source_relative_path: record.relative_path,
            source_size: record.size_bytes,
            target_path,
            target_relative_path: target_rel,
            version,
            destination_exists,
            destination_size,
        });
    }

    items.sort_by(|a, b| a.target_relative_path.cmp(&b.target_relative_path));

    let directories_to_create = compute_directories_to_create(&items, right_root)?;

    Ok(Plan {
        left_root: left_root.to_path_buf(),
        right_root: right_root.to_path_buf(),
        items,
        directories_to_create,
        total_candidates,
    })
}

fn validate_root(root: &Path) -> Result<(), SyncError> {
    let metadata = std::fs::metadata(root).map_err(|err| SyncError::from_io("reading directory", root.to_path_buf(), &err))?;
    if !metadata.is_dir() {
        return Err(SyncError::InvalidDirectory {
            path: root.to_path_buf(),
        });
    }
    Ok(())
}

fn normalize_join(dir: &Path, file_name: &str) -> PathBuf {
    if dir.as_os_str().is_empty() {
        PathBuf::from(file_name)
    } else {
        dir.join(file_name)
    }
}

/// Directories referenced by plan items that must be created under
/// `right_root` before copying: missing directories are included, existing
/// non-directories are a fatal `DestinationPathConflict`.
fn compute_directories_to_create(items: &[PlanItem], right_root: &Path) -> Result<Vec<PathBuf>, SyncError> {
    let mut dirs: Vec<PathBuf> = Vec::new();
    let mut seen = std::collections::HashSet::new();

    for item in items {
        if let Some(parent_rel) = item.target_relative_path.parent() {
            if parent_rel.as_os_str().is_empty() {
                continue;
            }
            for ancestor in ancestors_shallow_to_deep(parent_rel) {
                if !seen.insert(ancestor.clone()) {
                    continue;
                }
                let absolute = right_root.join(&ancestor);
                match std::fs::metadata(&absolute) {
                    Ok(meta) if meta.is_dir() => {}
                    Ok(_) => {
                        return Err(SyncError::DestinationPathConflict { path: absolute });
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                        dirs.push(ancestor);
                    }
                    Err(err) => {
                        return Err(SyncError::from_io("reading directory", absolute, &err));
                    }
                }
            }
        }
    }

    dirs.sort();
    Ok(dirs)
}

/// Guard against a caller-supplied plan (e.g. a `PlanBundle` built by hand,
/// or a journal read back off disk) naming a `target_path` that escapes
/// `right_root` — the boundary the runner must never write outside of
/// (§8: "Plan items whose target_path escapes right_root are rejected").
pub fn validate_plan_items(items: &[PlanItem], right_root: &Path) -> Result<(), SyncError> {
    if right_root.canonicalize().is_err() {
        // `right_root` doesn't exist yet (e.g. first run, directory not
        // created): nothing to canonicalize against. Directory creation or
        // the copy itself will raise a clearer error if it's genuinely
        // missing.
        return Ok(());
    }
    for item in items {
        if !is_path_within(right_root, &item.target_path) {
            return Err(SyncError::InvalidPlanItem {
                message: format!("target_path {:?} escapes right_root {:?}", item.target_path, right_root),
            });
        }
    }
    Ok(())
}

fn ancestors_shallow_to_deep(path: &Path) -> Vec<PathBuf> {
    let mut parts: Vec<PathBuf> = Vec::new();
    let mut current = PathBuf::new();
    for component in path.components() {
        current.push(component.as_os_str());
        parts.push(current.clone());
    }
    parts
}
