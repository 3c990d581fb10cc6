//! Path & name utilities (C1)
//!
//! Version-suffix parsing, safe-path validation, and ignored-name
//! classification. These are pure functions with no filesystem I/O beyond
//! `is_path_within`'s canonicalization, grounded in the same
//! glob/`ignore`-crate idiom the rest of this crate uses for pattern work.

use std::path::{Component, Path, PathBuf};

/// Well-known system files excluded from scans regardless of case.
const IGNORED_LOWERCASE_NAMES: &[&str] = &[
    ".ds_store",
    "thumbs.db",
    "desktop.ini",
    "icon\r",
    "sync-history.log",
];

/// Result of decoding a candidate source file name against the
/// versioned-name grammar (§3): `^(?<stem>.*)_v(?<digits>\d+)\.(?<ext>[^.]+)$`,
/// case-insensitive on the `v`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedName {
    pub target_file_name: String,
    pub version: u64,
    pub stripped_stem: String,
    pub is_versioned: bool,
}

/// Parse a basename against the versioned-name grammar:
/// `^(?<stem>.*)_v(?<digits>\d+)\.(?<ext>[^.]+)$`, case-insensitive on `v`.
///
/// Numeric parsing is base-10 with leading-zero tolerance. Unmatched names
/// report `version = 0` and map to themselves.
pub fn parse_versioned_name(name: &str) -> VersionedName {
    if let Some(parsed) = try_parse_versioned(name) {
        return parsed;
    }

    VersionedName {
        target_file_name: name.to_string(),
        version: 0,
        stripped_stem: name.to_string(),
        is_versioned: false,
    }
}

fn try_parse_versioned(name: &str) -> Option<VersionedName> {
    // Extension: rightmost dot not at position 0, with at least one char after it.
    let dot_idx = name.rfind('.')?;
    if dot_idx == 0 || dot_idx + 1 >= name.len() {
        return None;
    }
    let ext = &name[dot_idx + 1..];
    let before_ext = &name[..dot_idx];

    // Version marker: rightmost "_v"/"_V" in the stem-with-version portion,
    // followed only by ASCII digits up to the extension dot.
    let marker_idx = before_ext.to_lowercase().rfind("_v")?;
    let digits = &before_ext[marker_idx + 2..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let version: u64 = digits.parse().ok()?;
    let stem = &before_ext[..marker_idx];

    Some(VersionedName {
        target_file_name: format!("{}.{}", stem, ext),
        version,
        stripped_stem: stem.to_string(),
        is_versioned: true,
    })
}

/// True if `name` should never be scanned: dotfiles, or a well-known
/// system/metadata file regardless of case.
pub fn is_ignored(name: &str) -> bool {
    if name.starts_with('.') {
        return true;
    }
    IGNORED_LOWERCASE_NAMES.contains(&name.to_lowercase().as_str())
}

/// True iff `name` has a `.` that is not the first character and leaves at
/// least one extension character after it.
pub fn has_usable_extension(name: &str) -> bool {
    match name.rfind('.') {
        Some(0) => false,
        Some(idx) => idx + 1 < name.len(),
        None => false,
    }
}

/// Reject traversal: after canonicalizing `root` and lexically normalizing
/// `candidate`, `candidate` must share `root` as a prefix on path-component
/// boundaries.
pub fn is_path_within(root: &Path, candidate: &Path) -> bool {
    let root = match root.canonicalize() {
        Ok(r) => r,
        Err(_) => return false,
    };
    let normalized = normalize_lexically(candidate);
    normalized.starts_with(&root)
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Root-safety checks shared by the scanner and planner (§4.1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootSafetyViolation {
    IsFilesystemRoot,
    SameOrOverlapping,
    SymlinkRoot,
}

pub fn check_root_safety(left: &Path, right: &Path) -> Result<(), RootSafetyViolation> {
    if is_filesystem_root(left) || is_filesystem_root(right) {
        return Err(RootSafetyViolation::IsFilesystemRoot);
    }

    let left_norm = normalize_lexically(left);
    let right_norm = normalize_lexically(right);
    if left_norm == right_norm || left_norm.starts_with(&right_norm) || right_norm.starts_with(&left_norm) {
        return Err(RootSafetyViolation::SameOrOverlapping);
    }

    if is_symlink_root(left) || is_symlink_root(right) {
        return Err(RootSafetyViolation::SymlinkRoot);
    }

    Ok(())
}

fn is_filesystem_root(path: &Path) -> bool {
    path.parent().is_none()
}

fn is_symlink_root(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_versioned_name() {
        let parsed = parse_versioned_name("doc_v3.txt");
        assert_eq!(parsed.target_file_name, "doc.txt");
        assert_eq!(parsed.version, 3);
        assert_eq!(parsed.stripped_stem, "doc");
        assert!(parsed.is_versioned);
    }

    #[test]
    fn parses_versioned_name_case_insensitive_v() {
        let parsed = parse_versioned_name("report_V12.pdf");
        assert_eq!(parsed.version, 12);
        assert_eq!(parsed.target_file_name, "report.pdf");
    }

    #[test]
    fn leading_zero_tolerance() {
        let parsed = parse_versioned_name("doc_v007.txt");
        assert_eq!(parsed.version, 7);
    }

    #[test]
    fn unversioned_name_maps_to_itself() {
        let parsed = parse_versioned_name("plain.txt");
        assert!(!parsed.is_versioned);
        assert_eq!(parsed.version, 0);
        assert_eq!(parsed.target_file_name, "plain.txt");
    }

    #[test]
    fn extensionless_versioned_like_name_is_not_versioned() {
        // No `.` after the version digits means the grammar doesn't match.
        let parsed = parse_versioned_name("notes_v3");
        assert!(!parsed.is_versioned);
        assert_eq!(parsed.target_file_name, "notes_v3");
    }

    #[test]
    fn ignores_dotfiles_and_known_system_names() {
        assert!(is_ignored(".hidden"));
        assert!(is_ignored(".DS_Store"));
        assert!(is_ignored("Thumbs.db"));
        assert!(is_ignored("THUMBS.DB"));
        assert!(is_ignored("desktop.ini"));
        assert!(is_ignored("sync-history.log"));
        assert!(!is_ignored("visible.txt"));
    }

    #[test]
    fn usable_extension_rules() {
        assert!(has_usable_extension("file.txt"));
        assert!(!has_usable_extension(".hidden"));
        assert!(!has_usable_extension("noext"));
        assert!(!has_usable_extension("trailing."));
    }

    #[test]
    fn path_within_rejects_traversal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path();
        let inside = root.join("a/b.txt");
        let outside = root.join("../escape.txt");
        assert!(is_path_within(root, &inside));
        assert!(!is_path_within(root, &outside));
    }

    #[test]
    fn root_safety_rejects_overlap_and_equality() {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = dir.path().to_path_buf();
        let nested = root.join("nested");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(
            check_root_safety(&root, &root),
            Err(RootSafetyViolation::SameOrOverlapping)
        );
        assert_eq!(
            check_root_safety(&root, &nested),
            Err(RootSafetyViolation::SameOrOverlapping)
        );
    }

    #[test]
    fn root_safety_rejects_filesystem_root() {
        let fake_root = Path::new("/");
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(
            check_root_safety(fake_root, dir.path()),
            Err(RootSafetyViolation::IsFilesystemRoot)
        );
    }
}
