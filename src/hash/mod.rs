//! Optional content hashing.
//!
//! Not used by the planner — staleness is size-only by design, since a
//! version bump always changes the byte count in practice and hashing
//! every candidate would mean reading both trees in full on every run.
//! Kept as an opt-in extension point for callers that want a stronger
//! equality check than size comparison for a particular file.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::types::SyncError;

pub fn compute_hash(file_path: &Path) -> Result<[u8; 32], SyncError> {
    let mut file = File::open(file_path).map_err(|err| SyncError::from_io("reading source file", file_path.to_path_buf(), &err))?;

    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let bytes_read = file.read(&mut buffer).map_err(|err| SyncError::from_io("reading source file", file_path.to_path_buf(), &err))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[0..bytes_read]);
    }

    Ok(*hasher.finalize().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_hash_empty_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"").unwrap();
        temp_file.flush().unwrap();

        let hash = compute_hash(temp_file.path()).unwrap();
        assert_eq!(hash.len(), 32);
    }

    #[test]
    fn test_hash_deterministic() {
        let content = b"Test content for hashing";

        let mut file1 = NamedTempFile::new().unwrap();
        file1.write_all(content).unwrap();
        file1.flush().unwrap();

        let mut file2 = NamedTempFile::new().unwrap();
        file2.write_all(content).unwrap();
        file2.flush().unwrap();

        let hash1 = compute_hash(file1.path()).unwrap();
        let hash2 = compute_hash(file2.path()).unwrap();

        assert_eq!(hash1, hash2);
    }

    #[test]
    fn test_hash_different_content() {
        let mut file1 = NamedTempFile::new().unwrap();
        file1.write_all(b"Content A").unwrap();
        file1.flush().unwrap();

        let mut file2 = NamedTempFile::new().unwrap();
        file2.write_all(b"Content B").unwrap();
        file2.flush().unwrap();

        let hash1 = compute_hash(file1.path()).unwrap();
        let hash2 = compute_hash(file2.path()).unwrap();

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_hash_nonexistent_file() {
        let path = Path::new("/nonexistent/file.txt");
        let result = compute_hash(path);

        assert!(result.is_err());
    }
}
