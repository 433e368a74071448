//! Candidate path collection.
//!
//! Roots given on the command line may be files or directories; directories
//! are walked recursively. Every regular file found is a fingerprint
//! candidate - non-image files will simply fail to decode and be recorded
//! with the absent marker, so no extension filtering happens here.

use std::collections::BTreeSet;
use std::path::PathBuf;
use thiserror::Error;
use walkdir::WalkDir;

/// Errors raised while collecting candidate paths.
#[derive(Debug, Error)]
pub enum WalkError {
    /// A root path itself could not be read. Fatal for the run.
    #[error("cannot read root path {path}: {source}")]
    UnreadableRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Collect all regular files under the given roots.
///
/// Errors on a root itself (missing, permission denied) are fatal; errors
/// deeper in the tree are logged and the affected entry skipped. The result
/// is a sorted set, one entry per path regardless of how many roots cover it.
pub fn collect_candidates(roots: &[PathBuf]) -> Result<BTreeSet<PathBuf>, WalkError> {
    let mut candidates = BTreeSet::new();

    for root in roots {
        let meta = std::fs::metadata(root).map_err(|source| WalkError::UnreadableRoot {
            path: root.clone(),
            source,
        })?;

        if meta.is_file() {
            candidates.insert(root.clone());
            continue;
        }

        for entry in WalkDir::new(root) {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_file() {
                        candidates.insert(entry.into_path());
                    }
                }
                Err(e) => {
                    log::warn!("skipping unreadable entry under {}: {}", root.display(), e);
                }
            }
        }
    }

    log::debug!("collected {} candidate paths", candidates.len());
    Ok(candidates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_walks_directories_recursively() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("a.png"), b"x").unwrap();
        fs::write(dir.path().join("sub/b.png"), b"x").unwrap();

        let candidates = collect_candidates(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(candidates.len(), 2);
        assert!(candidates.contains(&dir.path().join("a.png")));
        assert!(candidates.contains(&dir.path().join("sub/b.png")));
    }

    #[test]
    fn test_file_roots_are_included_directly() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("single.png");
        fs::write(&file, b"x").unwrap();

        let candidates = collect_candidates(&[file.clone()]).unwrap();
        assert_eq!(candidates.len(), 1);
        assert!(candidates.contains(&file));
    }

    #[test]
    fn test_duplicate_roots_deduplicate() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.png"), b"x").unwrap();

        let root = dir.path().to_path_buf();
        let candidates = collect_candidates(&[root.clone(), root]).unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[test]
    fn test_missing_root_is_fatal() {
        let result = collect_candidates(&[PathBuf::from("/definitely/not/here")]);
        assert!(matches!(result, Err(WalkError::UnreadableRoot { .. })));
    }
}
