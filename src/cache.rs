//! Persistent fingerprint cache.
//!
//! The cache maps each candidate path to its 64-bit fingerprint, or to the
//! absent marker (`None`) when fingerprinting failed. It is loaded once at
//! startup, reconciled against the candidate set, and written back on every
//! exit path of the run so completed work survives errors and interrupts.
//!
//! # On-disk format
//!
//! A versioned JSON envelope: `{ "version": 1, "entries": { path: u64|null } }`.
//! A missing file loads as an empty cache. A file that exists but cannot be
//! parsed is a fatal error - a corrupt cache is never silently replaced,
//! since that would quietly discard hours of hashing work.
//!
//! Saving writes to a temporary file in the destination directory and then
//! renames it over the target, so a crash mid-write never corrupts the
//! previous cache.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Current on-disk format version.
const CACHE_VERSION: u32 = 1;

/// Errors raised by cache persistence.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache file exists but cannot be read.
    #[error("failed to read fingerprint cache {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The cache file exists but cannot be parsed. Fatal by design:
    /// silently starting over would discard all previously computed
    /// fingerprints.
    #[error("fingerprint cache {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The cache file was written by an incompatible version of the tool.
    #[error("fingerprint cache {path} has unsupported version {found} (expected {expected})")]
    UnsupportedVersion {
        path: PathBuf,
        found: u32,
        expected: u32,
    },

    /// Writing the cache failed.
    #[error("failed to write fingerprint cache {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Envelope for the serialized cache.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEnvelope {
    version: u32,
    entries: BTreeMap<PathBuf, Option<u64>>,
}

/// Mapping from path to fingerprint (or the absent marker).
///
/// A `BTreeMap` keeps iteration order deterministic, which the ranker's
/// reproducibility guarantee depends on.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FingerprintCache {
    entries: BTreeMap<PathBuf, Option<u64>>,
}

impl FingerprintCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached paths (including absent entries).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up a path. `None` means the path is not cached at all;
    /// `Some(None)` means fingerprinting was attempted and failed.
    #[must_use]
    pub fn get(&self, path: &Path) -> Option<Option<u64>> {
        self.entries.get(path).copied()
    }

    /// Record a fingerprint (or the absent marker) for a path.
    pub fn insert(&mut self, path: PathBuf, fingerprint: Option<u64>) {
        self.entries.insert(path, fingerprint);
    }

    /// Iterate over entries in path order.
    pub fn entries(&self) -> impl Iterator<Item = (&PathBuf, &Option<u64>)> {
        self.entries.iter()
    }

    /// Load a cache from `path`.
    ///
    /// A missing file yields an empty cache. An unreadable, unparseable, or
    /// version-incompatible file is a fatal [`CacheError`].
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("no fingerprint cache at {}, starting empty", path.display());
                return Ok(Self::new());
            }
            Err(source) => {
                return Err(CacheError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let envelope: CacheEnvelope =
            serde_json::from_str(&content).map_err(|source| CacheError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?;

        if envelope.version != CACHE_VERSION {
            return Err(CacheError::UnsupportedVersion {
                path: path.to_path_buf(),
                found: envelope.version,
                expected: CACHE_VERSION,
            });
        }

        log::debug!(
            "loaded fingerprints for {} paths from {}",
            envelope.entries.len(),
            path.display()
        );
        Ok(Self {
            entries: envelope.entries,
        })
    }

    /// Save the cache to `path` atomically (write-to-temp-then-rename).
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let envelope = CacheEnvelope {
            version: CACHE_VERSION,
            entries: self.entries.clone(),
        };
        let json = serde_json::to_string(&envelope).map_err(|source| CacheError::Write {
            path: path.to_path_buf(),
            source: std::io::Error::other(source),
        })?;

        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let mut tmp = tempfile::NamedTempFile::new_in(dir.unwrap_or(Path::new(".")))
            .map_err(|source| CacheError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        tmp.write_all(json.as_bytes())
            .map_err(|source| CacheError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        tmp.persist(path).map_err(|e| CacheError::Write {
            path: path.to_path_buf(),
            source: e.error,
        })?;

        log::debug!(
            "saved fingerprints for {} paths to {}",
            self.entries.len(),
            path.display()
        );
        Ok(())
    }

    /// Reconcile the cache against the current candidate set.
    ///
    /// Entries for paths no longer in `candidates` are removed. Paths in
    /// `candidates` without a cache entry are handed to `compute`, together
    /// with a sink that inserts each result as it arrives - so if `compute`
    /// fails partway through, everything it managed to produce is already in
    /// the cache when its error is returned. Paths whose previous attempt
    /// failed (absent marker) are not retried.
    ///
    /// The caller is responsible for saving the cache afterwards on both the
    /// success and the error path.
    pub fn reconcile<E>(
        &mut self,
        candidates: &BTreeSet<PathBuf>,
        compute: impl FnOnce(Vec<PathBuf>, &mut dyn FnMut(PathBuf, Option<u64>)) -> Result<(), E>,
    ) -> Result<(), E> {
        let before = self.entries.len();
        self.entries.retain(|path, _| candidates.contains(path));
        let pruned = before - self.entries.len();
        if pruned > 0 {
            log::info!("pruned {} stale cache entries", pruned);
        }

        let missing: Vec<PathBuf> = candidates
            .iter()
            .filter(|path| !self.entries.contains_key(*path))
            .cloned()
            .collect();

        if missing.is_empty() {
            log::debug!("cache already covers all {} candidates", candidates.len());
            return Ok(());
        }

        let entries = &mut self.entries;
        let mut sink = |path: PathBuf, fingerprint: Option<u64>| {
            entries.insert(path, fingerprint);
        };
        compute(missing, &mut sink)
    }
}
