//! Change-detection cache: document file name → mtime at last successful parse.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use citegraph_shared::{CitegraphError, Result};

use crate::{to_json_bytes, write_atomic};

/// Persisted mtime cache with buffered commits.
///
/// [`ChangeCache::commit`] only records into memory; nothing reaches disk
/// until [`ChangeCache::flush`], which the pipeline calls after the artifact
/// has been written.
#[derive(Debug, Clone)]
pub struct ChangeCache {
    path: PathBuf,
    entries: BTreeMap<String, f64>,
    pending: BTreeMap<String, f64>,
}

impl ChangeCache {
    /// An empty cache that will persist to `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
            pending: BTreeMap::new(),
        }
    }

    /// Load the cache from `path`.
    ///
    /// A missing file gives an empty cache. So does an unparseable one (with a
    /// warning): every document is then simply re-parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no change cache yet");
                return Ok(Self::new(path));
            }
            Err(e) => return Err(CitegraphError::io(path, e)),
        };

        let entries: BTreeMap<String, f64> = match serde_json::from_str(&content) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable change cache, starting fresh");
                BTreeMap::new()
            }
        };

        debug!(path = %path.display(), entries = entries.len(), "change cache loaded");
        Ok(Self {
            path: path.to_path_buf(),
            entries,
            pending: BTreeMap::new(),
        })
    }

    /// True if `filename` has no entry or its stored mtime differs from `mtime`.
    pub fn should_reparse(&self, filename: &str, mtime: f64) -> bool {
        self.entries.get(filename) != Some(&mtime)
    }

    /// Buffer a successful parse of `filename` at `mtime`.
    pub fn commit(&mut self, filename: impl Into<String>, mtime: f64) {
        self.pending.insert(filename.into(), mtime);
    }

    /// Stored (flushed) mtime for `filename`.
    pub fn get(&self, filename: &str) -> Option<f64> {
        self.entries.get(filename).copied()
    }

    /// Number of buffered commits not yet flushed.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply buffered commits and persist the whole cache.
    ///
    /// On failure the buffered commits are kept and nothing on disk changes.
    pub fn flush(&mut self) -> Result<()> {
        let mut merged = self.entries.clone();
        merged.extend(self.pending.iter().map(|(k, v)| (k.clone(), *v)));

        let bytes = to_json_bytes(&merged)?;
        write_atomic(&self.path, &bytes)?;

        info!(
            path = %self.path.display(),
            committed = self.pending.len(),
            entries = merged.len(),
            "change cache saved"
        );

        self.entries = merged;
        self.pending.clear();
        Ok(())
    }
}
