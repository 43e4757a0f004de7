use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::RenderError;
use crate::evaluator::OutputArtifact;
use crate::value::Value;

/// A memoized chunk execution, keyed by chunk label and invalidated
/// when the chunk's code text changes by even one character.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The exact code text that produced this entry.
    pub chunk_code: String,
    /// Captured output, unfiltered and uncaptioned (echo, results, and
    /// fig.cap are header state, applied at render time rather than
    /// capture time).
    pub artifacts: Vec<OutputArtifact>,
    /// Bindings the chunk added or changed, replayed on a hit so later
    /// chunks still see them.
    pub context_delta: BTreeMap<String, Value>,
}

/// Durable chunk-output store for one document: one JSON file per chunk
/// label inside a per-document directory.
///
/// Opening the store takes an exclusive render lock (a lock file).
/// Renders of the same document are serialized rather than allowed to
/// interleave cache writes; a second concurrent open fails with
/// `CacheBusy`. The lock is released when the store is dropped.
#[derive(Debug)]
pub struct CacheStore {
    dir: PathBuf,
    lock_path: PathBuf,
}

impl CacheStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, RenderError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let lock_path = dir.join(".render-lock");
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(_) => Ok(CacheStore { dir, lock_path }),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(RenderError::CacheBusy(dir)),
            Err(e) => Err(e.into()),
        }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    fn entry_path(&self, label: &str) -> PathBuf {
        // Labels may contain characters that are awkward in file names.
        // Sanitizing alone is lossy (`a.b` and `a_b` would collide), so
        // the raw label is also hashed into the name.
        let safe: String = label
            .chars()
            .map(|c| {
                if c.is_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        label.hash(&mut hasher);
        self.dir.join(format!("{}-{:016x}.json", safe, hasher.finish()))
    }

    /// Remove a leftover render lock without opening the store.
    /// For recovery after a crashed render; the caller is asserting
    /// that no live render holds the lock.
    pub fn break_lock(dir: impl AsRef<Path>) -> Result<(), RenderError> {
        match fs::remove_file(dir.as_ref().join(".render-lock")) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a chunk's entry. A missing entry is a miss; a corrupt
    /// entry is also a miss (logged, and overwritten on the next save),
    /// never fatal.
    pub fn load(&self, label: &str) -> Option<CacheEntry> {
        let path = self.entry_path(label);
        let raw = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(
                    chunk = label,
                    path = %path.display(),
                    error = %e,
                    "corrupt cache entry, re-executing"
                );
                None
            }
        }
    }

    pub fn save(&self, label: &str, entry: &CacheEntry) -> Result<(), RenderError> {
        let raw = serde_json::to_string_pretty(entry)?;
        fs::write(self.entry_path(label), raw)?;
        Ok(())
    }

    /// Remove every stored entry, forcing a full re-render next time.
    pub fn clear(&self) -> Result<(), RenderError> {
        for item in fs::read_dir(&self.dir)? {
            let path = item?.path();
            if path.extension().is_some_and(|e| e == "json") {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

impl Drop for CacheStore {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}
