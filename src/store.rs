//! Key-value preference store shared by every component.
//!
//! This is the Rust counterpart of a per-origin browser store: a flat map of
//! string keys to string values, persisted as a single JSON document. The
//! store is injected into each component as a trait object instead of being
//! reached through module-level globals.
//!
//! ## Design Decisions
//!
//! - **No locking**: the file is shared across processes with last-writer-wins
//!   semantics, matching the browser store this models. Callers that perform
//!   read-then-write sequences (e.g. the free-use counter) inherit that race.
//! - **Faults are swallowed**: read or write failures degrade to "key absent"
//!   or "write lost" with a warning, never a propagated error. Storage-layer
//!   faults are an acknowledged gap, not part of any component contract.

use crate::paths;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

/// String-keyed, string-valued preference storage.
pub trait PrefStore: Send + Sync {
    /// Returns the value for `key`, or `None` if absent (or unreadable).
    fn get(&self, key: &str) -> Option<String>;

    /// Sets `key` to `value`. Failures are logged and dropped.
    fn set(&self, key: &str, value: &str);

    /// Removes `key` if present. Failures are logged and dropped.
    fn remove(&self, key: &str);
}

/// File-backed preference store.
///
/// Every operation re-reads the backing file so that concurrent writers (other
/// processes sharing the profile) are observed, the same way separate browser
/// tabs observe one another's writes.
pub struct FilePrefStore {
    path: PathBuf,
}

impl FilePrefStore {
    /// Creates a store over an explicit file path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Creates a store over the profile default: `~/.toolpass/prefs.json`.
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(paths::prefs_path()?))
    }

    fn read_map(&self) -> BTreeMap<String, String> {
        if !self.path.exists() {
            return BTreeMap::new();
        }
        let content = match fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("Failed to read preference store {}: {}", self.path.display(), e);
                return BTreeMap::new();
            }
        };
        match serde_json::from_str(&content) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(
                    "Preference store {} is not valid JSON, treating as empty: {}",
                    self.path.display(),
                    e
                );
                BTreeMap::new()
            }
        }
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<()> {
        let temp_path = self.path.with_extension("json.tmp");
        let content =
            serde_json::to_string_pretty(map).context("Failed to serialize preference store")?;
        fs::write(&temp_path, &content)
            .with_context(|| format!("Failed to write temp store file: {}", temp_path.display()))?;
        fs::rename(&temp_path, &self.path)
            .with_context(|| format!("Failed to rename temp file to: {}", self.path.display()))?;
        Ok(())
    }
}

impl PrefStore for FilePrefStore {
    fn get(&self, key: &str) -> Option<String> {
        self.read_map().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut map = self.read_map();
        map.insert(key.to_string(), value.to_string());
        if let Err(e) = self.write_map(&map) {
            tracing::warn!("Dropped preference write for '{}': {:#}", key, e);
        }
    }

    fn remove(&self, key: &str) {
        let mut map = self.read_map();
        if map.remove(key).is_some() {
            if let Err(e) = self.write_map(&map) {
                tracing::warn!("Dropped preference removal for '{}': {:#}", key, e);
            }
        }
    }
}

/// In-memory store for tests.
#[cfg(test)]
pub struct MemoryPrefStore {
    map: std::sync::Mutex<BTreeMap<String, String>>,
}

#[cfg(test)]
impl MemoryPrefStore {
    pub fn new() -> Self {
        Self {
            map: std::sync::Mutex::new(BTreeMap::new()),
        }
    }
}

#[cfg(test)]
impl Default for MemoryPrefStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl PrefStore for MemoryPrefStore {
    fn get(&self, key: &str) -> Option<String> {
        self.map.lock().unwrap().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.map.lock().unwrap().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.map.lock().unwrap().remove(key);
    }
}
