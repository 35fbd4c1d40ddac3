//! Named per-tool configuration presets.
//!
//! Each tool owns an ordered list of presets stored under `presets_<tool>` in
//! the preference store, serialized as a JSON array. Names are unique within
//! a tool's list; saving under an existing name updates that entry in place.

use crate::store::PrefStore;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Returns the store key for a tool's preset list.
pub fn presets_key(tool_name: &str) -> String {
    format!("presets_{}", tool_name)
}

/// A named snapshot of a tool's configuration.
///
/// Fields default individually so that imported documents are read back
/// without per-item shape validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preset {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub data: Value,
    /// RFC3339 creation timestamp.
    #[serde(default)]
    pub created: String,
    /// RFC3339 timestamp of the last save or rename.
    #[serde(default)]
    pub updated: String,
}

/// Result of an import attempt. Imports are all-or-nothing: a rejected file
/// leaves the existing list untouched.
#[derive(Debug, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The tool's list was wholesale replaced with `count` entries.
    Replaced { count: usize },
    /// The file was rejected; `message` is suitable for display.
    Rejected { message: String },
}

/// CRUD operations over a tool's preset list.
pub struct PresetManager {
    store: Arc<dyn PrefStore>,
}

impl PresetManager {
    pub fn new(store: Arc<dyn PrefStore>) -> Self {
        Self { store }
    }

    /// Returns the tool's presets in insertion order (empty if none).
    pub fn list(&self, tool_name: &str) -> Vec<Preset> {
        let Some(stored) = self.store.get(&presets_key(tool_name)) else {
            return Vec::new();
        };
        match serde_json::from_str(&stored) {
            Ok(presets) => presets,
            Err(e) => {
                tracing::warn!("Stored presets for '{}' are unreadable: {}", tool_name, e);
                Vec::new()
            }
        }
    }

    /// Saves `data` under `name` for the tool.
    ///
    /// An existing entry with the same name has its data and `updated`
    /// timestamp overwritten in place, keeping its position and `created`
    /// timestamp; otherwise a new entry is appended.
    pub fn save(&self, tool_name: &str, name: &str, data: Value) -> Result<()> {
        if name.trim().is_empty() {
            bail!("Preset name must not be empty");
        }

        let mut presets = self.list(tool_name);
        let now = chrono::Utc::now().to_rfc3339();

        match presets.iter_mut().find(|p| p.name == name) {
            Some(existing) => {
                existing.data = data;
                existing.updated = now;
            }
            None => presets.push(Preset {
                name: name.to_string(),
                data,
                created: now.clone(),
                updated: now,
            }),
        }

        self.store_list(tool_name, &presets);
        Ok(())
    }

    /// Returns the data of the named preset, or `None` if absent.
    pub fn load(&self, tool_name: &str, name: &str) -> Option<Value> {
        self.list(tool_name)
            .into_iter()
            .find(|p| p.name == name)
            .map(|p| p.data)
    }

    /// Deletes the named preset. Deleting an absent name is a no-op success.
    pub fn delete(&self, tool_name: &str, name: &str) {
        let mut presets = self.list(tool_name);
        presets.retain(|p| p.name != name);
        self.store_list(tool_name, &presets);
    }

    /// Renames a preset, returning `false` when `old_name` is absent.
    ///
    /// Deliberately does not check for a collision with an existing
    /// `new_name`; a later save under the colliding name updates whichever
    /// entry matches first (last write wins).
    pub fn rename(&self, tool_name: &str, old_name: &str, new_name: &str) -> bool {
        let mut presets = self.list(tool_name);
        let Some(preset) = presets.iter_mut().find(|p| p.name == old_name) else {
            return false;
        };

        preset.name = new_name.to_string();
        preset.updated = chrono::Utc::now().to_rfc3339();
        self.store_list(tool_name, &presets);
        true
    }

    /// Writes the tool's full preset list to
    /// `<dir>/<tool>_presets_backup.json` and returns the file path.
    pub fn export_to(&self, tool_name: &str, dir: &Path) -> Result<PathBuf> {
        let presets = self.list(tool_name);
        let content =
            serde_json::to_string_pretty(&presets).context("Failed to serialize presets")?;
        let path = dir.join(format!("{}_presets_backup.json", tool_name));
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write preset backup: {}", path.display()))?;
        Ok(path)
    }

    /// Replaces the tool's preset list with the contents of an exported file.
    ///
    /// The document must parse as JSON with a top-level array; individual
    /// entries are not validated. Rejected files leave the list untouched.
    pub fn import(&self, tool_name: &str, file_contents: &str) -> ImportOutcome {
        let parsed: Value = match serde_json::from_str(file_contents) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Preset import for '{}' failed to parse: {}", tool_name, e);
                return ImportOutcome::Rejected {
                    message: "Error parsing preset file".to_string(),
                };
            }
        };

        let Some(entries) = parsed.as_array() else {
            return ImportOutcome::Rejected {
                message: "Invalid preset file format".to_string(),
            };
        };

        let count = entries.len();
        match serde_json::to_string(&parsed) {
            Ok(serialized) => self.store.set(&presets_key(tool_name), &serialized),
            Err(e) => {
                // serde_json::Value round-trips; reaching this means the
                // document held non-finite numbers or similar.
                return ImportOutcome::Rejected {
                    message: format!("Error parsing preset file: {}", e),
                };
            }
        }

        ImportOutcome::Replaced { count }
    }

    fn store_list(&self, tool_name: &str, presets: &[Preset]) {
        match serde_json::to_string(presets) {
            Ok(serialized) => self.store.set(&presets_key(tool_name), &serialized),
            Err(e) => tracing::warn!("Failed to serialize presets for '{}': {}", tool_name, e),
        }
    }
}
