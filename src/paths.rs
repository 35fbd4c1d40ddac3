//! Home-based storage paths for all toolpass persistence.
//!
//! Everything lives under `~/.toolpass/` (overridable via `TOOLPASS_HOME`):
//! - `prefs.json` - the shared key-value preference store
//! - `session.json` - cached identity session
//! - `config.json` - service endpoints and upgrade page URLs
//! - `current/<tool>.json` - a tool's live configuration (preset capture target)
//! - `exports/` - default destination for preset backup files

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// The name of the toolpass profile directory under the home directory.
const TOOLPASS_DIR: &str = ".toolpass";

/// Environment variable that relocates the profile directory (used by tests
/// and by deployments that keep per-site profiles side by side).
pub const HOME_ENV: &str = "TOOLPASS_HOME";

/// Returns the profile directory: `~/.toolpass/` (or `$TOOLPASS_HOME`).
///
/// Creates the directory if it doesn't exist.
///
/// # Errors
///
/// Returns an error if:
/// - Home directory cannot be determined
/// - Directory creation fails
pub fn toolpass_home_dir() -> Result<PathBuf> {
    let dir = std::env::var(HOME_ENV)
        .map(PathBuf::from)
        .ok()
        .or_else(|| dirs::home_dir().map(|h| h.join(TOOLPASS_DIR)))
        .context("Could not determine home directory for toolpass storage")?;
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create profile directory: {}", dir.display()))?;
    Ok(dir)
}

/// Returns the preference store path: `~/.toolpass/prefs.json`
pub fn prefs_path() -> Result<PathBuf> {
    Ok(toolpass_home_dir()?.join("prefs.json"))
}

/// Returns the cached session path: `~/.toolpass/session.json`
pub fn session_path() -> Result<PathBuf> {
    Ok(toolpass_home_dir()?.join("session.json"))
}

/// Returns the config file path: `~/.toolpass/config.json`
pub fn config_path() -> Result<PathBuf> {
    Ok(toolpass_home_dir()?.join("config.json"))
}

/// Returns the live configuration path for a tool: `~/.toolpass/current/<tool>.json`
///
/// Creates the `current/` directory if it doesn't exist.
pub fn current_config_path(tool_name: &str) -> Result<PathBuf> {
    let dir = toolpass_home_dir()?.join("current");
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create current-config directory: {}", dir.display()))?;
    Ok(dir.join(format!("{}.json", tool_name)))
}

/// Returns the default export directory: `~/.toolpass/exports/`
///
/// Creates the directory if it doesn't exist.
pub fn exports_dir() -> Result<PathBuf> {
    let dir = toolpass_home_dir()?.join("exports");
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create exports directory: {}", dir.display()))?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    #[serial]
    fn test_home_env_override() {
        let temp_dir = TempDir::new().unwrap();
        std::env::set_var(HOME_ENV, temp_dir.path());

        let home = toolpass_home_dir().unwrap();
        assert_eq!(home, temp_dir.path());
        assert!(home.exists());

        let prefs = prefs_path().unwrap();
        assert_eq!(prefs, temp_dir.path().join("prefs.json"));

        std::env::remove_var(HOME_ENV);
    }

    #[test]
    #[serial]
    fn test_current_config_path_creates_dir() {
        let temp_dir = TempDir::new().unwrap();
        std::env::set_var(HOME_ENV, temp_dir.path());

        let path = current_config_path("json-formatter").unwrap();
        assert_eq!(
            path,
            temp_dir.path().join("current").join("json-formatter.json")
        );
        assert!(temp_dir.path().join("current").exists());

        std::env::remove_var(HOME_ENV);
    }
}
