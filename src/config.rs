//! Service endpoints and upgrade page configuration.

use crate::paths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolpassConfig {
    /// Base URL of the identity service (session/sign-out endpoints).
    #[serde(default = "default_identity_url")]
    pub identity_url: String,
    /// Base URL of the entitlement REST service (purchase record queries).
    #[serde(default = "default_entitlements_url")]
    pub entitlements_url: String,
    /// Anonymous API key sent with every remote request.
    #[serde(default)]
    pub api_key: String,
    /// Checkout page offered when a user is out of free uses.
    #[serde(default = "default_purchase_url")]
    pub purchase_url: String,
    /// Pricing overview page.
    #[serde(default = "default_plans_url")]
    pub plans_url: String,
    /// Timeout for remote lookups, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_identity_url() -> String {
    "https://suite.example.com/auth/v1".to_string()
}

fn default_entitlements_url() -> String {
    "https://suite.example.com/rest/v1".to_string()
}

fn default_purchase_url() -> String {
    "https://suite.example.com/checkout".to_string()
}

fn default_plans_url() -> String {
    "https://suite.example.com/#pricing".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

impl Default for ToolpassConfig {
    fn default() -> Self {
        Self {
            identity_url: default_identity_url(),
            entitlements_url: default_entitlements_url(),
            api_key: String::new(),
            purchase_url: default_purchase_url(),
            plans_url: default_plans_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ToolpassConfig {
    /// Loads the config from `~/.toolpass/config.json`, falling back to
    /// defaults when the file is absent.
    pub fn load() -> Result<Self> {
        let path = paths::config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_fields() {
        let config: ToolpassConfig = serde_json::from_str(r#"{"api_key": "anon-key"}"#).unwrap();
        assert_eq!(config.api_key, "anon-key");
        assert_eq!(config.timeout_secs, 15);
        assert_eq!(config.entitlements_url, default_entitlements_url());
    }

    #[test]
    fn test_empty_object_is_default() {
        let config: ToolpassConfig = serde_json::from_str("{}").unwrap();
        let default = ToolpassConfig::default();
        assert_eq!(config.identity_url, default.identity_url);
        assert_eq!(config.purchase_url, default.purchase_url);
        assert!(config.api_key.is_empty());
    }
}
