//! Remote purchase records granting paid access.
//!
//! The entitlement table is owned by the remote service and read-only here.
//! A row grants access to a tool when it is active and its plan is
//! suite-wide (`lifetime`, `full_suite`) or an `individual_tool` purchase for
//! that tool.

use crate::config::ToolpassConfig;
use crate::identity::Session;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    Lifetime,
    FullSuite,
    IndividualTool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementStatus {
    Active,
    Inactive,
}

/// A purchase record for one user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entitlement {
    #[serde(default)]
    pub user_id: String,
    pub plan_type: PlanType,
    /// Present when `plan_type` is `individual_tool`.
    #[serde(default)]
    pub tool_name: Option<String>,
    pub status: EntitlementStatus,
}

impl Entitlement {
    /// Whether this record grants access to `tool_name`.
    pub fn grants(&self, tool_name: &str) -> bool {
        if self.status != EntitlementStatus::Active {
            return false;
        }
        match self.plan_type {
            PlanType::Lifetime | PlanType::FullSuite => true,
            PlanType::IndividualTool => self.tool_name.as_deref() == Some(tool_name),
        }
    }
}

#[async_trait]
pub trait EntitlementClient: Send + Sync {
    /// Returns the user's purchase records relevant to `tool_name`.
    ///
    /// Errors (network failure, malformed response) propagate; the access
    /// gate decides how to present them.
    async fn active_entitlements(
        &self,
        session: &Session,
        tool_name: &str,
    ) -> Result<Vec<Entitlement>>;
}

/// Entitlement client speaking a PostgREST-style filter dialect.
pub struct HttpEntitlementClient {
    config: ToolpassConfig,
}

impl HttpEntitlementClient {
    pub fn new(config: ToolpassConfig) -> Self {
        Self { config }
    }

    /// Builds the filtered query URL for one user and tool.
    fn query_url(&self, user_id: &str, tool_name: &str) -> String {
        format!(
            "{}/user_purchases?select=*&user_id=eq.{}&status=eq.active\
             &or=(plan_type.eq.lifetime,plan_type.eq.full_suite,\
             and(plan_type.eq.individual_tool,tool_name.eq.{}))",
            self.config.entitlements_url, user_id, tool_name
        )
    }
}

#[async_trait]
impl EntitlementClient for HttpEntitlementClient {
    async fn active_entitlements(
        &self,
        session: &Session,
        tool_name: &str,
    ) -> Result<Vec<Entitlement>> {
        let url = self.query_url(&session.user_id, tool_name);
        let api_key = self.config.api_key.clone();
        let token = session.access_token.clone();
        let timeout = Duration::from_secs(self.config.timeout_secs);

        tokio::task::spawn_blocking(move || -> Result<Vec<Entitlement>> {
            let agent: ureq::Agent = ureq::Agent::config_builder()
                .timeout_global(Some(timeout))
                .build()
                .into();

            let body: String = agent
                .get(url.as_str())
                .header("apikey", &api_key)
                .header("Authorization", &format!("Bearer {}", token))
                .call()
                .context("Failed to query purchase records")?
                .body_mut()
                .read_to_string()
                .context("Failed to read purchase record response")?;

            serde_json::from_str(&body).context("Malformed purchase record response")
        })
        .await
        .context("Entitlement query task panicked")?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entitlement(plan: PlanType, tool: Option<&str>, status: EntitlementStatus) -> Entitlement {
        Entitlement {
            user_id: "user-123".to_string(),
            plan_type: plan,
            tool_name: tool.map(String::from),
            status,
        }
    }

    #[test]
    fn test_suite_plans_grant_any_tool() {
        let lifetime = entitlement(PlanType::Lifetime, None, EntitlementStatus::Active);
        let suite = entitlement(PlanType::FullSuite, None, EntitlementStatus::Active);
        assert!(lifetime.grants("word-counter"));
        assert!(suite.grants("json-formatter"));
    }

    #[test]
    fn test_individual_tool_grants_only_its_tool() {
        let row = entitlement(
            PlanType::IndividualTool,
            Some("word-counter"),
            EntitlementStatus::Active,
        );
        assert!(row.grants("word-counter"));
        assert!(!row.grants("json-formatter"));

        let missing_tool = entitlement(PlanType::IndividualTool, None, EntitlementStatus::Active);
        assert!(!missing_tool.grants("word-counter"));
    }

    #[test]
    fn test_inactive_rows_grant_nothing() {
        let row = entitlement(PlanType::Lifetime, None, EntitlementStatus::Inactive);
        assert!(!row.grants("word-counter"));
    }

    #[test]
    fn test_wire_format() {
        let rows: Vec<Entitlement> = serde_json::from_str(
            r#"[{"user_id": "u1", "plan_type": "full_suite", "tool_name": null, "status": "active"},
                {"user_id": "u1", "plan_type": "individual_tool", "tool_name": "word-counter", "status": "inactive"}]"#,
        )
        .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].plan_type, PlanType::FullSuite);
        assert_eq!(rows[1].tool_name.as_deref(), Some("word-counter"));
        assert_eq!(rows[1].status, EntitlementStatus::Inactive);
    }

    #[test]
    fn test_query_url_shape() {
        let client = HttpEntitlementClient::new(ToolpassConfig::default());
        let url = client.query_url("user-123", "word-counter");
        assert!(url.contains("user_id=eq.user-123"));
        assert!(url.contains("status=eq.active"));
        assert!(url.contains("tool_name.eq.word-counter"));
    }
}
