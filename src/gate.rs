//! Freemium access gate.
//!
//! Paid entitlements grant unconditional access; otherwise each tool gets a
//! fixed quota of free uses tracked in the local preference store. Checking
//! access never consumes a use; callers record a use explicitly after the
//! tool has actually produced output.
//!
//! ## Design Decisions
//!
//! - **Explicit errors**: `check_access` returns `Result<AccessDecision>` so
//!   callers can tell a failed entitlement lookup from a policy denial. The
//!   original catch-and-default behavior is available as [`fail_closed`].
//! - **Ordering**: the entitlement query is only issued after the session
//!   resolves, and the free-use fallback only after a definitive unpaid
//!   outcome. There is no race between the two paths within one check.
//! - **Counter race**: `increment_free_uses` is an unsynchronized
//!   read-then-write against the shared store; concurrent processes can lose
//!   an increment. This mirrors the original and is accepted, not guaranteed.

use crate::config::ToolpassConfig;
use crate::entitlements::EntitlementClient;
use crate::identity::IdentityClient;
use crate::store::PrefStore;
use anyhow::{Context, Result};
use std::sync::Arc;

/// Total free uses permitted per tool per profile.
pub const FREE_USE_LIMIT: u32 = 4;

/// Returns the store key for a tool's free-use counter.
pub fn free_uses_key(tool_name: &str) -> String {
    format!("free_uses_{}", tool_name)
}

/// Why access was granted or denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessReason {
    /// An active entitlement covers this tool.
    Paid,
    /// Granted against the free-use quota.
    FreeTrial,
    /// The free-use quota is exhausted and no entitlement applies.
    LimitReached,
    /// The check itself failed; access is denied defensively.
    Error,
}

/// Outcome of an access check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessDecision {
    pub allowed: bool,
    pub reason: AccessReason,
    /// Remaining free uses, present only for free-trial grants.
    pub uses_remaining: Option<u32>,
}

impl AccessDecision {
    fn paid() -> Self {
        Self {
            allowed: true,
            reason: AccessReason::Paid,
            uses_remaining: None,
        }
    }

    fn free_trial(uses_remaining: u32) -> Self {
        Self {
            allowed: true,
            reason: AccessReason::FreeTrial,
            uses_remaining: Some(uses_remaining),
        }
    }

    fn limit_reached() -> Self {
        Self {
            allowed: false,
            reason: AccessReason::LimitReached,
            uses_remaining: None,
        }
    }
}

/// Data handed to the presentation layer when an upgrade prompt should be
/// shown. Absent for paid access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradePrompt {
    /// Remaining free uses, when any remain.
    pub uses_remaining: Option<u32>,
    pub purchase_url: String,
    pub plans_url: String,
    /// Whether a dismiss-and-continue affordance applies (uses remain).
    pub dismissible: bool,
}

impl UpgradePrompt {
    /// Builds the prompt data for a decision, or `None` when no prompt is due.
    pub fn for_decision(decision: &AccessDecision, config: &ToolpassConfig) -> Option<Self> {
        if decision.reason == AccessReason::Paid {
            return None;
        }
        Some(Self {
            uses_remaining: decision.uses_remaining,
            purchase_url: config.purchase_url.clone(),
            plans_url: config.plans_url.clone(),
            dismissible: decision.uses_remaining.is_some(),
        })
    }
}

/// Decides whether a tool invocation is permitted.
pub struct AccessGate {
    identity: Arc<dyn IdentityClient>,
    entitlements: Arc<dyn EntitlementClient>,
    store: Arc<dyn PrefStore>,
}

impl AccessGate {
    pub fn new(
        identity: Arc<dyn IdentityClient>,
        entitlements: Arc<dyn EntitlementClient>,
        store: Arc<dyn PrefStore>,
    ) -> Self {
        Self {
            identity,
            entitlements,
            store,
        }
    }

    /// Returns the recorded free-use count for a tool (zero if never used).
    pub fn free_uses(&self, tool_name: &str) -> u32 {
        let Some(stored) = self.store.get(&free_uses_key(tool_name)) else {
            return 0;
        };
        match stored.parse() {
            Ok(count) => count,
            Err(e) => {
                tracing::warn!("Unreadable free-use counter for '{}': {}", tool_name, e);
                0
            }
        }
    }

    /// Records one granted free use and returns the new count.
    ///
    /// Call exactly once per granted free use, after the tool has rendered
    /// its output. Read-then-write: concurrent callers can lose an increment
    /// (accepted weakness, see module docs).
    pub fn increment_free_uses(&self, tool_name: &str) -> u32 {
        let next = self.free_uses(tool_name) + 1;
        self.store.set(&free_uses_key(tool_name), &next.to_string());
        next
    }

    /// Determines whether `tool_name` may be invoked.
    ///
    /// Never consumes a free use. Session resolution failure degrades to
    /// "no session"; an entitlement query failure is a hard error so callers
    /// can distinguish it from a limit denial (see [`fail_closed`]).
    pub async fn check_access(&self, tool_name: &str) -> Result<AccessDecision> {
        let session = match self.identity.get_session().await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("Session resolution failed, treating as signed out: {:#}", e);
                None
            }
        };

        if let Some(session) = session {
            let rows = self
                .entitlements
                .active_entitlements(&session, tool_name)
                .await
                .context("Entitlement lookup failed")?;

            if rows.iter().any(|e| e.grants(tool_name)) {
                return Ok(AccessDecision::paid());
            }
        }

        let uses = self.free_uses(tool_name);
        if uses < FREE_USE_LIMIT {
            Ok(AccessDecision::free_trial(FREE_USE_LIMIT - uses))
        } else {
            Ok(AccessDecision::limit_reached())
        }
    }
}

/// Maps a check failure to a denied decision with [`AccessReason::Error`],
/// reproducing the original fail-closed presentation behavior.
pub fn fail_closed(result: Result<AccessDecision>) -> AccessDecision {
    match result {
        Ok(decision) => decision,
        Err(e) => {
            tracing::warn!("Access check failed, denying: {:#}", e);
            AccessDecision {
                allowed: false,
                reason: AccessReason::Error,
                uses_remaining: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entitlements::{Entitlement, EntitlementStatus, PlanType};
    use crate::identity::Session;
    use crate::store::MemoryPrefStore;
    use anyhow::{anyhow, bail};
    use async_trait::async_trait;

    struct MockIdentity {
        session: Option<Session>,
        fail: bool,
    }

    #[async_trait]
    impl crate::identity::IdentityClient for MockIdentity {
        async fn get_session(&self) -> Result<Option<Session>> {
            if self.fail {
                return Err(anyhow!("identity service unreachable"));
            }
            Ok(self.session.clone())
        }

        async fn sign_out(&self) -> Result<()> {
            Ok(())
        }
    }

    struct MockEntitlements {
        rows: Vec<Entitlement>,
        fail: bool,
    }

    #[async_trait]
    impl EntitlementClient for MockEntitlements {
        async fn active_entitlements(
            &self,
            _session: &Session,
            _tool_name: &str,
        ) -> Result<Vec<Entitlement>> {
            if self.fail {
                bail!("purchase query failed");
            }
            Ok(self.rows.clone())
        }
    }

    fn session() -> Session {
        Session {
            user_id: "user-123".to_string(),
            email: Some("user@example.com".to_string()),
            access_token: "token".to_string(),
            expires_at: None,
        }
    }

    fn row(plan: PlanType, tool: Option<&str>) -> Entitlement {
        Entitlement {
            user_id: "user-123".to_string(),
            plan_type: plan,
            tool_name: tool.map(String::from),
            status: EntitlementStatus::Active,
        }
    }

    fn gate(
        session: Option<Session>,
        identity_fail: bool,
        rows: Vec<Entitlement>,
        entitlements_fail: bool,
    ) -> AccessGate {
        AccessGate::new(
            Arc::new(MockIdentity {
                session,
                fail: identity_fail,
            }),
            Arc::new(MockEntitlements {
                rows,
                fail: entitlements_fail,
            }),
            Arc::new(MemoryPrefStore::new()),
        )
    }

    #[tokio::test]
    async fn test_fresh_tool_gets_full_trial() {
        let gate = gate(None, false, Vec::new(), false);
        let decision = gate.check_access("word-counter").await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.reason, AccessReason::FreeTrial);
        assert_eq!(decision.uses_remaining, Some(4));
    }

    #[tokio::test]
    async fn test_trial_exhausts_after_limit() {
        let gate = gate(None, false, Vec::new(), false);
        for _ in 0..FREE_USE_LIMIT {
            let decision = gate.check_access("word-counter").await.unwrap();
            assert!(decision.allowed);
            gate.increment_free_uses("word-counter");
        }

        let decision = gate.check_access("word-counter").await.unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.reason, AccessReason::LimitReached);
        assert_eq!(decision.uses_remaining, None);
    }

    #[tokio::test]
    async fn test_counters_are_per_tool() {
        let gate = gate(None, false, Vec::new(), false);
        for _ in 0..FREE_USE_LIMIT {
            gate.increment_free_uses("word-counter");
        }

        assert!(!gate.check_access("word-counter").await.unwrap().allowed);
        let other = gate.check_access("json-formatter").await.unwrap();
        assert!(other.allowed);
        assert_eq!(other.uses_remaining, Some(4));
    }

    #[tokio::test]
    async fn test_paid_access_ignores_exhausted_counter() {
        let gate = gate(
            Some(session()),
            false,
            vec![row(PlanType::Lifetime, None)],
            false,
        );
        for _ in 0..FREE_USE_LIMIT + 2 {
            gate.increment_free_uses("word-counter");
        }

        let decision = gate.check_access("word-counter").await.unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.reason, AccessReason::Paid);
        assert_eq!(decision.uses_remaining, None);
    }

    #[tokio::test]
    async fn test_individual_tool_plan_covers_only_its_tool() {
        let gate = gate(
            Some(session()),
            false,
            vec![row(PlanType::IndividualTool, Some("word-counter"))],
            false,
        );

        let covered = gate.check_access("word-counter").await.unwrap();
        assert_eq!(covered.reason, AccessReason::Paid);

        let uncovered = gate.check_access("json-formatter").await.unwrap();
        assert_eq!(uncovered.reason, AccessReason::FreeTrial);
    }

    #[tokio::test]
    async fn test_signed_in_without_purchase_falls_back_to_trial() {
        let gate = gate(Some(session()), false, Vec::new(), false);
        let decision = gate.check_access("word-counter").await.unwrap();
        assert_eq!(decision.reason, AccessReason::FreeTrial);
    }

    #[tokio::test]
    async fn test_identity_failure_degrades_to_trial() {
        let gate = gate(None, true, Vec::new(), false);
        let decision = gate.check_access("word-counter").await.unwrap();
        assert_eq!(decision.reason, AccessReason::FreeTrial);
    }

    #[tokio::test]
    async fn test_entitlement_failure_is_an_error_and_fails_closed() {
        let gate = gate(Some(session()), false, Vec::new(), true);
        let result = gate.check_access("word-counter").await;
        assert!(result.is_err());

        let decision = fail_closed(result);
        assert!(!decision.allowed);
        assert_eq!(decision.reason, AccessReason::Error);
    }

    #[tokio::test]
    async fn test_check_access_does_not_consume_a_use() {
        let gate = gate(None, false, Vec::new(), false);
        for _ in 0..10 {
            gate.check_access("word-counter").await.unwrap();
        }
        assert_eq!(gate.free_uses("word-counter"), 0);
    }

    #[test]
    fn test_increment_is_monotonic() {
        let gate = gate(None, false, Vec::new(), false);
        assert_eq!(gate.increment_free_uses("t"), 1);
        assert_eq!(gate.increment_free_uses("t"), 2);
        assert_eq!(gate.free_uses("t"), 2);
    }

    #[test]
    fn test_upgrade_prompt_contract() {
        let config = ToolpassConfig::default();

        let paid = AccessDecision::paid();
        assert_eq!(UpgradePrompt::for_decision(&paid, &config), None);

        let trial = AccessDecision::free_trial(2);
        let prompt = UpgradePrompt::for_decision(&trial, &config).unwrap();
        assert_eq!(prompt.uses_remaining, Some(2));
        assert!(prompt.dismissible);

        let limit = AccessDecision::limit_reached();
        let prompt = UpgradePrompt::for_decision(&limit, &config).unwrap();
        assert_eq!(prompt.uses_remaining, None);
        assert!(!prompt.dismissible);
        assert_eq!(prompt.purchase_url, config.purchase_url);
        assert_eq!(prompt.plans_url, config.plans_url);
    }
}
