//! Thin client over the external identity service.
//!
//! The only fact the rest of the crate inspects is session presence. Sessions
//! are cached locally in `~/.toolpass/session.json` by the sign-in flow (an
//! external collaborator); this module reads the cache, treats expired or
//! unreadable entries as signed out, and notifies subscribers when the
//! observed auth state changes.

use crate::config::ToolpassConfig;
use crate::paths;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::broadcast;

/// An authenticated session with the identity service.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub email: Option<String>,
    pub access_token: String,
    /// Epoch milliseconds; `None` means no known expiry.
    pub expires_at: Option<i64>,
}

/// Auth state change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
}

/// Data contract for the header auth affordance: which control to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderAuthControl {
    pub signed_in: bool,
}

impl HeaderAuthControl {
    pub fn for_session(session: Option<&Session>) -> Self {
        Self {
            signed_in: session.is_some(),
        }
    }
}

#[async_trait]
pub trait IdentityClient: Send + Sync {
    /// Resolves the current session, if any. A missing or unreadable cache
    /// is "no session", not an error.
    async fn get_session(&self) -> Result<Option<Session>>;

    /// Signs out: clears the local session and notifies the service.
    async fn sign_out(&self) -> Result<()>;
}

/// Identity client backed by the local session cache plus the remote
/// identity endpoint for sign-out.
pub struct HttpIdentityClient {
    config: ToolpassConfig,
    session_path: PathBuf,
    events: broadcast::Sender<AuthEvent>,
    /// Last observed presence, for emitting transitions.
    last_signed_in: Mutex<Option<bool>>,
}

impl HttpIdentityClient {
    pub fn new(config: ToolpassConfig) -> Result<Self> {
        let session_path = paths::session_path()?;
        Ok(Self::with_session_path(config, session_path))
    }

    /// Test seam: client over an explicit session cache path.
    pub fn with_session_path(config: ToolpassConfig, session_path: PathBuf) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            config,
            session_path,
            events,
            last_signed_in: Mutex::new(None),
        }
    }

    /// Subscribes to sign-in/sign-out notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    fn read_cached_session(&self) -> Option<Session> {
        if !self.session_path.exists() {
            return None;
        }

        let content = std::fs::read_to_string(&self.session_path).ok()?;
        let json: serde_json::Value = match serde_json::from_str(&content) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!("Session cache is not valid JSON, treating as signed out: {}", e);
                return None;
            }
        };

        let access_token = json["access_token"].as_str()?.to_string();
        let user_id = json["user_id"].as_str()?.to_string();
        let expires_at = json["expires_at"].as_i64();

        if let Some(expiry) = expires_at {
            if expiry <= chrono::Utc::now().timestamp_millis() {
                tracing::debug!("Cached session expired, treating as signed out");
                return None;
            }
        }

        let email = extract_email_from_jwt(&access_token);

        Some(Session {
            user_id,
            email,
            access_token,
            expires_at,
        })
    }

    fn note_presence(&self, signed_in: bool) {
        let mut last = self.last_signed_in.lock().unwrap();
        if *last != Some(signed_in) {
            *last = Some(signed_in);
            let event = if signed_in {
                AuthEvent::SignedIn
            } else {
                AuthEvent::SignedOut
            };
            // Send fails only when no subscriber exists.
            let _ = self.events.send(event);
        }
    }
}

#[async_trait]
impl IdentityClient for HttpIdentityClient {
    async fn get_session(&self) -> Result<Option<Session>> {
        let session = self.read_cached_session();
        self.note_presence(session.is_some());
        Ok(session)
    }

    async fn sign_out(&self) -> Result<()> {
        let session = self.read_cached_session();

        if self.session_path.exists() {
            std::fs::remove_file(&self.session_path).with_context(|| {
                format!("Failed to clear session cache: {}", self.session_path.display())
            })?;
        }

        // Best-effort service-side logout; local state is already cleared.
        if let Some(session) = session {
            let logout_url = format!("{}/logout", self.config.identity_url);
            let api_key = self.config.api_key.clone();
            let token = session.access_token;
            let timeout = Duration::from_secs(self.config.timeout_secs);

            let result = tokio::task::spawn_blocking(move || -> Result<()> {
                let agent: ureq::Agent = ureq::Agent::config_builder()
                    .timeout_global(Some(timeout))
                    .build()
                    .into();
                agent
                    .post(logout_url.as_str())
                    .header("apikey", &api_key)
                    .header("Authorization", &format!("Bearer {}", token))
                    .send("")
                    .context("Identity service logout failed")?;
                Ok(())
            })
            .await
            .context("Logout task panicked")?;

            if let Err(e) = result {
                tracing::warn!("Service-side sign-out failed (session cleared locally): {:#}", e);
            }
        }

        self.note_presence(false);
        Ok(())
    }
}

/// Extracts the email claim from a JWT access token's payload.
pub fn extract_email_from_jwt(token: &str) -> Option<String> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return None;
    }

    use base64::Engine;
    let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(parts[1])
        .ok()?;
    let json: serde_json::Value = serde_json::from_slice(&payload).ok()?;

    json["email"].as_str().map(String::from)
}
