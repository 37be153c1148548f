//! eID verification gate in front of candidate registration and job applications.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::HeaderMap;

use super::domain::{IdentityStamp, VerifiedIdentitySession};
use crate::config::IdentityConfig;

/// Shown on the form while verification is switched off.
pub const SOFT_MODE_BANNER: &str =
    "Vipps-verifisering er midlertidig slått av. Du kan sende inn skjemaet uten å verifisere deg.";

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("identity session lookup failed: {0}")]
    Transport(String),
    #[error("identity session payload could not be read: {0}")]
    Decode(String),
}

/// Looks up the caller's verified session. Signature checks are the provider's job.
#[async_trait]
pub trait IdentitySessions: Send + Sync {
    async fn current_session(
        &self,
        headers: &HeaderMap,
    ) -> Result<Option<VerifiedIdentitySession>, IdentityError>;
}

/// Used when no session endpoint is configured: nobody is ever verified.
pub struct NoSessions;

#[async_trait]
impl IdentitySessions for NoSessions {
    async fn current_session(
        &self,
        _headers: &HeaderMap,
    ) -> Result<Option<VerifiedIdentitySession>, IdentityError> {
        Ok(None)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Verified(VerifiedIdentitySession),
    /// Verification is optional; the session is used for pre-fill when present.
    Soft(Option<VerifiedIdentitySession>),
    /// Send the user to the login entry point.
    Redirect(String),
}

impl GateDecision {
    pub fn stamp(&self) -> IdentityStamp {
        match self {
            GateDecision::Verified(session) | GateDecision::Soft(Some(session)) => session.stamp(),
            GateDecision::Soft(None) | GateDecision::Redirect(_) => IdentityStamp::unverified(),
        }
    }

    pub fn session(&self) -> Option<&VerifiedIdentitySession> {
        match self {
            GateDecision::Verified(session) | GateDecision::Soft(Some(session)) => Some(session),
            _ => None,
        }
    }
}

pub struct IdentityGate {
    sessions: Arc<dyn IdentitySessions>,
    verification_optional: bool,
    login_path: String,
}

impl IdentityGate {
    pub fn new(
        sessions: Arc<dyn IdentitySessions>,
        verification_optional: bool,
        login_path: impl Into<String>,
    ) -> Self {
        Self {
            sessions,
            verification_optional,
            login_path: login_path.into(),
        }
    }

    pub fn from_config(sessions: Arc<dyn IdentitySessions>, config: &IdentityConfig) -> Self {
        Self::new(sessions, config.verification_optional, config.login_path.clone())
    }

    pub fn verification_required(&self) -> bool {
        !self.verification_optional
    }

    pub fn banner(&self) -> Option<&'static str> {
        self.verification_optional.then_some(SOFT_MODE_BANNER)
    }

    /// The caller's verified session. Lookup failures count as "no session".
    pub async fn session(&self, headers: &HeaderMap) -> Option<VerifiedIdentitySession> {
        match self.sessions.current_session(headers).await {
            Ok(session) => session.filter(|session| session.verified),
            Err(error) => {
                tracing::warn!(error = %error, "identity session lookup failed");
                None
            }
        }
    }

    pub async fn check(&self, headers: &HeaderMap, return_to: &str) -> GateDecision {
        let session = self.session(headers).await;
        match (session, self.verification_optional) {
            (Some(session), false) => GateDecision::Verified(session),
            (session, true) => GateDecision::Soft(session),
            (None, false) => GateDecision::Redirect(self.login_redirect(return_to)),
        }
    }

    pub fn login_redirect(&self, return_to: &str) -> String {
        format!("{}?returnTo={}", self.login_path, encode_component(return_to))
    }
}

fn encode_component(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            other => encoded.push_str(&format!("%{other:02X}")),
        }
    }
    encoded
}
