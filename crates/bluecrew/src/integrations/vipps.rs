//! Session lookup against the Vipps login service.
//!
//! The login service owns the OAuth round trip and the session cookie. We only
//! forward the caller's cookies and read back the verified session, if any.

use async_trait::async_trait;
use axum::http::HeaderMap;
use reqwest::{header, StatusCode};
use serde::Deserialize;

use super::error_body;
use crate::intake::domain::VerifiedIdentitySession;
use crate::intake::identity::{IdentityError, IdentitySessions};

pub struct VippsSessionClient {
    http: reqwest::Client,
    session_url: String,
}

/// The session endpoint answers either with the session itself or wrapped in `{"session": ..}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SessionReply {
    Bare(VerifiedIdentitySession),
    Wrapped { session: Option<VerifiedIdentitySession> },
}

impl VippsSessionClient {
    pub fn new(http: reqwest::Client, session_url: impl Into<String>) -> Self {
        Self {
            http,
            session_url: session_url.into(),
        }
    }
}

#[async_trait]
impl IdentitySessions for VippsSessionClient {
    async fn current_session(
        &self,
        headers: &HeaderMap,
    ) -> Result<Option<VerifiedIdentitySession>, IdentityError> {
        let Some(cookie) = headers.get(header::COOKIE) else {
            return Ok(None);
        };

        let response = self
            .http
            .get(&self.session_url)
            .header(header::COOKIE, cookie.clone())
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|error| IdentityError::Transport(error.to_string()))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => Ok(None),
            status if status.is_success() => {
                let reply: SessionReply = response
                    .json()
                    .await
                    .map_err(|error| IdentityError::Decode(error.to_string()))?;
                Ok(match reply {
                    SessionReply::Wrapped { session } => session,
                    SessionReply::Bare(session) => Some(session),
                })
            }
            status => Err(IdentityError::Transport(format!(
                "status {status}: {}",
                error_body(response).await
            ))),
        }
    }
}
