//! Resend transactional email API.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use super::error_body;
use crate::config::EmailConfig;
use crate::intake::notify::{MailError, MailTransport, OutgoingEmail};

pub const RESEND_ENDPOINT: &str = "https://api.resend.com/emails";

pub struct ResendMailer {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    from: String,
    to: Vec<String>,
}

#[derive(Debug, Serialize)]
struct ResendAttachment<'a> {
    filename: &'a str,
    content: String,
    content_type: &'a str,
}

#[derive(Debug, Serialize)]
struct ResendRequest<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    html: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_to: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<ResendAttachment<'a>>,
}

#[derive(Debug, Deserialize)]
struct ResendResponse {
    #[serde(default)]
    id: Option<String>,
}

impl ResendMailer {
    /// `None` unless an API key, a sender and at least one recipient are set.
    pub fn from_config(http: reqwest::Client, config: &EmailConfig) -> Option<Self> {
        let api_key = config.api_key.clone()?;
        let from = config.from.clone()?;
        if config.to.is_empty() {
            return None;
        }
        Some(Self {
            http,
            endpoint: RESEND_ENDPOINT.to_string(),
            api_key,
            from,
            to: config.to.clone(),
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn request_body<'a>(&'a self, email: &'a OutgoingEmail) -> ResendRequest<'a> {
        ResendRequest {
            from: &self.from,
            to: &self.to,
            subject: &email.subject,
            text: &email.text,
            html: email.html.as_deref(),
            reply_to: email.reply_to.as_deref(),
            attachments: email
                .attachments
                .iter()
                .map(|attachment| ResendAttachment {
                    filename: &attachment.file_name,
                    content: STANDARD.encode(&attachment.content),
                    content_type: &attachment.content_type,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl MailTransport for ResendMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<Option<String>, MailError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(email))
            .send()
            .await
            .map_err(|error| MailError::Transport(error.to_string()))?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            return Err(MailError::Forbidden(error_body(response).await));
        }
        if !status.is_success() {
            return Err(MailError::Rejected {
                status: status.as_u16(),
                message: error_body(response).await,
            });
        }

        let body: ResendResponse = response.json().await.unwrap_or(ResendResponse { id: None });
        Ok(body.id)
    }
}
