//! Staff notification email for every accepted submission.
//!
//! Delivery is best effort. An unconfigured or disabled provider, and a
//! provider refusing our sender domain, all come back as
//! [`DeliveryOutcome::Skipped`]. Every message leaving through the
//! [`NotificationDispatcher`] carries the company's compliance footer.

mod summary;

pub use summary::{candidate_email, client_lead_email, job_application_email, SummaryLines};

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;

use crate::config::CompanyProfile;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub content_type: String,
    pub content: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub subject: String,
    pub text: String,
    pub html: Option<String>,
    pub reply_to: Option<String>,
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotConfigured,
    Disabled,
    SenderForbidden,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Sent { id: Option<String> },
    Skipped(SkipReason),
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("mail provider is not configured")]
    NotConfigured,
    #[error("mail provider refused the sender: {0}")]
    Forbidden(String),
    #[error("mail provider rejected the message with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("mail provider unreachable: {0}")]
    Transport(String),
}

/// Provider that delivers a single message to the staff mailbox.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Returns the provider's message id when it reports one.
    async fn send(&self, email: &OutgoingEmail) -> Result<Option<String>, MailError>;
}

/// Organisation details appended to every message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplianceFooter {
    lines: Vec<String>,
    privacy_url: String,
}

impl ComplianceFooter {
    pub fn new(company: &CompanyProfile) -> Self {
        let mut heading = company.name.clone();
        if let Some(org_number) = &company.org_number {
            heading.push_str(&format!(" (org.nr. {org_number})"));
        }
        Self {
            lines: vec![
                heading,
                company.address.clone(),
                format!("Kontakt: {}", company.contact_email),
            ],
            privacy_url: company.privacy_url.clone(),
        }
    }

    pub fn text(&self) -> String {
        format!(
            "\n\n--\n{}\nPersonvern: {}\n",
            self.lines.join("\n"),
            self.privacy_url
        )
    }

    pub fn html(&self) -> String {
        let lines = self
            .lines
            .iter()
            .map(|line| summary::escape_html(line))
            .collect::<Vec<_>>()
            .join("<br>");
        let url = summary::escape_html(&self.privacy_url);
        format!(
            "<hr><p style=\"font-size:12px;color:#555\">{lines}<br>Personvern: <a href=\"{url}\">{url}</a></p>"
        )
    }

    fn apply(&self, email: &mut OutgoingEmail) {
        email.text.push_str(&self.text());
        if let Some(html) = email.html.as_mut() {
            html.push_str(&self.html());
        }
    }
}

pub struct NotificationDispatcher {
    transport: Option<Arc<dyn MailTransport>>,
    footer: ComplianceFooter,
    disabled: bool,
}

impl NotificationDispatcher {
    pub fn new(
        transport: Option<Arc<dyn MailTransport>>,
        company: &CompanyProfile,
        disabled: bool,
    ) -> Self {
        Self {
            transport,
            footer: ComplianceFooter::new(company),
            disabled,
        }
    }

    pub fn is_configured(&self) -> bool {
        self.transport.is_some() && !self.disabled
    }

    pub async fn dispatch(&self, mut email: OutgoingEmail) -> Result<DeliveryOutcome, MailError> {
        if self.disabled {
            tracing::info!(subject = %email.subject, "email disabled, skipping notification");
            return Ok(DeliveryOutcome::Skipped(SkipReason::Disabled));
        }
        let Some(transport) = &self.transport else {
            tracing::warn!(subject = %email.subject, "email provider not configured, skipping notification");
            return Ok(DeliveryOutcome::Skipped(SkipReason::NotConfigured));
        };

        self.footer.apply(&mut email);

        match transport.send(&email).await {
            Ok(id) => Ok(DeliveryOutcome::Sent { id }),
            Err(MailError::NotConfigured) => Ok(DeliveryOutcome::Skipped(SkipReason::NotConfigured)),
            Err(MailError::Forbidden(message)) => {
                tracing::warn!(%message, "mail provider refused sender domain, skipping notification");
                Ok(DeliveryOutcome::Skipped(SkipReason::SenderForbidden))
            }
            Err(other) => Err(other),
        }
    }
}
