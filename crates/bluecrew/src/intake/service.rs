use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::multipart::MultipartError;
use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::domain::{DocumentSet, SubmissionKind, UploadedFile};
use super::files::{storage_key, FileRules, StorageKey};
use super::identity::{GateDecision, IdentityGate};
use super::notify::{
    candidate_email, client_lead_email, job_application_email, DeliveryOutcome,
    NotificationDispatcher, OutgoingEmail,
};
use super::rate_limit::{RateLimitDecision, RateLimiter, RatePurpose};
use super::records::{
    candidate_row, client_lead_row, job_application_row, replication_payload, RowMeta, StoredPaths,
};
use super::repository::{ObjectStore, Replicator, Row, SubmissionStore, WriteOutcome};
use super::reporting::{ErrorContext, ErrorReporter};
use super::validation::{
    is_spam, validate_candidate, validate_client_lead, validate_job_application, ValidationFailure,
};
use super::form::FormPayload;
use crate::config::FormsConfig;

/// Page the identity provider sends the user back to after login.
pub const CANDIDATE_FORM_PATH: &str = "/jobbsoker/registrer";

/// Transport the submission arrived through. Both share one pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPoint {
    /// Plain HTML form post answered with a redirect.
    Form,
    /// Script-driven post answered with JSON.
    SelfService,
}

impl EntryPoint {
    pub const fn label(self) -> &'static str {
        match self {
            EntryPoint::Form => "form",
            EntryPoint::SelfService => "self_service",
        }
    }
}

/// Result of one best-effort side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectStatus {
    Done,
    Skipped,
    Failed,
}

impl<T> From<&WriteOutcome<T>> for EffectStatus {
    fn from(outcome: &WriteOutcome<T>) -> Self {
        match outcome {
            WriteOutcome::Done(_) => EffectStatus::Done,
            WriteOutcome::Skipped => EffectStatus::Skipped,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectReport {
    pub uploads: EffectStatus,
    pub persisted: EffectStatus,
    pub notified: EffectStatus,
    pub replicated: EffectStatus,
}

/// What the caller learns about an accepted submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionReceipt {
    pub kind: SubmissionKind,
    pub reference: String,
    pub submitted_at: DateTime<Utc>,
    pub effects: EffectReport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeOutcome {
    Accepted(SubmissionReceipt),
    /// Honeypot filled in. Nothing was stored or sent.
    Spam,
}

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationFailure),
    #[error("rate limit exceeded, retry in {reset_seconds}s")]
    RateLimited { reset_seconds: u64 },
    #[error("identity verification required")]
    IdentityRequired { login_url: String },
    #[error("csrf token missing or invalid")]
    Csrf,
    #[error("could not read submission body: {0}")]
    Body(#[from] MultipartError),
}

/// External collaborators of the intake pipeline.
pub struct IntakeDependencies {
    pub store: Arc<dyn SubmissionStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub replicator: Arc<dyn Replicator>,
    pub notifier: NotificationDispatcher,
    pub reporter: Arc<dyn ErrorReporter>,
}

/// Orchestrates the gates, validation and fan-out for every public submission.
pub struct IntakeService {
    store: Arc<dyn SubmissionStore>,
    objects: Arc<dyn ObjectStore>,
    replicator: Arc<dyn Replicator>,
    notifier: NotificationDispatcher,
    reporter: Arc<dyn ErrorReporter>,
    limiter: Arc<RateLimiter>,
    gate: Arc<IdentityGate>,
    forms: FormsConfig,
}

impl IntakeService {
    pub fn new(
        dependencies: IntakeDependencies,
        limiter: Arc<RateLimiter>,
        gate: Arc<IdentityGate>,
        forms: FormsConfig,
    ) -> Self {
        Self {
            store: dependencies.store,
            objects: dependencies.objects,
            replicator: dependencies.replicator,
            notifier: dependencies.notifier,
            reporter: dependencies.reporter,
            limiter,
            gate,
            forms,
        }
    }

    pub fn gate(&self) -> &IdentityGate {
        &self.gate
    }

    /// Document rules for candidate registration through `entry`.
    pub fn candidate_rules(&self, entry: EntryPoint) -> FileRules {
        let certs_required = match entry {
            EntryPoint::Form => self.forms.candidate_form_certs_required,
            EntryPoint::SelfService => self.forms.candidate_self_service_certs_required,
        };
        FileRules::candidate(certs_required)
    }

    /// Address the rate limiter counts this request against.
    pub fn client_ip(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
        self.limiter.client_ip(headers, peer)
    }

    /// Must run before the request body is read.
    pub async fn enforce_rate_limit(
        &self,
        purpose: RatePurpose,
        client_ip: &str,
    ) -> Result<RateLimitDecision, IntakeError> {
        let decision = self.limiter.check(purpose, client_ip).await;
        if decision.allowed {
            Ok(decision)
        } else {
            Err(IntakeError::RateLimited {
                reset_seconds: decision.reset_seconds,
            })
        }
    }

    pub async fn submit_candidate(
        &self,
        entry: EntryPoint,
        payload: FormPayload,
        headers: &HeaderMap,
        source_ip: &str,
    ) -> Result<IntakeOutcome, IntakeError> {
        if is_spam(&payload) {
            tracing::info!(kind = "candidate", "honeypot triggered, dropping submission");
            return Ok(IntakeOutcome::Spam);
        }

        let identity = match self.gate.check(headers, CANDIDATE_FORM_PATH).await {
            GateDecision::Redirect(login_url) => {
                return Err(IntakeError::IdentityRequired { login_url })
            }
            decision => decision.stamp(),
        };

        let candidate = validate_candidate(&payload, &self.candidate_rules(entry), identity)?;

        let submitted_at = Utc::now();
        let key = storage_key(&candidate.email, submitted_at);
        let kind = SubmissionKind::Candidate;

        let (paths, uploads) = self.upload_documents(kind, &key, &candidate.documents).await;
        let meta = RowMeta {
            submitted_at,
            source_ip,
            entry_point: entry.label(),
        };
        let row = candidate_row(&candidate, &paths, &meta);
        let email = candidate_email(&candidate, &key, submitted_at);

        let effects = self.fan_out(kind, &key, row, email, uploads).await;
        Ok(self.accepted(kind, key, submitted_at, effects, entry))
    }

    pub async fn submit_client_lead(
        &self,
        payload: FormPayload,
        source_ip: &str,
    ) -> Result<IntakeOutcome, IntakeError> {
        if is_spam(&payload) {
            tracing::info!(kind = "client_lead", "honeypot triggered, dropping submission");
            return Ok(IntakeOutcome::Spam);
        }

        let lead = validate_client_lead(&payload)?;

        let submitted_at = Utc::now();
        let key = storage_key(&lead.email, submitted_at);
        let kind = SubmissionKind::ClientLead;
        let meta = RowMeta {
            submitted_at,
            source_ip,
            entry_point: EntryPoint::Form.label(),
        };
        let row = client_lead_row(&lead, &meta);
        let email = client_lead_email(&lead, submitted_at);

        let effects = self
            .fan_out(kind, &key, row, email, EffectStatus::Skipped)
            .await;
        Ok(self.accepted(kind, key, submitted_at, effects, EntryPoint::Form))
    }

    pub async fn submit_job_application(
        &self,
        payload: FormPayload,
        headers: &HeaderMap,
        source_ip: &str,
    ) -> Result<IntakeOutcome, IntakeError> {
        if is_spam(&payload) {
            tracing::info!(kind = "job_application", "honeypot triggered, dropping submission");
            return Ok(IntakeOutcome::Spam);
        }

        let session = self.gate.session(headers).await.map(|session| session.stamp());
        let application = validate_job_application(&payload, session)?;

        let submitted_at = Utc::now();
        let key = storage_key(&application.email, submitted_at);
        let kind = SubmissionKind::JobApplication;

        let (paths, uploads) = self
            .upload_documents(kind, &key, &application.documents)
            .await;
        let meta = RowMeta {
            submitted_at,
            source_ip,
            entry_point: EntryPoint::SelfService.label(),
        };
        let row = job_application_row(&application, &paths, &meta);
        let email = job_application_email(&application, &key, submitted_at);

        let effects = self.fan_out(kind, &key, row, email, uploads).await;
        Ok(self.accepted(kind, key, submitted_at, effects, EntryPoint::SelfService))
    }

    fn accepted(
        &self,
        kind: SubmissionKind,
        key: StorageKey,
        submitted_at: DateTime<Utc>,
        effects: EffectReport,
        entry: EntryPoint,
    ) -> IntakeOutcome {
        tracing::info!(
            kind = kind.label(),
            reference = key.as_str(),
            entry_point = entry.label(),
            uploads = ?effects.uploads,
            persisted = ?effects.persisted,
            notified = ?effects.notified,
            replicated = ?effects.replicated,
            "submission accepted"
        );
        IntakeOutcome::Accepted(SubmissionReceipt {
            kind,
            reference: key.as_str().to_string(),
            submitted_at,
            effects,
        })
    }

    /// Store each document under the submission's key. Only paths that were
    /// written come back, so the row never points at a missing object.
    async fn upload_documents(
        &self,
        kind: SubmissionKind,
        key: &StorageKey,
        documents: &DocumentSet,
    ) -> (StoredPaths, EffectStatus) {
        if documents.cv.is_none() && documents.certs.is_none() {
            return (StoredPaths::default(), EffectStatus::Skipped);
        }

        let cv_path = match kind {
            SubmissionKind::JobApplication => key.job_application_path(),
            _ => key.cv_path(),
        };
        let cv = async {
            match &documents.cv {
                Some(file) => Some(self.upload(kind, key, &cv_path, file).await),
                None => None,
            }
        };
        let certs = async {
            match &documents.certs {
                Some(file) => {
                    let path = key.cert_path(&file.file_name);
                    Some(self.upload(kind, key, &path, file).await)
                }
                None => None,
            }
        };
        let (cv, certs) = tokio::join!(cv, certs);

        let statuses: Vec<EffectStatus> = [&cv, &certs]
            .into_iter()
            .flatten()
            .map(|(_, status)| *status)
            .collect();
        let overall = if statuses.contains(&EffectStatus::Failed) {
            EffectStatus::Failed
        } else if statuses.iter().all(|status| *status == EffectStatus::Skipped) {
            EffectStatus::Skipped
        } else {
            EffectStatus::Done
        };

        let paths = StoredPaths {
            cv: cv.and_then(|(path, _)| path),
            certs: certs.and_then(|(path, _)| path),
        };
        (paths, overall)
    }

    async fn upload(
        &self,
        kind: SubmissionKind,
        key: &StorageKey,
        path: &str,
        file: &UploadedFile,
    ) -> (Option<String>, EffectStatus) {
        let content_type = upload_content_type(file);
        match self
            .objects
            .put(path, Bytes::clone(&file.bytes), &content_type)
            .await
        {
            Ok(WriteOutcome::Done(stored)) => (Some(stored), EffectStatus::Done),
            Ok(WriteOutcome::Skipped) => (None, EffectStatus::Skipped),
            Err(error) => {
                self.reporter.report(
                    &error,
                    ErrorContext::for_submission("upload", kind, key.as_str()),
                );
                (None, EffectStatus::Failed)
            }
        }
    }

    /// Persist, notify and replicate concurrently. No failure escapes.
    async fn fan_out(
        &self,
        kind: SubmissionKind,
        key: &StorageKey,
        row: Row,
        email: OutgoingEmail,
        uploads: EffectStatus,
    ) -> EffectReport {
        let payload = replication_payload(kind, &row);

        let persist = async {
            match self.store.insert(kind.table(), row).await {
                Ok(outcome) => EffectStatus::from(&outcome),
                Err(error) => {
                    self.reporter.report(
                        &error,
                        ErrorContext::for_submission("persist", kind, key.as_str()),
                    );
                    EffectStatus::Failed
                }
            }
        };
        let notify = async {
            match self.notifier.dispatch(email).await {
                Ok(DeliveryOutcome::Sent { .. }) => EffectStatus::Done,
                Ok(DeliveryOutcome::Skipped(_)) => EffectStatus::Skipped,
                Err(error) => {
                    self.reporter.report(
                        &error,
                        ErrorContext::for_submission("notify", kind, key.as_str()),
                    );
                    EffectStatus::Failed
                }
            }
        };
        let replicate = async {
            match self.replicator.replicate(kind, &payload).await {
                Ok(outcome) => EffectStatus::from(&outcome),
                Err(error) => {
                    self.reporter.report(
                        &error,
                        ErrorContext::for_submission("replicate", kind, key.as_str()),
                    );
                    EffectStatus::Failed
                }
            }
        };

        let (persisted, notified, replicated) = tokio::join!(persist, notify, replicate);
        EffectReport {
            uploads,
            persisted,
            notified,
            replicated,
        }
    }
}

fn upload_content_type(file: &UploadedFile) -> String {
    if file.has_extension(".pdf") {
        return mime::APPLICATION_PDF.essence_str().to_string();
    }
    mime_guess::from_path(&file.file_name)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
