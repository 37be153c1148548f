use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, Request};
use axum::response::Response;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};

use crate::config::{AdminConfig, CompanyProfile, FormsConfig};
use crate::intake::admin::{admin_router, AdminDependencies, AdminService};
use crate::intake::domain::{SubmissionKind, UploadedFile, VerifiedIdentitySession};
use crate::intake::form::FormPayload;
use crate::intake::identity::{IdentityError, IdentityGate, IdentitySessions};
use crate::intake::notify::{MailError, MailTransport, NotificationDispatcher, OutgoingEmail};
use crate::intake::rate_limit::{InMemoryRateLimiter, RateLimitPolicy, RateLimiter};
use crate::intake::reporting::{ErrorContext, ErrorReporter};
use crate::intake::repository::{
    DependencyStatus, ObjectStore, ReplicationError, Replicator, Row, SelectQuery, StorageError,
    StoreError, StoredObject, SubmissionStore, WriteOutcome,
};
use crate::intake::router::intake_router;
use crate::intake::service::{IntakeDependencies, IntakeService};

pub(super) const ADMIN_TOKEN: &str = "admin-secret";
pub(super) const DEBUG_KEY: &str = "debug-secret";
pub(super) const LOGIN_PATH: &str = "/api/vipps/login";

pub(super) fn company() -> CompanyProfile {
    CompanyProfile {
        name: "Bluecrew AS".to_string(),
        org_number: Some("923 456 789".to_string()),
        address: "Storgata 1, 8006 Bodø".to_string(),
        contact_email: "post@bluecrew.no".to_string(),
        privacy_url: "https://bluecrew.no/personvern".to_string(),
    }
}

pub(super) fn session() -> VerifiedIdentitySession {
    VerifiedIdentitySession {
        verified: true,
        name: "Kari Nordmann".to_string(),
        given_name: Some("Kari".to_string()),
        family_name: Some("Nordmann".to_string()),
        phone: Some("4791234567".to_string()),
        email: Some("kari@example.no".to_string()),
        birth_date: None,
        subject: "vipps-sub-1".to_string(),
        verified_at: Utc
            .with_ymd_and_hms(2025, 3, 1, 9, 0, 0)
            .single()
            .expect("timestamp"),
    }
}

pub(super) fn pdf(field: &str, name: &str) -> UploadedFile {
    UploadedFile {
        field: field.to_string(),
        file_name: name.to_string(),
        content_type: Some("application/pdf".to_string()),
        bytes: Bytes::from_static(b"%PDF-1.4 test document"),
    }
}

/// Field pairs for a complete, valid candidate registration (no files).
pub(super) fn candidate_fields() -> Vec<(&'static str, &'static str)> {
    vec![
        ("name", "Kari Nordmann"),
        ("email", "kari@example.no"),
        ("phone", "91234567"),
        ("work_main", "Havbruk:Operativt"),
        ("wants_temporary", "ja"),
        ("stcw_has", "nei"),
        ("deck_has", "nei"),
        ("gdpr", "on"),
        ("stcw_confirm", "on"),
        ("honey", ""),
    ]
}

pub(super) fn candidate_payload() -> FormPayload {
    let mut payload = FormPayload::new();
    for (key, value) in candidate_fields() {
        payload.push_field(key, value);
    }
    payload.push_file(pdf("cv", "kari.pdf"));
    payload
}

pub(super) fn client_fields() -> Vec<(&'static str, &'static str)> {
    vec![
        ("company", "Nordhav Sjømat AS"),
        ("contact_person", "Ola Nordmann"),
        ("email", "ola@nordhav.no"),
        ("phone", "90000000"),
        ("county", "Nordland"),
        ("municipality", "Bodø"),
        ("need_category", "Havbruk"),
        ("need_type", "Vikar"),
        ("description", "Trenger to matroser fra mars"),
        ("gdpr", "on"),
    ]
}

pub(super) fn job_fields() -> Vec<(&'static str, &'static str)> {
    vec![
        ("job_id", "job-42"),
        ("name", "Kari Nordmann"),
        ("email", "kari@example.no"),
        ("phone", "91234567"),
        ("cover_letter", "Jeg har fem års erfaring fra brønnbåt."),
    ]
}

pub(super) fn payload_from(fields: &[(&str, &str)]) -> FormPayload {
    let mut payload = FormPayload::new();
    for (key, value) in fields {
        payload.push_field(*key, *value);
    }
    payload
}

#[derive(Default)]
pub(super) struct MemoryStore {
    rows: Mutex<Vec<(String, Row)>>,
    fail: bool,
}

impl MemoryStore {
    pub(super) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(super) fn rows(&self, table: &str) -> Vec<Row> {
        self.rows
            .lock()
            .expect("store mutex poisoned")
            .iter()
            .filter(|(stored_table, _)| stored_table == table)
            .map(|(_, row)| row.clone())
            .collect()
    }

    pub(super) fn seed(&self, table: &str, row: Row) {
        self.rows
            .lock()
            .expect("store mutex poisoned")
            .push((table.to_string(), row));
    }

    pub(super) fn total(&self) -> usize {
        self.rows.lock().expect("store mutex poisoned").len()
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn insert(&self, table: &str, mut row: Row) -> Result<WriteOutcome<Row>, StoreError> {
        if self.fail {
            return Err(StoreError::Transport("database offline".to_string()));
        }
        let mut guard = self.rows.lock().expect("store mutex poisoned");
        row.insert("id".to_string(), json!((guard.len() + 1).to_string()));
        guard.push((table.to_string(), row.clone()));
        Ok(WriteOutcome::Done(row))
    }

    async fn select(&self, query: SelectQuery) -> Result<Vec<Row>, StoreError> {
        if self.fail {
            return Err(StoreError::Transport("database offline".to_string()));
        }
        let mut rows: Vec<Row> = self
            .rows(query.table)
            .into_iter()
            .filter(|row| {
                query.filters.iter().all(|(column, value)| {
                    row.get(column).and_then(Value::as_str) == Some(value.as_str())
                })
            })
            .collect();
        rows.sort_by(|a, b| {
            let key = |row: &Row| {
                row.get(query.order_by)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            key(b).cmp(&key(a))
        });
        rows.truncate(query.limit);
        Ok(rows)
    }

    async fn health(&self) -> DependencyStatus {
        if self.fail {
            DependencyStatus::failing("database", "offline")
        } else {
            DependencyStatus::ok("database")
        }
    }
}

#[derive(Default)]
pub(super) struct MemoryObjects {
    objects: Mutex<BTreeMap<String, (Bytes, String)>>,
    fail: bool,
}

impl MemoryObjects {
    pub(super) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(super) fn paths(&self) -> Vec<String> {
        self.objects
            .lock()
            .expect("objects mutex poisoned")
            .keys()
            .cloned()
            .collect()
    }

    pub(super) fn content_type(&self, path: &str) -> Option<String> {
        self.objects
            .lock()
            .expect("objects mutex poisoned")
            .get(path)
            .map(|(_, content_type)| content_type.clone())
    }

    pub(super) fn seed(&self, path: &str) {
        self.objects
            .lock()
            .expect("objects mutex poisoned")
            .insert(
                path.to_string(),
                (Bytes::from_static(b"seed"), "application/pdf".to_string()),
            );
    }
}

#[async_trait]
impl ObjectStore for MemoryObjects {
    async fn put(
        &self,
        path: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<WriteOutcome<String>, StorageError> {
        if self.fail {
            return Err(StorageError::Transport("bucket offline".to_string()));
        }
        self.objects
            .lock()
            .expect("objects mutex poisoned")
            .insert(path.to_string(), (bytes, content_type.to_string()));
        Ok(WriteOutcome::Done(path.to_string()))
    }

    async fn list(&self, folder: &str) -> Result<Vec<StoredObject>, StorageError> {
        let prefix = format!("{}/", folder.trim_end_matches('/'));
        Ok(self
            .objects
            .lock()
            .expect("objects mutex poisoned")
            .iter()
            .filter_map(|(path, (bytes, _))| {
                let name = path.strip_prefix(&prefix)?;
                Some(StoredObject {
                    path: path.clone(),
                    name: name.to_string(),
                    size: Some(bytes.len() as u64),
                })
            })
            .collect())
    }

    async fn signed_url(&self, path: &str, expires_in_seconds: u32) -> Result<String, StorageError> {
        if self.fail {
            return Err(StorageError::Transport("bucket offline".to_string()));
        }
        Ok(format!(
            "https://storage.test/signed/{path}?expires={expires_in_seconds}"
        ))
    }

    async fn health(&self) -> DependencyStatus {
        DependencyStatus::ok("storage")
    }
}

#[derive(Default)]
pub(super) struct RecordingReplicator {
    pub(super) payloads: Mutex<Vec<(SubmissionKind, Value)>>,
}

#[async_trait]
impl Replicator for RecordingReplicator {
    async fn replicate(
        &self,
        kind: SubmissionKind,
        payload: &Value,
    ) -> Result<WriteOutcome<()>, ReplicationError> {
        self.payloads
            .lock()
            .expect("replicator mutex poisoned")
            .push((kind, payload.clone()));
        Ok(WriteOutcome::Done(()))
    }
}

#[derive(Default)]
pub(super) struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
    fail: bool,
}

impl RecordingMailer {
    pub(super) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub(super) fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().expect("mailer mutex poisoned").clone()
    }
}

#[async_trait]
impl MailTransport for RecordingMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<Option<String>, MailError> {
        if self.fail {
            return Err(MailError::Rejected {
                status: 500,
                message: "provider outage".to_string(),
            });
        }
        self.sent
            .lock()
            .expect("mailer mutex poisoned")
            .push(email.clone());
        Ok(Some("email-1".to_string()))
    }
}

#[derive(Default)]
pub(super) struct RecordingReporter {
    reports: Mutex<Vec<ErrorContext>>,
}

impl RecordingReporter {
    pub(super) fn operations(&self) -> Vec<&'static str> {
        self.reports
            .lock()
            .expect("reporter mutex poisoned")
            .iter()
            .map(|context| context.operation)
            .collect()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, _error: &(dyn std::error::Error + 'static), context: ErrorContext) {
        self.reports
            .lock()
            .expect("reporter mutex poisoned")
            .push(context);
    }
}

pub(super) struct FixedSessions(pub(super) Option<VerifiedIdentitySession>);

#[async_trait]
impl IdentitySessions for FixedSessions {
    async fn current_session(
        &self,
        _headers: &HeaderMap,
    ) -> Result<Option<VerifiedIdentitySession>, IdentityError> {
        Ok(self.0.clone())
    }
}

/// Knobs for [`Harness::build`]. Defaults: verified session, healthy doubles,
/// in-memory limiter with the production policy that trusts forwarding headers.
pub(super) struct HarnessConfig {
    pub(super) session: Option<VerifiedIdentitySession>,
    pub(super) verification_optional: bool,
    pub(super) store: MemoryStore,
    pub(super) objects: MemoryObjects,
    pub(super) mailer: RecordingMailer,
    pub(super) limiter: Option<RateLimiter>,
    pub(super) forms: FormsConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            session: Some(session()),
            verification_optional: false,
            store: MemoryStore::default(),
            objects: MemoryObjects::default(),
            mailer: RecordingMailer::default(),
            limiter: None,
            forms: FormsConfig {
                candidate_form_certs_required: false,
                candidate_self_service_certs_required: true,
            },
        }
    }
}

pub(super) struct Harness {
    pub(super) store: Arc<MemoryStore>,
    pub(super) objects: Arc<MemoryObjects>,
    pub(super) replicator: Arc<RecordingReplicator>,
    pub(super) mailer: Arc<RecordingMailer>,
    pub(super) reporter: Arc<RecordingReporter>,
    pub(super) service: Arc<IntakeService>,
    pub(super) admin: Arc<AdminService>,
}

impl Harness {
    pub(super) fn new() -> Self {
        Self::build(HarnessConfig::default())
    }

    pub(super) fn build(config: HarnessConfig) -> Self {
        let store = Arc::new(config.store);
        let objects = Arc::new(config.objects);
        let replicator = Arc::new(RecordingReplicator::default());
        let mailer = Arc::new(config.mailer);
        let reporter = Arc::new(RecordingReporter::default());

        let limiter = Arc::new(config.limiter.unwrap_or_else(|| {
            // Requests carry no socket peer here, so callers are told apart by header.
            RateLimiter::new(
                Some(Arc::new(InMemoryRateLimiter::new())),
                RateLimitPolicy {
                    max_requests: 8,
                    window: Duration::from_secs(60),
                },
            )
            .trusting_proxy_headers(true)
        }));
        let gate = Arc::new(IdentityGate::new(
            Arc::new(FixedSessions(config.session)),
            config.verification_optional,
            LOGIN_PATH,
        ));

        let service = Arc::new(IntakeService::new(
            IntakeDependencies {
                store: store.clone(),
                objects: objects.clone(),
                replicator: replicator.clone(),
                notifier: NotificationDispatcher::new(Some(mailer.clone()), &company(), false),
                reporter: reporter.clone(),
            },
            limiter.clone(),
            gate,
            config.forms,
        ));

        let admin = Arc::new(AdminService::new(
            AdminDependencies {
                store: store.clone(),
                objects: objects.clone(),
                reporter: reporter.clone(),
                static_checks: vec![DependencyStatus::ok("email")],
            },
            limiter,
            &AdminConfig {
                sign_token: Some(ADMIN_TOKEN.to_string()),
                debug_key: Some(DEBUG_KEY.to_string()),
            },
            600,
        ));

        Self {
            store,
            objects,
            replicator,
            mailer,
            reporter,
            service,
            admin,
        }
    }

    pub(super) fn router(&self) -> axum::Router {
        intake_router(self.service.clone()).merge(admin_router(self.admin.clone()))
    }
}

const BOUNDARY: &str = "bluecrew-test-boundary";

/// Hand-built multipart/form-data body.
#[derive(Default)]
pub(super) struct MultipartBody {
    bytes: Vec<u8>,
}

impl MultipartBody {
    pub(super) fn from_fields(fields: &[(&str, &str)]) -> Self {
        let mut body = Self::default();
        for (name, value) in fields {
            body = body.text(name, value);
        }
        body
    }

    pub(super) fn text(mut self, name: &str, value: &str) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    pub(super) fn file(mut self, name: &str, file_name: &str, content_type: &str, data: &[u8]) -> Self {
        self.bytes.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.bytes.extend_from_slice(data);
        self.bytes.extend_from_slice(b"\r\n");
        self
    }

    /// Close the body and wrap it in a POST to `uri` with any extra headers.
    pub(super) fn into_request(mut self, uri: &str, headers: &[(&str, &str)]) -> Request<Body> {
        self.bytes
            .extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        let mut builder = Request::post(uri).header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        );
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(Body::from(self.bytes)).expect("request builds")
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) async fn read_text_body(response: Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    String::from_utf8(body.to_vec()).expect("utf-8 body")
}

pub(super) fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}
