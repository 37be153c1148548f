//! Token-protected staff views: signed download links, submission lists and
//! the dependency health report.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use subtle::ConstantTimeEq;

use super::domain::SubmissionKind;
use super::files::{storage_key, StorageKey};
use super::rate_limit::{RateLimiter, RatePurpose};
use super::repository::{
    DependencyStatus, ObjectStore, Row, SelectQuery, StorageError, StoreError, SubmissionStore,
};
use super::reporting::{ErrorContext, ErrorReporter};
use super::router::GENERIC_FAILURE;
use crate::config::AdminConfig;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";
pub const DEBUG_KEY_HEADER: &str = "x-debug-key";

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 200;
const SIGNABLE_PREFIXES: [&str; 2] = ["cv/", "cert/"];

#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("invalid object key")]
    InvalidKey,
    #[error("rate limit exceeded, retry in {reset_seconds}s")]
    RateLimited { reset_seconds: u64 },
    #[error("not found")]
    NotFound,
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl AdminError {
    fn status(&self) -> StatusCode {
        match self {
            AdminError::Unauthorized => StatusCode::UNAUTHORIZED,
            AdminError::InvalidKey => StatusCode::BAD_REQUEST,
            AdminError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AdminError::NotFound => StatusCode::NOT_FOUND,
            AdminError::Store(_) | AdminError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Never includes dependency names or upstream error text.
    fn public_message(&self) -> &'static str {
        match self {
            AdminError::Unauthorized => "Unauthorized",
            AdminError::InvalidKey => "Invalid key",
            AdminError::RateLimited { .. } => "Too many requests",
            AdminError::NotFound => "Not found",
            AdminError::Store(_) | AdminError::Storage(_) => GENERIC_FAILURE,
        }
    }
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "ok": false, "error": self.public_message() }));
        match self {
            AdminError::RateLimited { reset_seconds } => (
                status,
                [(header::RETRY_AFTER, reset_seconds.max(1).to_string())],
                body,
            )
                .into_response(),
            _ => (status, body).into_response(),
        }
    }
}

pub struct AdminDependencies {
    pub store: Arc<dyn SubmissionStore>,
    pub objects: Arc<dyn ObjectStore>,
    pub reporter: Arc<dyn ErrorReporter>,
    /// Configuration-only checks (email, identity, limiter, replication).
    pub static_checks: Vec<DependencyStatus>,
}

pub struct AdminService {
    store: Arc<dyn SubmissionStore>,
    objects: Arc<dyn ObjectStore>,
    reporter: Arc<dyn ErrorReporter>,
    limiter: Arc<RateLimiter>,
    static_checks: Vec<DependencyStatus>,
    sign_token: Option<String>,
    debug_key: Option<String>,
    signed_url_ttl_seconds: u32,
}

impl AdminService {
    pub fn new(
        dependencies: AdminDependencies,
        limiter: Arc<RateLimiter>,
        config: &AdminConfig,
        signed_url_ttl_seconds: u32,
    ) -> Self {
        Self {
            store: dependencies.store,
            objects: dependencies.objects,
            reporter: dependencies.reporter,
            limiter,
            static_checks: dependencies.static_checks,
            sign_token: config.sign_token.clone(),
            debug_key: config.debug_key.clone(),
            signed_url_ttl_seconds,
        }
    }

    /// Accepts `x-admin-token: <t>` or `Authorization: Bearer <t>`.
    pub fn authorize(&self, headers: &HeaderMap) -> Result<(), AdminError> {
        let presented = headers
            .get(ADMIN_TOKEN_HEADER)
            .or_else(|| headers.get(header::AUTHORIZATION))
            .and_then(|value| value.to_str().ok())
            .map(|value| value.strip_prefix("Bearer ").unwrap_or(value).trim());
        check_secret(self.sign_token.as_deref(), presented)
    }

    pub fn authorize_debug(&self, headers: &HeaderMap) -> Result<(), AdminError> {
        let presented = headers
            .get(DEBUG_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim);
        check_secret(self.debug_key.as_deref(), presented)
    }

    pub fn client_ip(&self, headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
        self.limiter.client_ip(headers, peer)
    }

    /// Rate limit, then token, then key shape.
    pub async fn sign_url(
        &self,
        headers: &HeaderMap,
        client_ip: &str,
        key: Option<&str>,
    ) -> Result<String, AdminError> {
        let decision = self.limiter.check(RatePurpose::SignUrl, client_ip).await;
        if !decision.allowed {
            return Err(AdminError::RateLimited {
                reset_seconds: decision.reset_seconds,
            });
        }
        self.authorize(headers)?;

        let key = key.map(str::trim).filter(|key| is_signable_key(key));
        let Some(key) = key else {
            return Err(AdminError::InvalidKey);
        };

        self.signed(key).await
    }

    async fn signed(&self, path: &str) -> Result<String, AdminError> {
        self.objects
            .signed_url(path, self.signed_url_ttl_seconds)
            .await
            .map_err(|error| {
                self.reporter.report(&error, ErrorContext::new("sign-url"));
                AdminError::Storage(error)
            })
    }

    /// Signed link for an optional path column; failures degrade to `null`.
    async fn link(&self, path: Option<&str>) -> Value {
        match path {
            Some(path) => self.signed(path).await.map(Value::String).unwrap_or(Value::Null),
            None => Value::Null,
        }
    }

    async fn select(&self, query: SelectQuery) -> Result<Vec<Row>, AdminError> {
        self.store.select(query).await.map_err(|error| {
            self.reporter.report(&error, ErrorContext::new("admin-select"));
            AdminError::Store(error)
        })
    }

    pub async fn candidates(&self, limit: Option<usize>) -> Result<Vec<Value>, AdminError> {
        let rows = self
            .select(SelectQuery::newest(SubmissionKind::Candidate, clamp_limit(limit)))
            .await?;

        let mut views = Vec::with_capacity(rows.len());
        for mut row in rows {
            let cv_url = self.link(text_column(&row, "cv_key")).await;
            row.insert("cv_url".to_string(), cv_url);
            views.push(Value::Object(row));
        }
        Ok(views)
    }

    /// One candidate with their certificate files, found by recomputing the
    /// storage key from the stored email and timestamp.
    pub async fn candidate(&self, id: &str) -> Result<Value, AdminError> {
        let rows = self
            .select(SelectQuery::newest(SubmissionKind::Candidate, 1).filter("id", id))
            .await?;
        let Some(row) = rows.into_iter().next() else {
            return Err(AdminError::NotFound);
        };

        let cv_url = self.link(text_column(&row, "cv_key")).await;

        let mut certificates = Vec::new();
        if let Some(key) = stored_key(&row) {
            let objects = self.objects.list(&key.cert_folder()).await.map_err(|error| {
                self.reporter.report(&error, ErrorContext::new("admin-list"));
                AdminError::Storage(error)
            })?;
            for object in objects {
                let url = self.link(Some(object.path.as_str())).await;
                certificates.push(json!({
                    "name": object.name,
                    "path": object.path,
                    "size": object.size,
                    "url": url,
                }));
            }
        }

        Ok(json!({
            "candidate": row,
            "cv_url": cv_url,
            "certificates": certificates,
        }))
    }

    pub async fn client_leads(&self, limit: Option<usize>) -> Result<Vec<Row>, AdminError> {
        self.select(SelectQuery::newest(SubmissionKind::ClientLead, clamp_limit(limit)))
            .await
    }

    pub async fn job_applications(
        &self,
        job_id: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<Value>, AdminError> {
        let mut query = SelectQuery::newest(SubmissionKind::JobApplication, clamp_limit(limit));
        if let Some(job_id) = job_id.map(str::trim).filter(|id| !id.is_empty()) {
            query = query.filter("job_id", job_id);
        }

        let rows = self.select(query).await?;
        let mut views = Vec::with_capacity(rows.len());
        for mut row in rows {
            let cv_url = match text_column(&row, "cv_key") {
                Some(path) if path.starts_with("job-applications/") => {
                    self.link(Some(path)).await
                }
                _ => Value::Null,
            };
            row.insert("cv_url".to_string(), cv_url);
            views.push(Value::Object(row));
        }
        Ok(views)
    }

    /// Configuration checks plus live probes of the store and bucket.
    pub async fn health(&self) -> (bool, Vec<DependencyStatus>) {
        let (store, objects) = tokio::join!(self.store.health(), self.objects.health());
        let mut statuses = self.static_checks.clone();
        statuses.push(store);
        statuses.push(objects);
        let healthy = !statuses.iter().any(DependencyStatus::is_failing);
        (healthy, statuses)
    }
}

fn check_secret(expected: Option<&str>, presented: Option<&str>) -> Result<(), AdminError> {
    match (expected, presented) {
        (Some(expected), Some(presented))
            if !expected.is_empty()
                && bool::from(expected.as_bytes().ct_eq(presented.as_bytes())) =>
        {
            Ok(())
        }
        _ => Err(AdminError::Unauthorized),
    }
}

/// Only document prefixes may be signed, and never a traversal.
pub fn is_signable_key(key: &str) -> bool {
    SIGNABLE_PREFIXES.iter().any(|prefix| key.starts_with(prefix))
        && !key.contains("..")
        && !key.contains('\\')
}

fn clamp_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

fn text_column<'a>(row: &'a Row, column: &str) -> Option<&'a str> {
    row.get(column)
        .and_then(Value::as_str)
        .filter(|value| !value.is_empty())
}

fn stored_key(row: &Row) -> Option<StorageKey> {
    let email = text_column(row, "email")?;
    let submitted_at = text_column(row, "submitted_at")?;
    let submitted_at = DateTime::parse_from_rfc3339(submitted_at)
        .ok()?
        .with_timezone(&Utc);
    Some(storage_key(email, submitted_at))
}

#[derive(Debug, Default, Deserialize)]
pub struct SignUrlRequest {
    pub key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
    pub job_id: Option<String>,
}

pub fn admin_router(service: Arc<AdminService>) -> Router {
    Router::new()
        .route(
            "/api/admin/sign-url",
            get(sign_url_query_handler).post(sign_url_body_handler),
        )
        .route("/api/admin/candidates", get(candidates_handler))
        .route("/api/admin/candidates/:id", get(candidate_handler))
        .route("/api/admin/client-leads", get(client_leads_handler))
        .route("/api/admin/job-applications", get(job_applications_handler))
        .route("/api/debug/health", get(debug_health_handler))
        .with_state(service)
}

fn signed_response(result: Result<String, AdminError>) -> Response {
    match result {
        Ok(url) => Json(json!({ "ok": true, "url": url })).into_response(),
        Err(error) => error.into_response(),
    }
}

pub(crate) async fn sign_url_query_handler(
    State(service): State<Arc<AdminService>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Query(request): Query<SignUrlRequest>,
) -> Response {
    let ip = service.client_ip(&headers, connect.map(|ConnectInfo(addr)| addr));
    signed_response(service.sign_url(&headers, &ip, request.key.as_deref()).await)
}

pub(crate) async fn sign_url_body_handler(
    State(service): State<Arc<AdminService>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let ip = service.client_ip(&headers, connect.map(|ConnectInfo(addr)| addr));
    let request: SignUrlRequest = serde_json::from_slice(&body).unwrap_or_default();
    signed_response(service.sign_url(&headers, &ip, request.key.as_deref()).await)
}

pub(crate) async fn candidates_handler(
    State(service): State<Arc<AdminService>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Response, AdminError> {
    service.authorize(&headers)?;
    let candidates = service.candidates(query.limit).await?;
    Ok(Json(json!({ "ok": true, "candidates": candidates })).into_response())
}

pub(crate) async fn candidate_handler(
    State(service): State<Arc<AdminService>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Response, AdminError> {
    service.authorize(&headers)?;
    let mut view = service.candidate(&id).await?;
    if let Value::Object(map) = &mut view {
        map.insert("ok".to_string(), Value::Bool(true));
    }
    Ok(Json(view).into_response())
}

pub(crate) async fn client_leads_handler(
    State(service): State<Arc<AdminService>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Response, AdminError> {
    service.authorize(&headers)?;
    let leads = service.client_leads(query.limit).await?;
    Ok(Json(json!({ "ok": true, "client_leads": leads })).into_response())
}

pub(crate) async fn job_applications_handler(
    State(service): State<Arc<AdminService>>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Response, AdminError> {
    service.authorize(&headers)?;
    let applications = service
        .job_applications(query.job_id.as_deref(), query.limit)
        .await?;
    Ok(Json(json!({ "ok": true, "job_applications": applications })).into_response())
}

pub(crate) async fn debug_health_handler(
    State(service): State<Arc<AdminService>>,
    headers: HeaderMap,
) -> Result<Response, AdminError> {
    service.authorize_debug(&headers)?;
    let (healthy, dependencies) = service.health().await;
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    Ok((
        status,
        Json(json!({
            "ok": healthy,
            "checked_at": Utc::now().to_rfc3339(),
            "dependencies": dependencies,
        })),
    )
        .into_response())
}
