use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, DefaultBodyLimit, Multipart, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use super::csrf;
use super::files::MEBIBYTE;
use super::form::FormPayload;
use super::identity::GateDecision;
use super::rate_limit::RatePurpose;
use super::service::{
    EntryPoint, IntakeError, IntakeOutcome, IntakeService, CANDIDATE_FORM_PATH,
};

/// Large enough that document size rules are enforced by validation, not the transport.
pub const SUBMISSION_BODY_LIMIT: usize = 25 * MEBIBYTE;

pub const CANDIDATE_SENT_REDIRECT: &str = "/?sent=worker";
pub const CLIENT_SENT_REDIRECT: &str = "/?sent=client";

pub(crate) const GENERIC_FAILURE: &str = "Noe gikk galt. Prøv igjen senere.";
const INVALID_BODY: &str = "Skjemaet kunne ikke leses. Prøv igjen.";
const IDENTITY_REQUIRED: &str = "Du må verifisere deg med Vipps før du sender inn skjemaet.";
const CSRF_REJECTED: &str = "Økten din er utløpt. Last inn siden på nytt og prøv igjen.";
const JOB_APPLICATION_THANKS: &str = "Takk for søknaden! Vi tar kontakt så snart vi har sett på den.";

/// Public submission endpoints plus the form gate, CSRF and session helpers.
pub fn intake_router(service: Arc<IntakeService>) -> Router {
    Router::new()
        .route("/api/candidate", post(candidate_form_handler))
        .route("/api/candidate/submit", post(candidate_json_handler))
        .route("/api/candidate/form", get(form_gate_handler))
        .route("/api/client", post(client_lead_handler))
        .route("/api/jobs/apply", post(job_application_handler))
        .route("/api/csrf", get(csrf_handler))
        .route("/api/identity/session", get(session_handler))
        .layer(DefaultBodyLimit::max(SUBMISSION_BODY_LIMIT))
        .with_state(service)
}

fn peer(connect: Option<ConnectInfo<SocketAddr>>) -> Option<SocketAddr> {
    connect.map(|ConnectInfo(addr)| addr)
}

pub(crate) async fn candidate_form_handler(
    State(service): State<Arc<IntakeService>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let ip = service.client_ip(&headers, peer(connect));
    let result = async {
        service
            .enforce_rate_limit(RatePurpose::Candidate, &ip)
            .await?;
        let payload = FormPayload::from_multipart(multipart).await?;
        service
            .submit_candidate(EntryPoint::Form, payload, &headers, &ip)
            .await
    }
    .await;

    match result {
        Ok(_) => Redirect::to(CANDIDATE_SENT_REDIRECT).into_response(),
        Err(error) => form_error(error),
    }
}

pub(crate) async fn candidate_json_handler(
    State(service): State<Arc<IntakeService>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let ip = service.client_ip(&headers, peer(connect));
    let result = async {
        service
            .enforce_rate_limit(RatePurpose::Candidate, &ip)
            .await?;
        if !csrf::verify(&headers) {
            return Err(IntakeError::Csrf);
        }
        let payload = FormPayload::from_multipart(multipart).await?;
        service
            .submit_candidate(EntryPoint::SelfService, payload, &headers, &ip)
            .await
    }
    .await;

    match result {
        Ok(IntakeOutcome::Accepted(_)) => Json(json!({ "success": true })).into_response(),
        Ok(IntakeOutcome::Spam) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => json_error(error),
    }
}

pub(crate) async fn client_lead_handler(
    State(service): State<Arc<IntakeService>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let ip = service.client_ip(&headers, peer(connect));
    let result = async {
        service.enforce_rate_limit(RatePurpose::Client, &ip).await?;
        let payload = FormPayload::from_multipart(multipart).await?;
        service.submit_client_lead(payload, &ip).await
    }
    .await;

    match result {
        Ok(_) => Redirect::to(CLIENT_SENT_REDIRECT).into_response(),
        Err(error) => form_error(error),
    }
}

pub(crate) async fn job_application_handler(
    State(service): State<Arc<IntakeService>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Response {
    let ip = service.client_ip(&headers, peer(connect));
    let result = async {
        service
            .enforce_rate_limit(RatePurpose::JobApplication, &ip)
            .await?;
        let payload = FormPayload::from_multipart(multipart).await?;
        service.submit_job_application(payload, &headers, &ip).await
    }
    .await;

    match result {
        Ok(IntakeOutcome::Accepted(_)) => Json(json!({
            "success": true,
            "message": JOB_APPLICATION_THANKS,
        }))
        .into_response(),
        Ok(IntakeOutcome::Spam) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => json_error(error),
    }
}

pub(crate) async fn form_gate_handler(
    State(service): State<Arc<IntakeService>>,
    headers: HeaderMap,
) -> Response {
    let gate = service.gate();
    match gate.check(&headers, CANDIDATE_FORM_PATH).await {
        GateDecision::Redirect(login_url) => Redirect::to(&login_url).into_response(),
        decision => {
            let prefill = decision.session().map(|session| {
                json!({
                    "name": session.name,
                    "phone": session.phone,
                    "email": session.email,
                })
            });
            Json(json!({
                "verification_required": gate.verification_required(),
                "soft_mode": !gate.verification_required(),
                "banner": gate.banner(),
                "prefill": prefill,
            }))
            .into_response()
        }
    }
}

pub(crate) async fn session_handler(
    State(service): State<Arc<IntakeService>>,
    headers: HeaderMap,
) -> Response {
    match service.gate().session(&headers).await {
        Some(session) => Json(session).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Ingen aktiv Vipps-økt" })),
        )
            .into_response(),
    }
}

pub(crate) async fn csrf_handler() -> Response {
    let token = csrf::issue_token();
    let mut response = Json(json!({ "csrf_token": token })).into_response();
    match HeaderValue::from_str(&csrf::set_cookie_value(&token)) {
        Ok(cookie) => {
            response.headers_mut().insert(header::SET_COOKIE, cookie);
            response
        }
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE).into_response(),
    }
}

fn retry_after(reset_seconds: u64) -> [(header::HeaderName, String); 1] {
    [(header::RETRY_AFTER, reset_seconds.max(1).to_string())]
}

fn rate_limited_message(reset_seconds: u64) -> String {
    format!(
        "For mange forespørsler. Prøv igjen om {} sekunder.",
        reset_seconds.max(1)
    )
}

/// Responses for the plain HTML form flow.
fn form_error(error: IntakeError) -> Response {
    match error {
        IntakeError::Validation(failure) => {
            (StatusCode::BAD_REQUEST, failure.joined()).into_response()
        }
        IntakeError::RateLimited { reset_seconds } => (
            StatusCode::TOO_MANY_REQUESTS,
            retry_after(reset_seconds),
            rate_limited_message(reset_seconds),
        )
            .into_response(),
        IntakeError::IdentityRequired { login_url } => Redirect::to(&login_url).into_response(),
        IntakeError::Csrf => (StatusCode::FORBIDDEN, CSRF_REJECTED).into_response(),
        IntakeError::Body(error) => {
            let status = error.status();
            tracing::warn!(error = %error, %status, "unreadable submission body");
            (status, body_message(status)).into_response()
        }
    }
}

/// Responses for the script-driven flows.
fn json_error(error: IntakeError) -> Response {
    match error {
        IntakeError::Validation(failure) => (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "error": failure.joined(),
                "issues": failure.issues,
            })),
        )
            .into_response(),
        IntakeError::RateLimited { reset_seconds } => (
            StatusCode::TOO_MANY_REQUESTS,
            retry_after(reset_seconds),
            Json(json!({
                "success": false,
                "error": rate_limited_message(reset_seconds),
                "retry_after": reset_seconds,
            })),
        )
            .into_response(),
        IntakeError::IdentityRequired { login_url } => (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "success": false,
                "error": IDENTITY_REQUIRED,
                "login_url": login_url,
            })),
        )
            .into_response(),
        IntakeError::Csrf => (
            StatusCode::FORBIDDEN,
            Json(json!({ "success": false, "error": CSRF_REJECTED })),
        )
            .into_response(),
        IntakeError::Body(error) => {
            let status = error.status();
            tracing::warn!(error = %error, %status, "unreadable submission body");
            (
                status,
                Json(json!({ "success": false, "error": body_message(status) })),
            )
                .into_response()
        }
    }
}

fn body_message(status: StatusCode) -> &'static str {
    if status.is_server_error() {
        GENERIC_FAILURE
    } else {
        INVALID_BODY
    }
}
