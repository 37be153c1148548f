use crate::infra::{AppState, Services};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use bluecrew::intake::{admin_router, intake_router};
use serde_json::json;

/// Public intake, admin views and the operational endpoints in one router.
pub(crate) fn with_service_routes(services: Services) -> axum::Router {
    intake_router(services.intake)
        .merge(admin_router(services.admin))
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::build_services;
    use axum::body::Body;
    use axum::http::Request;
    use bluecrew::config::AppConfig;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state(ready: bool) -> AppState {
        AppState {
            readiness: Arc::new(AtomicBool::new(ready)),
            metrics: Arc::new(PrometheusBuilder::new().build_recorder().handle()),
        }
    }

    fn app(state: AppState) -> axum::Router {
        let services = build_services(&AppConfig::default()).expect("services build");
        with_service_routes(services).layer(Extension(state))
    }

    async fn status_of(app: axum::Router, uri: &str) -> StatusCode {
        app.oneshot(Request::get(uri).body(Body::empty()).expect("request"))
            .await
            .expect("router responds")
            .status()
    }

    #[tokio::test]
    async fn readiness_follows_the_flag() {
        let state = state(false);
        assert_eq!(
            status_of(app(state.clone()), "/ready").await,
            StatusCode::SERVICE_UNAVAILABLE
        );

        state.readiness.store(true, Ordering::Release);
        assert_eq!(status_of(app(state), "/ready").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn operational_and_intake_routes_share_one_router() {
        assert_eq!(status_of(app(state(true)), "/health").await, StatusCode::OK);
        assert_eq!(status_of(app(state(true)), "/metrics").await, StatusCode::OK);
        assert_eq!(status_of(app(state(true)), "/api/csrf").await, StatusCode::OK);
        assert_eq!(
            status_of(app(state(true)), "/api/admin/candidates").await,
            StatusCode::UNAUTHORIZED
        );
    }
}
