use crate::cli::ServeArgs;
use crate::infra::{build_services, AppState};
use crate::routes::with_service_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use bluecrew::config::AppConfig;
use bluecrew::error::AppError;
use bluecrew::telemetry;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let services = build_services(&config)?;
    let rate_limit_backend = services.rate_limit_backend;

    let app = with_service_routes(services)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        database = config.supabase.is_some(),
        rate_limit = rate_limit_backend.unwrap_or("none"),
        identity_soft_mode = config.identity.verification_optional,
        "bluecrew intake ready"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
