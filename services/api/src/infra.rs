use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use bluecrew::config::AppConfig;
use bluecrew::error::AppError;
use bluecrew::integrations::{
    http_client, HttpReplicator, ResendMailer, SupabaseClient, UpstashRateLimiter,
    VippsSessionClient, WebhookErrorReporter,
};
use bluecrew::intake::{
    AdminDependencies, AdminService, DependencyStatus, ErrorReporter, IdentityGate,
    IdentitySessions, InMemoryRateLimiter, IntakeDependencies, IntakeService, MailTransport,
    NoSessions, NotificationDispatcher, RateLimitBackend, RateLimitPolicy, RateLimiter,
    TracingReporter,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Services shared by every request.
pub(crate) struct Services {
    pub(crate) intake: Arc<IntakeService>,
    pub(crate) admin: Arc<AdminService>,
    pub(crate) rate_limit_backend: Option<&'static str>,
}

pub(crate) fn build_services(config: &AppConfig) -> Result<Services, AppError> {
    let http = http_client()?;

    let supabase = Arc::new(SupabaseClient::new(
        http.clone(),
        config.supabase.clone(),
        config.storage.bucket.clone(),
    ));
    let replicator = Arc::new(HttpReplicator::new(http.clone(), config.replication.clone()));

    let mailer = ResendMailer::from_config(http.clone(), &config.email)
        .map(|mailer| Arc::new(mailer) as Arc<dyn MailTransport>);
    let notifier = NotificationDispatcher::new(mailer, &config.company, config.email.disabled);

    let reporter: Arc<dyn ErrorReporter> = match &config.error_webhook_url {
        Some(url) => Arc::new(WebhookErrorReporter::new(http.clone(), url.clone())),
        None => Arc::new(TracingReporter),
    };

    let sessions: Arc<dyn IdentitySessions> = match &config.identity.session_url {
        Some(url) => Arc::new(VippsSessionClient::new(http.clone(), url.clone())),
        None => Arc::new(NoSessions),
    };
    let gate = Arc::new(IdentityGate::from_config(sessions, &config.identity));

    let limiter = Arc::new(rate_limiter(config, &http));

    let static_checks = static_checks(config, &notifier, &limiter, replicator.is_configured());

    let intake = Arc::new(IntakeService::new(
        IntakeDependencies {
            store: supabase.clone(),
            objects: supabase.clone(),
            replicator,
            notifier,
            reporter: reporter.clone(),
        },
        limiter.clone(),
        gate,
        config.forms,
    ));

    let admin = Arc::new(AdminService::new(
        AdminDependencies {
            store: supabase.clone(),
            objects: supabase,
            reporter,
            static_checks,
        },
        limiter.clone(),
        &config.admin,
        config.storage.signed_url_ttl_seconds,
    ));

    Ok(Services {
        intake,
        admin,
        rate_limit_backend: limiter.backend_name(),
    })
}

/// Shared Redis when configured, then the per-process map, else none (fail open).
fn rate_limiter(config: &AppConfig, http: &reqwest::Client) -> RateLimiter {
    let policy = RateLimitPolicy::from_config(&config.rate_limit);
    let backend: Option<Arc<dyn RateLimitBackend>> = match &config.rate_limit.upstash {
        Some(upstash) => Some(Arc::new(UpstashRateLimiter::new(http.clone(), upstash))),
        None if config.rate_limit.in_memory => Some(Arc::new(InMemoryRateLimiter::new())),
        None => None,
    };
    RateLimiter::new(backend, policy)
        .trusting_proxy_headers(config.rate_limit.trust_proxy_headers)
}

/// Dependencies whose health is only a matter of configuration.
fn static_checks(
    config: &AppConfig,
    notifier: &NotificationDispatcher,
    limiter: &RateLimiter,
    replication_configured: bool,
) -> Vec<DependencyStatus> {
    let configured = |name: &'static str, yes: bool| {
        if yes {
            DependencyStatus::ok(name)
        } else {
            DependencyStatus::not_configured(name)
        }
    };

    let mut rate_limit = configured("rate_limit", limiter.backend_name().is_some());
    rate_limit.detail = limiter.backend_name().map(str::to_string);

    let mut identity = configured("identity", config.identity.session_url.is_some());
    if !config.identity.has_credentials() {
        identity.detail = Some("provider credentials incomplete".to_string());
    }

    vec![
        configured("email", notifier.is_configured()),
        rate_limit,
        identity,
        configured("replication", replication_configured),
        configured("error_webhook", config.error_webhook_url.is_some()),
    ]
}
