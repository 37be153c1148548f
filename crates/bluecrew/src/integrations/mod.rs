//! HTTP adapters for the managed services behind the intake seams.

pub mod replication;
pub mod resend;
pub mod supabase;
pub mod upstash;
pub mod vipps;
pub mod webhook;

use std::time::Duration;

pub use replication::HttpReplicator;
pub use resend::ResendMailer;
pub use supabase::SupabaseClient;
pub use upstash::UpstashRateLimiter;
pub use vipps::VippsSessionClient;
pub use webhook::WebhookErrorReporter;

const USER_AGENT: &str = concat!("bluecrew-intake/", env!("CARGO_PKG_VERSION"));
const ERROR_BODY_MAX: usize = 300;

/// Shared client with connection pooling. Clone it into every adapter.
pub fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .connect_timeout(Duration::from_secs(5))
        .pool_max_idle_per_host(8)
        .user_agent(USER_AGENT)
        .build()
}

/// Upstream error body, shortened for logs.
pub(crate) async fn error_body(response: reqwest::Response) -> String {
    let text = response.text().await.unwrap_or_default();
    let mut short: String = text.chars().take(ERROR_BODY_MAX).collect();
    if text.chars().count() > ERROR_BODY_MAX {
        short.push_str("...");
    }
    short
}

pub(crate) fn trim_base(url: &str) -> &str {
    url.trim_end_matches('/')
}
