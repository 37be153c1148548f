use chrono::Utc;
use serde_json::json;

use crate::intake::reporting::{ErrorContext, ErrorReporter, TracingReporter};

/// Logs locally and posts a small JSON report to an error webhook in the background.
pub struct WebhookErrorReporter {
    http: reqwest::Client,
    url: String,
}

impl WebhookErrorReporter {
    pub fn new(http: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

impl ErrorReporter for WebhookErrorReporter {
    fn report(&self, error: &(dyn std::error::Error + 'static), context: ErrorContext) {
        TracingReporter.report(error, context.clone());

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let body = json!({
            "service": "bluecrew-intake",
            "at": Utc::now().to_rfc3339(),
            "context": context,
            "message": context.to_string(),
            "error": error.to_string(),
        });
        let request = self.http.post(&self.url).json(&body);

        runtime.spawn(async move {
            if let Err(send_error) = request.send().await {
                tracing::debug!(error = %send_error, "error webhook unreachable");
            }
        });
    }
}
