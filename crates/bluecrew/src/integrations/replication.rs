//! Forwarding to the recruiting backend run by the staffing team.

use async_trait::async_trait;
use serde_json::Value;

use super::trim_base;
use crate::config::ReplicationConfig;
use crate::intake::domain::SubmissionKind;
use crate::intake::repository::{ReplicationError, Replicator, WriteOutcome};

pub struct HttpReplicator {
    http: reqwest::Client,
    config: Option<ReplicationConfig>,
}

impl HttpReplicator {
    pub fn new(http: reqwest::Client, config: Option<ReplicationConfig>) -> Self {
        Self { http, config }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }
}

/// Collection path on the target for each submission kind.
fn collection(kind: SubmissionKind) -> &'static str {
    match kind {
        SubmissionKind::Candidate => "candidates",
        SubmissionKind::ClientLead => "leads",
        SubmissionKind::JobApplication => "applications",
    }
}

#[async_trait]
impl Replicator for HttpReplicator {
    async fn replicate(
        &self,
        kind: SubmissionKind,
        payload: &Value,
    ) -> Result<WriteOutcome<()>, ReplicationError> {
        let Some(config) = &self.config else {
            return Ok(WriteOutcome::Skipped);
        };

        let mut request = self
            .http
            .post(format!("{}/{}", trim_base(&config.url), collection(kind)))
            .json(payload);
        if let Some(api_key) = &config.api_key {
            request = request.header("x-api-key", api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|error| ReplicationError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ReplicationError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(WriteOutcome::Done(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn unconfigured_target_is_skipped() {
        let replicator = HttpReplicator::new(reqwest::Client::new(), None);
        assert!(!replicator.is_configured());
        let outcome = replicator
            .replicate(SubmissionKind::JobApplication, &json!({}))
            .await
            .expect("skip");
        assert_eq!(outcome, WriteOutcome::Skipped);
    }

    #[test]
    fn collections_are_distinct() {
        assert_eq!(collection(SubmissionKind::Candidate), "candidates");
        assert_ne!(
            collection(SubmissionKind::ClientLead),
            collection(SubmissionKind::JobApplication)
        );
    }
}
