//! Supabase PostgREST and Storage adapter.

use async_trait::async_trait;
use axum::body::Bytes;
use reqwest::{header, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{error_body, trim_base};
use crate::config::SupabaseConfig;
use crate::intake::repository::{
    DependencyStatus, ObjectStore, Row, SelectQuery, StorageError, StoreError, StoredObject,
    SubmissionStore, WriteOutcome,
};

const LIST_PAGE_SIZE: u32 = 100;
const FOLDER_PLACEHOLDER: &str = ".emptyFolderPlaceholder";

pub struct SupabaseClient {
    http: reqwest::Client,
    config: Option<SupabaseConfig>,
    bucket: String,
}

impl SupabaseClient {
    pub fn new(http: reqwest::Client, config: Option<SupabaseConfig>, bucket: impl Into<String>) -> Self {
        Self {
            http,
            config,
            bucket: bucket.into(),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.config.is_some()
    }

    fn request(
        &self,
        config: &SupabaseConfig,
        method: reqwest::Method,
        path: &str,
    ) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", trim_base(&config.url), path))
            .header("apikey", &config.service_key)
            .bearer_auth(&config.service_key)
    }
}

#[async_trait]
impl SubmissionStore for SupabaseClient {
    async fn insert(&self, table: &str, row: Row) -> Result<WriteOutcome<Row>, StoreError> {
        let Some(config) = &self.config else {
            tracing::warn!(table, "database not configured, skipping insert");
            return Ok(WriteOutcome::Skipped);
        };

        let response = self
            .request(config, reqwest::Method::POST, &format!("/rest/v1/{table}"))
            .header("Prefer", "return=representation")
            .json(&Value::Object(row))
            .send()
            .await
            .map_err(|error| StoreError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                message: error_body(response).await,
            });
        }

        let mut rows: Vec<Row> = response
            .json()
            .await
            .map_err(|error| StoreError::Decode(error.to_string()))?;
        Ok(WriteOutcome::Done(rows.pop().unwrap_or_default()))
    }

    async fn select(&self, query: SelectQuery) -> Result<Vec<Row>, StoreError> {
        let Some(config) = &self.config else {
            return Err(StoreError::NotConfigured);
        };

        let mut params: Vec<(String, String)> = vec![
            ("select".to_string(), "*".to_string()),
            ("order".to_string(), format!("{}.desc", query.order_by)),
            ("limit".to_string(), query.limit.to_string()),
        ];
        for (column, value) in &query.filters {
            params.push((column.clone(), format!("eq.{value}")));
        }

        let response = self
            .request(config, reqwest::Method::GET, &format!("/rest/v1/{}", query.table))
            .query(&params)
            .send()
            .await
            .map_err(|error| StoreError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Rejected {
                status: status.as_u16(),
                message: error_body(response).await,
            });
        }

        response
            .json()
            .await
            .map_err(|error| StoreError::Decode(error.to_string()))
    }

    async fn health(&self) -> DependencyStatus {
        const NAME: &str = "database";
        let Some(config) = &self.config else {
            return DependencyStatus::not_configured(NAME);
        };
        match self
            .request(config, reqwest::Method::GET, "/rest/v1/")
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => DependencyStatus::ok(NAME),
            Ok(response) => DependencyStatus::failing(NAME, format!("status {}", response.status())),
            Err(error) => DependencyStatus::failing(NAME, error.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListedObject {
    name: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    metadata: Option<ObjectMetadata>,
}

#[derive(Debug, Deserialize)]
struct ObjectMetadata {
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SignedObject {
    #[serde(rename = "signedURL", alias = "signedUrl")]
    signed_url: String,
}

fn storage_error(status: StatusCode, message: String) -> StorageError {
    StorageError::Rejected {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl ObjectStore for SupabaseClient {
    async fn put(
        &self,
        path: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<WriteOutcome<String>, StorageError> {
        let Some(config) = &self.config else {
            tracing::warn!("object storage not configured, skipping upload");
            return Ok(WriteOutcome::Skipped);
        };

        let response = self
            .request(
                config,
                reqwest::Method::POST,
                &format!("/storage/v1/object/{}/{path}", self.bucket),
            )
            .header(header::CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .map_err(|error| StorageError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(storage_error(status, error_body(response).await));
        }
        Ok(WriteOutcome::Done(path.to_string()))
    }

    async fn list(&self, folder: &str) -> Result<Vec<StoredObject>, StorageError> {
        let Some(config) = &self.config else {
            return Err(StorageError::NotConfigured);
        };
        let folder = folder.trim_end_matches('/');

        let response = self
            .request(
                config,
                reqwest::Method::POST,
                &format!("/storage/v1/object/list/{}", self.bucket),
            )
            .json(&json!({
                "prefix": folder,
                "limit": LIST_PAGE_SIZE,
                "offset": 0,
                "sortBy": { "column": "name", "order": "asc" },
            }))
            .send()
            .await
            .map_err(|error| StorageError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(storage_error(status, error_body(response).await));
        }

        let listed: Vec<ListedObject> = response
            .json()
            .await
            .map_err(|error| StorageError::Decode(error.to_string()))?;

        Ok(listed
            .into_iter()
            .filter(|object| object.id.is_some() && object.name != FOLDER_PLACEHOLDER)
            .map(|object| StoredObject {
                path: format!("{folder}/{}", object.name),
                size: object.metadata.and_then(|metadata| metadata.size),
                name: object.name,
            })
            .collect())
    }

    async fn signed_url(&self, path: &str, expires_in_seconds: u32) -> Result<String, StorageError> {
        let Some(config) = &self.config else {
            return Err(StorageError::NotConfigured);
        };

        let response = self
            .request(
                config,
                reqwest::Method::POST,
                &format!("/storage/v1/object/sign/{}/{path}", self.bucket),
            )
            .json(&json!({ "expiresIn": expires_in_seconds }))
            .send()
            .await
            .map_err(|error| StorageError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(storage_error(status, error_body(response).await));
        }

        let signed: SignedObject = response
            .json()
            .await
            .map_err(|error| StorageError::Decode(error.to_string()))?;
        Ok(format!(
            "{}/storage/v1{}",
            trim_base(&config.url),
            signed.signed_url
        ))
    }

    async fn health(&self) -> DependencyStatus {
        const NAME: &str = "storage";
        let Some(config) = &self.config else {
            return DependencyStatus::not_configured(NAME);
        };
        match self
            .request(
                config,
                reqwest::Method::GET,
                &format!("/storage/v1/bucket/{}", self.bucket),
            )
            .send()
            .await
        {
            Ok(response) if response.status().is_success() => DependencyStatus::ok(NAME),
            Ok(response) => DependencyStatus::failing(NAME, format!("status {}", response.status())),
            Err(error) => DependencyStatus::failing(NAME, error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unconfigured() -> SupabaseClient {
        SupabaseClient::new(reqwest::Client::new(), None, "candidates-private")
    }

    #[tokio::test]
    async fn unconfigured_writes_are_skipped() {
        let client = unconfigured();
        assert_eq!(
            client.insert("candidates", Row::new()).await.expect("skip"),
            WriteOutcome::Skipped
        );
        assert_eq!(
            client
                .put("cv/abc.pdf", Bytes::from_static(b"%PDF"), "application/pdf")
                .await
                .expect("skip"),
            WriteOutcome::Skipped
        );
    }

    #[tokio::test]
    async fn unconfigured_reads_fail_and_health_says_so() {
        let client = unconfigured();
        assert!(matches!(
            client.select(SelectQuery::newest(crate::intake::SubmissionKind::Candidate, 5)).await,
            Err(StoreError::NotConfigured)
        ));
        assert!(matches!(
            client.signed_url("cv/abc.pdf", 60).await,
            Err(StorageError::NotConfigured)
        ));
        let status = SubmissionStore::health(&client).await;
        assert_eq!(status, DependencyStatus::not_configured("database"));
    }

    #[test]
    fn signed_url_payload_accepts_both_spellings() {
        let upper: SignedObject =
            serde_json::from_value(json!({ "signedURL": "/object/sign/b/cv/a.pdf?token=t" }))
                .expect("upper");
        let lower: SignedObject =
            serde_json::from_value(json!({ "signedUrl": "/object/sign/b/cv/a.pdf?token=t" }))
                .expect("lower");
        assert_eq!(upper.signed_url, lower.signed_url);
    }
}
