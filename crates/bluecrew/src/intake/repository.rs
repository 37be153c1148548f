//! Seams to the managed database, object store and the external recruiting backend.

use async_trait::async_trait;
use axum::body::Bytes;
use serde::Serialize;
use serde_json::{Map, Value};

use super::domain::SubmissionKind;

/// Flat column → value payload written to one table row.
pub type Row = Map<String, Value>;

/// Outcome of a best-effort write against an optional dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome<T> {
    Done(T),
    /// The dependency is not configured in this environment.
    Skipped,
}

impl<T> WriteOutcome<T> {
    pub fn is_done(&self) -> bool {
        matches!(self, WriteOutcome::Done(_))
    }
}

/// Row filter for admin reads. Results are ordered by `order_by` descending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery {
    pub table: &'static str,
    pub filters: Vec<(String, String)>,
    pub order_by: &'static str,
    pub limit: usize,
}

impl SelectQuery {
    pub fn newest(kind: SubmissionKind, limit: usize) -> Self {
        Self {
            table: kind.table(),
            filters: Vec::new(),
            order_by: "submitted_at",
            limit,
        }
    }

    pub fn filter(mut self, column: &str, value: impl Into<String>) -> Self {
        self.filters.push((column.to_string(), value.into()));
        self
    }
}

/// Relational store holding one row per submission.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Insert a row; on success the stored row (with its generated id) is returned.
    async fn insert(&self, table: &str, row: Row) -> Result<WriteOutcome<Row>, StoreError>;
    async fn select(&self, query: SelectQuery) -> Result<Vec<Row>, StoreError>;
    async fn health(&self) -> DependencyStatus;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store is not configured")]
    NotConfigured,
    #[error("store rejected the request with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("store unreachable: {0}")]
    Transport(String),
    #[error("store returned an unexpected payload: {0}")]
    Decode(String),
}

/// One object found under a folder prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredObject {
    pub path: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

/// Private bucket holding uploaded documents.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        path: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<WriteOutcome<String>, StorageError>;
    async fn list(&self, folder: &str) -> Result<Vec<StoredObject>, StorageError>;
    /// Time-limited download link for a private object.
    async fn signed_url(&self, path: &str, expires_in_seconds: u32) -> Result<String, StorageError>;
    async fn health(&self) -> DependencyStatus;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object storage is not configured")]
    NotConfigured,
    #[error("object storage rejected the request with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("object storage unreachable: {0}")]
    Transport(String),
    #[error("object storage returned an unexpected payload: {0}")]
    Decode(String),
}

/// Forwards normalized submissions to the recruiting backend owned by another team.
#[async_trait]
pub trait Replicator: Send + Sync {
    async fn replicate(
        &self,
        kind: SubmissionKind,
        payload: &Value,
    ) -> Result<WriteOutcome<()>, ReplicationError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    #[error("replication target rejected the submission with status {status}")]
    Rejected { status: u16 },
    #[error("replication target unreachable: {0}")]
    Transport(String),
}

/// Health of one dependency as reported by the debug endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyStatus {
    pub name: &'static str,
    pub state: DependencyState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyState {
    Ok,
    NotConfigured,
    Failing,
}

impl DependencyStatus {
    pub fn ok(name: &'static str) -> Self {
        Self {
            name,
            state: DependencyState::Ok,
            detail: None,
        }
    }

    pub fn not_configured(name: &'static str) -> Self {
        Self {
            name,
            state: DependencyState::NotConfigured,
            detail: None,
        }
    }

    pub fn failing(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            state: DependencyState::Failing,
            detail: Some(detail.into()),
        }
    }

    pub fn is_failing(&self) -> bool {
        self.state == DependencyState::Failing
    }
}
