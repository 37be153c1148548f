//! Sink for failures that are swallowed on the request path.

use std::fmt;

use serde::Serialize;

use super::domain::SubmissionKind;

/// Where a swallowed failure happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorContext {
    pub operation: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<SubmissionKind>,
    /// Storage hash of the submission. Never an email or name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl ErrorContext {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            kind: None,
            reference: None,
        }
    }

    pub fn for_submission(operation: &'static str, kind: SubmissionKind, reference: &str) -> Self {
        Self {
            operation,
            kind: Some(kind),
            reference: Some(reference.to_string()),
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.operation)?;
        if let Some(kind) = self.kind {
            write!(f, " [{}]", kind.label())?;
        }
        if let Some(reference) = &self.reference {
            write!(f, " ref={reference}")?;
        }
        Ok(())
    }
}

/// Fire-and-forget error reporting. Implementations must not block the caller.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &(dyn std::error::Error + 'static), context: ErrorContext);
}

/// Logs through `tracing` only.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, error: &(dyn std::error::Error + 'static), context: ErrorContext) {
        tracing::error!(
            operation = context.operation,
            kind = context.kind.map(SubmissionKind::label),
            reference = context.reference.as_deref(),
            error = %error,
            "operation failed"
        );
    }
}
