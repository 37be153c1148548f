//! Public submission pipeline: gates, validation, document intake and fan-out.

pub mod admin;
pub mod csrf;
pub mod domain;
pub mod files;
pub mod form;
pub mod identity;
pub mod notify;
pub mod rate_limit;
pub mod records;
pub mod reporting;
pub mod repository;
pub mod router;
pub mod service;
pub mod validation;

#[cfg(test)]
mod tests;

pub use admin::{admin_router, AdminDependencies, AdminError, AdminService};
pub use domain::{
    CandidateSubmission, ClientLeadSubmission, DocumentSet, IdentityStamp,
    JobApplicationSubmission, SubmissionKind, UploadedFile, VerifiedIdentitySession,
};
pub use files::{storage_key, FileRules, StorageKey};
pub use form::FormPayload;
pub use identity::{GateDecision, IdentityGate, IdentitySessions, NoSessions};
pub use notify::{DeliveryOutcome, MailTransport, NotificationDispatcher, OutgoingEmail};
pub use rate_limit::{
    InMemoryRateLimiter, RateLimitBackend, RateLimitDecision, RateLimitPolicy, RateLimiter,
    RatePurpose,
};
pub use reporting::{ErrorContext, ErrorReporter, TracingReporter};
pub use repository::{
    DependencyStatus, ObjectStore, Replicator, Row, SelectQuery, SubmissionStore, WriteOutcome,
};
pub use router::intake_router;
pub use service::{
    EntryPoint, IntakeDependencies, IntakeError, IntakeOutcome, IntakeService, SubmissionReceipt,
};
pub use validation::{ValidationFailure, ValidationIssue};
