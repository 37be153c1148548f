//! Lead intake for the Bluecrew marketing site.
//!
//! Candidate registrations, client leads and job applications arrive as
//! multipart forms, pass a rate-limit and identity gate, are validated in a
//! single collect-all pass, and then fan out to storage, the database, staff
//! email and an external recruiting backend on a best-effort basis.

pub mod config;
pub mod error;
pub mod intake;
pub mod integrations;
pub mod telemetry;
