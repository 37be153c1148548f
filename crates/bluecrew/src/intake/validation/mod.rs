//! Server-side validation for the public submission forms.
//!
//! Every rule runs on every request so the caller gets the complete list of
//! problems at once. Issues carry a field path and a Norwegian message that can be
//! shown to the submitter as-is.

mod candidate;
mod client;
mod job;

pub use candidate::validate_candidate;
pub use client::validate_client_lead;
pub use job::validate_job_application;

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use super::domain::{RegionSelection, YesNo};
use super::form::FormPayload;

/// Hidden field that real users never fill in.
pub const HONEYPOT_FIELD: &str = "honey";

const SHORT_TEXT_MAX: usize = 200;
const LONG_TEXT_MAX: usize = 4000;

/// A single violated rule, addressed by field path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub path: Vec<String>,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            path: vec![field.to_string()],
            message: message.into(),
        }
    }

    pub fn field(&self) -> &str {
        self.path.first().map(String::as_str).unwrap_or_default()
    }
}

/// Validation outcome carrying every issue found in the submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationFailure {
    /// Messages joined with ` | `, the format the HTML form flow shows.
    pub fn joined(&self) -> String {
        self.issues
            .iter()
            .map(|issue| issue.message.as_str())
            .collect::<Vec<_>>()
            .join(" | ")
    }

    pub fn has_issue_for(&self, field: &str) -> bool {
        self.issues.iter().any(|issue| issue.field() == field)
    }
}

/// Ordered issue collector.
#[derive(Debug, Default)]
pub struct Issues(Vec<ValidationIssue>);

impl Issues {
    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.0.push(ValidationIssue::new(field, message));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_failure(self) -> Option<ValidationFailure> {
        if self.0.is_empty() {
            None
        } else {
            Some(ValidationFailure { issues: self.0 })
        }
    }
}

/// True when the honeypot was filled in; such requests are accepted without side effects.
pub fn is_spam(payload: &FormPayload) -> bool {
    payload.text(HONEYPOT_FIELD).is_some()
}

/// Loose `local@domain.tld` shape check.
pub fn looks_like_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    match domain.rsplit_once('.') {
        Some((host, tld)) => !host.is_empty() && !tld.is_empty(),
        None => false,
    }
}

/// Typed reads over a [`FormPayload`] that record issues instead of returning early.
pub(crate) struct FieldReader<'a> {
    payload: &'a FormPayload,
    pub(crate) issues: Issues,
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(payload: &'a FormPayload) -> Self {
        Self {
            payload,
            issues: Issues::default(),
        }
    }

    pub(crate) fn payload(&self) -> &'a FormPayload {
        self.payload
    }

    pub(crate) fn required_text(
        &mut self,
        field: &str,
        min_chars: usize,
        message: &str,
    ) -> Option<String> {
        match self.payload.text(field) {
            Some(value) if value.chars().count() >= min_chars => {
                self.bounded(field, value, SHORT_TEXT_MAX)
            }
            _ => {
                self.issues.push(field, message);
                None
            }
        }
    }

    pub(crate) fn optional_text(&mut self, field: &str) -> Option<String> {
        let value = self.payload.text(field)?;
        self.bounded(field, value, SHORT_TEXT_MAX)
    }

    pub(crate) fn optional_long_text(&mut self, field: &str) -> Option<String> {
        let value = self.payload.text(field)?;
        self.bounded(field, value, LONG_TEXT_MAX)
    }

    fn bounded(&mut self, field: &str, value: &str, max_chars: usize) -> Option<String> {
        if value.chars().count() > max_chars {
            self.issues
                .push(field, format!("Feltet kan ha maks {max_chars} tegn"));
            return None;
        }
        Some(value.to_string())
    }

    pub(crate) fn email(&mut self, field: &str) -> Option<String> {
        match self.payload.text(field) {
            Some(value) if looks_like_email(value) => self.bounded(field, value, SHORT_TEXT_MAX),
            Some(_) => {
                self.issues.push(field, "Ugyldig e-postadresse");
                None
            }
            None => {
                self.issues.push(field, "E-post er påkrevd");
                None
            }
        }
    }

    pub(crate) fn yes_no(&mut self, field: &str, message: &str) -> Option<YesNo> {
        let parsed = self.payload.text(field).and_then(YesNo::parse);
        if parsed.is_none() {
            self.issues.push(field, message);
        }
        parsed
    }

    pub(crate) fn non_empty_list(&mut self, field: &str, message: &str) -> Vec<String> {
        let values = self.payload.values(field);
        if values.is_empty() {
            self.issues.push(field, message);
        }
        values
    }

    pub(crate) fn must_be_checked(&mut self, field: &str, message: &str) -> bool {
        let checked = self.payload.checked(field);
        if !checked {
            self.issues.push(field, message);
        }
        checked
    }

    /// County and municipality are captured together: a county without a
    /// municipality is incomplete.
    pub(crate) fn region(
        &mut self,
        county_field: &str,
        municipality_field: &str,
    ) -> Option<RegionSelection> {
        let county = self.payload.text(county_field)?;
        match self.payload.text(municipality_field) {
            Some(municipality) => Some(RegionSelection {
                county: county.to_string(),
                municipality: municipality.to_string(),
            }),
            None => {
                self.issues
                    .push(municipality_field, "Velg kommune for valgt fylke");
                None
            }
        }
    }

    pub(crate) fn optional_date(&mut self, field: &str) -> Option<NaiveDate> {
        let raw = self.payload.text(field)?;
        match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => {
                self.issues.push(field, "Ugyldig dato (bruk ÅÅÅÅ-MM-DD)");
                None
            }
        }
    }

    /// Build the typed record when no rule was violated. `build` sees every
    /// required value as `Some` on that path.
    pub(crate) fn finish<T>(
        self,
        build: impl FnOnce() -> Option<T>,
    ) -> Result<T, ValidationFailure> {
        if let Some(failure) = self.issues.into_failure() {
            return Err(failure);
        }
        build().ok_or_else(|| ValidationFailure {
            issues: vec![ValidationIssue::new("form", "Skjemaet er ufullstendig")],
        })
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined())
    }
}

impl std::error::Error for ValidationFailure {}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.join("."), self.message)
    }
}
