use std::collections::BTreeMap;
use std::fmt;

use axum::body::Bytes;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Yes/no answers are posted as the Norwegian literals `ja` and `nei`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YesNo {
    Ja,
    Nei,
}

impl YesNo {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "ja" => Some(Self::Ja),
            "nei" => Some(Self::Nei),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            YesNo::Ja => "ja",
            YesNo::Nei => "nei",
        }
    }

    pub const fn is_yes(self) -> bool {
        matches!(self, YesNo::Ja)
    }
}

/// One `"<category>:<subcategory>"` desired-work tag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkSelection {
    pub category: String,
    pub subcategory: String,
}

impl WorkSelection {
    pub fn parse(tag: &str) -> Option<Self> {
        let (category, subcategory) = tag.split_once(':')?;
        let category = category.trim();
        let subcategory = subcategory.trim();
        if category.is_empty() || subcategory.is_empty() {
            return None;
        }
        Some(Self {
            category: category.to_string(),
            subcategory: subcategory.to_string(),
        })
    }

    pub fn tag(&self) -> String {
        format!("{}:{}", self.category, self.subcategory)
    }
}

impl fmt::Display for WorkSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.category, self.subcategory)
    }
}

/// County (fylke) with its municipality (kommune). Always captured as a pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSelection {
    pub county: String,
    pub municipality: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
    pub street: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
}

impl PostalAddress {
    pub fn is_empty(&self) -> bool {
        self.street.is_none() && self.postal_code.is_none() && self.city.is_none()
    }
}

/// A file part received with a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub field: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn has_extension(&self, extension: &str) -> bool {
        self.file_name
            .to_ascii_lowercase()
            .ends_with(&extension.to_ascii_lowercase())
    }
}

/// Identity fields stamped onto a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityStamp {
    pub verified: bool,
    pub subject: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl IdentityStamp {
    pub fn unverified() -> Self {
        Self::default()
    }
}

/// Session returned by the identity provider once the user completed eID login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedIdentitySession {
    pub verified: bool,
    pub name: String,
    #[serde(default)]
    pub given_name: Option<String>,
    #[serde(default)]
    pub family_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
    pub subject: String,
    pub verified_at: DateTime<Utc>,
}

impl VerifiedIdentitySession {
    pub fn stamp(&self) -> IdentityStamp {
        IdentityStamp {
            verified: self.verified,
            subject: Some(self.subject.clone()),
            verified_at: Some(self.verified_at),
        }
    }
}

/// Documents accepted with a submission, already checked against the flow's rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentSet {
    pub cv: Option<UploadedFile>,
    pub certs: Option<UploadedFile>,
}

impl DocumentSet {
    pub fn iter(&self) -> impl Iterator<Item = &UploadedFile> {
        self.cv.iter().chain(self.certs.iter())
    }
}

/// General candidate registration (not tied to one posted job).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSubmission {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub address: PostalAddress,
    pub region: Option<RegionSelection>,
    pub work_main: Vec<WorkSelection>,
    pub work_other: BTreeMap<String, String>,
    pub available_from: Option<NaiveDate>,
    pub wants_temporary: YesNo,
    pub stcw_has: YesNo,
    pub stcw_modules: Vec<String>,
    pub deck_has: YesNo,
    pub deck_class: Option<u8>,
    pub skills: Option<String>,
    pub other_comments: Option<String>,
    pub stcw_confirm: bool,
    pub gdpr: bool,
    pub identity: IdentityStamp,
    pub documents: DocumentSet,
}

/// Staffing request from a prospective client company.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientLeadSubmission {
    pub company: String,
    pub contact_person: String,
    pub email: String,
    pub phone: String,
    pub region: Option<RegionSelection>,
    pub need_category: String,
    pub need_type: String,
    pub description: Option<String>,
    pub gdpr: bool,
}

/// Application for one specific posted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobApplicationSubmission {
    pub job_id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub cover_letter: Option<String>,
    pub identity: IdentityStamp,
    pub documents: DocumentSet,
}

/// The three public submission kinds handled by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionKind {
    Candidate,
    ClientLead,
    JobApplication,
}

impl SubmissionKind {
    pub const fn table(self) -> &'static str {
        match self {
            SubmissionKind::Candidate => "candidates",
            SubmissionKind::ClientLead => "client_leads",
            SubmissionKind::JobApplication => "job_applications",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            SubmissionKind::Candidate => "candidate",
            SubmissionKind::ClientLead => "client_lead",
            SubmissionKind::JobApplication => "job_application",
        }
    }
}
