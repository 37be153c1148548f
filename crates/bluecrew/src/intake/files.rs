//! Document intake rules and the storage key shared by writers and admin readers.
//!
//! The storage key is `sha256(lowercase(email) + "|" + iso8601(submitted_at))`,
//! hex encoded. Admin views recompute it from the stored row to find a
//! candidate's objects, so both sides must go through [`storage_key`].

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use super::domain::{DocumentSet, UploadedFile};
use super::form::FormPayload;
use super::validation::Issues;

pub const MEBIBYTE: usize = 1024 * 1024;
pub const CANDIDATE_MAX_BYTES: usize = 10 * MEBIBYTE;
pub const JOB_APPLICATION_MAX_BYTES: usize = 4 * MEBIBYTE;

pub const CV_FIELD: &str = "cv";
pub const CERTS_FIELD: &str = "certs";

const CV_EXTENSION: &str = ".pdf";
const CERT_EXTENSIONS: [&str; 4] = [".pdf", ".zip", ".doc", ".docx"];

/// Per-flow document requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileRules {
    pub cv_required: bool,
    pub certs_accepted: bool,
    pub certs_required: bool,
    pub max_bytes: usize,
}

impl FileRules {
    pub fn candidate(certs_required: bool) -> Self {
        Self {
            cv_required: true,
            certs_accepted: true,
            certs_required,
            max_bytes: CANDIDATE_MAX_BYTES,
        }
    }

    pub fn job_application() -> Self {
        Self {
            cv_required: false,
            certs_accepted: false,
            certs_required: false,
            max_bytes: JOB_APPLICATION_MAX_BYTES,
        }
    }

    fn max_megabytes(&self) -> usize {
        self.max_bytes / MEBIBYTE
    }
}

struct Slot {
    field: &'static str,
    required: bool,
    missing: &'static str,
    wrong_type: &'static str,
    extensions: &'static [&'static str],
}

/// Check the `cv` and `certs` parts against `rules`, recording issues under
/// those field names. Only files that pass are returned.
pub fn check_documents(payload: &FormPayload, rules: &FileRules, issues: &mut Issues) -> DocumentSet {
    let cv = Slot {
        field: CV_FIELD,
        required: rules.cv_required,
        missing: "CV er påkrevd",
        wrong_type: "CV må være en PDF-fil",
        extensions: &[CV_EXTENSION],
    };
    let certs = Slot {
        field: CERTS_FIELD,
        required: rules.certs_required,
        missing: "Sertifikater er påkrevd",
        wrong_type: "Sertifikater må være PDF, ZIP, DOC eller DOCX",
        extensions: &CERT_EXTENSIONS,
    };

    DocumentSet {
        cv: check_slot(payload, &cv, rules, issues),
        certs: if rules.certs_accepted {
            check_slot(payload, &certs, rules, issues)
        } else {
            None
        },
    }
}

fn check_slot(
    payload: &FormPayload,
    slot: &Slot,
    rules: &FileRules,
    issues: &mut Issues,
) -> Option<UploadedFile> {
    let file = match payload.files(slot.field).as_slice() {
        [] => {
            if slot.required {
                issues.push(slot.field, slot.missing);
            }
            return None;
        }
        [file] => *file,
        _ => {
            issues.push(slot.field, "Last opp kun én fil i dette feltet");
            return None;
        }
    };

    let mut ok = true;
    if file.is_empty() {
        issues.push(slot.field, "Filen er tom");
        ok = false;
    }
    if !slot.extensions.iter().any(|ext| file.has_extension(ext)) {
        issues.push(slot.field, slot.wrong_type);
        ok = false;
    }
    if file.len() > rules.max_bytes {
        issues.push(
            slot.field,
            format!("Filen kan ikke være større enn {} MB", rules.max_megabytes()),
        );
        ok = false;
    }

    ok.then(|| file.clone())
}

/// Hex-encoded SHA-256 handle for one submission's stored objects.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn cv_path(&self) -> String {
        format!("cv/{}.pdf", self.0)
    }

    pub fn cert_folder(&self) -> String {
        format!("cert/{}", self.0)
    }

    pub fn cert_path(&self, file_name: &str) -> String {
        format!("{}/{}", self.cert_folder(), sanitize_file_name(file_name))
    }

    pub fn job_application_path(&self) -> String {
        format!("job-applications/{}.pdf", self.0)
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Millisecond-precision UTC timestamp with a `Z` suffix, e.g. `2025-03-01T09:30:00.000Z`.
pub fn iso_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn storage_key(email: &str, submitted_at: DateTime<Utc>) -> StorageKey {
    let material = format!(
        "{}|{}",
        email.trim().to_lowercase(),
        iso_timestamp(submitted_at)
    );
    let digest = Sha256::digest(material.as_bytes());
    StorageKey(hex::encode(digest))
}

/// Object names keep ASCII letters, digits, `.`, `-` and `_`; everything else
/// becomes `_`.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    let cleaned: String = cleaned.chars().take(120).collect();

    if cleaned.is_empty() {
        "dokument".to_string()
    } else {
        cleaned
    }
}
