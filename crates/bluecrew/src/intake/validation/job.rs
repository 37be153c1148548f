use chrono::{DateTime, Utc};

use super::{FieldReader, ValidationFailure};
use crate::intake::domain::{IdentityStamp, JobApplicationSubmission};
use crate::intake::files::{check_documents, FileRules};
use crate::intake::form::FormPayload;

/// Validate an application for a posted job.
///
/// A live session from the identity provider takes precedence over the
/// verification fields echoed back by the browser. Either way the applicant
/// must be verified.
pub fn validate_job_application(
    payload: &FormPayload,
    session: Option<IdentityStamp>,
) -> Result<JobApplicationSubmission, ValidationFailure> {
    let mut reader = FieldReader::new(payload);

    let job_id = reader.required_text("job_id", 1, "Mangler stillingsreferanse");
    let name = reader.required_text("name", 2, "Navn må ha minst 2 tegn");
    let email = reader.email("email");
    let phone = reader.optional_text("phone");
    let cover_letter = reader.optional_long_text("cover_letter");

    let identity = session.unwrap_or_else(|| identity_from_fields(payload));
    if !identity.verified {
        reader
            .issues
            .push("verified", "Du må verifisere deg med Vipps før du søker");
    }

    let documents = check_documents(payload, &FileRules::job_application(), &mut reader.issues);

    reader.finish(|| {
        Some(JobApplicationSubmission {
            job_id: job_id?,
            name: name?,
            email: email?,
            phone,
            cover_letter,
            identity,
            documents,
        })
    })
}

fn identity_from_fields(payload: &FormPayload) -> IdentityStamp {
    IdentityStamp {
        verified: payload
            .text("verified")
            .map(|value| value.eq_ignore_ascii_case("true"))
            .unwrap_or(false),
        subject: payload.text("verified_sub").map(str::to_string),
        verified_at: payload
            .text("verified_at")
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|at| at.with_timezone(&Utc)),
    }
}
