//! Flat rows written to the store, one per accepted submission.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use super::domain::{
    CandidateSubmission, ClientLeadSubmission, IdentityStamp, JobApplicationSubmission,
    RegionSelection, SubmissionKind,
};
use super::files::iso_timestamp;
use super::repository::Row;

/// Object paths that were actually written for a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredPaths {
    pub cv: Option<String>,
    pub certs: Option<String>,
}

/// Request metadata stamped onto every row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowMeta<'a> {
    pub submitted_at: DateTime<Utc>,
    pub source_ip: &'a str,
    pub entry_point: &'static str,
}

fn put(row: &mut Row, column: &str, value: Value) {
    row.insert(column.to_string(), value);
}

fn put_region(row: &mut Row, region: &Option<RegionSelection>) {
    put(row, "county", json!(region.as_ref().map(|r| r.county.as_str())));
    put(
        row,
        "municipality",
        json!(region.as_ref().map(|r| r.municipality.as_str())),
    );
}

fn put_identity(row: &mut Row, identity: &IdentityStamp) {
    put(row, "identity_verified", json!(identity.verified));
    put(row, "identity_subject", json!(identity.subject));
    put(
        row,
        "identity_verified_at",
        json!(identity.verified_at.map(iso_timestamp)),
    );
}

fn put_meta(row: &mut Row, meta: &RowMeta<'_>) {
    put(row, "submitted_at", json!(iso_timestamp(meta.submitted_at)));
    put(row, "source_ip", json!(meta.source_ip));
    put(row, "entry_point", json!(meta.entry_point));
}

pub fn candidate_row(
    candidate: &CandidateSubmission,
    paths: &StoredPaths,
    meta: &RowMeta<'_>,
) -> Row {
    let mut row = Row::new();
    put(&mut row, "name", json!(candidate.name));
    put(&mut row, "email", json!(candidate.email));
    put(&mut row, "phone", json!(candidate.phone));
    put(&mut row, "address", json!(candidate.address.street));
    put(&mut row, "postal_code", json!(candidate.address.postal_code));
    put(&mut row, "city", json!(candidate.address.city));
    put_region(&mut row, &candidate.region);
    put(
        &mut row,
        "work_main",
        json!(candidate
            .work_main
            .iter()
            .map(|selection| selection.tag())
            .collect::<Vec<_>>()),
    );
    put(&mut row, "work_other", json!(candidate.work_other));
    put(
        &mut row,
        "available_from",
        json!(candidate
            .available_from
            .map(|date| date.format("%Y-%m-%d").to_string())),
    );
    put(&mut row, "wants_temporary", json!(candidate.wants_temporary.label()));
    put(&mut row, "stcw_has", json!(candidate.stcw_has.label()));
    put(&mut row, "stcw_mod", json!(candidate.stcw_modules));
    put(&mut row, "deck_has", json!(candidate.deck_has.label()));
    put(&mut row, "deck_class", json!(candidate.deck_class));
    put(&mut row, "skills", json!(candidate.skills));
    put(&mut row, "other_comments", json!(candidate.other_comments));
    put(&mut row, "stcw_confirm", json!(candidate.stcw_confirm));
    put(&mut row, "gdpr", json!(candidate.gdpr));
    put(&mut row, "cv_key", json!(paths.cv));
    put(&mut row, "certs_key", json!(paths.certs));
    put_identity(&mut row, &candidate.identity);
    put_meta(&mut row, meta);
    row
}

pub fn client_lead_row(lead: &ClientLeadSubmission, meta: &RowMeta<'_>) -> Row {
    let mut row = Row::new();
    put(&mut row, "company", json!(lead.company));
    put(&mut row, "contact_person", json!(lead.contact_person));
    put(&mut row, "email", json!(lead.email));
    put(&mut row, "phone", json!(lead.phone));
    put_region(&mut row, &lead.region);
    put(&mut row, "need_category", json!(lead.need_category));
    put(&mut row, "need_type", json!(lead.need_type));
    put(&mut row, "description", json!(lead.description));
    put(&mut row, "gdpr", json!(lead.gdpr));
    put_meta(&mut row, meta);
    row
}

pub fn job_application_row(
    application: &JobApplicationSubmission,
    paths: &StoredPaths,
    meta: &RowMeta<'_>,
) -> Row {
    let mut row = Row::new();
    put(&mut row, "job_id", json!(application.job_id));
    put(&mut row, "name", json!(application.name));
    put(&mut row, "email", json!(application.email));
    put(&mut row, "phone", json!(application.phone));
    put(&mut row, "cover_letter", json!(application.cover_letter));
    put(&mut row, "cv_key", json!(paths.cv));
    put_identity(&mut row, &application.identity);
    put_meta(&mut row, meta);
    row
}

/// Body sent to the replication target: the row plus its kind.
pub fn replication_payload(kind: SubmissionKind, row: &Row) -> Value {
    json!({
        "type": kind.label(),
        "source": "bluecrew-web",
        "submission": row,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn client_lead_row_keeps_region_pair_and_nulls() {
        let lead = ClientLeadSubmission {
            company: "Nordhav Sjømat AS".to_string(),
            contact_person: "Ola Nordmann".to_string(),
            email: "ola@nordhav.no".to_string(),
            phone: "90000000".to_string(),
            region: Some(RegionSelection {
                county: "Nordland".to_string(),
                municipality: "Bodø".to_string(),
            }),
            need_category: "Havbruk".to_string(),
            need_type: "Vikar".to_string(),
            description: None,
            gdpr: true,
        };
        let meta = RowMeta {
            submitted_at: Utc
                .with_ymd_and_hms(2025, 3, 1, 9, 30, 0)
                .single()
                .expect("timestamp"),
            source_ip: "203.0.113.7",
            entry_point: "form",
        };

        let row = client_lead_row(&lead, &meta);
        assert_eq!(row["county"], json!("Nordland"));
        assert_eq!(row["municipality"], json!("Bodø"));
        assert_eq!(row["description"], Value::Null);
        assert_eq!(row["submitted_at"], json!("2025-03-01T09:30:00.000Z"));

        let payload = replication_payload(SubmissionKind::ClientLead, &row);
        assert_eq!(payload["type"], json!("client_lead"));
        assert_eq!(payload["submission"]["company"], json!("Nordhav Sjømat AS"));
    }
}
