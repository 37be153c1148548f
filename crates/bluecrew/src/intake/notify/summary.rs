use chrono::{DateTime, Utc};

use super::{Attachment, OutgoingEmail};
use crate::intake::domain::{
    CandidateSubmission, ClientLeadSubmission, DocumentSet, IdentityStamp, JobApplicationSubmission,
    RegionSelection, YesNo,
};
use crate::intake::files::{iso_timestamp, StorageKey};

/// Ordered label/value pairs rendered into both the text and HTML bodies.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SummaryLines {
    lines: Vec<(String, String)>,
}

impl SummaryLines {
    pub fn push(&mut self, label: &str, value: impl Into<String>) {
        self.lines.push((label.to_string(), value.into()));
    }

    pub fn push_opt(&mut self, label: &str, value: Option<&str>) {
        self.push(label, value.unwrap_or("-"));
    }

    pub fn text(&self, heading: &str) -> String {
        let mut out = format!("{heading}\n\n");
        for (label, value) in &self.lines {
            out.push_str(&format!("{label}: {value}\n"));
        }
        out
    }

    pub fn html(&self, heading: &str) -> String {
        let mut out = format!("<h2>{}</h2><table>", escape_html(heading));
        for (label, value) in &self.lines {
            out.push_str(&format!(
                "<tr><th align=\"left\" style=\"padding-right:12px\">{}</th><td>{}</td></tr>",
                escape_html(label),
                escape_html(value).replace('\n', "<br>")
            ));
        }
        out.push_str("</table>");
        out
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    fn into_email(self, subject: String, heading: &str, reply_to: &str, documents: &DocumentSet) -> OutgoingEmail {
        OutgoingEmail {
            text: self.text(heading),
            html: Some(self.html(heading)),
            subject,
            reply_to: Some(reply_to.to_string()),
            attachments: attachments(documents),
        }
    }
}

pub(super) fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn region_label(region: &Option<RegionSelection>) -> String {
    match region {
        Some(region) => format!("{}, {}", region.municipality, region.county),
        None => "-".to_string(),
    }
}

fn identity_label(identity: &IdentityStamp) -> String {
    match (identity.verified, identity.verified_at) {
        (true, Some(at)) => format!("Verifisert med Vipps {}", iso_timestamp(at)),
        (true, None) => "Verifisert med Vipps".to_string(),
        (false, _) => "Ikke verifisert".to_string(),
    }
}

fn yes_no(value: YesNo) -> &'static str {
    match value {
        YesNo::Ja => "Ja",
        YesNo::Nei => "Nei",
    }
}

fn attachments(documents: &DocumentSet) -> Vec<Attachment> {
    documents
        .iter()
        .map(|file| Attachment {
            file_name: file.file_name.clone(),
            content_type: file
                .content_type
                .clone()
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| {
                    mime_guess::from_path(&file.file_name)
                        .first_or_octet_stream()
                        .essence_str()
                        .to_string()
                }),
            content: file.bytes.clone(),
        })
        .collect()
}

pub fn candidate_email(
    candidate: &CandidateSubmission,
    key: &StorageKey,
    submitted_at: DateTime<Utc>,
) -> OutgoingEmail {
    let mut lines = SummaryLines::default();
    lines.push("Navn", candidate.name.as_str());
    lines.push("E-post", candidate.email.as_str());
    lines.push("Telefon", candidate.phone.as_str());
    if !candidate.address.is_empty() {
        let address = [
            candidate.address.street.as_deref(),
            candidate.address.postal_code.as_deref(),
            candidate.address.city.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
        lines.push("Adresse", address);
    }
    lines.push("Område", region_label(&candidate.region));
    lines.push(
        "Ønsket arbeid",
        candidate
            .work_main
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", "),
    );
    for (category, note) in &candidate.work_other {
        lines.push(&format!("Annet ({category})"), note.as_str());
    }
    lines.push(
        "Tilgjengelig fra",
        candidate
            .available_from
            .map(|date| date.format("%d.%m.%Y").to_string())
            .unwrap_or_else(|| "-".to_string()),
    );
    lines.push("Ønsker vikariat", yes_no(candidate.wants_temporary));
    lines.push("STCW", yes_no(candidate.stcw_has));
    if !candidate.stcw_modules.is_empty() {
        lines.push("STCW-moduler", candidate.stcw_modules.join(", "));
    }
    lines.push("Dekksoffisersertifikat", yes_no(candidate.deck_has));
    if let Some(class) = candidate.deck_class {
        lines.push("Klasse", format!("D{class}"));
    }
    lines.push_opt("Kompetanse", candidate.skills.as_deref());
    lines.push_opt("Kommentarer", candidate.other_comments.as_deref());
    lines.push("Identitet", identity_label(&candidate.identity));
    lines.push("Mottatt", iso_timestamp(submitted_at));
    lines.push("Dokumentnøkkel", key.as_str());

    lines.into_email(
        format!("Ny kandidat: {}", candidate.name),
        "Ny kandidatregistrering",
        &candidate.email,
        &candidate.documents,
    )
}

pub fn client_lead_email(lead: &ClientLeadSubmission, submitted_at: DateTime<Utc>) -> OutgoingEmail {
    let mut lines = SummaryLines::default();
    lines.push("Firma", lead.company.as_str());
    lines.push("Kontaktperson", lead.contact_person.as_str());
    lines.push("E-post", lead.email.as_str());
    lines.push("Telefon", lead.phone.as_str());
    lines.push("Område", region_label(&lead.region));
    lines.push("Behov", lead.need_category.as_str());
    lines.push("Type", lead.need_type.as_str());
    lines.push_opt("Beskrivelse", lead.description.as_deref());
    lines.push("Mottatt", iso_timestamp(submitted_at));

    lines.into_email(
        format!("Ny kundeforespørsel: {}", lead.company),
        "Ny forespørsel fra kunde",
        &lead.email,
        &DocumentSet::default(),
    )
}

pub fn job_application_email(
    application: &JobApplicationSubmission,
    key: &StorageKey,
    submitted_at: DateTime<Utc>,
) -> OutgoingEmail {
    let mut lines = SummaryLines::default();
    lines.push("Stilling", application.job_id.as_str());
    lines.push("Navn", application.name.as_str());
    lines.push("E-post", application.email.as_str());
    lines.push_opt("Telefon", application.phone.as_deref());
    lines.push_opt("Søknadstekst", application.cover_letter.as_deref());
    lines.push("Identitet", identity_label(&application.identity));
    lines.push("Mottatt", iso_timestamp(submitted_at));
    lines.push("Dokumentnøkkel", key.as_str());

    lines.into_email(
        format!("Ny søknad på {}: {}", application.job_id, application.name),
        "Ny stillingssøknad",
        &application.email,
        &application.documents,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::domain::{UploadedFile, WorkSelection};
    use crate::intake::files::storage_key;
    use axum::body::Bytes;
    use chrono::TimeZone;

    fn submitted_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0)
            .single()
            .expect("timestamp")
    }

    #[test]
    fn html_escapes_user_input() {
        let mut lines = SummaryLines::default();
        lines.push("Kommentarer", "<script>alert('x')</script>\nLinje 2");
        let html = lines.html("Test & co");
        assert!(html.contains("<h2>Test &amp; co</h2>"));
        assert!(html.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;<br>Linje 2"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn candidate_email_attaches_documents_and_replies_to_submitter() {
        let candidate = CandidateSubmission {
            name: "Kari Nordmann".to_string(),
            email: "kari@example.no".to_string(),
            phone: "91234567".to_string(),
            address: Default::default(),
            region: None,
            work_main: vec![WorkSelection::parse("Havbruk:Operativt").expect("tag")],
            work_other: Default::default(),
            available_from: None,
            wants_temporary: YesNo::Ja,
            stcw_has: YesNo::Nei,
            stcw_modules: Vec::new(),
            deck_has: YesNo::Nei,
            deck_class: None,
            skills: None,
            other_comments: None,
            stcw_confirm: true,
            gdpr: true,
            identity: IdentityStamp::unverified(),
            documents: DocumentSet {
                cv: Some(UploadedFile {
                    field: "cv".to_string(),
                    file_name: "kari.pdf".to_string(),
                    content_type: None,
                    bytes: Bytes::from_static(b"%PDF"),
                }),
                certs: None,
            },
        };
        let key = storage_key(&candidate.email, submitted_at());

        let email = candidate_email(&candidate, &key, submitted_at());
        assert_eq!(email.subject, "Ny kandidat: Kari Nordmann");
        assert_eq!(email.reply_to.as_deref(), Some("kari@example.no"));
        assert!(email.text.contains("Ønsket arbeid: Havbruk: Operativt"));
        assert!(email.text.contains(key.as_str()));
        assert_eq!(email.attachments.len(), 1);
        assert_eq!(email.attachments[0].content_type, "application/pdf");
    }
}
