use super::{FieldReader, ValidationFailure};
use crate::intake::domain::ClientLeadSubmission;
use crate::intake::form::FormPayload;

pub fn validate_client_lead(payload: &FormPayload) -> Result<ClientLeadSubmission, ValidationFailure> {
    let mut reader = FieldReader::new(payload);

    let company = reader.required_text("company", 2, "Firmanavn må ha minst 2 tegn");
    let contact_person =
        reader.required_text("contact_person", 2, "Kontaktperson må ha minst 2 tegn");
    let email = reader.email("email");
    let phone = reader.required_text("phone", 6, "Telefonnummer må ha minst 6 tegn");
    let region = reader.region("county", "municipality");
    let need_category = reader.required_text("need_category", 1, "Velg hva dere trenger");
    let need_type = reader.required_text("need_type", 1, "Velg type oppdrag");
    let description = reader.optional_long_text("description");
    let gdpr = reader.must_be_checked("gdpr", "Du må samtykke til behandling av personopplysninger");

    reader.finish(|| {
        Some(ClientLeadSubmission {
            company: company?,
            contact_person: contact_person?,
            email: email?,
            phone: phone?,
            region,
            need_category: need_category?,
            need_type: need_type?,
            description,
            gdpr,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lead() -> FormPayload {
        FormPayload::new()
            .with_field("company", "Nordhav Sjømat AS")
            .with_field("contact_person", "Ola Nordmann")
            .with_field("email", "ola@nordhav.no")
            .with_field("phone", "+47 900 00 000")
            .with_field("need_category", "Havbruk")
            .with_field("need_type", "Vikar")
            .with_field("gdpr", "on")
    }

    #[test]
    fn accepts_complete_lead() {
        let lead = validate_client_lead(&lead()).expect("valid lead");
        assert_eq!(lead.company, "Nordhav Sjømat AS");
        assert!(lead.region.is_none());
        assert!(lead.gdpr);
    }

    #[test]
    fn consent_and_region_pair_are_enforced() {
        let mut payload = FormPayload::new();
        for (key, value) in [
            ("company", "Nordhav Sjømat AS"),
            ("contact_person", "Ola Nordmann"),
            ("email", "ola@nordhav.no"),
            ("phone", "90000000"),
            ("need_category", "Havbruk"),
            ("need_type", "Vikar"),
            ("county", "Troms"),
        ] {
            payload.push_field(key, value);
        }

        let failure = validate_client_lead(&payload).expect_err("invalid lead");
        assert!(failure.has_issue_for("gdpr"));
        assert!(failure.has_issue_for("municipality"));
        assert_eq!(failure.issues.len(), 2);
    }
}
