use std::collections::BTreeMap;

use super::{FieldReader, ValidationFailure};
use crate::intake::domain::{
    CandidateSubmission, IdentityStamp, PostalAddress, WorkSelection, YesNo,
};
use crate::intake::files::{check_documents, FileRules};
use crate::intake::form::FormPayload;

const WORK_OTHER_PREFIX: &str = "work_other:";

/// Validate a candidate registration. `rules` carries the entry point's
/// document requirements; `identity` comes from the verification gate.
pub fn validate_candidate(
    payload: &FormPayload,
    rules: &FileRules,
    identity: IdentityStamp,
) -> Result<CandidateSubmission, ValidationFailure> {
    let mut reader = FieldReader::new(payload);

    let name = reader.required_text("name", 2, "Navn må ha minst 2 tegn");
    let email = reader.email("email");
    let phone = reader.required_text("phone", 6, "Telefonnummer må ha minst 6 tegn");

    let address = PostalAddress {
        street: reader.optional_text("address"),
        postal_code: reader.optional_text("postal_code"),
        city: reader.optional_text("city"),
    };
    let region = reader.region("county", "municipality");

    let work_tags = reader.non_empty_list("work_main", "Velg minst ett arbeidsområde");
    let mut work_main = Vec::with_capacity(work_tags.len());
    for tag in &work_tags {
        match WorkSelection::parse(tag) {
            Some(selection) => work_main.push(selection),
            None => reader
                .issues
                .push("work_main", format!("Ukjent arbeidsområde: {tag}")),
        }
    }

    let work_other: BTreeMap<String, String> = reader
        .payload()
        .with_prefix(WORK_OTHER_PREFIX)
        .map(|(category, note)| (category.to_string(), note.to_string()))
        .collect();

    let available_from = reader.optional_date("available_from");
    let wants_temporary = reader.yes_no("wants_temporary", "Svar ja eller nei på vikariat");

    let stcw_has = reader.yes_no("stcw_has", "Svar ja eller nei på STCW-kurs");
    let stcw_modules = reader.payload().values("stcw_mod");
    if stcw_has == Some(YesNo::Ja) && stcw_modules.is_empty() {
        reader
            .issues
            .push("stcw_mod", "Velg minst én STCW-modul");
    }

    let deck_has = reader.yes_no("deck_has", "Svar ja eller nei på dekksoffisersertifikat");
    let deck_class = match reader.payload().text("deck_class") {
        Some(raw) => match raw.parse::<u8>() {
            Ok(class @ 1..=6) => Some(class),
            _ => {
                reader
                    .issues
                    .push("deck_class", "Sertifikatklasse må være mellom 1 og 6");
                None
            }
        },
        None => None,
    };

    let skills = reader.optional_long_text("skills");
    let other_comments = reader.optional_long_text("other_comments");

    let stcw_confirm = reader.must_be_checked(
        "stcw_confirm",
        "Du må bekrefte opplysningene om sikkerhetskurs",
    );
    let gdpr = reader.must_be_checked("gdpr", "Du må samtykke til behandling av personopplysninger");

    let documents = check_documents(payload, rules, &mut reader.issues);

    reader.finish(|| {
        Some(CandidateSubmission {
            name: name?,
            email: email?,
            phone: phone?,
            address,
            region,
            work_main,
            work_other,
            available_from,
            wants_temporary: wants_temporary?,
            stcw_has: stcw_has?,
            stcw_modules,
            deck_has: deck_has?,
            deck_class: if deck_has? == YesNo::Ja { deck_class } else { None },
            skills,
            other_comments,
            stcw_confirm,
            gdpr,
            identity,
            documents,
        })
    })
}
