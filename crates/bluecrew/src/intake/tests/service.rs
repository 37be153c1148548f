use axum::http::HeaderMap;
use serde_json::{json, Value};

use super::common::*;
use crate::intake::domain::SubmissionKind;
use crate::intake::files::storage_key;
use crate::intake::service::{EffectStatus, EntryPoint, IntakeError, IntakeOutcome};

fn receipt(outcome: IntakeOutcome) -> crate::intake::service::SubmissionReceipt {
    match outcome {
        IntakeOutcome::Accepted(receipt) => receipt,
        IntakeOutcome::Spam => panic!("expected an accepted submission"),
    }
}

#[tokio::test]
async fn candidate_registration_fans_out_to_every_sink() {
    let harness = Harness::new();

    let outcome = harness
        .service
        .submit_candidate(
            EntryPoint::Form,
            candidate_payload(),
            &HeaderMap::new(),
            "203.0.113.7",
        )
        .await
        .expect("accepted");
    let receipt = receipt(outcome);

    assert_eq!(receipt.kind, SubmissionKind::Candidate);
    assert_eq!(receipt.effects.uploads, EffectStatus::Done);
    assert_eq!(receipt.effects.persisted, EffectStatus::Done);
    assert_eq!(receipt.effects.notified, EffectStatus::Done);
    assert_eq!(receipt.effects.replicated, EffectStatus::Done);
    assert_eq!(
        receipt.reference,
        storage_key("kari@example.no", receipt.submitted_at).as_str()
    );

    let rows = harness.store.rows("candidates");
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row["work_main"], json!(["Havbruk:Operativt"]));
    assert_eq!(row["cv_key"], json!(format!("cv/{}.pdf", receipt.reference)));
    assert_eq!(row["certs_key"], Value::Null);
    assert_eq!(row["identity_verified"], json!(true));
    assert_eq!(row["identity_subject"], json!("vipps-sub-1"));
    assert_eq!(row["source_ip"], json!("203.0.113.7"));
    assert_eq!(row["entry_point"], json!("form"));

    let cv_path = format!("cv/{}.pdf", receipt.reference);
    assert_eq!(harness.objects.paths(), vec![cv_path.clone()]);
    assert_eq!(
        harness.objects.content_type(&cv_path).as_deref(),
        Some("application/pdf")
    );

    let sent = harness.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Ny kandidat: Kari Nordmann");
    assert_eq!(sent[0].reply_to.as_deref(), Some("kari@example.no"));
    assert_eq!(sent[0].attachments.len(), 1);
    assert!(sent[0].text.contains("Bluecrew AS"));
    assert!(sent[0].text.contains("https://bluecrew.no/personvern"));

    let replicated = harness.replicator.payloads.lock().expect("mutex").clone();
    assert_eq!(replicated.len(), 1);
    assert_eq!(replicated[0].0, SubmissionKind::Candidate);
    assert_eq!(replicated[0].1["type"], json!("candidate"));
    assert_eq!(replicated[0].1["submission"]["email"], json!("kari@example.no"));

    assert!(harness.reporter.operations().is_empty());
}

#[tokio::test]
async fn honeypot_is_accepted_without_side_effects() {
    let harness = Harness::new();
    let payload = candidate_payload().with_field("honey", "http://spam.example");

    let outcome = harness
        .service
        .submit_candidate(EntryPoint::Form, payload, &HeaderMap::new(), "203.0.113.7")
        .await
        .expect("spam is not an error");

    assert_eq!(outcome, IntakeOutcome::Spam);
    assert_eq!(harness.store.total(), 0);
    assert!(harness.objects.paths().is_empty());
    assert!(harness.mailer.sent().is_empty());
    assert!(harness.replicator.payloads.lock().expect("mutex").is_empty());
}

#[tokio::test]
async fn validation_failure_collects_issues_and_writes_nothing() {
    let harness = Harness::new();
    let fields: Vec<_> = candidate_fields()
        .into_iter()
        .filter(|(key, _)| *key != "work_main" && *key != "gdpr")
        .collect();

    let error = harness
        .service
        .submit_candidate(
            EntryPoint::Form,
            payload_from(&fields),
            &HeaderMap::new(),
            "203.0.113.7",
        )
        .await
        .expect_err("invalid");

    let IntakeError::Validation(failure) = error else {
        panic!("expected validation failure, got {error:?}");
    };
    assert!(failure.has_issue_for("work_main"));
    assert!(failure.has_issue_for("gdpr"));
    assert_eq!(harness.store.total(), 0);
    assert!(harness.mailer.sent().is_empty());
}

#[tokio::test]
async fn email_failure_is_reported_but_row_is_kept() {
    let harness = Harness::build(HarnessConfig {
        mailer: RecordingMailer::failing(),
        ..HarnessConfig::default()
    });

    let receipt = receipt(
        harness
            .service
            .submit_candidate(
                EntryPoint::Form,
                candidate_payload(),
                &HeaderMap::new(),
                "203.0.113.7",
            )
            .await
            .expect("still accepted"),
    );

    assert_eq!(receipt.effects.notified, EffectStatus::Failed);
    assert_eq!(receipt.effects.persisted, EffectStatus::Done);
    assert_eq!(harness.store.rows("candidates").len(), 1);
    assert_eq!(harness.reporter.operations(), vec!["notify"]);
}

#[tokio::test]
async fn failed_upload_leaves_key_column_null() {
    let harness = Harness::build(HarnessConfig {
        objects: MemoryObjects::failing(),
        ..HarnessConfig::default()
    });

    let receipt = receipt(
        harness
            .service
            .submit_candidate(
                EntryPoint::Form,
                candidate_payload(),
                &HeaderMap::new(),
                "203.0.113.7",
            )
            .await
            .expect("still accepted"),
    );

    assert_eq!(receipt.effects.uploads, EffectStatus::Failed);
    let rows = harness.store.rows("candidates");
    assert_eq!(rows[0]["cv_key"], Value::Null);
    assert_eq!(harness.reporter.operations(), vec!["upload"]);
}

#[tokio::test]
async fn store_outage_does_not_fail_the_submission() {
    let harness = Harness::build(HarnessConfig {
        store: MemoryStore::failing(),
        ..HarnessConfig::default()
    });

    let receipt = receipt(
        harness
            .service
            .submit_client_lead(payload_from(&client_fields()), "198.51.100.4")
            .await
            .expect("still accepted"),
    );

    assert_eq!(receipt.effects.persisted, EffectStatus::Failed);
    assert_eq!(receipt.effects.notified, EffectStatus::Done);
    assert_eq!(receipt.effects.uploads, EffectStatus::Skipped);
    assert_eq!(harness.reporter.operations(), vec!["persist"]);
}

#[tokio::test]
async fn missing_session_requires_login_when_verification_is_mandatory() {
    let harness = Harness::build(HarnessConfig {
        session: None,
        ..HarnessConfig::default()
    });

    let error = harness
        .service
        .submit_candidate(
            EntryPoint::Form,
            candidate_payload(),
            &HeaderMap::new(),
            "203.0.113.7",
        )
        .await
        .expect_err("login required");

    let IntakeError::IdentityRequired { login_url } = error else {
        panic!("expected identity redirect, got {error:?}");
    };
    assert!(login_url.starts_with(LOGIN_PATH));
    assert!(login_url.contains("returnTo=%2Fjobbsoker%2Fregistrer"));
    assert_eq!(harness.store.total(), 0);
}

#[tokio::test]
async fn soft_mode_accepts_unverified_candidates() {
    let harness = Harness::build(HarnessConfig {
        session: None,
        verification_optional: true,
        ..HarnessConfig::default()
    });

    harness
        .service
        .submit_candidate(
            EntryPoint::Form,
            candidate_payload(),
            &HeaderMap::new(),
            "203.0.113.7",
        )
        .await
        .expect("accepted");

    let rows = harness.store.rows("candidates");
    assert_eq!(rows[0]["identity_verified"], json!(false));
    assert_eq!(rows[0]["identity_subject"], Value::Null);
}

#[tokio::test]
async fn self_service_registration_requires_certificates() {
    let harness = Harness::new();

    let error = harness
        .service
        .submit_candidate(
            EntryPoint::SelfService,
            candidate_payload(),
            &HeaderMap::new(),
            "203.0.113.7",
        )
        .await
        .expect_err("certs missing");
    let IntakeError::Validation(failure) = error else {
        panic!("expected validation failure, got {error:?}");
    };
    assert!(failure.has_issue_for("certs"));

    let payload = candidate_payload().with_file(pdf("certs", "Sertifikater 2024.pdf"));
    let receipt = receipt(
        harness
            .service
            .submit_candidate(
                EntryPoint::SelfService,
                payload,
                &HeaderMap::new(),
                "203.0.113.7",
            )
            .await
            .expect("accepted"),
    );
    let rows = harness.store.rows("candidates");
    assert_eq!(
        rows[0]["certs_key"],
        json!(format!("cert/{}/Sertifikater_2024.pdf", receipt.reference))
    );
    assert_eq!(rows[0]["entry_point"], json!("self_service"));
}

#[tokio::test]
async fn job_application_uses_session_identity_and_its_own_folder() {
    let harness = Harness::new();
    let payload = payload_from(&job_fields()).with_file(pdf("cv", "kari-cv.pdf"));

    let receipt = receipt(
        harness
            .service
            .submit_job_application(payload, &HeaderMap::new(), "203.0.113.7")
            .await
            .expect("accepted"),
    );

    assert_eq!(receipt.kind, SubmissionKind::JobApplication);
    let rows = harness.store.rows("job_applications");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["job_id"], json!("job-42"));
    assert_eq!(
        rows[0]["cv_key"],
        json!(format!("job-applications/{}.pdf", receipt.reference))
    );
    assert_eq!(rows[0]["identity_subject"], json!("vipps-sub-1"));
}

#[tokio::test]
async fn job_application_without_verification_is_rejected() {
    let harness = Harness::build(HarnessConfig {
        session: None,
        ..HarnessConfig::default()
    });

    let error = harness
        .service
        .submit_job_application(payload_from(&job_fields()), &HeaderMap::new(), "203.0.113.7")
        .await
        .expect_err("unverified");

    let IntakeError::Validation(failure) = error else {
        panic!("expected validation failure, got {error:?}");
    };
    assert!(failure.has_issue_for("verified"));
    assert_eq!(harness.store.total(), 0);
}

#[tokio::test]
async fn client_lead_is_stored_and_mailed() {
    let harness = Harness::new();

    harness
        .service
        .submit_client_lead(payload_from(&client_fields()), "198.51.100.4")
        .await
        .expect("accepted");

    let rows = harness.store.rows("client_leads");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["company"], json!("Nordhav Sjømat AS"));
    assert_eq!(rows[0]["county"], json!("Nordland"));
    assert_eq!(rows[0]["municipality"], json!("Bodø"));
    assert_eq!(harness.mailer.sent().len(), 1);
    assert!(harness.objects.paths().is_empty());
}
