//! Profile, fund manager, document and consent integration tests.

mod common;

use axum::http::StatusCode;
use common::TestHarness;
use serde_json::{json, Value};

// ============================================================================
// Profile
// ============================================================================

#[tokio::test]
async fn profile_needs_completed_kyc() {
    let harness = TestHarness::new();
    let session = harness.login("9876543210").await;

    let response = harness
        .server
        .post("/user/profile/personal")
        .add_header("authorization", session.bearer())
        .json(&json!({ "fatherName": "Ramesh Kumar", "occupation": "Salaried" }))
        .await;
    response.assert_status_bad_request();
    assert_eq!(
        response.json::<Value>()["error"]["message"],
        "Complete KYC before submitting profile details"
    );
}

#[tokio::test]
async fn personal_details_after_pfm_selection_are_rejected() {
    let harness = TestHarness::new();
    let session = harness.select_pfm("9876543210").await;

    let response = harness
        .server
        .post("/user/profile/personal")
        .add_header("authorization", session.bearer())
        .json(&json!({ "fatherName": "Someone Else", "occupation": "Business" }))
        .await;
    response.assert_status_bad_request();
    assert_eq!(
        response.json::<Value>()["error"]["message"],
        "Profile already completed"
    );

    // Nothing changed
    let draft: Value = harness
        .server
        .get("/user/profile/draft")
        .add_header("authorization", session.bearer())
        .await
        .json();
    assert_eq!(draft["onboardingStep"], "PFM_SELECTED");
    assert_eq!(draft["draft"]["fatherName"], "Ramesh Kumar");
}

#[tokio::test]
async fn blank_mandatory_fields_are_rejected() {
    let harness = TestHarness::new();
    let session = harness.complete_profile("9876543210").await;

    harness
        .server
        .post("/user/profile/personal")
        .add_header("authorization", session.bearer())
        .json(&json!({ "fatherName": "  ", "occupation": "Salaried" }))
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn draft_is_empty_before_any_profile() {
    let harness = TestHarness::new();
    let session = harness.login("9876543210").await;

    let draft: Value = harness
        .server
        .get("/user/profile/draft")
        .add_header("authorization", session.bearer())
        .await
        .json();
    assert_eq!(draft["onboardingStep"], "KYC_PENDING");
    assert_eq!(draft["draft"], json!({}));
}

#[tokio::test]
async fn profile_steps_fill_the_draft() {
    let harness = TestHarness::new();
    let session = harness.complete_profile("9876543210").await;

    let draft: Value = harness
        .server
        .get("/user/profile/draft")
        .add_header("authorization", session.bearer())
        .await
        .json();
    assert_eq!(draft["onboardingStep"], "PROFILE_COMPLETED");
    assert_eq!(draft["draft"]["occupation"], "Salaried");
    assert_eq!(draft["draft"]["address"], "12 MG Road, Bengaluru");
    assert_eq!(draft["draft"]["nomineeName"], "Sita Kumar");
}

// ============================================================================
// Fund managers
// ============================================================================

#[tokio::test]
async fn catalogue_lists_seven_managers() {
    let harness = TestHarness::new();
    let session = harness.login("9876543210").await;

    for _ in 0..2 {
        let body: Value = harness
            .server
            .get("/pfm/list")
            .add_header("authorization", session.bearer())
            .await
            .json();
        assert_eq!(body["pfms"].as_array().unwrap().len(), 7);
        assert_eq!(body["pfms"][0]["id"], 1);
    }
}

#[tokio::test]
async fn compare_returns_the_requested_subset() {
    let harness = TestHarness::new();
    let session = harness.login("9876543210").await;

    let body: Value = harness
        .server
        .get("/pfm/compare")
        .add_query_param("ids", "1,3")
        .add_header("authorization", session.bearer())
        .await
        .json();
    let ids: Vec<i64> = body["comparison"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 3]);

    harness
        .server
        .get("/pfm/compare")
        .add_header("authorization", session.bearer())
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn allocation_is_stored_exactly_when_it_sums_to_100() {
    let harness = TestHarness::new();
    let session = harness.complete_profile("9876543210").await;

    let body = harness
        .post_ok(
            &session,
            "/pfm/select",
            json!({ "pfmId": 2, "allocationE": 50, "allocationC": 30, "allocationG": 20, "allocationA": 0 }),
        )
        .await;
    assert_eq!(body["message"], "PFM selected successfully");
    assert_eq!(
        body["allocation"],
        json!({ "allocationE": 50, "allocationC": 30, "allocationG": 20, "allocationA": 0 })
    );
}

#[tokio::test]
async fn allocation_is_normalised_to_100() {
    let harness = TestHarness::new();
    let session = harness.complete_profile("9876543210").await;

    let body = harness
        .post_ok(
            &session,
            "/pfm/select",
            json!({ "pfmId": 3, "allocationE": 1, "allocationC": 1, "allocationG": 1, "allocationA": 1 }),
        )
        .await;
    assert_eq!(
        body["allocation"],
        json!({ "allocationE": 25, "allocationC": 25, "allocationG": 25, "allocationA": 25 })
    );
}

#[tokio::test]
async fn unknown_fund_manager_is_404() {
    let harness = TestHarness::new();
    let session = harness.complete_profile("9876543210").await;

    harness
        .server
        .post("/pfm/select")
        .add_header("authorization", session.bearer())
        .json(&json!({ "pfmId": 99 }))
        .await
        .assert_status_not_found();
}

#[tokio::test]
async fn pfm_selection_needs_a_completed_profile() {
    let harness = TestHarness::new();
    let session = harness.login("9876543210").await;

    harness
        .server
        .post("/pfm/select")
        .add_header("authorization", session.bearer())
        .json(&json!({ "pfmId": 1 }))
        .await
        .assert_status_bad_request();
}

// ============================================================================
// Documents
// ============================================================================

#[tokio::test]
async fn upload_and_verify_a_document() {
    let harness = TestHarness::new();
    let session = harness.login("9876543210").await;

    let upload = harness
        .post_ok(
            &session,
            "/document/upload-url",
            json!({ "fileType": "pdf", "mimeType": "application/pdf" }),
        )
        .await;
    let key = upload["key"].as_str().unwrap().to_string();
    assert!(key.starts_with("documents/"));
    assert!(key.ends_with(".pdf"));
    assert!(upload["url"].as_str().unwrap().contains(&key));

    let pending: Value = harness
        .server
        .get("/document/status")
        .add_query_param("type", "address_proof")
        .add_header("authorization", session.bearer())
        .await
        .json();
    assert_eq!(pending["status"], "pending");

    let verified = harness
        .post_ok(
            &session,
            "/document/verify",
            json!({ "key": key, "type": "address_proof" }),
        )
        .await;
    assert_eq!(verified["status"], "verified");

    let status: Value = harness
        .server
        .get("/document/status")
        .add_query_param("type", "address_proof")
        .add_header("authorization", session.bearer())
        .await
        .json();
    assert_eq!(status["status"], "verified");
}

#[tokio::test]
async fn mime_type_must_match_the_file_type() {
    let harness = TestHarness::new();
    let session = harness.login("9876543210").await;

    let response = harness
        .server
        .post("/document/upload-url")
        .add_header("authorization", session.bearer())
        .json(&json!({ "fileType": "jpg", "mimeType": "application/pdf" }))
        .await;
    response.assert_status_bad_request();
    assert_eq!(
        response.json::<Value>()["error"]["message"],
        "Invalid MIME type"
    );
}

#[tokio::test]
async fn another_users_document_key_is_forbidden() {
    let harness = TestHarness::new();
    let owner = harness.login("9876543210").await;
    let intruder = harness.login("9123456789").await;

    let upload = harness
        .post_ok(
            &owner,
            "/document/upload-url",
            json!({ "fileType": "png", "mimeType": "image/png" }),
        )
        .await;

    harness
        .server
        .post("/document/verify")
        .add_header("authorization", intruder.bearer())
        .json(&json!({ "key": upload["key"], "type": "photo" }))
        .await
        .assert_status(StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_document_type_is_rejected() {
    let harness = TestHarness::new();
    let session = harness.login("9876543210").await;

    let response = harness
        .server
        .post("/document/verify")
        .add_header("authorization", session.bearer())
        .json(&json!({ "key": "documents/x/1.png", "type": "selfie" }))
        .await;
    response.assert_status_bad_request();
    assert_eq!(
        response.json::<Value>()["error"]["message"],
        "Invalid document data"
    );
}

// ============================================================================
// Consent
// ============================================================================

#[tokio::test]
async fn consents_are_kept_newest_first() {
    let harness = TestHarness::new();
    let session = harness.login("9876543210").await;

    for consent in ["TERMS_AND_CONDITIONS", "PRIVACY_POLICY"] {
        let response = harness
            .server
            .post("/consent/accept")
            .add_header("authorization", session.bearer())
            .add_header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
            .json(&json!({ "consentType": consent }))
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["message"], "Consent accepted");
    }

    let history: Value = harness
        .server
        .get("/consent/history")
        .add_header("authorization", session.bearer())
        .await
        .json();
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0]["consentType"], "PRIVACY_POLICY");
    assert_eq!(history[1]["consentType"], "TERMS_AND_CONDITIONS");
    assert_eq!(history[0]["ipAddress"], "203.0.113.7");
}

#[tokio::test]
async fn unknown_consent_type_is_rejected() {
    let harness = TestHarness::new();
    let session = harness.login("9876543210").await;

    let response = harness
        .server
        .post("/consent/accept")
        .add_header("authorization", session.bearer())
        .json(&json!({ "consentType": "MARKETING" }))
        .await;
    response.assert_status_bad_request();
    assert_eq!(
        response.json::<Value>()["error"]["message"],
        "Invalid consent type"
    );
}
