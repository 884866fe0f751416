//! KYC integration tests.

mod common;

use common::{TestHarness, AADHAAR_LINKED_MOBILE, SANDBOX_AADHAAR};
use serde_json::{json, Value};

// ============================================================================
// Aadhaar OTP login
// ============================================================================

#[tokio::test]
async fn aadhaar_login_verifies_and_issues_tokens() {
    let harness = TestHarness::new();

    let initiated = harness
        .server
        .post("/kyc/aadhaar/initiate")
        .json(&json!({ "aadhaar": SANDBOX_AADHAAR }))
        .await;
    initiated.assert_status_ok();
    let body: Value = initiated.json();
    assert_eq!(body["maskedMobile"], "XXXXXX9012");
    let otp = body["otp"].as_str().unwrap().to_string();

    let verified = harness
        .server
        .post("/kyc/aadhaar/verify")
        .json(&json!({ "aadhaar": SANDBOX_AADHAAR, "otp": otp }))
        .await;
    verified.assert_status_ok();
    let body: Value = verified.json();
    assert!(body["token"].as_str().is_some());
    assert!(body["refreshToken"].as_str().is_some());
    assert_eq!(body["kycStatus"], "AADHAAR_VERIFIED");
    assert_eq!(body["onboardingStep"], "KYC_PENDING");

    // The account belongs to the Aadhaar-linked mobile
    let session = harness.login(AADHAAR_LINKED_MOBILE).await;
    let status: Value = harness
        .server
        .get("/kyc/status")
        .add_header("authorization", session.bearer())
        .await
        .json();
    assert_eq!(status["kycStatus"], "AADHAAR_VERIFIED");
}

#[tokio::test]
async fn verified_aadhaar_gets_no_second_code() {
    let harness = TestHarness::new();

    let otp = harness
        .server
        .post("/kyc/aadhaar/initiate")
        .json(&json!({ "aadhaar": SANDBOX_AADHAAR }))
        .await
        .json::<Value>()["otp"]
        .as_str()
        .unwrap()
        .to_string();
    harness
        .server
        .post("/kyc/aadhaar/verify")
        .json(&json!({ "aadhaar": SANDBOX_AADHAAR, "otp": otp }))
        .await
        .assert_status_ok();

    let again = harness
        .server
        .post("/kyc/aadhaar/initiate")
        .json(&json!({ "aadhaar": SANDBOX_AADHAAR }))
        .await;
    again.assert_status_bad_request();
    let body: Value = again.json();
    assert_eq!(body["error"]["message"], "Aadhaar already verified");
    assert!(body.get("otp").is_none());
}

#[tokio::test]
async fn aadhaar_verified_while_logged_in_blocks_the_public_initiate() {
    let harness = TestHarness::new();
    let session = harness.login(AADHAAR_LINKED_MOBILE).await;
    harness
        .post_ok(&session, "/kyc/aadhaar", json!({ "aadhaar": SANDBOX_AADHAAR }))
        .await;

    let response = harness
        .server
        .post("/kyc/aadhaar/initiate")
        .json(&json!({ "aadhaar": SANDBOX_AADHAAR }))
        .await;
    response.assert_status_bad_request();
    assert_eq!(
        response.json::<Value>()["error"]["message"],
        "Aadhaar already verified"
    );
}

#[tokio::test]
async fn existing_unverified_account_can_start_aadhaar_login() {
    let harness = TestHarness::new();
    harness.login(AADHAAR_LINKED_MOBILE).await;

    harness
        .server
        .post("/kyc/aadhaar/initiate")
        .json(&json!({ "aadhaar": SANDBOX_AADHAAR }))
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn malformed_aadhaar_is_rejected() {
    let harness = TestHarness::new();

    harness
        .server
        .post("/kyc/aadhaar/initiate")
        .json(&json!({ "aadhaar": "1234" }))
        .await
        .assert_status_bad_request();
}

// ============================================================================
// PAN
// ============================================================================

#[tokio::test]
async fn pan_requires_aadhaar_first() {
    let harness = TestHarness::new();
    let session = harness.login("9876543210").await;

    let response = harness
        .server
        .post("/kyc/pan")
        .add_header("authorization", session.bearer())
        .json(&json!({ "pan": "ABCDE1234F" }))
        .await;
    response.assert_status_bad_request();
    assert_eq!(
        response.json::<Value>()["error"]["message"],
        "Complete Aadhaar verification first"
    );
}

#[tokio::test]
async fn pan_completes_kyc_and_retries_succeed() {
    let harness = TestHarness::new();
    let session = harness.login("9876543210").await;
    harness
        .post_ok(&session, "/kyc/aadhaar", json!({ "aadhaar": SANDBOX_AADHAAR }))
        .await;

    let body = harness
        .post_ok(&session, "/kyc/pan", json!({ "pan": "abcde1234f" }))
        .await;
    assert_eq!(body["message"], "PAN verification completed");
    assert_eq!(body["kycStatus"], "PAN_VERIFIED");
    assert_eq!(body["onboardingStep"], "KYC_COMPLETED");

    let retry = harness
        .post_ok(&session, "/kyc/pan", json!({ "pan": "ZZZZZ9999Z" }))
        .await;
    assert_eq!(retry["kycStatus"], "PAN_VERIFIED");

    let details: Value = harness
        .server
        .get("/kyc/details")
        .add_header("authorization", session.bearer())
        .await
        .json();
    assert_eq!(details["kyc"]["panNumber"], "ABCDE1234F");
}

#[tokio::test]
async fn invalid_pan_format_is_rejected() {
    let harness = TestHarness::new();
    let session = harness.login("9876543210").await;

    let response = harness
        .server
        .post("/kyc/pan")
        .add_header("authorization", session.bearer())
        .json(&json!({ "pan": "12345ABCDE" }))
        .await;
    response.assert_status_bad_request();
    assert_eq!(
        response.json::<Value>()["error"]["message"],
        "Invalid PAN format"
    );
}

// ============================================================================
// Video KYC
// ============================================================================

#[tokio::test]
async fn video_kyc_approves_the_user() {
    let harness = TestHarness::new();
    let session = harness.login("9876543210").await;
    harness
        .post_ok(&session, "/kyc/aadhaar", json!({ "aadhaar": SANDBOX_AADHAAR }))
        .await;

    let started = harness.post_ok(&session, "/kyc/video/start", json!({})).await;
    assert_eq!(started["kycStatus"], "VIDEO_REQUIRED");
    let session_id = started["sessionId"].as_str().unwrap().to_string();

    let completed = harness
        .post_ok(
            &session,
            "/kyc/video/complete",
            json!({ "sessionId": session_id }),
        )
        .await;
    assert_eq!(completed["kycStatus"], "APPROVED");
    assert_eq!(completed["onboardingStep"], "KYC_COMPLETED");
}

#[tokio::test]
async fn video_completion_needs_the_users_own_session() {
    let harness = TestHarness::new();
    let session = harness.login("9876543210").await;
    harness
        .post_ok(&session, "/kyc/aadhaar", json!({ "aadhaar": SANDBOX_AADHAAR }))
        .await;
    harness.post_ok(&session, "/kyc/video/start", json!({})).await;

    harness
        .server
        .post("/kyc/video/complete")
        .add_header("authorization", session.bearer())
        .json(&json!({ "sessionId": uuid_like() }))
        .await
        .assert_status_not_found();

    harness
        .server
        .post("/kyc/video/complete")
        .add_header("authorization", session.bearer())
        .json(&json!({ "sessionId": "not-a-uuid" }))
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn kyc_details_are_404_before_any_kyc() {
    let harness = TestHarness::new();
    let session = harness.login("9876543210").await;

    harness
        .server
        .get("/kyc/details")
        .add_header("authorization", session.bearer())
        .await
        .assert_status_not_found();
}

fn uuid_like() -> String {
    "6f1c2b8e-4d3a-4f5e-9a7b-1c2d3e4f5a6b".to_string()
}
