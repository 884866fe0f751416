//! Login and session integration tests.

mod common;

use axum::http::StatusCode;
use common::TestHarness;
use serde_json::{json, Value};

// ============================================================================
// Mobile OTP login
// ============================================================================

#[tokio::test]
async fn mobile_login_starts_at_kyc_pending() {
    let harness = TestHarness::new();

    let sent = harness
        .server
        .post("/auth/send-otp")
        .json(&json!({ "mobile": "9876543210" }))
        .await;
    sent.assert_status_ok();
    let body: Value = sent.json();
    assert_eq!(body["message"], "OTP sent successfully");
    let otp = body["otp"].as_str().unwrap().to_string();
    assert_eq!(otp.len(), 6);

    let verified = harness
        .server
        .post("/auth/verify-otp")
        .json(&json!({ "mobile": "9876543210", "otp": otp }))
        .await;
    verified.assert_status_ok();
    let body: Value = verified.json();
    assert!(body["token"].as_str().is_some());
    assert!(body["refreshToken"].as_str().is_some());
    assert_eq!(body["onboardingStep"], "KYC_PENDING");
    assert_eq!(body["kycStatus"], "NOT_STARTED");
}

#[tokio::test]
async fn returning_user_keeps_their_position() {
    let harness = TestHarness::new();
    let first = harness.complete_profile("9876543210").await;
    drop(first);

    let sent = harness
        .server
        .post("/auth/send-otp")
        .json(&json!({ "mobile": "9876543210" }))
        .await;
    let otp = sent.json::<Value>()["otp"].as_str().unwrap().to_string();
    let body: Value = harness
        .server
        .post("/auth/verify-otp")
        .json(&json!({ "mobile": "9876543210", "otp": otp }))
        .await
        .json();

    assert_eq!(body["onboardingStep"], "PROFILE_COMPLETED");
    assert_eq!(body["kycStatus"], "PAN_VERIFIED");
}

#[tokio::test]
async fn invalid_mobile_is_rejected() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/auth/send-otp")
        .json(&json!({ "mobile": "98765" }))
        .await;

    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(
        body["error"]["message"],
        "Mobile number must be exactly 10 digits"
    );
}

#[tokio::test]
async fn sixth_send_inside_the_window_is_rate_limited() {
    let harness = TestHarness::new();

    for _ in 0..5 {
        harness
            .server
            .post("/auth/send-otp")
            .json(&json!({ "mobile": "9876543210" }))
            .await
            .assert_status_ok();
    }

    let response = harness
        .server
        .post("/auth/send-otp")
        .json(&json!({ "mobile": "9876543210" }))
        .await;
    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let body: Value = response.json();
    assert_eq!(
        body["error"]["message"],
        "Too many OTP requests. Please try again later."
    );

    // Other identities are unaffected
    harness
        .server
        .post("/auth/send-otp")
        .json(&json!({ "mobile": "9876543211" }))
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn an_otp_works_only_once() {
    let harness = TestHarness::new();

    let otp = harness
        .server
        .post("/auth/send-otp")
        .json(&json!({ "mobile": "9876543210" }))
        .await
        .json::<Value>()["otp"]
        .as_str()
        .unwrap()
        .to_string();

    harness
        .server
        .post("/auth/verify-otp")
        .json(&json!({ "mobile": "9876543210", "otp": otp }))
        .await
        .assert_status_ok();

    let replay = harness
        .server
        .post("/auth/verify-otp")
        .json(&json!({ "mobile": "9876543210", "otp": otp }))
        .await;
    replay.assert_status_bad_request();
    assert_eq!(
        replay.json::<Value>()["error"]["message"],
        "OTP expired or not found"
    );
}

#[tokio::test]
async fn wrong_code_is_invalid() {
    let harness = TestHarness::new();

    let otp = harness
        .server
        .post("/auth/send-otp")
        .json(&json!({ "mobile": "9876543210" }))
        .await
        .json::<Value>()["otp"]
        .as_str()
        .unwrap()
        .to_string();
    let wrong = if otp == "000000" { "111111" } else { "000000" };

    let response = harness
        .server
        .post("/auth/verify-otp")
        .json(&json!({ "mobile": "9876543210", "otp": wrong }))
        .await;
    response.assert_status_bad_request();
    assert_eq!(response.json::<Value>()["error"]["message"], "Invalid OTP");
}

// ============================================================================
// Sessions
// ============================================================================

#[tokio::test]
async fn refresh_rotates_the_token() {
    let harness = TestHarness::new();
    let session = harness.login("9876543210").await;

    let rotated = harness
        .server
        .post("/auth/refresh-token")
        .json(&json!({ "refreshToken": session.refresh_token }))
        .await;
    rotated.assert_status_ok();
    let body: Value = rotated.json();
    let next = body["refreshToken"].as_str().unwrap().to_string();
    assert_ne!(next, session.refresh_token);
    assert_eq!(body["onboardingStep"], "KYC_PENDING");

    // The superseded token no longer works
    harness
        .server
        .post("/auth/refresh-token")
        .json(&json!({ "refreshToken": session.refresh_token }))
        .await
        .assert_status_unauthorized();

    harness
        .server
        .post("/auth/refresh-token")
        .json(&json!({ "refreshToken": next }))
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn concurrent_refreshes_with_one_token_have_one_winner() {
    let harness = TestHarness::new();
    let session = harness.login("9876543210").await;
    let body = json!({ "refreshToken": session.refresh_token });

    let (first, second) = tokio::join!(
        async { harness.server.post("/auth/refresh-token").json(&body).await },
        async { harness.server.post("/auth/refresh-token").json(&body).await },
    );

    let mut statuses = [first.status_code(), second.status_code()];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::OK, StatusCode::UNAUTHORIZED]);
}

#[tokio::test]
async fn access_token_cannot_be_used_to_refresh() {
    let harness = TestHarness::new();
    let session = harness.login("9876543210").await;

    harness
        .server
        .post("/auth/refresh-token")
        .json(&json!({ "refreshToken": session.token }))
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn logout_invalidates_the_refresh_token() {
    let harness = TestHarness::new();
    let session = harness.login("9876543210").await;

    let response = harness
        .server
        .post("/auth/logout")
        .add_header("authorization", session.bearer())
        .await;
    response.assert_status_ok();
    assert_eq!(
        response.json::<Value>()["message"],
        "Logged out successfully"
    );

    harness
        .server
        .post("/auth/refresh-token")
        .json(&json!({ "refreshToken": session.refresh_token }))
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn protected_routes_require_a_bearer_token() {
    let harness = TestHarness::new();

    harness
        .server
        .get("/kyc/status")
        .await
        .assert_status_unauthorized();

    harness
        .server
        .get("/kyc/status")
        .add_header("authorization", "Bearer not-a-jwt")
        .await
        .assert_status_unauthorized();
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn health_check() {
    let harness = TestHarness::new();

    let response = harness.server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "nps-onboarding");
}
