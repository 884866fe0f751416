//! Admin dashboard integration tests.

mod common;

use axum::http::StatusCode;
use common::{TestHarness, SANDBOX_AADHAAR};
use serde_json::{json, Value};

const ADMIN_MOBILE: &str = "9000000001";

#[tokio::test]
async fn regular_users_are_forbidden() {
    let harness = TestHarness::new();
    let session = harness.login("9876543210").await;

    for path in ["/admin/analytics", "/admin/kyc-report", "/admin/dropoffs"] {
        harness
            .server
            .get(path)
            .add_header("authorization", session.bearer())
            .await
            .assert_status(StatusCode::FORBIDDEN);
    }
}

#[tokio::test]
async fn anonymous_callers_are_unauthorized() {
    let harness = TestHarness::new();

    harness
        .server
        .get("/admin/analytics")
        .await
        .assert_status_unauthorized();
}

#[tokio::test]
async fn analytics_reports_rates_in_percent() {
    let harness = TestHarness::new();
    let admin = harness.login_admin(ADMIN_MOBILE).await;

    // One user paid, one only through KYC
    let paid = harness.select_pfm("9876543210").await;
    let order_id = harness.initiate_payment(&paid).await;
    harness
        .server
        .post("/payment/webhook")
        .json(&json!({ "orderId": order_id, "status": "success" }))
        .await
        .assert_status_ok();

    let kyc_only = harness.login("9123456789").await;
    harness
        .post_ok(&kyc_only, "/kyc/aadhaar", json!({ "aadhaar": SANDBOX_AADHAAR }))
        .await;
    harness
        .post_ok(&kyc_only, "/kyc/pan", json!({ "pan": "PQRST6789K" }))
        .await;

    let response = harness
        .server
        .get("/admin/analytics")
        .add_header("authorization", admin.bearer())
        .await;
    response.assert_status_ok();
    let body: Value = response.json();

    // The admin account counts as a user too
    assert_eq!(body["totalUsers"], 3);
    let kyc_rate = body["kycApprovalRate"].as_f64().unwrap();
    let payment_rate = body["paymentCompletionRate"].as_f64().unwrap();
    assert!((kyc_rate - 200.0 / 3.0).abs() < 1e-9);
    assert!((payment_rate - 100.0 / 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn dropoffs_count_users_per_step() {
    let harness = TestHarness::new();
    let admin = harness.login_admin(ADMIN_MOBILE).await;
    harness.complete_profile("9876543210").await;
    harness.login("9123456789").await;

    let body: Value = harness
        .server
        .get("/admin/dropoffs")
        .add_header("authorization", admin.bearer())
        .await
        .json();

    assert_eq!(
        body["steps"],
        json!([
            { "onboardingStep": "KYC_PENDING", "count": 2 },
            { "onboardingStep": "PROFILE_COMPLETED", "count": 1 }
        ])
    );
}

#[tokio::test]
async fn kyc_report_pages_and_caps_the_limit() {
    let harness = TestHarness::new();
    let admin = harness.login_admin(ADMIN_MOBILE).await;
    for mobile in ["9876543210", "9123456789"] {
        let session = harness.login(mobile).await;
        harness
            .post_ok(&session, "/kyc/aadhaar", json!({ "aadhaar": SANDBOX_AADHAAR }))
            .await;
    }

    let body: Value = harness
        .server
        .get("/admin/kyc-report")
        .add_query_param("page", 1)
        .add_query_param("limit", 1000)
        .add_header("authorization", admin.bearer())
        .await
        .json();
    assert_eq!(body["page"], 1);
    assert_eq!(body["limit"], 100);
    assert_eq!(body["total"], 2);
    assert_eq!(body["users"].as_array().unwrap().len(), 2);

    let second: Value = harness
        .server
        .get("/admin/kyc-report")
        .add_query_param("page", 2)
        .add_query_param("limit", 1)
        .add_header("authorization", admin.bearer())
        .await
        .json();
    assert_eq!(second["users"].as_array().unwrap().len(), 1);
}
