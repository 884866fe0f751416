//! Payment, webhook and PRAN integration tests.

mod common;

use std::time::Duration;

use common::TestHarness;
use serde_json::{json, Value};

use nps_core::OrderId;
use nps_service::crypto::hmac_sha256_hex;
use nps_service::sweeper::sweep_once;
use nps_service::ServiceConfig;

async fn webhook(harness: &TestHarness, order_id: &str, status: &str) -> Value {
    let response = harness
        .server
        .post("/payment/webhook")
        .json(&json!({ "orderId": order_id, "status": status }))
        .await;
    response.assert_status_ok();
    response.json()
}

async fn onboarding_step(harness: &TestHarness, session: &common::Session) -> String {
    let status: Value = harness
        .server
        .get("/kyc/status")
        .add_header("authorization", session.bearer())
        .await
        .json();
    status["onboardingStep"].as_str().unwrap().to_string()
}

// ============================================================================
// Initiate
// ============================================================================

#[tokio::test]
async fn initiate_uses_the_configured_amount() {
    let harness = TestHarness::new();
    let session = harness.select_pfm("9876543210").await;

    let body = harness.post_ok(&session, "/payment/initiate", json!({})).await;
    assert!(body["orderId"].as_str().unwrap().starts_with("order_"));
    assert_eq!(body["amount"], 500);
    assert_eq!(body["redirectUrl"], "https://demo-gateway.local/pay");

    let custom = harness
        .post_ok(&session, "/payment/initiate", json!({ "amount": 1000 }))
        .await;
    assert_eq!(custom["amount"], 1000);
    assert_ne!(custom["orderId"], body["orderId"]);
}

#[tokio::test]
async fn non_positive_amount_is_rejected() {
    let harness = TestHarness::new();
    let session = harness.select_pfm("9876543210").await;

    let response = harness
        .server
        .post("/payment/initiate")
        .add_header("authorization", session.bearer())
        .json(&json!({ "amount": 0 }))
        .await;
    response.assert_status_bad_request();
    assert_eq!(response.json::<Value>()["error"]["message"], "Invalid amount");
}

// ============================================================================
// Webhook
// ============================================================================

#[tokio::test]
async fn duplicate_success_callback_is_already_processed() {
    let harness = TestHarness::new();
    let session = harness.select_pfm("9876543210").await;
    let order_id = harness.initiate_payment(&session).await;

    assert_eq!(webhook(&harness, &order_id, "success").await["status"], "success");
    assert_eq!(onboarding_step(&harness, &session).await, "PAYMENT_COMPLETED");

    assert_eq!(
        webhook(&harness, &order_id, "success").await["status"],
        "already_processed"
    );
    assert_eq!(onboarding_step(&harness, &session).await, "PAYMENT_COMPLETED");

    // A paid user cannot start another order
    let response = harness
        .server
        .post("/payment/initiate")
        .add_header("authorization", session.bearer())
        .json(&json!({}))
        .await;
    response.assert_status_bad_request();
    assert_eq!(
        response.json::<Value>()["error"]["message"],
        "Payment already completed"
    );
}

#[tokio::test]
async fn failed_callback_leaves_the_step_alone() {
    let harness = TestHarness::new();
    let session = harness.select_pfm("9876543210").await;
    let order_id = harness.initiate_payment(&session).await;

    assert_eq!(webhook(&harness, &order_id, "failed").await["status"], "failed");
    assert_eq!(onboarding_step(&harness, &session).await, "PFM_SELECTED");

    // A later success on the same order still settles it
    assert_eq!(webhook(&harness, &order_id, "success").await["status"], "success");
    assert_eq!(onboarding_step(&harness, &session).await, "PAYMENT_COMPLETED");
}

#[tokio::test]
async fn unknown_order_is_404() {
    let harness = TestHarness::new();

    for order_id in [OrderId::generate().to_string(), "order_garbage".to_string()] {
        harness
            .server
            .post("/payment/webhook")
            .json(&json!({ "orderId": order_id, "status": "success" }))
            .await
            .assert_status_not_found();
    }
}

#[tokio::test]
async fn expired_orders_ignore_callbacks() {
    let harness = TestHarness::new();
    let session = harness.select_pfm("9876543210").await;
    let order_id = harness.initiate_payment(&session).await;

    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(
        sweep_once(harness.store.as_ref(), Duration::ZERO).await.unwrap(),
        1
    );

    assert_eq!(webhook(&harness, &order_id, "success").await["status"], "expired");
    assert_eq!(onboarding_step(&harness, &session).await, "PFM_SELECTED");

    // A fresh order can still be paid
    let retry = harness.initiate_payment(&session).await;
    assert_eq!(webhook(&harness, &retry, "success").await["status"], "success");
}

#[tokio::test]
async fn signed_webhooks_are_checked() {
    let harness = TestHarness::with_config(ServiceConfig {
        payment_webhook_secret: Some("whsec_test".into()),
        ..ServiceConfig::default()
    });
    let session = harness.select_pfm("9876543210").await;
    let order_id = harness.initiate_payment(&session).await;
    let payload = json!({ "orderId": order_id, "status": "success" }).to_string();

    let unsigned = harness
        .server
        .post("/payment/webhook")
        .text(payload.clone())
        .await;
    unsigned.assert_status_bad_request();
    assert_eq!(
        unsigned.json::<Value>()["error"]["message"],
        "Missing webhook signature"
    );

    let forged = harness
        .server
        .post("/payment/webhook")
        .add_header("x-webhook-signature", "00".repeat(32))
        .text(payload.clone())
        .await;
    forged.assert_status_bad_request();
    assert_eq!(
        forged.json::<Value>()["error"]["message"],
        "Invalid webhook signature"
    );
    assert_eq!(onboarding_step(&harness, &session).await, "PFM_SELECTED");

    let signature = hmac_sha256_hex("whsec_test", &payload).unwrap();
    let signed = harness
        .server
        .post("/payment/webhook")
        .add_header("x-webhook-signature", signature)
        .text(payload)
        .await;
    signed.assert_status_ok();
    assert_eq!(signed.json::<Value>()["status"], "success");
}

// ============================================================================
// PRAN
// ============================================================================

#[tokio::test]
async fn pran_is_issued_once_after_payment() {
    let harness = TestHarness::new();
    let session = harness.select_pfm("9876543210").await;
    let order_id = harness.initiate_payment(&session).await;
    webhook(&harness, &order_id, "success").await;

    let body = harness
        .post_ok(&session, "/payment/generate-pran", json!({}))
        .await;
    let pran = body["pran"].as_str().unwrap();
    assert_eq!(pran.len(), 12);
    assert!(pran.starts_with("PRAN"));
    assert!(pran[4..].chars().all(|c| c.is_ascii_digit()));
    assert_eq!(onboarding_step(&harness, &session).await, "PRAN_GENERATED");

    let again = harness
        .server
        .post("/payment/generate-pran")
        .add_header("authorization", session.bearer())
        .await;
    again.assert_status_bad_request();
    assert_eq!(
        again.json::<Value>()["error"]["message"],
        "PRAN already generated"
    );
}

#[tokio::test]
async fn development_allows_pran_without_a_gateway_payment() {
    let harness = TestHarness::new();
    let session = harness.select_pfm("9876543210").await;

    harness
        .post_ok(&session, "/payment/generate-pran", json!({}))
        .await;
    assert_eq!(onboarding_step(&harness, &session).await, "PRAN_GENERATED");
}

#[tokio::test]
async fn pran_before_pfm_selection_is_rejected() {
    let harness = TestHarness::new();
    let session = harness.complete_profile("9876543210").await;

    harness
        .server
        .post("/payment/generate-pran")
        .add_header("authorization", session.bearer())
        .await
        .assert_status_bad_request();
}
