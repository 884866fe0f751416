//! Payment handlers: order creation, gateway callback and PRAN issuance.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use nps_core::{Change, EventType, GuardPolicy, OrderId, Pran, User, UserId};
use nps_store::{Outcome, Settlement, Store, StoreError};

use super::required;
use crate::auth::AuthUser;
use crate::crypto::{constant_time_eq, hmac_sha256_hex};
use crate::error::ApiError;
use crate::state::AppState;

/// Header carrying the hex HMAC-SHA256 of the webhook body.
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

const DEMO_GATEWAY_URL: &str = "https://demo-gateway.local/pay";

/// Fresh numbers tried when a generated PRAN is already taken.
const PRAN_ATTEMPTS: usize = 5;

/// Payment initiation request.
#[derive(Debug, Default, Deserialize)]
pub struct InitiateRequest {
    /// Amount in whole rupees. Defaults to the configured contribution.
    pub amount: Option<i64>,
}

/// Order created.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateResponse {
    /// Order id to hand to the gateway.
    pub order_id: OrderId,
    /// Amount in whole rupees.
    pub amount: i64,
    /// Where to send the user to pay.
    pub redirect_url: String,
}

/// Gateway callback payload.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookPayload {
    /// Order id from `/payment/initiate`.
    pub order_id: Option<String>,
    /// `success`, or anything else for a failure.
    pub status: Option<String>,
}

/// Callback outcome.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// `success`, `failed`, `already_processed` or `expired`.
    pub status: &'static str,
}

/// Issued PRAN.
#[derive(Debug, Serialize)]
pub struct PranResponse {
    /// The PRAN.
    pub pran: String,
}

/// Create a payment order for the caller.
pub async fn initiate(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    body: Option<Json<InitiateRequest>>,
) -> Result<Json<InitiateResponse>, ApiError> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let amount = request.amount.unwrap_or(state.config.payment_amount);
    if amount <= 0 {
        return Err(ApiError::BadRequest("Invalid amount".into()));
    }

    let order_id = OrderId::generate();
    state
        .store
        .apply_change(
            &auth.user_id,
            Change::InitiatePayment { order_id, amount },
            &state.policy,
        )
        .await?;

    tracing::info!(user_id = %auth.user_id, order_id = %order_id, amount, "Payment order created");
    state
        .emitter
        .emit(
            EventType::PaymentInitiated,
            json!({ "userId": auth.user_id, "orderId": order_id, "amount": amount }),
        )
        .await;

    let redirect_url = state
        .config
        .payment_gateway_url
        .clone()
        .unwrap_or_else(|| DEMO_GATEWAY_URL.to_string());

    Ok(Json(InitiateResponse {
        order_id,
        amount,
        redirect_url,
    }))
}

/// Gateway callback. Idempotent per order.
pub async fn webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    if let Some(secret) = &state.config.payment_webhook_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::BadRequest("Missing webhook signature".into()))?;

        let expected = hmac_sha256_hex(secret, &body)?;
        if !constant_time_eq(&expected, &signature.trim().to_ascii_lowercase()) {
            tracing::warn!("Invalid payment webhook signature");
            return Err(ApiError::BadRequest("Invalid webhook signature".into()));
        }
    }

    let payload: WebhookPayload =
        serde_json::from_str(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let order_id: OrderId = required(payload.order_id.as_deref(), "Order ID is required")?
        .parse()
        .map_err(|_| ApiError::NotFound("Invalid order".into()))?;
    let success = payload.status.as_deref() == Some("success");

    let settlement = state.store.settle_payment(&order_id, success).await?;
    let payment = settlement.payment();
    let status = match &settlement {
        Settlement::AlreadyProcessed(_) => "already_processed",
        Settlement::Expired(_) => "expired",
        Settlement::Succeeded(_) => "success",
        Settlement::Failed(_) => "failed",
    };

    tracing::info!(order_id = %order_id, user_id = %payment.user_id, outcome = status, "Payment webhook processed");

    let event = match &settlement {
        Settlement::Succeeded(_) => Some(EventType::PaymentSuccess),
        Settlement::Failed(_) => Some(EventType::PaymentFailed),
        Settlement::AlreadyProcessed(_) | Settlement::Expired(_) => None,
    };
    if let Some(event) = event {
        state
            .emitter
            .emit(
                event,
                json!({
                    "userId": payment.user_id,
                    "orderId": order_id,
                    "amount": payment.amount,
                }),
            )
            .await;
    }

    Ok(Json(WebhookResponse { status }))
}

/// Issue the caller's PRAN.
pub async fn generate_pran(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<PranResponse>, ApiError> {
    let user = issue_pran(
        state.store.as_ref(),
        &auth.user_id,
        &state.policy,
        Pran::generate,
    )
    .await?;

    let pran = user
        .pran
        .map(|p| p.as_str().to_string())
        .ok_or_else(|| ApiError::Internal("PRAN missing after issuance".into()))?;

    tracing::info!(user_id = %auth.user_id, "PRAN generated");
    state
        .emitter
        .emit(
            EventType::PranGenerated,
            json!({ "userId": auth.user_id, "pran": pran }),
        )
        .await;

    Ok(Json(PranResponse { pran }))
}

/// Issue a PRAN, drawing another number from `generate` while the drawn one
/// belongs to someone else.
async fn issue_pran(
    store: &dyn Store,
    user_id: &UserId,
    policy: &GuardPolicy,
    mut generate: impl FnMut() -> Pran,
) -> Result<User, StoreError> {
    let mut attempt = 1;
    loop {
        let change = Change::GeneratePran { pran: generate() };
        match store.apply_change(user_id, change, policy).await {
            Err(StoreError::Conflict(msg)) if attempt < PRAN_ATTEMPTS => {
                tracing::warn!(user_id = %user_id, attempt, error = %msg, "PRAN collision, retrying");
                attempt += 1;
            }
            other => return other.map(Outcome::into_user),
        }
    }
}
