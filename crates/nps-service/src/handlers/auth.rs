//! Mobile OTP login and session handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use nps_core::{EventType, KycStatus, Mobile, OnboardingStep, OtpCode, User};

use super::{required, MessageResponse};
use crate::auth::{AuthUser, TokenKind};
use crate::error::ApiError;
use crate::otp::OtpTarget;
use crate::state::AppState;

/// Send OTP request.
#[derive(Debug, Deserialize)]
pub struct SendOtpRequest {
    /// 10-digit mobile number.
    pub mobile: Option<String>,
}

/// OTP issued.
#[derive(Debug, Serialize)]
pub struct SendOtpResponse {
    /// Outcome.
    pub message: String,
    /// The code, when running without an SMS gateway.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
}

/// Verify OTP request.
#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    /// 10-digit mobile number.
    pub mobile: Option<String>,
    /// 6-digit code.
    pub otp: Option<String>,
}

/// Refresh request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    /// The current refresh token.
    pub refresh_token: Option<String>,
}

/// A new session.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    /// Outcome, for flows that report one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Access token.
    pub token: String,
    /// Refresh token.
    pub refresh_token: String,
    /// Current step.
    pub onboarding_step: OnboardingStep,
    /// Current KYC status.
    pub kyc_status: KycStatus,
}

/// Issue a token pair for `user` and make its refresh token the only valid one.
pub(crate) async fn start_session(
    state: &AppState,
    user: &User,
) -> Result<SessionResponse, ApiError> {
    let pair = state.tokens.issue(&user.id)?;
    state
        .store
        .set_refresh_token(&user.id, Some(&pair.refresh_token))
        .await?;

    Ok(SessionResponse {
        message: None,
        token: pair.token,
        refresh_token: pair.refresh_token,
        onboarding_step: user.onboarding_step,
        kyc_status: user.kyc_status,
    })
}

/// Send a login OTP to a mobile number.
pub async fn send_otp(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SendOtpRequest>,
) -> Result<Json<SendOtpResponse>, ApiError> {
    let mobile: Mobile = required(body.mobile.as_deref(), "Mobile number required")?.parse()?;

    let echoed = state.otp.send(OtpTarget::Mobile(&mobile)).await?;

    Ok(Json(SendOtpResponse {
        message: "OTP sent successfully".to_string(),
        otp: echoed.map(|code| code.as_str().to_string()),
    }))
}

/// Verify a login OTP and start a session, registering the mobile on first use.
pub async fn verify_otp(
    State(state): State<Arc<AppState>>,
    Json(body): Json<VerifyOtpRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let mobile: Mobile =
        required(body.mobile.as_deref(), "Mobile and OTP required")?.parse()?;
    let code: OtpCode = required(body.otp.as_deref(), "Mobile and OTP required")?.parse()?;

    state.otp.verify(OtpTarget::Mobile(&mobile), &code).await?;

    let (user, created) = state.store.find_or_create_user(&mobile).await?;
    if created {
        tracing::info!(user_id = %user.id, mobile = %mobile.masked(), "User registered");
        state
            .emitter
            .emit(EventType::UserRegistered, json!({ "userId": user.id }))
            .await;
    }
    state
        .emitter
        .emit(EventType::UserMobileVerified, json!({ "userId": user.id }))
        .await;

    Ok(Json(start_session(&state, &user).await?))
}

/// Exchange a refresh token for a new pair. The presented token stops working.
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let current = required(body.refresh_token.as_deref(), "Refresh token required")?;
    let user_id = state.tokens.verify(current, TokenKind::Refresh)?;

    let pair = state.tokens.issue(&user_id)?;
    if !state
        .store
        .rotate_refresh_token(&user_id, current, &pair.refresh_token)
        .await?
    {
        tracing::warn!(user_id = %user_id, "Refresh with a superseded token");
        return Err(ApiError::Unauthorized);
    }

    let user = super::load_user(&state, &user_id).await?;
    state
        .emitter
        .emit(EventType::TokenRefreshed, json!({ "userId": user_id }))
        .await;

    Ok(Json(SessionResponse {
        message: None,
        token: pair.token,
        refresh_token: pair.refresh_token,
        onboarding_step: user.onboarding_step,
        kyc_status: user.kyc_status,
    }))
}

/// End the session by clearing the stored refresh token.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<MessageResponse>, ApiError> {
    state.store.set_refresh_token(&auth.user_id, None).await?;
    state
        .emitter
        .emit(EventType::UserLogout, json!({ "userId": auth.user_id }))
        .await;

    Ok(MessageResponse::json("Logged out successfully"))
}
