//! KYC handlers: Aadhaar (authenticated and OTP login), PAN, video and reads.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use nps_core::{
    document, evaluate, Aadhaar, Change, CoreError, EventType, KycRecord, KycStatus,
    OnboardingStep, OtpCode, Pan, SessionId, Transition,
};

use super::auth::{start_session, SessionResponse};
use super::{load_user, required};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::otp::OtpTarget;
use crate::state::AppState;

/// Request carrying an Aadhaar number.
#[derive(Debug, Deserialize)]
pub struct AadhaarRequest {
    /// 12-digit Aadhaar number.
    pub aadhaar: Option<String>,
}

/// Aadhaar OTP login request.
#[derive(Debug, Deserialize)]
pub struct AadhaarVerifyRequest {
    /// 12-digit Aadhaar number.
    pub aadhaar: Option<String>,
    /// 6-digit code.
    pub otp: Option<String>,
}

/// Aadhaar OTP issued.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AadhaarInitiateResponse {
    /// Outcome.
    pub message: String,
    /// The linked mobile with all but the last four digits hidden.
    pub masked_mobile: String,
    /// The code, when running without an SMS gateway.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp: Option<String>,
}

/// PAN request.
#[derive(Debug, Deserialize)]
pub struct PanRequest {
    /// PAN, e.g. `ABCDE1234F`.
    pub pan: Option<String>,
}

/// Video KYC completion request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoCompleteRequest {
    /// Session returned by `/kyc/video/start`.
    pub session_id: Option<String>,
    /// Blob key of the uploaded recording.
    pub recording_key: Option<String>,
}

/// Position after a KYC step.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KycStepResponse {
    /// Outcome.
    pub message: String,
    /// KYC status.
    pub kyc_status: KycStatus,
    /// Step.
    pub onboarding_step: OnboardingStep,
}

/// Video session opened.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoStartResponse {
    /// New session.
    pub session_id: SessionId,
    /// KYC status.
    pub kyc_status: KycStatus,
}

/// Current KYC position.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KycStatusResponse {
    /// KYC status.
    pub kyc_status: KycStatus,
    /// Step.
    pub onboarding_step: OnboardingStep,
}

/// Stored KYC record.
#[derive(Debug, Serialize)]
pub struct KycDetailsResponse {
    /// The record.
    pub kyc: KycRecord,
}

fn parse_aadhaar(value: Option<&str>) -> Result<Aadhaar, ApiError> {
    Ok(required(value, "Invalid Aadhaar number")?.parse()?)
}

// ============================================================================
// Aadhaar OTP login (public)
// ============================================================================

/// Send an OTP to the mobile linked to an Aadhaar number.
pub async fn aadhaar_initiate(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AadhaarRequest>,
) -> Result<Json<AadhaarInitiateResponse>, ApiError> {
    let aadhaar = parse_aadhaar(body.aadhaar.as_deref())?;
    let identity = state.ekyc.lookup(&aadhaar).await?;

    // An account that already holds a verified Aadhaar never gets another code
    if let Some(user) = state.store.get_user_by_mobile(&identity.linked_mobile).await? {
        evaluate(user.position(), Transition::VerifyAadhaar, &state.policy)?;
    }

    let echoed = state
        .otp
        .send(OtpTarget::Aadhaar {
            aadhaar: &aadhaar,
            linked_mobile: &identity.linked_mobile,
        })
        .await?;

    tracing::info!(aadhaar = %aadhaar.masked(), "Aadhaar OTP sent");

    Ok(Json(AadhaarInitiateResponse {
        message: "OTP sent to Aadhaar-linked mobile".to_string(),
        masked_mobile: identity.linked_mobile.masked(),
        otp: echoed.map(|code| code.as_str().to_string()),
    }))
}

/// Verify an Aadhaar OTP, record the Aadhaar on the linked account and start a session.
pub async fn aadhaar_verify(
    State(state): State<Arc<AppState>>,
    Json(body): Json<AadhaarVerifyRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let aadhaar = parse_aadhaar(body.aadhaar.as_deref())?;
    let code: OtpCode = required(body.otp.as_deref(), "Aadhaar and OTP required")?.parse()?;

    let identity = state.ekyc.lookup(&aadhaar).await?;
    state
        .otp
        .verify(
            OtpTarget::Aadhaar {
                aadhaar: &aadhaar,
                linked_mobile: &identity.linked_mobile,
            },
            &code,
        )
        .await?;

    let (user, created) = state
        .store
        .find_or_create_user(&identity.linked_mobile)
        .await?;
    if created {
        state
            .emitter
            .emit(EventType::UserRegistered, json!({ "userId": user.id }))
            .await;
    }

    let user = state
        .store
        .apply_change(
            &user.id,
            Change::VerifyAadhaar {
                last4: aadhaar.last4().to_string(),
                demographics: identity.demographics,
            },
            &state.policy,
        )
        .await?
        .into_user();

    tracing::info!(user_id = %user.id, aadhaar = %aadhaar.masked(), "Aadhaar verified via OTP");
    state
        .emitter
        .emit(
            EventType::AadhaarVerified,
            json!({ "userId": user.id, "method": "otp" }),
        )
        .await;

    let mut session = start_session(&state, &user).await?;
    session.message = Some("Aadhaar verification successful".to_string());
    Ok(Json(session))
}

// ============================================================================
// Authenticated KYC steps
// ============================================================================

/// Verify the caller's Aadhaar through the eKYC provider.
pub async fn verify_aadhaar(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<AadhaarRequest>,
) -> Result<Json<KycStepResponse>, ApiError> {
    let aadhaar = parse_aadhaar(body.aadhaar.as_deref())?;
    let identity = state.ekyc.lookup(&aadhaar).await?;

    let user = state
        .store
        .apply_change(
            &auth.user_id,
            Change::VerifyAadhaar {
                last4: aadhaar.last4().to_string(),
                demographics: identity.demographics,
            },
            &state.policy,
        )
        .await?
        .into_user();

    state
        .emitter
        .emit(EventType::AadhaarVerified, json!({ "userId": user.id }))
        .await;

    Ok(Json(KycStepResponse {
        message: "Aadhaar verification successful".to_string(),
        kyc_status: user.kyc_status,
        onboarding_step: user.onboarding_step,
    }))
}

/// Verify the caller's PAN. Retries after success answer success again.
pub async fn verify_pan(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<PanRequest>,
) -> Result<Json<KycStepResponse>, ApiError> {
    let pan: Pan = required(body.pan.as_deref(), "Invalid PAN format")?.parse()?;

    let outcome = state
        .store
        .apply_change(&auth.user_id, Change::VerifyPan { pan }, &state.policy)
        .await?;

    if outcome.is_applied() {
        state
            .emitter
            .emit(EventType::PanVerified, json!({ "userId": auth.user_id }))
            .await;
    }

    let user = outcome.into_user();
    Ok(Json(KycStepResponse {
        message: "PAN verification completed".to_string(),
        kyc_status: user.kyc_status,
        onboarding_step: user.onboarding_step,
    }))
}

/// Open a video KYC session.
pub async fn start_video(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<VideoStartResponse>, ApiError> {
    let session_id = SessionId::generate();

    let user = state
        .store
        .apply_change(
            &auth.user_id,
            Change::StartVideo { session_id },
            &state.policy,
        )
        .await?
        .into_user();

    state
        .emitter
        .emit(
            EventType::VideoKycStarted,
            json!({ "userId": auth.user_id, "sessionId": session_id }),
        )
        .await;

    Ok(Json(VideoStartResponse {
        session_id,
        kyc_status: user.kyc_status,
    }))
}

/// Approve a video KYC session owned by the caller.
pub async fn complete_video(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<VideoCompleteRequest>,
) -> Result<Json<KycStepResponse>, ApiError> {
    let session_id: SessionId = required(body.session_id.as_deref(), "Session ID is required")?
        .parse()
        .map_err(CoreError::from)?;

    let recording_key = body
        .recording_key
        .map(|key| key.trim().to_string())
        .filter(|key| !key.is_empty());
    if let Some(key) = &recording_key {
        if !key.starts_with(&document::user_prefix(&auth.user_id)) || key.contains("..") {
            return Err(ApiError::Forbidden);
        }
    }

    let outcome = state
        .store
        .apply_change(
            &auth.user_id,
            Change::CompleteVideo {
                session_id,
                recording_key,
            },
            &state.policy,
        )
        .await?;

    if outcome.is_applied() {
        state
            .emitter
            .emit(
                EventType::VideoKycCompleted,
                json!({ "userId": auth.user_id, "sessionId": session_id }),
            )
            .await;
    }

    let user = outcome.into_user();
    Ok(Json(KycStepResponse {
        message: "Video KYC completed".to_string(),
        kyc_status: user.kyc_status,
        onboarding_step: user.onboarding_step,
    }))
}

// ============================================================================
// Reads
// ============================================================================

/// Current KYC status and step.
pub async fn status(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<KycStatusResponse>, ApiError> {
    let user = load_user(&state, &auth.user_id).await?;
    Ok(Json(KycStatusResponse {
        kyc_status: user.kyc_status,
        onboarding_step: user.onboarding_step,
    }))
}

/// The caller's KYC record.
pub async fn details(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<KycDetailsResponse>, ApiError> {
    let kyc = state
        .store
        .get_kyc(&auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("KYC not found".into()))?;
    Ok(Json(KycDetailsResponse { kyc }))
}
