//! Profile handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::{json, Value};

use nps_core::{
    AddressDetails, Change, EventType, NomineeDetails, OnboardingStep, PersonalDetails,
};

use super::{load_user, MessageResponse};
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Saved profile so far.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftResponse {
    /// Current step.
    pub onboarding_step: OnboardingStep,
    /// Stored profile, or an empty object.
    pub draft: Value,
}

async fn save(
    state: &AppState,
    auth: &AuthUser,
    change: Change,
    event: EventType,
    message: &str,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .store
        .apply_change(&auth.user_id, change, &state.policy)
        .await?;
    state
        .emitter
        .emit(event, json!({ "userId": auth.user_id }))
        .await;
    Ok(MessageResponse::json(message))
}

/// Save personal details.
pub async fn save_personal(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(details): Json<PersonalDetails>,
) -> Result<Json<MessageResponse>, ApiError> {
    details.validate()?;
    save(
        &state,
        &auth,
        Change::SavePersonal(details),
        EventType::ProfilePersonalSaved,
        "Personal details saved successfully",
    )
    .await
}

/// Save the address.
pub async fn save_address(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(details): Json<AddressDetails>,
) -> Result<Json<MessageResponse>, ApiError> {
    details.validate()?;
    save(
        &state,
        &auth,
        Change::SaveAddress(details),
        EventType::ProfileAddressSaved,
        "Address saved successfully",
    )
    .await
}

/// Save the nominee. Leaves the step unchanged.
pub async fn save_nominee(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(details): Json<NomineeDetails>,
) -> Result<Json<MessageResponse>, ApiError> {
    details.validate()?;
    save(
        &state,
        &auth,
        Change::SaveNominee(details),
        EventType::ProfileNomineeSaved,
        "Nominee saved successfully",
    )
    .await
}

/// The stored profile and current step.
pub async fn draft(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<DraftResponse>, ApiError> {
    let user = load_user(&state, &auth.user_id).await?;
    let draft = match state.store.get_profile(&auth.user_id).await? {
        Some(profile) => serde_json::to_value(profile)
            .map_err(|e| ApiError::Internal(e.to_string()))?,
        None => json!({}),
    };

    Ok(Json(DraftResponse {
        onboarding_step: user.onboarding_step,
        draft,
    }))
}
