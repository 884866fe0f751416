//! API handlers.

pub mod admin;
pub mod auth;
pub mod consent;
pub mod documents;
pub mod health;
pub mod kyc;
pub mod payments;
pub mod pfm;
pub mod profile;

use axum::Json;
use serde::Serialize;

use nps_core::{User, UserId};

use crate::error::ApiError;
use crate::state::AppState;

/// Plain acknowledgement.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// Human-readable outcome.
    pub message: String,
}

impl MessageResponse {
    /// Wrap `message` as a JSON body.
    pub fn json(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

/// A field the client must send, as a trimmed non-empty string.
pub(crate) fn required<'a>(value: Option<&'a str>, message: &str) -> Result<&'a str, ApiError> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::BadRequest(message.to_string()))
}

/// The caller's user record.
pub(crate) async fn load_user(state: &AppState, user_id: &UserId) -> Result<User, ApiError> {
    state
        .store
        .get_user(user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))
}
