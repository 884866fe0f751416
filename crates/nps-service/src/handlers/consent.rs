//! Consent handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use nps_core::{Consent, ConsentType, EventType};

use super::MessageResponse;
use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Consent request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptRequest {
    /// One of the known consent types.
    pub consent_type: Option<String>,
}

/// First hop of `x-forwarded-for`, if any.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

/// Record a consent. Every acceptance is kept.
pub async fn accept(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    headers: HeaderMap,
    Json(body): Json<AcceptRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let consent_type = body
        .consent_type
        .as_deref()
        .and_then(ConsentType::parse)
        .ok_or_else(|| ApiError::BadRequest("Invalid consent type".into()))?;

    let consent = Consent {
        user_id: auth.user_id,
        consent_type,
        ip_address: client_ip(&headers),
        accepted_at: Utc::now(),
    };
    state.store.append_consent(&consent).await?;

    state
        .emitter
        .emit(
            EventType::ConsentAccepted,
            json!({ "userId": auth.user_id, "consentType": consent_type.as_str() }),
        )
        .await;

    Ok(MessageResponse::json("Consent accepted"))
}

/// The caller's consents, newest first.
pub async fn history(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<Vec<Consent>>, ApiError> {
    Ok(Json(state.store.list_consents(&auth.user_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn client_ip_takes_the_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.7"));
        assert_eq!(client_ip(&HeaderMap::new()), None);
    }
}
