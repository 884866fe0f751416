//! Pension fund manager handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use nps_core::{find_pfm, pfm_catalog, Allocation, AllocationInput, Change, EventType, Pfm};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

const CATALOG_CACHE_KEY: &str = "pfms";
const CATALOG_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Query for `/pfm/compare`.
#[derive(Debug, Deserialize)]
pub struct CompareQuery {
    /// Comma-separated catalogue ids.
    pub ids: Option<String>,
}

/// Fund manager selection request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectRequest {
    /// Catalogue id.
    pub pfm_id: Option<u32>,
    /// Raw allocation weights.
    #[serde(flatten)]
    pub allocation: AllocationInput,
}

/// Selection stored.
#[derive(Debug, Serialize)]
pub struct SelectResponse {
    /// Outcome.
    pub message: String,
    /// The normalised allocation.
    pub allocation: Allocation,
}

/// The catalogue, served from cache when warm.
pub async fn list(
    State(state): State<Arc<AppState>>,
    _auth: AuthUser,
) -> Result<Json<Value>, ApiError> {
    match state.cache.get(CATALOG_CACHE_KEY).await {
        Ok(Some(cached)) => match serde_json::from_str::<Value>(&cached) {
            Ok(pfms) => return Ok(Json(json!({ "pfms": pfms }))),
            Err(e) => tracing::warn!(error = %e, "Discarding unreadable PFM cache entry"),
        },
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "PFM cache read failed"),
    }

    let pfms = serde_json::to_value(pfm_catalog()).map_err(|e| ApiError::Internal(e.to_string()))?;
    if let Err(e) = state
        .cache
        .set_ex(CATALOG_CACHE_KEY, &pfms.to_string(), CATALOG_CACHE_TTL)
        .await
    {
        tracing::warn!(error = %e, "PFM cache write failed");
    }

    Ok(Json(json!({ "pfms": pfms })))
}

/// A subset of the catalogue for side-by-side comparison.
pub async fn compare(
    _auth: AuthUser,
    Query(query): Query<CompareQuery>,
) -> Result<Json<Value>, ApiError> {
    let ids = query
        .ids
        .as_deref()
        .map(str::trim)
        .filter(|ids| !ids.is_empty())
        .ok_or_else(|| ApiError::BadRequest("PFM ids required".into()))?;

    let wanted = ids
        .split(',')
        .map(|id| id.trim().parse::<u32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ApiError::BadRequest("PFM ids must be numbers".into()))?;

    let comparison: Vec<&Pfm> = pfm_catalog()
        .iter()
        .filter(|pfm| wanted.contains(&pfm.id))
        .collect();

    Ok(Json(json!({ "comparison": comparison })))
}

/// Select a fund manager and allocation.
pub async fn select(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<SelectRequest>,
) -> Result<Json<SelectResponse>, ApiError> {
    let pfm_id = body
        .pfm_id
        .ok_or_else(|| ApiError::BadRequest("PFM id required".into()))?;
    if find_pfm(pfm_id).is_none() {
        return Err(ApiError::NotFound("PFM not found".into()));
    }
    let allocation = Allocation::normalize(&body.allocation)?;

    state
        .store
        .apply_change(
            &auth.user_id,
            Change::SelectPfm { pfm_id, allocation },
            &state.policy,
        )
        .await?;

    state
        .emitter
        .emit(
            EventType::PfmSelected,
            json!({ "userId": auth.user_id, "pfmId": pfm_id, "allocation": allocation }),
        )
        .await;

    Ok(Json(SelectResponse {
        message: "PFM selected successfully".to_string(),
        allocation,
    }))
}
