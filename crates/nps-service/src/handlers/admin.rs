//! Admin dashboard handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use nps_core::EventType;
use nps_store::{KycReportPage, StepCount};

use crate::auth::AdminUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Default KYC report page size.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Largest KYC report page size.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Headline numbers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsResponse {
    /// All registered users.
    pub total_users: u64,
    /// Percentage of users with completed KYC.
    pub kyc_approval_rate: f64,
    /// Percentage of users who have paid.
    pub payment_completion_rate: f64,
}

/// Pagination for the KYC report.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    /// Page number, from 1.
    pub page: Option<u32>,
    /// Page size.
    pub limit: Option<u32>,
}

/// Users per step.
#[derive(Debug, Serialize)]
pub struct DropoffResponse {
    /// Counts in step order.
    pub steps: Vec<StepCount>,
}

async fn record_view(state: &AppState, admin: &AdminUser, event: EventType) {
    state
        .emitter
        .emit(event, json!({ "adminId": admin.user.id }))
        .await;
}

/// Headline onboarding numbers.
pub async fn analytics(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
) -> Result<Json<AnalyticsResponse>, ApiError> {
    let summary = state.store.onboarding_summary().await?;
    record_view(&state, &admin, EventType::AdminAnalyticsViewed).await;

    Ok(Json(AnalyticsResponse {
        total_users: summary.total_users,
        kyc_approval_rate: summary.kyc_approval_rate(),
        payment_completion_rate: summary.payment_completion_rate(),
    }))
}

/// Users who have started KYC, newest first.
pub async fn kyc_report(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<KycReportPage>, ApiError> {
    let page = query.page.filter(|p| *p > 0).unwrap_or(1);
    let limit = query
        .limit
        .filter(|l| *l > 0)
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .min(MAX_PAGE_SIZE);

    let report = state.store.kyc_report(page, limit).await?;
    record_view(&state, &admin, EventType::AdminKycReportViewed).await;

    Ok(Json(report))
}

/// Users currently at each step.
pub async fn dropoffs(
    State(state): State<Arc<AppState>>,
    admin: AdminUser,
) -> Result<Json<DropoffResponse>, ApiError> {
    let summary = state.store.onboarding_summary().await?;
    record_view(&state, &admin, EventType::AdminDropoffViewed).await;

    Ok(Json(DropoffResponse {
        steps: summary.by_step,
    }))
}
