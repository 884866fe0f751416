//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{admin, auth, consent, documents, health, kyc, payments, pfm, profile};
use crate::state::AppState;

// ============================================================================
// Concurrency Limiting Constants
// ============================================================================

/// Maximum concurrent requests for OTP endpoints.
/// Each one hashes or verifies an Argon2 digest.
const OTP_MAX_CONCURRENT_REQUESTS: usize = 20;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Login (public, OTP rate-limited)
/// - `POST /auth/send-otp` - Send a mobile OTP
/// - `POST /auth/verify-otp` - Verify it and start a session
/// - `POST /kyc/aadhaar/initiate` - Send an OTP to the Aadhaar-linked mobile
/// - `POST /kyc/aadhaar/verify` - Verify it, record the Aadhaar and start a session
/// - `POST /auth/refresh-token` - Rotate the refresh token
///
/// ## Onboarding (bearer token)
/// - `POST /auth/logout`
/// - `POST /kyc/aadhaar`, `POST /kyc/pan`, `POST /kyc/video/start`, `POST /kyc/video/complete`
/// - `GET /kyc/status`, `GET /kyc/details`
/// - `POST /user/profile/{personal,address,nominee}`, `GET /user/profile/draft`
/// - `POST /document/upload-url`, `POST /document/verify`, `GET /document/status`
/// - `GET /pfm/list`, `GET /pfm/compare`, `POST /pfm/select`
/// - `POST /payment/initiate`, `POST /payment/generate-pran`
/// - `POST /consent/accept`, `GET /consent/history`
///
/// ## Admin (bearer token, role `ADMIN`)
/// - `GET /admin/analytics`, `GET /admin/kyc-report`, `GET /admin/dropoffs`
///
/// ## Webhooks (optional signature verification)
/// - `POST /payment/webhook` - Payment gateway callback
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let login_routes = Router::new()
        .route("/auth/send-otp", post(auth::send_otp))
        .route("/auth/verify-otp", post(auth::verify_otp))
        .route("/kyc/aadhaar/initiate", post(kyc::aadhaar_initiate))
        .route("/kyc/aadhaar/verify", post(kyc::aadhaar_verify))
        .layer(ConcurrencyLimitLayer::new(OTP_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        // Session
        .route("/auth/refresh-token", post(auth::refresh_token))
        .route("/auth/logout", post(auth::logout))
        // KYC
        .route("/kyc/aadhaar", post(kyc::verify_aadhaar))
        .route("/kyc/pan", post(kyc::verify_pan))
        .route("/kyc/video/start", post(kyc::start_video))
        .route("/kyc/video/complete", post(kyc::complete_video))
        .route("/kyc/status", get(kyc::status))
        .route("/kyc/details", get(kyc::details))
        // Profile
        .route("/user/profile/personal", post(profile::save_personal))
        .route("/user/profile/address", post(profile::save_address))
        .route("/user/profile/nominee", post(profile::save_nominee))
        .route("/user/profile/draft", get(profile::draft))
        // Documents
        .route("/document/upload-url", post(documents::upload_url))
        .route("/document/verify", post(documents::verify))
        .route("/document/status", get(documents::status))
        // Fund managers
        .route("/pfm/list", get(pfm::list))
        .route("/pfm/compare", get(pfm::compare))
        .route("/pfm/select", post(pfm::select))
        // Payment
        .route("/payment/initiate", post(payments::initiate))
        .route("/payment/generate-pran", post(payments::generate_pran))
        // Consent
        .route("/consent/accept", post(consent::accept))
        .route("/consent/history", get(consent::history))
        // Admin
        .route("/admin/analytics", get(admin::analytics))
        .route("/admin/kyc-report", get(admin::kyc_report))
        .route("/admin/dropoffs", get(admin::dropoffs))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        .merge(login_routes)
        .merge(api_routes)
        // Gateway callback (no rate limit - controlled by the payment provider)
        .route("/payment/webhook", post(payments::webhook))
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
