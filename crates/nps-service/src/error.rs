//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use nps_core::{CoreError, GuardViolation};
use nps_store::{CacheError, StoreError};

use crate::auth::TokenError;
use crate::blob::BlobError;
use crate::crypto::CryptoError;
use crate::ekyc::EkycError;
use crate::otp::OtpError;

/// Message shown when the OTP send limit is hit.
pub const RATE_LIMIT_MESSAGE: &str = "Too many OTP requests. Please try again later.";

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden - valid credentials but insufficient permissions.
    #[error("forbidden")]
    Forbidden,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input or a step taken out of order.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict - resource already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Too many requests for one identity.
    #[error("too many requests: {0}")]
    TooManyRequests(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// External service error.
    #[error("external service error: {0}")]
    ExternalService(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::Forbidden => (StatusCode::FORBIDDEN, "forbidden", self.to_string(), None),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::TooManyRequests(msg) => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                msg.clone(),
                None,
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            Self::ExternalService(msg) => (
                StatusCode::BAD_GATEWAY,
                "external_service_error",
                msg.clone(),
                None,
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound(format!("{entity} not found: {id}")),
            StoreError::Guard(violation) => Self::BadRequest(violation.to_string()),
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Internal(msg),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<GuardViolation> for ApiError {
    fn from(violation: GuardViolation) -> Self {
        Self::BadRequest(violation.to_string())
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<CryptoError> for ApiError {
    fn from(err: CryptoError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<OtpError> for ApiError {
    fn from(err: OtpError) -> Self {
        match err {
            OtpError::Expired | OtpError::Invalid => Self::BadRequest(err.to_string()),
            OtpError::RateLimited => Self::TooManyRequests(RATE_LIMIT_MESSAGE.into()),
            OtpError::Delivery(e) => Self::ExternalService(e.to_string()),
            OtpError::Cache(e) => Self::Internal(e.to_string()),
            OtpError::Hash(msg) => Self::Internal(msg),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Invalid => Self::Unauthorized,
            TokenError::Encode(msg) => Self::Internal(msg),
        }
    }
}

impl From<BlobError> for ApiError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::Http(e) => Self::ExternalService(e.to_string()),
            BlobError::Status(status) => {
                Self::ExternalService(format!("blob storage answered HTTP {status}"))
            }
            BlobError::Signing(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<EkycError> for ApiError {
    fn from(err: EkycError) -> Self {
        match err {
            EkycError::NotFound => Self::BadRequest(err.to_string()),
            EkycError::Http(_) | EkycError::Api { .. } | EkycError::Malformed(_) => {
                Self::ExternalService(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_of(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn guard_violation_is_a_bad_request_with_reason() {
        let (status, body) =
            body_of(StoreError::Guard(GuardViolation::ProfileAlreadyCompleted).into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "bad_request");
        assert_eq!(body["error"]["message"], "Profile already completed");
        assert!(body["error"].get("details").is_none());
    }

    #[tokio::test]
    async fn internal_errors_do_not_leak_detail() {
        let (status, body) = body_of(StoreError::Database("connection refused".into()).into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"]["message"], "An internal error occurred");
    }

    #[tokio::test]
    async fn rate_limit_is_429_with_friendly_message() {
        let (status, body) = body_of(OtpError::RateLimited.into()).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["message"], RATE_LIMIT_MESSAGE);
    }

    #[tokio::test]
    async fn unknown_record_is_404() {
        let (status, _) = body_of(
            StoreError::NotFound {
                entity: "payment",
                id: "order_x".into(),
            }
            .into(),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
