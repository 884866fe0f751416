//! Document upload handlers.
//!
//! Uploads go straight to blob storage. The service signs an upload URL under
//! the caller's own prefix, and on `/document/verify` checks ownership and
//! presence before recording the key encrypted.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use nps_core::{document, Document, DocumentKind, DocumentStatus, EventType, FileType, UserId};

use crate::auth::AuthUser;
use crate::blob::UPLOAD_URL_TTL;
use crate::error::ApiError;
use crate::state::AppState;

/// Upload URL request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadUrlRequest {
    /// `jpg`, `png` or `pdf`.
    pub file_type: Option<String>,
    /// Must match the file type.
    pub mime_type: Option<String>,
}

/// Signed upload target.
#[derive(Debug, Serialize)]
pub struct UploadUrlResponse {
    /// Presigned `PUT` URL.
    pub url: String,
    /// Key to pass back to `/document/verify`.
    pub key: String,
}

/// Verification request.
#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    /// Key from `/document/upload-url`.
    pub key: Option<String>,
    /// Document kind.
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Status query.
#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    /// Document kind.
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// Document status.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// `verified` or `pending`.
    pub status: &'static str,
}

/// Whether `key` lies inside the caller's upload prefix.
fn owned_by(key: &str, user_id: &UserId) -> bool {
    key.starts_with(&document::user_prefix(user_id)) && !key.contains("..")
}

/// Sign an upload URL for a new document.
pub async fn upload_url(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<UploadUrlRequest>,
) -> Result<Json<UploadUrlResponse>, ApiError> {
    let file_type = FileType::parse(body.file_type.as_deref().unwrap_or_default())?;
    file_type.check_mime(body.mime_type.as_deref().unwrap_or_default())?;

    let key = format!(
        "{}{}.{}",
        document::user_prefix(&auth.user_id),
        Utc::now().timestamp_millis(),
        file_type.extension()
    );
    let url = state
        .blob
        .presign_put(&key, file_type.mime_type(), UPLOAD_URL_TTL)
        .await?;

    Ok(Json(UploadUrlResponse { url, key }))
}

/// Confirm an uploaded object and record it.
pub async fn verify(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<VerifyRequest>,
) -> Result<Json<StatusResponse>, ApiError> {
    let (Some(key), Some(kind)) = (
        body.key.as_deref().map(str::trim).filter(|k| !k.is_empty()),
        body.kind.as_deref().and_then(DocumentKind::parse),
    ) else {
        return Err(ApiError::BadRequest("Invalid document data".into()));
    };

    if !owned_by(key, &auth.user_id) {
        tracing::warn!(user_id = %auth.user_id, "Document key outside the caller's prefix");
        return Err(ApiError::Forbidden);
    }

    if !state.blob.exists(key).await? {
        return Err(ApiError::BadRequest("Document verification failed".into()));
    }

    let record = Document {
        user_id: auth.user_id,
        kind,
        encrypted_path: state.cipher.encrypt(key)?,
        status: DocumentStatus::Verified,
        created_at: Utc::now(),
    };
    state.store.put_document(&record).await?;

    state
        .emitter
        .emit(
            EventType::DocumentVerified,
            json!({ "userId": auth.user_id, "type": kind.as_str() }),
        )
        .await;

    Ok(Json(StatusResponse {
        status: DocumentStatus::Verified.as_str(),
    }))
}

/// Latest status of one document kind.
pub async fn status(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusResponse>, ApiError> {
    let kind = query
        .kind
        .as_deref()
        .and_then(DocumentKind::parse)
        .ok_or_else(|| ApiError::BadRequest("Invalid document type".into()))?;

    let status = state
        .store
        .latest_document(&auth.user_id, kind)
        .await?
        .map_or("pending", |doc| doc.status.as_str());

    Ok(Json(StatusResponse { status }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_must_stay_under_the_callers_prefix() {
        let me = UserId::generate();
        let other = UserId::generate();
        let prefix = document::user_prefix(&me);

        assert!(owned_by(&format!("{prefix}1700000000000.pdf"), &me));
        assert!(!owned_by(&format!("{prefix}1700000000000.pdf"), &other));
        assert!(!owned_by(&format!("{prefix}../{other}/x.pdf"), &me));
        assert!(!owned_by("documents/", &me));
    }
}
