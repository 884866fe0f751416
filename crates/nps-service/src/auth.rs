//! Token issuance and authentication extractors.
//!
//! This module provides:
//! - `TokenIssuer` - HS256 access/refresh token pairs
//! - `AuthUser` - End-user authentication via bearer access token
//! - `AdminUser` - Authenticated user whose stored role is `ADMIN`

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use nps_core::{User, UserId};

use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// Constants
// ============================================================================

/// Access token lifetime in seconds.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 60 * 60;

/// Refresh token lifetime in seconds.
pub const REFRESH_TOKEN_TTL_SECS: i64 = 7 * 24 * 60 * 60;

// ============================================================================
// Tokens
// ============================================================================

/// Token failures.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// Bad signature, expired, wrong kind or malformed.
    #[error("invalid token")]
    Invalid,

    /// Signing failed.
    #[error("token encoding failed: {0}")]
    Encode(String),
}

/// Which secret a token is signed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Short-lived API token.
    Access,
    /// Long-lived token exchanged for a new pair.
    Refresh,
}

/// JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID).
    pub sub: String,
    /// Issued at.
    pub iat: i64,
    /// Expiration time.
    pub exp: i64,
    /// Random token id, so two pairs issued in the same second differ.
    pub jti: String,
    /// Token kind.
    pub typ: TokenKind,
}

/// An access/refresh pair as returned to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    /// Access token.
    pub token: String,
    /// Refresh token.
    pub refresh_token: String,
}

struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: i64,
}

impl SigningKeys {
    fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        }
    }
}

/// Signs and checks tokens. Access and refresh tokens use separate secrets.
pub struct TokenIssuer {
    access: SigningKeys,
    refresh: SigningKeys,
}

impl TokenIssuer {
    /// Issuer for the two secrets.
    #[must_use]
    pub fn new(jwt_secret: &str, refresh_secret: &str) -> Self {
        Self {
            access: SigningKeys::new(jwt_secret, ACCESS_TOKEN_TTL_SECS),
            refresh: SigningKeys::new(refresh_secret, REFRESH_TOKEN_TTL_SECS),
        }
    }

    const fn keys(&self, kind: TokenKind) -> &SigningKeys {
        match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        }
    }

    /// Sign one token.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Encode` if signing fails.
    pub fn sign(&self, user_id: &UserId, kind: TokenKind) -> Result<String, TokenError> {
        let keys = self.keys(kind);
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now,
            exp: now + keys.ttl_secs,
            jti: uuid::Uuid::new_v4().to_string(),
            typ: kind,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(|e| TokenError::Encode(e.to_string()))
    }

    /// Sign a fresh access/refresh pair.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Encode` if signing fails.
    pub fn issue(&self, user_id: &UserId) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            token: self.sign(user_id, TokenKind::Access)?,
            refresh_token: self.sign(user_id, TokenKind::Refresh)?,
        })
    }

    /// Check a token of the given kind and return the user it was issued to.
    ///
    /// # Errors
    ///
    /// Returns `TokenError::Invalid` for anything but a live token of `kind`.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<UserId, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.keys(kind).decoding, &validation).map_err(|e| {
            tracing::debug!(error = %e, "JWT validation failed");
            TokenError::Invalid
        })?;

        if data.claims.typ != kind {
            return Err(TokenError::Invalid);
        }
        data.claims
            .sub
            .parse::<UserId>()
            .map_err(|_| TokenError::Invalid)
    }
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenIssuer(..)")
    }
}

// ============================================================================
// Extractors
// ============================================================================

fn bearer(parts: &Parts) -> Result<&str, ApiError> {
    parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)
}

/// An authenticated user extracted from a bearer access token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The user ID.
    pub user_id: UserId,
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer(parts)?;
        let user_id = state.tokens.verify(token, TokenKind::Access)?;
        Ok(Self { user_id })
    }
}

/// An authenticated user holding the `ADMIN` role.
///
/// The role is read from the datastore on every request, so revoking it takes
/// effect immediately.
#[derive(Debug, Clone)]
pub struct AdminUser {
    /// The admin's record.
    pub user: User,
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let AuthUser { user_id } = AuthUser::from_request_parts(parts, state).await?;
        let user = state
            .store
            .get_user(&user_id)
            .await?
            .ok_or(ApiError::Unauthorized)?;

        if !user.is_admin() {
            tracing::warn!(user_id = %user_id, "Admin access denied");
            return Err(ApiError::Forbidden);
        }

        Ok(Self { user })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::new("access-secret", "refresh-secret")
    }

    #[test]
    fn pair_round_trips_per_kind() {
        let issuer = issuer();
        let id = UserId::generate();
        let pair = issuer.issue(&id).unwrap();

        assert_eq!(issuer.verify(&pair.token, TokenKind::Access).unwrap(), id);
        assert_eq!(
            issuer.verify(&pair.refresh_token, TokenKind::Refresh).unwrap(),
            id
        );
    }

    #[test]
    fn kinds_are_not_interchangeable() {
        let issuer = issuer();
        let pair = issuer.issue(&UserId::generate()).unwrap();

        assert!(issuer.verify(&pair.refresh_token, TokenKind::Access).is_err());
        assert!(issuer.verify(&pair.token, TokenKind::Refresh).is_err());
    }

    #[test]
    fn same_secret_still_checks_the_kind_claim() {
        let issuer = TokenIssuer::new("same", "same");
        let pair = issuer.issue(&UserId::generate()).unwrap();
        assert!(issuer.verify(&pair.refresh_token, TokenKind::Access).is_err());
    }

    #[test]
    fn consecutive_pairs_differ() {
        let issuer = issuer();
        let id = UserId::generate();
        let a = issuer.issue(&id).unwrap();
        let b = issuer.issue(&id).unwrap();
        assert_ne!(a.refresh_token, b.refresh_token);
    }

    #[test]
    fn foreign_signature_is_rejected() {
        let pair = TokenIssuer::new("other", "other-refresh")
            .issue(&UserId::generate())
            .unwrap();
        assert!(issuer().verify(&pair.token, TokenKind::Access).is_err());
        assert!(issuer().verify("not-a-jwt", TokenKind::Access).is_err());
    }
}
