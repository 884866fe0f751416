//! Aadhaar eKYC provider.
//!
//! Resolves an Aadhaar number to the mobile number linked to it and the
//! demographics on record. [`HttpEkyc`] calls a provider over HTTPS;
//! [`SandboxEkyc`] answers with fixed demo data for development.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use nps_core::{Aadhaar, Demographics, Mobile};

/// Error type for eKYC lookups.
#[derive(Debug, thiserror::Error)]
pub enum EkycError {
    /// The provider has no record for the Aadhaar number.
    #[error("Aadhaar number not found")]
    NotFound,

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The provider returned an error.
    #[error("eKYC provider error: HTTP {status}")]
    Api {
        /// HTTP status.
        status: u16,
    },

    /// The provider answered with data we cannot use.
    #[error("malformed eKYC response: {0}")]
    Malformed(String),
}

/// What the provider knows about an Aadhaar holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AadhaarIdentity {
    /// Mobile number the OTP is sent to and the account is keyed on.
    pub linked_mobile: Mobile,
    /// Name, date of birth and gender.
    pub demographics: Demographics,
}

/// Looks up Aadhaar holders.
#[async_trait]
pub trait EkycProvider: Send + Sync {
    /// Resolve `aadhaar`.
    ///
    /// # Errors
    ///
    /// Returns `EkycError::NotFound` for an unknown number, other variants when
    /// the provider fails.
    async fn lookup(&self, aadhaar: &Aadhaar) -> Result<AadhaarIdentity, EkycError>;
}

// ============================================================================
// Sandbox
// ============================================================================

/// Development provider. Every well-formed number resolves to a demo identity
/// whose linked mobile is `9` followed by the last nine Aadhaar digits.
#[derive(Debug, Clone, Copy, Default)]
pub struct SandboxEkyc;

impl SandboxEkyc {
    /// Linked mobile for `aadhaar`.
    ///
    /// # Errors
    ///
    /// Never fails for a validated Aadhaar.
    pub fn linked_mobile(aadhaar: &Aadhaar) -> Result<Mobile, EkycError> {
        let digits = aadhaar.expose();
        format!("9{}", &digits[3..])
            .parse()
            .map_err(|e: nps_core::CoreError| EkycError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl EkycProvider for SandboxEkyc {
    async fn lookup(&self, aadhaar: &Aadhaar) -> Result<AadhaarIdentity, EkycError> {
        let dob = NaiveDate::from_ymd_opt(1990, 1, 1)
            .ok_or_else(|| EkycError::Malformed("invalid sandbox date".into()))?;
        Ok(AadhaarIdentity {
            linked_mobile: Self::linked_mobile(aadhaar)?,
            demographics: Demographics {
                name: "John Doe".into(),
                dob,
                gender: "M".into(),
            },
        })
    }
}

// ============================================================================
// HTTP provider
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupResponse {
    mobile: String,
    name: String,
    dob: NaiveDate,
    gender: String,
}

/// eKYC provider reached over HTTPS with a bearer API key.
#[derive(Debug, Clone)]
pub struct HttpEkyc {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpEkyc {
    /// Create a client for the provider at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, EkycError> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl EkycProvider for HttpEkyc {
    async fn lookup(&self, aadhaar: &Aadhaar) -> Result<AadhaarIdentity, EkycError> {
        let response = self
            .client
            .post(format!("{}/v1/aadhaar/lookup", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "aadhaar": aadhaar.expose() }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(EkycError::NotFound);
        }
        if !status.is_success() {
            return Err(EkycError::Api {
                status: status.as_u16(),
            });
        }

        let body: LookupResponse = response.json().await?;
        let linked_mobile = body
            .mobile
            .parse()
            .map_err(|e: nps_core::CoreError| EkycError::Malformed(e.to_string()))?;

        Ok(AadhaarIdentity {
            linked_mobile,
            demographics: Demographics {
                name: body.name,
                dob: body.dob,
                gender: body.gender,
            },
        })
    }
}
