//! Consent audit trail.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::UserId;

/// The closed set of consents a user can give.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConsentType {
    /// Terms and conditions.
    TermsAndConditions,
    /// Privacy policy.
    PrivacyPolicy,
    /// Central KYC registry lookup.
    CkycConsent,
    /// Recording of the video KYC call.
    VideoKycConsent,
    /// NPS subscriber declaration.
    NpsDeclaration,
}

impl ConsentType {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TermsAndConditions => "TERMS_AND_CONDITIONS",
            Self::PrivacyPolicy => "PRIVACY_POLICY",
            Self::CkycConsent => "CKYC_CONSENT",
            Self::VideoKycConsent => "VIDEO_KYC_CONSENT",
            Self::NpsDeclaration => "NPS_DECLARATION",
        }
    }

    /// Parse a wire name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        [
            Self::TermsAndConditions,
            Self::PrivacyPolicy,
            Self::CkycConsent,
            Self::VideoKycConsent,
            Self::NpsDeclaration,
        ]
        .into_iter()
        .find(|c| c.as_str() == s)
    }
}

/// One accepted consent. Rows are never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consent {
    /// Who consented.
    pub user_id: UserId,
    /// What was consented to.
    pub consent_type: ConsentType,
    /// Client address as seen by the service.
    pub ip_address: Option<String>,
    /// When.
    pub accepted_at: DateTime<Utc>,
}
