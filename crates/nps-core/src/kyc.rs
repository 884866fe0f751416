//! KYC records and video sessions.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{SessionId, UserId};

/// Demographic fields returned by the eKYC provider after Aadhaar verification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Demographics {
    /// Full name.
    pub name: String,
    /// Date of birth.
    pub dob: NaiveDate,
    /// Gender code (`M`, `F`, `T`).
    pub gender: String,
}

/// State of video KYC for a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VideoKycStatus {
    /// No session started.
    #[default]
    None,
    /// A session is open.
    Initiated,
    /// A session was approved.
    Approved,
}

impl VideoKycStatus {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Initiated => "INITIATED",
            Self::Approved => "APPROVED",
        }
    }

    /// Parse a wire name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "NONE" => Some(Self::None),
            "INITIATED" => Some(Self::Initiated),
            "APPROVED" => Some(Self::Approved),
            _ => None,
        }
    }
}

/// The KYC row for a user. Holds only the last four Aadhaar digits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KycRecord {
    /// Owner.
    pub user_id: UserId,
    /// Aadhaar verified.
    pub aadhaar_verified: bool,
    /// Last four Aadhaar digits.
    pub aadhaar_last4: Option<String>,
    /// Demographics from the eKYC provider.
    pub demographics: Option<Demographics>,
    /// PAN verified.
    pub pan_verified: bool,
    /// PAN, upper case.
    pub pan_number: Option<String>,
    /// Video KYC state.
    pub video_kyc_status: VideoKycStatus,
    /// Created.
    pub created_at: DateTime<Utc>,
    /// Last updated.
    pub updated_at: DateTime<Utc>,
}

impl KycRecord {
    /// An empty record for `user_id`.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            aadhaar_verified: false,
            aadhaar_last4: None,
            demographics: None,
            pan_verified: false,
            pan_number: None,
            video_kyc_status: VideoKycStatus::None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A video KYC session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoKycSession {
    /// Session id handed to the client.
    pub session_id: SessionId,
    /// Owner.
    pub user_id: UserId,
    /// `Initiated` until completed, then `Approved`.
    pub status: VideoKycStatus,
    /// Recording key uploaded by the client, set on completion.
    pub recording_key: Option<String>,
    /// Created.
    pub created_at: DateTime<Utc>,
    /// Last updated.
    pub updated_at: DateTime<Utc>,
}
