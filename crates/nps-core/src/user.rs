//! User records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::Mobile;
use crate::ids::UserId;
use crate::onboarding::{KycStatus, OnboardingStep, Position};
use crate::payment::Pran;

/// Access role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Subscriber going through onboarding.
    #[default]
    User,
    /// Back-office analyst with access to reports.
    Admin,
}

impl Role {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Admin => "ADMIN",
        }
    }

    /// Parse a wire name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "USER" => Some(Self::User),
            "ADMIN" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// The identity anchor. Created on first OTP login, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Id.
    pub id: UserId,
    /// Unique mobile number.
    pub mobile: Mobile,
    /// Mobile verified by OTP.
    pub is_verified: bool,
    /// Coarse step.
    pub onboarding_step: OnboardingStep,
    /// KYC status.
    pub kyc_status: KycStatus,
    /// Access role.
    pub role: Role,
    /// The single active refresh token.
    #[serde(skip_serializing)]
    pub refresh_token: Option<String>,
    /// Assigned once at the end of onboarding.
    pub pran: Option<Pran>,
    /// Created.
    pub created_at: DateTime<Utc>,
    /// Last updated.
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// A new verified user at the start of onboarding.
    #[must_use]
    pub fn new(mobile: Mobile) -> Self {
        let now = Utc::now();
        Self {
            id: UserId::generate(),
            mobile,
            is_verified: true,
            onboarding_step: OnboardingStep::KycPending,
            kyc_status: KycStatus::NotStarted,
            role: Role::User,
            refresh_token: None,
            pran: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Current position on both onboarding axes.
    #[must_use]
    pub const fn position(&self) -> Position {
        Position {
            onboarding_step: self.onboarding_step,
            kyc_status: self.kyc_status,
        }
    }

    /// Move to `position`. Only stores call this, after the guard accepted.
    pub fn set_position(&mut self, position: Position) {
        self.onboarding_step = position.onboarding_step;
        self.kyc_status = position.kyc_status;
        self.updated_at = Utc::now();
    }

    /// Whether the user may read admin reports.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}
