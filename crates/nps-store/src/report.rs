//! Aggregates for the admin dashboard.

use chrono::{DateTime, Utc};
use serde::Serialize;

use nps_core::{KycStatus, Mobile, OnboardingStep, UserId};

/// Number of users sitting at one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepCount {
    /// The step.
    pub onboarding_step: OnboardingStep,
    /// Users currently there.
    pub count: u64,
}

/// Population counts used for the analytics summary and drop-off report.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OnboardingSummary {
    /// All users.
    pub total_users: u64,
    /// Users whose KYC is complete (`PAN_VERIFIED` or `APPROVED`).
    pub kyc_completed: u64,
    /// Users at `PAYMENT_COMPLETED` or later.
    pub payment_completed: u64,
    /// Users per step, in step order. Steps with nobody are omitted.
    pub by_step: Vec<StepCount>,
}

impl OnboardingSummary {
    /// Build from per-user positions.
    #[must_use]
    pub fn from_positions(positions: impl IntoIterator<Item = (OnboardingStep, KycStatus)>) -> Self {
        Self::from_grouped(positions.into_iter().map(|(step, kyc)| (step, kyc, 1)))
    }

    /// Build from `(step, kyc, users)` groups, as returned by a `GROUP BY`.
    #[must_use]
    pub fn from_grouped(
        groups: impl IntoIterator<Item = (OnboardingStep, KycStatus, u64)>,
    ) -> Self {
        let mut summary = Self::default();
        let mut counts = [0u64; OnboardingStep::ALL.len()];
        for (step, kyc, users) in groups {
            summary.total_users += users;
            if matches!(kyc, KycStatus::PanVerified | KycStatus::Approved) {
                summary.kyc_completed += users;
            }
            if step >= OnboardingStep::PaymentCompleted {
                summary.payment_completed += users;
            }
            counts[step as usize] += users;
        }
        summary.by_step = OnboardingStep::ALL
            .into_iter()
            .zip(counts)
            .filter(|(_, count)| *count > 0)
            .map(|(onboarding_step, count)| StepCount {
                onboarding_step,
                count,
            })
            .collect();
        summary
    }

    /// Percentage of users with completed KYC, 0 when there are no users.
    #[must_use]
    pub fn kyc_approval_rate(&self) -> f64 {
        percentage(self.kyc_completed, self.total_users)
    }

    /// Percentage of users who have paid, 0 when there are no users.
    #[must_use]
    pub fn payment_completion_rate(&self) -> f64 {
        percentage(self.payment_completed, self.total_users)
    }
}

#[allow(clippy::cast_precision_loss)]
fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// One line of the KYC report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KycReportRow {
    /// User id.
    pub id: UserId,
    /// Mobile.
    pub mobile: Mobile,
    /// KYC status.
    pub kyc_status: KycStatus,
    /// Step.
    pub onboarding_step: OnboardingStep,
    /// Registered.
    pub created_at: DateTime<Utc>,
}

/// A page of the KYC report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KycReportPage {
    /// Page number, from 1.
    pub page: u32,
    /// Page size.
    pub limit: u32,
    /// Matching users across all pages.
    pub total: u64,
    /// This page.
    pub users: Vec<KycReportRow>,
}
