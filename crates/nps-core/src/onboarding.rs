//! Onboarding state machine.
//!
//! A user's position has two axes: the coarse [`OnboardingStep`] and the
//! [`KycStatus`]. Both only move forward. [`evaluate`] decides, for a requested
//! [`Transition`], whether the position advances, whether the request is an
//! idempotent retry that must not write anything, or whether it is rejected.
//!
//! `evaluate` is pure. Stores call it while holding the user's row lock so the
//! read, the check and the write form one atomic unit.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{OrderId, SessionId};
use crate::kyc::Demographics;
use crate::payment::Pran;
use crate::pfm::Allocation;
use crate::profile::{AddressDetails, NomineeDetails, PersonalDetails};
use crate::Pan;

// ============================================================================
// Axes
// ============================================================================

/// Coarse onboarding position, in forward order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OnboardingStep {
    /// Registered, KYC not finished.
    KycPending,
    /// Aadhaar and PAN (or video) KYC done.
    KycCompleted,
    /// Personal details saved.
    ProfileCompleted,
    /// Fund manager and allocation chosen.
    PfmSelected,
    /// Contribution payment confirmed.
    PaymentCompleted,
    /// PRAN issued. Terminal.
    PranGenerated,
}

impl OnboardingStep {
    /// All steps in forward order.
    pub const ALL: [Self; 6] = [
        Self::KycPending,
        Self::KycCompleted,
        Self::ProfileCompleted,
        Self::PfmSelected,
        Self::PaymentCompleted,
        Self::PranGenerated,
    ];

    /// Wire name, as stored in the datastore.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::KycPending => "KYC_PENDING",
            Self::KycCompleted => "KYC_COMPLETED",
            Self::ProfileCompleted => "PROFILE_COMPLETED",
            Self::PfmSelected => "PFM_SELECTED",
            Self::PaymentCompleted => "PAYMENT_COMPLETED",
            Self::PranGenerated => "PRAN_GENERATED",
        }
    }

    /// Parse a wire name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|step| step.as_str() == s)
    }
}

impl fmt::Display for OnboardingStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// KYC progress.
///
/// `PanVerified` and `VideoRequired` share a rank: they are alternative
/// routes to `Approved` and neither may turn into the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum KycStatus {
    /// Nothing verified.
    NotStarted,
    /// Aadhaar OTP verified.
    AadhaarVerified,
    /// PAN verified after Aadhaar.
    PanVerified,
    /// PAN skipped, video KYC in progress.
    VideoRequired,
    /// Video KYC approved.
    Approved,
}

impl KycStatus {
    /// All statuses.
    pub const ALL: [Self; 5] = [
        Self::NotStarted,
        Self::AadhaarVerified,
        Self::PanVerified,
        Self::VideoRequired,
        Self::Approved,
    ];

    /// Position on the forward order.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::NotStarted => 0,
            Self::AadhaarVerified => 1,
            Self::PanVerified | Self::VideoRequired => 2,
            Self::Approved => 3,
        }
    }

    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::AadhaarVerified => "AADHAAR_VERIFIED",
            Self::PanVerified => "PAN_VERIFIED",
            Self::VideoRequired => "VIDEO_REQUIRED",
            Self::Approved => "APPROVED",
        }
    }

    /// Parse a wire name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.as_str() == s)
    }
}

impl fmt::Display for KycStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user's position on both axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    /// Coarse step.
    pub onboarding_step: OnboardingStep,
    /// KYC status.
    pub kyc_status: KycStatus,
}

impl Position {
    /// Position of a freshly registered user.
    pub const START: Self = Self {
        onboarding_step: OnboardingStep::KycPending,
        kyc_status: KycStatus::NotStarted,
    };

    fn with_step(self, step: OnboardingStep) -> Self {
        Self {
            onboarding_step: step,
            ..self
        }
    }

    fn with_kyc(self, status: KycStatus) -> Self {
        Self {
            kyc_status: status,
            ..self
        }
    }

    /// Whether `next` is reachable from `self` without moving backward on either axis.
    #[must_use]
    pub fn precedes_or_equals(self, next: Self) -> bool {
        let kyc_ok = next.kyc_status == self.kyc_status
            || next.kyc_status.rank() > self.kyc_status.rank();
        next.onboarding_step >= self.onboarding_step && kyc_ok
    }
}

// ============================================================================
// Transitions
// ============================================================================

/// Operations that read or move a user's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Aadhaar OTP verified (authenticated or public flow).
    VerifyAadhaar,
    /// PAN verified.
    VerifyPan,
    /// Video KYC session opened.
    StartVideo,
    /// Video KYC session approved.
    CompleteVideo,
    /// Personal profile details saved.
    SavePersonal,
    /// Address saved.
    SaveAddress,
    /// Nominee saved.
    SaveNominee,
    /// Fund manager chosen.
    SelectPfm,
    /// Payment order created.
    InitiatePayment,
    /// Gateway reported a successful payment.
    ConfirmPayment,
    /// PRAN issued.
    GeneratePran,
}

impl Transition {
    /// Every transition, for exhaustive checks.
    pub const ALL: [Self; 11] = [
        Self::VerifyAadhaar,
        Self::VerifyPan,
        Self::StartVideo,
        Self::CompleteVideo,
        Self::SavePersonal,
        Self::SaveAddress,
        Self::SaveNominee,
        Self::SelectPfm,
        Self::InitiatePayment,
        Self::ConfirmPayment,
        Self::GeneratePran,
    ];
}

/// Environment-dependent switches for the guard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuardPolicy {
    /// Allow `PFM_SELECTED → PRAN_GENERATED` without a confirmed payment.
    /// Only ever set in development.
    pub allow_simulated_payment: bool,
}

impl GuardPolicy {
    /// Production policy: payment must be confirmed by the gateway.
    pub const STRICT: Self = Self {
        allow_simulated_payment: false,
    };

    /// Development policy: PRAN may be issued straight after PFM selection.
    pub const DEVELOPMENT: Self = Self {
        allow_simulated_payment: true,
    };
}

/// Result of a successful guard check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Perform the write and store the new position.
    Apply(Position),
    /// The transition already happened. Answer success, write nothing.
    Replay,
}

/// Why a transition was rejected. The message is shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GuardViolation {
    /// Aadhaar verified before.
    #[error("Aadhaar already verified")]
    AadhaarAlreadyVerified,

    /// PAN or video KYC attempted before Aadhaar.
    #[error("Complete Aadhaar verification first")]
    AadhaarRequired,

    /// PAN attempted on the video route.
    #[error("PAN verification is not available while video KYC is in progress")]
    PanUnavailable,

    /// KYC approved before.
    #[error("KYC already approved")]
    KycAlreadyApproved,

    /// Video completion without a started session.
    #[error("Start video KYC before completing it")]
    VideoNotStarted,

    /// Profile attempted before KYC completed.
    #[error("Complete KYC before submitting profile details")]
    KycIncomplete,

    /// Personal details resubmitted after PFM selection.
    #[error("Profile already completed")]
    ProfileAlreadyCompleted,

    /// Address, nominee or PFM attempted before the personal details.
    #[error("Complete your profile first")]
    ProfileRequired,

    /// Profile edits after payment.
    #[error("Profile can no longer be changed after payment")]
    ProfileLocked,

    /// PFM change after payment.
    #[error("PFM already selected and payment done")]
    PfmLocked,

    /// Second payment after a confirmed one.
    #[error("Payment already completed")]
    PaymentAlreadyCompleted,

    /// PRAN requested twice.
    #[error("PRAN already generated")]
    PranAlreadyGenerated,

    /// PRAN requested too early.
    #[error("Cannot generate PRAN from step {0}")]
    PranNotAllowed(OnboardingStep),
}

/// Decide what `transition` does to a user at `position`.
///
/// # Errors
///
/// Returns a [`GuardViolation`] when the transition is not permitted from `position`.
pub fn evaluate(
    position: Position,
    transition: Transition,
    policy: &GuardPolicy,
) -> Result<Verdict, GuardViolation> {
    use KycStatus as K;
    use OnboardingStep as S;
    use Verdict::{Apply, Replay};

    let step = position.onboarding_step;
    let kyc = position.kyc_status;

    match transition {
        Transition::VerifyAadhaar => match kyc {
            K::NotStarted => Ok(Apply(position.with_kyc(K::AadhaarVerified))),
            _ => Err(GuardViolation::AadhaarAlreadyVerified),
        },

        Transition::VerifyPan => match kyc {
            K::AadhaarVerified => Ok(Apply(
                position
                    .with_kyc(K::PanVerified)
                    .with_step(step.max(S::KycCompleted)),
            )),
            K::PanVerified | K::Approved => Ok(Replay),
            K::NotStarted => Err(GuardViolation::AadhaarRequired),
            K::VideoRequired => Err(GuardViolation::PanUnavailable),
        },

        Transition::StartVideo => match kyc {
            K::NotStarted => Err(GuardViolation::AadhaarRequired),
            K::Approved => Err(GuardViolation::KycAlreadyApproved),
            K::AadhaarVerified => Ok(Apply(position.with_kyc(K::VideoRequired))),
            K::PanVerified | K::VideoRequired => Ok(Apply(position)),
        },

        Transition::CompleteVideo => match kyc {
            K::PanVerified | K::VideoRequired => Ok(Apply(
                position
                    .with_kyc(K::Approved)
                    .with_step(step.max(S::KycCompleted)),
            )),
            K::Approved => Ok(Replay),
            K::NotStarted | K::AadhaarVerified => Err(GuardViolation::VideoNotStarted),
        },

        Transition::SavePersonal => {
            if step < S::KycCompleted {
                Err(GuardViolation::KycIncomplete)
            } else if step >= S::PfmSelected {
                Err(GuardViolation::ProfileAlreadyCompleted)
            } else {
                Ok(Apply(position.with_step(S::ProfileCompleted)))
            }
        }

        Transition::SaveAddress | Transition::SaveNominee => {
            if step < S::ProfileCompleted {
                Err(GuardViolation::ProfileRequired)
            } else if step >= S::PaymentCompleted {
                Err(GuardViolation::ProfileLocked)
            } else {
                Ok(Apply(position))
            }
        }

        Transition::SelectPfm => {
            if step >= S::PaymentCompleted {
                Err(GuardViolation::PfmLocked)
            } else if step < S::ProfileCompleted {
                Err(GuardViolation::ProfileRequired)
            } else {
                Ok(Apply(position.with_step(S::PfmSelected)))
            }
        }

        Transition::InitiatePayment => {
            if step >= S::PaymentCompleted {
                Err(GuardViolation::PaymentAlreadyCompleted)
            } else {
                Ok(Apply(position))
            }
        }

        Transition::ConfirmPayment => {
            if step >= S::PaymentCompleted {
                Ok(Replay)
            } else {
                Ok(Apply(position.with_step(S::PaymentCompleted)))
            }
        }

        Transition::GeneratePran => match step {
            S::PranGenerated => Err(GuardViolation::PranAlreadyGenerated),
            S::PaymentCompleted => Ok(Apply(position.with_step(S::PranGenerated))),
            S::PfmSelected if policy.allow_simulated_payment => {
                Ok(Apply(position.with_step(S::PranGenerated)))
            }
            other => Err(GuardViolation::PranNotAllowed(other)),
        },
    }
}

// ============================================================================
// Changes
// ============================================================================

/// A transition together with the data it writes.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Record a verified Aadhaar.
    VerifyAadhaar {
        /// Last four digits of the Aadhaar number.
        last4: String,
        /// Demographics returned by the eKYC provider.
        demographics: Demographics,
    },
    /// Record a verified PAN.
    VerifyPan {
        /// The PAN.
        pan: Pan,
    },
    /// Open a video KYC session.
    StartVideo {
        /// New session id.
        session_id: SessionId,
    },
    /// Approve a video KYC session.
    CompleteVideo {
        /// Session to approve. Must belong to the user.
        session_id: SessionId,
        /// Blob key of the uploaded recording, if any.
        recording_key: Option<String>,
    },
    /// Save personal details.
    SavePersonal(PersonalDetails),
    /// Save address.
    SaveAddress(AddressDetails),
    /// Save nominee.
    SaveNominee(NomineeDetails),
    /// Store the chosen fund manager.
    SelectPfm {
        /// Catalogue id.
        pfm_id: u32,
        /// Normalised allocation.
        allocation: Allocation,
    },
    /// Create a payment order.
    InitiatePayment {
        /// New order id.
        order_id: OrderId,
        /// Amount in whole rupees.
        amount: i64,
    },
    /// Issue a PRAN.
    GeneratePran {
        /// Freshly generated PRAN.
        pran: Pran,
    },
}

impl Change {
    /// The guarded transition this change performs.
    #[must_use]
    pub const fn transition(&self) -> Transition {
        match self {
            Self::VerifyAadhaar { .. } => Transition::VerifyAadhaar,
            Self::VerifyPan { .. } => Transition::VerifyPan,
            Self::StartVideo { .. } => Transition::StartVideo,
            Self::CompleteVideo { .. } => Transition::CompleteVideo,
            Self::SavePersonal(_) => Transition::SavePersonal,
            Self::SaveAddress(_) => Transition::SaveAddress,
            Self::SaveNominee(_) => Transition::SaveNominee,
            Self::SelectPfm { .. } => Transition::SelectPfm,
            Self::InitiatePayment { .. } => Transition::InitiatePayment,
            Self::GeneratePran { .. } => Transition::GeneratePran,
        }
    }
}
