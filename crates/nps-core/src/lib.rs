//! Core types and rules for the NPS onboarding service.
//!
//! This crate provides the foundational types used throughout the onboarding platform:
//!
//! - **Identifiers**: `UserId`, `SessionId`, `EventId`, `OrderId`
//! - **Identity inputs**: `Mobile`, `Aadhaar`, `Pan`, `OtpCode`
//! - **Onboarding**: `OnboardingStep`, `KycStatus`, the transition guard and `Change`
//! - **Records**: `User`, `KycRecord`, `UserProfile`, `PfmSelection`, `Payment`,
//!   `Consent`, `Document`
//! - **Analytics**: `AnalyticsEvent`, `QueueMessage`, `EventType`
//!
//! # Onboarding order
//!
//! A user moves forward through
//! `KYC_PENDING → KYC_COMPLETED → PROFILE_COMPLETED → PFM_SELECTED → PAYMENT_COMPLETED → PRAN_GENERATED`
//! and never backward. Every mutation of a user's position goes through
//! [`onboarding::evaluate`], which is a pure function so that storage backends can run
//! it inside their own transaction.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod consent;
pub mod document;
pub mod error;
pub mod event;
pub mod identity;
pub mod ids;
pub mod kyc;
pub mod onboarding;
pub mod payment;
pub mod pfm;
pub mod profile;
pub mod user;

pub use consent::{Consent, ConsentType};
pub use document::{Document, DocumentKind, DocumentStatus, FileType};
pub use error::{CoreError, Result};
pub use event::{AnalyticsEvent, EventType, QueueMessage};
pub use identity::{Aadhaar, Mobile, OtpCode, Pan};
pub use ids::{EventId, IdError, OrderId, SessionId, UserId};
pub use kyc::{Demographics, KycRecord, VideoKycSession, VideoKycStatus};
pub use onboarding::{
    evaluate, Change, GuardPolicy, GuardViolation, KycStatus, OnboardingStep, Position,
    Transition, Verdict,
};
pub use payment::{Payment, PaymentStatus, Pran};
pub use pfm::{find_pfm, pfm_catalog, Allocation, AllocationInput, Pfm, PfmSelection, RiskLevel};
pub use profile::{AddressDetails, NomineeDetails, PersonalDetails, UserProfile};
pub use user::{Role, User};
