//! Storage layer for the NPS onboarding service.
//!
//! This crate provides the durable datastore behind the [`Store`] trait and the
//! ephemeral key/value [`cache::Cache`] used for OTPs and rate limits.
//!
//! # Backends
//!
//! - [`MemoryStore`]: a single mutex around in-process maps. Used by tests and local runs.
//! - [`PgStore`]: PostgreSQL through `sqlx`, migrations embedded from `migrations/`.
//!
//! # Guarded writes
//!
//! Every change to a user's onboarding position goes through
//! [`Store::apply_change`]. Implementations read the user under a lock, run
//! [`nps_core::evaluate`], and perform the domain write together with the position
//! update, so two concurrent requests can never both pass the guard against the
//! same stale position.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod cache;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod report;

pub use cache::{Cache, CacheError, MemoryCache};
pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use report::{KycReportPage, KycReportRow, OnboardingSummary, StepCount};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use nps_core::{
    AnalyticsEvent, Change, Consent, Document, DocumentKind, GuardPolicy, KycRecord, Mobile,
    OrderId, Payment, PfmSelection, User, UserId, UserProfile,
};

/// Result of a guarded change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The change was written. Carries the updated user.
    Applied(User),
    /// The change had already happened. Nothing was written.
    Replayed(User),
}

impl Outcome {
    /// The user after the call.
    #[must_use]
    pub fn user(&self) -> &User {
        match self {
            Self::Applied(u) | Self::Replayed(u) => u,
        }
    }

    /// Consume into the user.
    #[must_use]
    pub fn into_user(self) -> User {
        match self {
            Self::Applied(u) | Self::Replayed(u) => u,
        }
    }

    /// Whether anything was written.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Result of a payment gateway callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// The order was already `SUCCESS`. Nothing was written.
    AlreadyProcessed(Payment),
    /// The order is now `SUCCESS` and the payer is at `PAYMENT_COMPLETED` or later.
    Succeeded(Payment),
    /// The order is now `FAILED`.
    Failed(Payment),
    /// The order expired before the callback. Nothing was written.
    Expired(Payment),
}

impl Settlement {
    /// The order after the call.
    #[must_use]
    pub fn payment(&self) -> &Payment {
        match self {
            Self::AlreadyProcessed(p) | Self::Succeeded(p) | Self::Failed(p) | Self::Expired(p) => {
                p
            }
        }
    }
}

/// The storage trait defining all datastore operations.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (PostgreSQL, in-memory for testing).
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // Users and sessions
    // =========================================================================

    /// Find the user with `mobile`, creating one at the start of onboarding if none
    /// exists. Marks the mobile verified. Returns the user and whether it was created.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn find_or_create_user(&self, mobile: &Mobile) -> Result<(User, bool)>;

    /// Insert a fully formed user, for seeding admins.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the mobile is taken.
    async fn insert_user(&self, user: &User) -> Result<()>;

    /// Get a user by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_user(&self, id: &UserId) -> Result<Option<User>>;

    /// Get a user by mobile.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_user_by_mobile(&self, mobile: &Mobile) -> Result<Option<User>>;

    /// Replace the stored refresh token. `None` ends the session.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the user doesn't exist.
    async fn set_refresh_token(&self, id: &UserId, token: Option<&str>) -> Result<()>;

    /// Swap the refresh token from `current` to `next` only if `current` is still
    /// the stored one. Returns whether the swap happened.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn rotate_refresh_token(&self, id: &UserId, current: &str, next: &str) -> Result<bool>;

    // =========================================================================
    // Guarded onboarding changes
    // =========================================================================

    /// Check `change` against the user's current position and, if allowed, write it
    /// together with the new position in one atomic unit.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Guard` if the transition is not allowed,
    /// `StoreError::NotFound` for an unknown user or video session.
    async fn apply_change(&self, id: &UserId, change: Change, policy: &GuardPolicy)
        -> Result<Outcome>;

    /// Apply a gateway callback to an order. Idempotent: an order already in
    /// `SUCCESS` is left alone. A success moves the payer forward to
    /// `PAYMENT_COMPLETED`, never backward.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` for an unknown order.
    async fn settle_payment(&self, order_id: &OrderId, success: bool) -> Result<Settlement>;

    /// Mark `CREATED` orders older than `created_before` as `EXPIRED`. Returns how
    /// many were expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn expire_payments(&self, created_before: DateTime<Utc>) -> Result<u64>;

    // =========================================================================
    // Reads
    // =========================================================================

    /// KYC record for a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_kyc(&self, id: &UserId) -> Result<Option<KycRecord>>;

    /// Profile for a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_profile(&self, id: &UserId) -> Result<Option<UserProfile>>;

    /// PFM selection for a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_pfm_selection(&self, id: &UserId) -> Result<Option<PfmSelection>>;

    /// A payment order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_payment(&self, order_id: &OrderId) -> Result<Option<Payment>>;

    // =========================================================================
    // Consents and documents
    // =========================================================================

    /// Append a consent to the audit trail.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn append_consent(&self, consent: &Consent) -> Result<()>;

    /// All consents of a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_consents(&self, id: &UserId) -> Result<Vec<Consent>>;

    /// Record a verified document.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn put_document(&self, document: &Document) -> Result<()>;

    /// Most recent document of `kind` for a user.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn latest_document(&self, id: &UserId, kind: DocumentKind) -> Result<Option<Document>>;

    // =========================================================================
    // Analytics
    // =========================================================================

    /// Append one analytics row.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn record_event(&self, event: &AnalyticsEvent) -> Result<()>;

    /// Most recent analytics rows, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_events(&self, limit: usize) -> Result<Vec<AnalyticsEvent>>;

    /// Counts of users per step and KYC outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn onboarding_summary(&self) -> Result<OnboardingSummary>;

    /// Users past `NOT_STARTED`, newest first. `page` starts at 1.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn kyc_report(&self, page: u32, limit: u32) -> Result<KycReportPage>;
}
