//! Error types for the onboarding core.

use crate::ids::IdError;
use crate::onboarding::GuardViolation;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while validating input or applying onboarding rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// Input failed a format check (digit count, enum value, regex).
    #[error("{0}")]
    Validation(String),

    /// The requested transition is not allowed from the current position.
    #[error(transparent)]
    Guard(#[from] GuardViolation),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}

impl CoreError {
    /// Shorthand for a validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
