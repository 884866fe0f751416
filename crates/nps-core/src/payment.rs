//! Payment orders and PRAN issuance.

use std::fmt;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ids::{OrderId, UserId};

/// Lifecycle of a payment order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Order created, waiting for the gateway.
    Created,
    /// Gateway confirmed the payment.
    Success,
    /// Gateway reported a failure.
    Failed,
    /// No callback arrived in time. The order no longer accepts callbacks.
    Expired,
}

impl PaymentStatus {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Expired => "EXPIRED",
        }
    }

    /// Parse a wire name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CREATED" => Some(Self::Created),
            "SUCCESS" => Some(Self::Success),
            "FAILED" => Some(Self::Failed),
            "EXPIRED" => Some(Self::Expired),
            _ => None,
        }
    }
}

/// A payment attempt. A user may have many.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    /// Order id shared with the gateway.
    pub order_id: OrderId,
    /// Payer.
    pub user_id: UserId,
    /// Amount in whole rupees.
    pub amount: i64,
    /// Current status.
    pub status: PaymentStatus,
    /// Created.
    pub created_at: DateTime<Utc>,
    /// Last updated.
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// A new order in `CREATED`.
    #[must_use]
    pub fn new(order_id: OrderId, user_id: UserId, amount: i64) -> Self {
        let now = Utc::now();
        Self {
            order_id,
            user_id,
            amount,
            status: PaymentStatus::Created,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Permanent Retirement Account Number: `PRAN` followed by eight digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pran(String);

impl Pran {
    /// Generate a fresh PRAN.
    #[must_use]
    pub fn generate() -> Self {
        let n: u32 = rand::thread_rng().gen_range(0..100_000_000);
        Self(format!("PRAN{n:08}"))
    }

    /// Wrap a stored value.
    #[must_use]
    pub fn from_stored(value: String) -> Self {
        Self(value)
    }

    /// The PRAN string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Pran {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pran_shape() {
        for _ in 0..100 {
            let pran = Pran::generate();
            let s = pran.as_str();
            assert_eq!(s.len(), 12);
            assert!(s.starts_with("PRAN"));
            assert!(s[4..].bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn status_wire_names() {
        for status in [
            PaymentStatus::Created,
            PaymentStatus::Success,
            PaymentStatus::Failed,
            PaymentStatus::Expired,
        ] {
            assert_eq!(PaymentStatus::parse(status.as_str()), Some(status));
        }
    }
}
