//! Pension fund managers and asset allocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::UserId;

// ============================================================================
// Catalogue
// ============================================================================

/// Risk label shown next to a fund manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RiskLevel {
    /// Low.
    #[serde(rename = "Low")]
    Low,
    /// Moderate low.
    #[serde(rename = "Moderate Low")]
    ModerateLow,
    /// Moderate.
    #[serde(rename = "Moderate")]
    Moderate,
    /// Moderate high.
    #[serde(rename = "Moderate High")]
    ModerateHigh,
    /// High.
    #[serde(rename = "High Risk")]
    High,
}

/// A fund manager in the catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pfm {
    /// Catalogue id.
    pub id: u32,
    /// Display name.
    pub name: &'static str,
    /// Marketing tag.
    pub tag: &'static str,
    /// Trailing three-year return.
    #[serde(rename = "returns3Y")]
    pub returns_3y: &'static str,
    /// Assets under management, crore rupees.
    pub aum: &'static str,
    /// Risk label.
    pub risk: RiskLevel,
}

const CATALOG: [Pfm; 7] = [
    Pfm {
        id: 1,
        name: "SBI Pension Funds Pvt. Ltd.",
        tag: "Recommended",
        returns_3y: "14.2%",
        aum: "45,210",
        risk: RiskLevel::ModerateHigh,
    },
    Pfm {
        id: 2,
        name: "HDFC Pension Management Co. Ltd.",
        tag: "Top Performer (Equity)",
        returns_3y: "14.8%",
        aum: "32,180",
        risk: RiskLevel::High,
    },
    Pfm {
        id: 3,
        name: "LIC Pension Fund Ltd.",
        tag: "Stable Growth History",
        returns_3y: "11.5%",
        aum: "85,440",
        risk: RiskLevel::ModerateLow,
    },
    Pfm {
        id: 4,
        name: "UTI Retirement Solutions Ltd.",
        tag: "Legacy Fund",
        returns_3y: "12.1%",
        aum: "28,900",
        risk: RiskLevel::Moderate,
    },
    Pfm {
        id: 5,
        name: "ICICI Prudential Pension Fund Mgmt.",
        tag: "Balanced",
        returns_3y: "13.6%",
        aum: "38,750",
        risk: RiskLevel::Moderate,
    },
    Pfm {
        id: 6,
        name: "Kotak Mahindra Pension Fund Ltd.",
        tag: "Growth Focus",
        returns_3y: "13.9%",
        aum: "21,300",
        risk: RiskLevel::ModerateHigh,
    },
    Pfm {
        id: 7,
        name: "Aditya Birla Sun Life Pension Mgmt.",
        tag: "Conservative Choice",
        returns_3y: "11.8%",
        aum: "15,600",
        risk: RiskLevel::Low,
    },
];

/// The full catalogue, ordered by id.
#[must_use]
pub fn pfm_catalog() -> &'static [Pfm] {
    &CATALOG
}

/// Look up a fund manager by id.
#[must_use]
pub fn find_pfm(id: u32) -> Option<&'static Pfm> {
    CATALOG.iter().find(|p| p.id == id)
}

// ============================================================================
// Allocation
// ============================================================================

fn default_equity() -> f64 {
    50.0
}

fn default_corporate() -> f64 {
    30.0
}

fn default_government() -> f64 {
    20.0
}

/// Raw allocation weights as submitted. Any non-negative numbers, not all zero.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct AllocationInput {
    /// Equity.
    #[serde(rename = "allocationE", default = "default_equity")]
    pub equity: f64,
    /// Corporate bonds.
    #[serde(rename = "allocationC", default = "default_corporate")]
    pub corporate: f64,
    /// Government securities.
    #[serde(rename = "allocationG", default = "default_government")]
    pub government: f64,
    /// Alternative assets.
    #[serde(rename = "allocationA", default)]
    pub alternative: f64,
}

impl Default for AllocationInput {
    fn default() -> Self {
        Self {
            equity: default_equity(),
            corporate: default_corporate(),
            government: default_government(),
            alternative: 0.0,
        }
    }
}

/// Integer percentages that always sum to 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    /// Equity.
    #[serde(rename = "allocationE")]
    pub equity: u8,
    /// Corporate bonds.
    #[serde(rename = "allocationC")]
    pub corporate: u8,
    /// Government securities.
    #[serde(rename = "allocationG")]
    pub government: u8,
    /// Alternative assets.
    #[serde(rename = "allocationA")]
    pub alternative: u8,
}

impl Allocation {
    /// The four shares in E, C, G, A order.
    #[must_use]
    pub const fn as_array(&self) -> [u8; 4] {
        [self.equity, self.corporate, self.government, self.alternative]
    }

    /// Build from already-normalised shares.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` unless the shares sum to exactly 100.
    pub fn from_shares(shares: [u8; 4]) -> Result<Self, CoreError> {
        let sum: u32 = shares.iter().map(|&s| u32::from(s)).sum();
        if sum != 100 {
            return Err(CoreError::validation("Allocation must sum to 100"));
        }
        Ok(Self {
            equity: shares[0],
            corporate: shares[1],
            government: shares[2],
            alternative: shares[3],
        })
    }

    /// Scale raw weights to integer percentages summing to 100.
    ///
    /// Each bucket gets `floor(100 * v / total)`. The rounding remainder goes to
    /// the bucket with the largest input, the earliest of E, C, G, A on ties.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` for negative or non-finite inputs, or when
    /// every input is zero.
    #[allow(clippy::cast_possible_truncation)] // clamped to 0..=100 first
    pub fn normalize(input: &AllocationInput) -> Result<Self, CoreError> {
        let raw = [
            input.equity,
            input.corporate,
            input.government,
            input.alternative,
        ];
        if raw.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(CoreError::validation(
                "Allocations must be non-negative numbers",
            ));
        }
        let total: f64 = raw.iter().sum();
        if total <= 0.0 || !total.is_finite() {
            return Err(CoreError::validation("At least one allocation must be positive"));
        }

        let mut shares = [0i32; 4];
        for (share, v) in shares.iter_mut().zip(raw) {
            *share = (v * 100.0 / total).floor().clamp(0.0, 100.0) as i32;
        }

        let mut largest = 0;
        for i in 1..4 {
            if raw[i] > raw[largest] {
                largest = i;
            }
        }
        let remainder = 100 - shares.iter().sum::<i32>();
        shares[largest] += remainder;

        let mut out = [0u8; 4];
        for (dst, src) in out.iter_mut().zip(shares) {
            *dst = u8::try_from(src)
                .map_err(|_| CoreError::validation("Allocation out of range"))?;
        }
        Self::from_shares(out)
    }
}

/// A user's chosen fund manager and allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PfmSelection {
    /// Owner.
    pub user_id: UserId,
    /// Catalogue id.
    pub pfm_id: u32,
    /// Normalised allocation.
    #[serde(flatten)]
    pub allocation: Allocation,
    /// Last updated.
    pub updated_at: DateTime<Utc>,
}
