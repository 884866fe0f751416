//! Validated identity inputs.
//!
//! Every value here is checked on construction, so handlers reject malformed
//! input before touching the cache or the datastore.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

fn all_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit())
}

fn mask_tail(s: &str, visible: usize) -> String {
    let hidden = s.len().saturating_sub(visible);
    format!("{}{}", "X".repeat(hidden), &s[hidden..])
}

// ============================================================================
// Mobile
// ============================================================================

/// A 10-digit Indian mobile number without country code.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Mobile(String);

impl Mobile {
    /// The number as entered.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The number with all but the last four digits replaced by `X`.
    #[must_use]
    pub fn masked(&self) -> String {
        mask_tail(&self.0, 4)
    }
}

impl FromStr for Mobile {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if all_digits(s, 10) {
            Ok(Self(s.to_string()))
        } else {
            Err(CoreError::validation("Mobile number must be exactly 10 digits"))
        }
    }
}

impl TryFrom<String> for Mobile {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Mobile> for String {
    fn from(m: Mobile) -> Self {
        m.0
    }
}

impl fmt::Display for Mobile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Mobile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mobile({})", self.masked())
    }
}

// ============================================================================
// Aadhaar
// ============================================================================

/// A 12-digit Aadhaar number.
///
/// Never persisted whole: only [`Aadhaar::last4`] reaches the datastore. `Debug`
/// prints the masked form so the number cannot leak through logs.
#[derive(Clone, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub struct Aadhaar(String);

impl Aadhaar {
    /// The full number, for cache keys and provider calls only.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// The last four digits.
    #[must_use]
    pub fn last4(&self) -> &str {
        &self.0[8..]
    }

    /// All but the last four digits replaced by `X`.
    #[must_use]
    pub fn masked(&self) -> String {
        mask_tail(&self.0, 4)
    }
}

impl FromStr for Aadhaar {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if all_digits(s, 12) {
            Ok(Self(s.to_string()))
        } else {
            Err(CoreError::validation("Aadhaar number must be exactly 12 digits"))
        }
    }
}

impl TryFrom<String> for Aadhaar {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Debug for Aadhaar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Aadhaar({})", self.masked())
    }
}

// ============================================================================
// PAN
// ============================================================================

/// A Permanent Account Number: five letters, four digits, one letter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pan(String);

impl Pan {
    /// The PAN in upper case.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Pan {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let bytes = upper.as_bytes();
        let valid = bytes.len() == 10
            && bytes[..5].iter().all(u8::is_ascii_uppercase)
            && bytes[5..9].iter().all(u8::is_ascii_digit)
            && bytes[9].is_ascii_uppercase();
        if valid {
            Ok(Self(upper))
        } else {
            Err(CoreError::validation("Invalid PAN format"))
        }
    }
}

impl TryFrom<String> for Pan {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Pan> for String {
    fn from(p: Pan) -> Self {
        p.0
    }
}

// ============================================================================
// OTP code
// ============================================================================

/// A 6-digit one-time passcode.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct OtpCode(String);

impl OtpCode {
    /// Draw a code uniformly from `100000..=999999` using the OS-seeded thread RNG.
    #[must_use]
    pub fn generate() -> Self {
        let n: u32 = rand::thread_rng().gen_range(100_000..=999_999);
        Self(n.to_string())
    }

    /// The code digits.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for OtpCode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if all_digits(s, 6) {
            Ok(Self(s.to_string()))
        } else {
            Err(CoreError::validation("OTP must be exactly 6 digits"))
        }
    }
}

impl TryFrom<String> for OtpCode {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Debug for OtpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("OtpCode(******)")
    }
}
