//! User profile details collected after KYC.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::UserId;

fn required(field: &str, value: &str) -> Result<(), CoreError> {
    if value.trim().is_empty() {
        Err(CoreError::validation(format!("{field} is required")))
    } else {
        Ok(())
    }
}

/// Personal details. Father's name and occupation are mandatory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonalDetails {
    /// Father's name.
    pub father_name: String,
    /// Marital status.
    #[serde(default)]
    pub marital_status: Option<String>,
    /// Occupation.
    pub occupation: String,
    /// Annual income band.
    #[serde(default)]
    pub annual_income: Option<String>,
}

impl PersonalDetails {
    /// Check mandatory fields.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` if a mandatory field is blank.
    pub fn validate(&self) -> Result<(), CoreError> {
        required("fatherName", &self.father_name)?;
        required("occupation", &self.occupation)
    }
}

/// Residential address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressDetails {
    /// Free-form address.
    pub address: String,
}

impl AddressDetails {
    /// Check mandatory fields.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` if the address is blank.
    pub fn validate(&self) -> Result<(), CoreError> {
        required("address", &self.address)
    }
}

/// Nominee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NomineeDetails {
    /// Nominee's full name.
    pub nominee_name: String,
}

impl NomineeDetails {
    /// Check mandatory fields.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` if the nominee name is blank.
    pub fn validate(&self) -> Result<(), CoreError> {
        required("nomineeName", &self.nominee_name)
    }
}

/// The stored profile. Fields not yet submitted are `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    /// Owner.
    pub user_id: UserId,
    /// Father's name.
    pub father_name: Option<String>,
    /// Marital status.
    pub marital_status: Option<String>,
    /// Occupation.
    pub occupation: Option<String>,
    /// Annual income band.
    pub annual_income: Option<String>,
    /// Address.
    pub address: Option<String>,
    /// Nominee name.
    pub nominee_name: Option<String>,
    /// Created.
    pub created_at: DateTime<Utc>,
    /// Last updated.
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// An empty profile for `user_id`.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            father_name: None,
            marital_status: None,
            occupation: None,
            annual_income: None,
            address: None,
            nominee_name: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Merge personal details. Optional fields left out keep their stored value.
    pub fn apply_personal(&mut self, details: &PersonalDetails) {
        self.father_name = Some(details.father_name.clone());
        self.occupation = Some(details.occupation.clone());
        if details.marital_status.is_some() {
            self.marital_status.clone_from(&details.marital_status);
        }
        if details.annual_income.is_some() {
            self.annual_income.clone_from(&details.annual_income);
        }
        self.updated_at = Utc::now();
    }

    /// Merge the address.
    pub fn apply_address(&mut self, details: &AddressDetails) {
        self.address = Some(details.address.clone());
        self.updated_at = Utc::now();
    }

    /// Merge the nominee.
    pub fn apply_nominee(&mut self, details: &NomineeDetails) {
        self.nominee_name = Some(details.nominee_name.clone());
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn personal_requires_father_name_and_occupation() {
        let mut details = PersonalDetails {
            father_name: "Ramesh".into(),
            marital_status: None,
            occupation: "  ".into(),
            annual_income: None,
        };
        assert_eq!(
            details.validate(),
            Err(CoreError::validation("occupation is required"))
        );
        details.occupation = "Engineer".into();
        assert!(details.validate().is_ok());
    }

    #[test]
    fn merge_keeps_unsent_optional_fields() {
        let mut profile = UserProfile::new(UserId::generate());
        profile.apply_personal(&PersonalDetails {
            father_name: "Ramesh".into(),
            marital_status: Some("MARRIED".into()),
            occupation: "Engineer".into(),
            annual_income: Some("5-10L".into()),
        });
        profile.apply_personal(&PersonalDetails {
            father_name: "Ramesh Kumar".into(),
            marital_status: None,
            occupation: "Engineer".into(),
            annual_income: None,
        });
        assert_eq!(profile.father_name.as_deref(), Some("Ramesh Kumar"));
        assert_eq!(profile.marital_status.as_deref(), Some("MARRIED"));
        assert_eq!(profile.annual_income.as_deref(), Some("5-10L"));
    }
}
