//! Uploaded documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::UserId;

/// Accepted upload formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// JPEG image.
    Jpg,
    /// PNG image.
    Png,
    /// PDF document.
    Pdf,
}

impl FileType {
    /// File extension used in blob keys.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Jpg => "jpg",
            Self::Png => "png",
            Self::Pdf => "pdf",
        }
    }

    /// The only MIME type accepted for this format.
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Jpg => "image/jpeg",
            Self::Png => "image/png",
            Self::Pdf => "application/pdf",
        }
    }

    /// Parse an extension, rejecting anything outside the allowed set.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` for unknown extensions.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "jpg" => Ok(Self::Jpg),
            "png" => Ok(Self::Png),
            "pdf" => Ok(Self::Pdf),
            _ => Err(CoreError::validation("Invalid file type")),
        }
    }

    /// Check that `mime` matches this format.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` on mismatch.
    pub fn check_mime(self, mime: &str) -> Result<(), CoreError> {
        if mime == self.mime_type() {
            Ok(())
        } else {
            Err(CoreError::validation("Invalid MIME type"))
        }
    }
}

/// Kinds of documents collected during onboarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    /// Passport photo.
    Photo,
    /// Signature.
    Signature,
    /// Proof of address.
    AddressProof,
    /// Copy of the PAN card.
    PanCopy,
}

impl DocumentKind {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Signature => "signature",
            Self::AddressProof => "address_proof",
            Self::PanCopy => "pan_copy",
        }
    }

    /// Parse a wire name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "photo" => Some(Self::Photo),
            "signature" => Some(Self::Signature),
            "address_proof" => Some(Self::AddressProof),
            "pan_copy" => Some(Self::PanCopy),
            _ => None,
        }
    }
}

/// Verification state of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Object confirmed present in blob storage.
    Verified,
}

impl DocumentStatus {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Verified => "verified",
        }
    }
}

/// A stored document reference. The blob key is kept encrypted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Owner.
    pub user_id: UserId,
    /// Kind.
    pub kind: DocumentKind,
    /// Encrypted blob key.
    pub encrypted_path: String,
    /// Status.
    pub status: DocumentStatus,
    /// Recorded.
    pub created_at: DateTime<Utc>,
}

/// Blob key prefix under which `user_id` may upload.
#[must_use]
pub fn user_prefix(user_id: &UserId) -> String {
    format!("documents/{user_id}/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_must_match_extension() {
        let jpg = FileType::parse("jpg").unwrap();
        assert!(jpg.check_mime("image/jpeg").is_ok());
        assert!(jpg.check_mime("image/png").is_err());
        assert!(FileType::parse("gif").is_err());
    }

    #[test]
    fn kind_wire_names() {
        for kind in [
            DocumentKind::Photo,
            DocumentKind::Signature,
            DocumentKind::AddressProof,
            DocumentKind::PanCopy,
        ] {
            assert_eq!(DocumentKind::parse(kind.as_str()), Some(kind));
        }
    }
}
