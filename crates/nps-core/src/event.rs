//! Analytics events and their queue wire format.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{EventId, UserId};

/// Event types emitted by the service.
///
/// The analytics log stores the type as free-form text, so consumers accept
/// names outside this list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// First login for a mobile number.
    UserRegistered,
    /// Mobile OTP verified.
    UserMobileVerified,
    /// Refresh token rotated.
    TokenRefreshed,
    /// Session ended.
    UserLogout,
    /// Aadhaar verified.
    AadhaarVerified,
    /// PAN verified.
    PanVerified,
    /// Video KYC session opened.
    VideoKycStarted,
    /// Video KYC approved.
    VideoKycCompleted,
    /// Personal details saved.
    ProfilePersonalSaved,
    /// Address saved.
    ProfileAddressSaved,
    /// Nominee saved.
    ProfileNomineeSaved,
    /// Fund manager selected.
    PfmSelected,
    /// Payment order created.
    PaymentInitiated,
    /// Gateway confirmed payment.
    PaymentSuccess,
    /// Gateway reported failure.
    PaymentFailed,
    /// PRAN issued.
    PranGenerated,
    /// Consent recorded.
    ConsentAccepted,
    /// Document verified.
    DocumentVerified,
    /// Admin opened the analytics summary.
    AdminAnalyticsViewed,
    /// Admin opened the KYC report.
    AdminKycReportViewed,
    /// Admin opened the drop-off report.
    AdminDropoffViewed,
}

impl EventType {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UserRegistered => "USER_REGISTERED",
            Self::UserMobileVerified => "USER_MOBILE_VERIFIED",
            Self::TokenRefreshed => "TOKEN_REFRESHED",
            Self::UserLogout => "USER_LOGOUT",
            Self::AadhaarVerified => "AADHAAR_VERIFIED",
            Self::PanVerified => "PAN_VERIFIED",
            Self::VideoKycStarted => "VIDEO_KYC_STARTED",
            Self::VideoKycCompleted => "VIDEO_KYC_COMPLETED",
            Self::ProfilePersonalSaved => "PROFILE_PERSONAL_SAVED",
            Self::ProfileAddressSaved => "PROFILE_ADDRESS_SAVED",
            Self::ProfileNomineeSaved => "PROFILE_NOMINEE_SAVED",
            Self::PfmSelected => "PFM_SELECTED",
            Self::PaymentInitiated => "PAYMENT_INITIATED",
            Self::PaymentSuccess => "PAYMENT_SUCCESS",
            Self::PaymentFailed => "PAYMENT_FAILED",
            Self::PranGenerated => "PRAN_GENERATED",
            Self::ConsentAccepted => "CONSENT_ACCEPTED",
            Self::DocumentVerified => "DOCUMENT_VERIFIED",
            Self::AdminAnalyticsViewed => "ADMIN_ANALYTICS_VIEWED",
            Self::AdminKycReportViewed => "ADMIN_KYC_REPORT_VIEWED",
            Self::AdminDropoffViewed => "ADMIN_DROPOFF_VIEWED",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message body published on the analytics queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMessage {
    /// Event type name.
    pub event_type: String,
    /// Event attributes. Always a JSON object.
    pub data: serde_json::Value,
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
}

impl QueueMessage {
    /// Build a message stamped with the current time.
    #[must_use]
    pub fn new(event_type: EventType, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.as_str().to_string(),
            data,
            timestamp: Utc::now(),
        }
    }

    /// Convert into the analytics row written by the consumer.
    ///
    /// `userId` is taken from `data` when it is a valid id. The stored details are
    /// `data` plus a `queuedAt` field carrying the emit time.
    #[must_use]
    pub fn into_event(self) -> AnalyticsEvent {
        let user_id = self
            .data
            .get("userId")
            .and_then(serde_json::Value::as_str)
            .and_then(|s| s.parse::<UserId>().ok());

        let mut details = match self.data {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".into(), other);
                map
            }
        };
        details.insert(
            "queuedAt".into(),
            serde_json::Value::String(self.timestamp.to_rfc3339()),
        );

        AnalyticsEvent {
            id: EventId::generate(),
            event_type: self.event_type,
            user_id,
            details: serde_json::Value::Object(details),
            created_at: Utc::now(),
        }
    }
}

/// One row of the analytics log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    /// Row id.
    pub id: EventId,
    /// Event type name.
    pub event_type: String,
    /// Subject user, when known.
    pub user_id: Option<UserId>,
    /// Event attributes plus `queuedAt`.
    pub details: serde_json::Value,
    /// When the row was written.
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wire_format_is_camel_case() {
        let msg = QueueMessage::new(EventType::PfmSelected, json!({"pfmId": 1}));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["eventType"], "PFM_SELECTED");
        assert_eq!(value["data"]["pfmId"], 1);
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn into_event_extracts_user_and_stamps_queued_at() {
        let user_id = UserId::generate();
        let msg = QueueMessage::new(
            EventType::UserLogout,
            json!({"userId": user_id.to_string()}),
        );
        let ts = msg.timestamp;
        let event = msg.into_event();
        assert_eq!(event.event_type, "USER_LOGOUT");
        assert_eq!(event.user_id, Some(user_id));
        assert_eq!(event.details["queuedAt"], ts.to_rfc3339());
        assert_eq!(event.details["userId"], user_id.to_string());
    }

    #[test]
    fn admin_events_have_no_subject_user() {
        let msg = QueueMessage::new(
            EventType::AdminDropoffViewed,
            json!({"adminId": UserId::generate().to_string()}),
        );
        assert_eq!(msg.into_event().user_id, None);
    }
}
