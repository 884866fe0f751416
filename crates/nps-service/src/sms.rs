//! OTP delivery over SMS/WhatsApp.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use nps_core::Mobile;

/// Twilio API base URL.
pub const TWILIO_API_BASE: &str = "https://api.twilio.com";

/// Error type for message delivery.
#[derive(Debug, thiserror::Error)]
pub enum SmsError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway rejected the message.
    #[error("SMS gateway error: {code} - {message}")]
    Api {
        /// Gateway error code.
        code: i64,
        /// Gateway message.
        message: String,
    },
}

/// Sends an OTP text to a mobile number.
#[async_trait]
pub trait OtpSender: Send + Sync {
    /// Deliver `body` to `to`.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway cannot be reached or rejects the message.
    async fn send(&self, to: &Mobile, body: &str) -> Result<(), SmsError>;
}

/// Message text for an OTP.
#[must_use]
pub fn otp_message(code: &str) -> String {
    format!(
        "Your NPS verification OTP is: {code}\nValid for 5 minutes.\nDo not share this with anyone."
    )
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    sid: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    code: i64,
    message: String,
}

/// Twilio Messages API client sending over WhatsApp to Indian numbers.
#[derive(Debug, Clone)]
pub struct TwilioSender {
    client: Client,
    api_base: String,
    account_sid: String,
    auth_token: String,
    from: String,
}

impl TwilioSender {
    /// Create a new Twilio client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        api_base: impl Into<String>,
        account_sid: impl Into<String>,
        auth_token: impl Into<String>,
        from: impl Into<String>,
    ) -> Result<Self, SmsError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            account_sid: account_sid.into(),
            auth_token: auth_token.into(),
            from: from.into(),
        })
    }
}

#[async_trait]
impl OtpSender for TwilioSender {
    async fn send(&self, to: &Mobile, body: &str) -> Result<(), SmsError> {
        let mut params = HashMap::new();
        params.insert("From", self.from.clone());
        params.insert("To", format!("whatsapp:+91{to}"));
        params.insert("Body", body.to_string());

        let response = self
            .client
            .post(format!(
                "{}/2010-04-01/Accounts/{}/Messages.json",
                self.api_base, self.account_sid
            ))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            let message: MessageResponse = response.json().await?;
            tracing::info!(
                to = %to.masked(),
                sid = %message.sid,
                status = %message.status,
                "OTP message queued"
            );
            return Ok(());
        }

        match response.json::<ErrorResponse>().await {
            Ok(error) => Err(SmsError::Api {
                code: error.code,
                message: error.message,
            }),
            Err(_) => Err(SmsError::Api {
                code: i64::from(status.as_u16()),
                message: format!("HTTP {status}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{basic_auth, body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn mobile() -> Mobile {
        "9876543210".parse().unwrap()
    }

    #[tokio::test]
    async fn sends_whatsapp_message_with_basic_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/2010-04-01/Accounts/AC123/Messages.json"))
            .and(basic_auth("AC123", "secret"))
            .and(body_string_contains("To=whatsapp%3A%2B919876543210"))
            .and(body_string_contains("From=whatsapp%3A%2B14155238886"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({
                "sid": "SM1",
                "status": "queued"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let sender =
            TwilioSender::new(server.uri(), "AC123", "secret", "whatsapp:+14155238886").unwrap();
        sender.send(&mobile(), &otp_message("123456")).await.unwrap();
    }

    #[tokio::test]
    async fn gateway_rejection_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "code": 21211,
                "message": "Invalid 'To' Phone Number"
            })))
            .mount(&server)
            .await;

        let sender = TwilioSender::new(server.uri(), "AC123", "secret", "whatsapp:+1").unwrap();
        let err = sender.send(&mobile(), "hi").await.unwrap_err();
        assert!(matches!(err, SmsError::Api { code: 21211, .. }));
    }

    #[test]
    fn message_carries_the_code() {
        assert!(otp_message("654321").contains("654321"));
    }
}
