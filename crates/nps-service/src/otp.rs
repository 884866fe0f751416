//! One-time passcode issuance and verification.
//!
//! Codes are stored only as Argon2id PHC hashes in the cache, keyed by the
//! identity they were sent for. Verification commits by deleting the key, so
//! of two concurrent verifications with the same code exactly one succeeds.

use std::sync::Arc;
use std::time::Duration;

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use rand::rngs::OsRng;

use nps_core::{Aadhaar, Mobile, OtpCode};
use nps_store::{Cache, CacheError};

use crate::sms::{otp_message, OtpSender, SmsError};

/// How long a code stays valid.
pub const OTP_TTL: Duration = Duration::from_secs(300);

/// Window for the send counter.
pub const ATTEMPTS_WINDOW: Duration = Duration::from_secs(3600);

/// Codes that may be sent to one identity inside the window.
pub const MAX_SENDS_PER_WINDOW: u64 = 5;

/// OTP failures.
#[derive(Debug, thiserror::Error)]
pub enum OtpError {
    /// No live code for the identity.
    #[error("OTP expired or not found")]
    Expired,

    /// The code does not match.
    #[error("Invalid OTP")]
    Invalid,

    /// Too many codes sent inside the window.
    #[error("too many OTP requests")]
    RateLimited,

    /// The gateway could not deliver the code.
    #[error("failed to deliver OTP: {0}")]
    Delivery(#[from] SmsError),

    /// The cache failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Hashing or hash parsing failed.
    #[error("OTP hashing failed: {0}")]
    Hash(String),
}

/// How codes reach the user. Chosen once at startup.
#[derive(Clone)]
pub enum OtpDelivery {
    /// Send through an SMS/WhatsApp gateway.
    Gateway(Arc<dyn OtpSender>),
    /// Log the code and hand it back to the caller. Development only.
    Echo,
}

impl std::fmt::Debug for OtpDelivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gateway(_) => f.write_str("Gateway"),
            Self::Echo => f.write_str("Echo"),
        }
    }
}

/// The identity a code is issued for.
#[derive(Debug, Clone, Copy)]
pub enum OtpTarget<'a> {
    /// Mobile login.
    Mobile(&'a Mobile),
    /// Aadhaar login; the code goes to the mobile linked to the Aadhaar.
    Aadhaar {
        /// Aadhaar number.
        aadhaar: &'a Aadhaar,
        /// Where the code is delivered.
        linked_mobile: &'a Mobile,
    },
}

impl OtpTarget<'_> {
    fn id(&self) -> &str {
        match self {
            Self::Mobile(mobile) => mobile.as_str(),
            Self::Aadhaar { aadhaar, .. } => aadhaar.expose(),
        }
    }

    fn code_key(&self) -> String {
        match self {
            Self::Mobile(mobile) => format!("otp:{mobile}"),
            Self::Aadhaar { aadhaar, .. } => format!("aadhaar_otp:{}", aadhaar.expose()),
        }
    }

    fn attempts_key(&self) -> String {
        format!("otp_attempts:{}", self.id())
    }

    fn recipient(&self) -> &Mobile {
        match self {
            Self::Mobile(mobile) => mobile,
            Self::Aadhaar { linked_mobile, .. } => linked_mobile,
        }
    }
}

/// Issues and checks OTPs.
pub struct OtpService {
    cache: Arc<dyn Cache>,
    delivery: OtpDelivery,
    hasher: Argon2<'static>,
}

impl OtpService {
    /// Service with default Argon2id parameters.
    #[must_use]
    pub fn new(cache: Arc<dyn Cache>, delivery: OtpDelivery) -> Self {
        Self {
            cache,
            delivery,
            hasher: Argon2::default(),
        }
    }

    /// Replace the Argon2id cost parameters.
    #[must_use]
    pub fn with_params(mut self, params: Params) -> Self {
        self.hasher = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        self
    }

    /// Whether codes are echoed back instead of delivered.
    #[must_use]
    pub const fn echoes(&self) -> bool {
        matches!(self.delivery, OtpDelivery::Echo)
    }

    /// Issue a fresh code for `target`, replacing any previous one.
    ///
    /// Returns the code only under [`OtpDelivery::Echo`].
    ///
    /// # Errors
    ///
    /// Returns `OtpError::RateLimited` on the sixth send inside the window.
    pub async fn send(&self, target: OtpTarget<'_>) -> Result<Option<OtpCode>, OtpError> {
        let sends = self
            .cache
            .incr_with_ttl(&target.attempts_key(), ATTEMPTS_WINDOW)
            .await?;
        if sends > MAX_SENDS_PER_WINDOW {
            tracing::warn!(to = %target.recipient().masked(), sends, "OTP send limit reached");
            return Err(OtpError::RateLimited);
        }

        let code = OtpCode::generate();
        let hash = self.hash(&code)?;
        self.cache.set_ex(&target.code_key(), &hash, OTP_TTL).await?;

        match &self.delivery {
            OtpDelivery::Gateway(sender) => {
                sender
                    .send(target.recipient(), &otp_message(code.as_str()))
                    .await?;
                tracing::info!(to = %target.recipient().masked(), "OTP sent");
                Ok(None)
            }
            OtpDelivery::Echo => {
                tracing::info!(
                    to = %target.recipient().masked(),
                    otp = %code.as_str(),
                    "Development OTP issued"
                );
                Ok(Some(code))
            }
        }
    }

    /// Check `code` for `target`. Succeeds at most once per issued code.
    ///
    /// # Errors
    ///
    /// Returns `OtpError::Expired` when no live code exists (or a concurrent
    /// verification consumed it) and `OtpError::Invalid` on mismatch.
    pub async fn verify(&self, target: OtpTarget<'_>, code: &OtpCode) -> Result<(), OtpError> {
        let key = target.code_key();
        let stored = self.cache.get(&key).await?.ok_or(OtpError::Expired)?;

        let parsed = PasswordHash::new(&stored).map_err(|e| OtpError::Hash(e.to_string()))?;
        if self
            .hasher
            .verify_password(code.as_str().as_bytes(), &parsed)
            .is_err()
        {
            return Err(OtpError::Invalid);
        }

        if !self.cache.del(&key).await? {
            return Err(OtpError::Expired);
        }
        self.cache.del(&target.attempts_key()).await?;
        Ok(())
    }

    fn hash(&self, code: &OtpCode) -> Result<String, OtpError> {
        let salt = SaltString::generate(&mut OsRng);
        self.hasher
            .hash_password(code.as_str().as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| OtpError::Hash(e.to_string()))
    }
}

impl std::fmt::Debug for OtpService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtpService")
            .field("delivery", &self.delivery)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use nps_store::MemoryCache;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl OtpSender for RecordingSender {
        async fn send(&self, to: &Mobile, body: &str) -> Result<(), SmsError> {
            self.sent
                .lock()
                .await
                .push((to.as_str().to_string(), body.to_string()));
            Ok(())
        }
    }

    fn cheap() -> Params {
        Params::new(1024, 1, 1, None).unwrap()
    }

    fn echo_service(cache: Arc<MemoryCache>) -> OtpService {
        OtpService::new(cache, OtpDelivery::Echo).with_params(cheap())
    }

    fn mobile() -> Mobile {
        "9876543210".parse().unwrap()
    }

    #[tokio::test]
    async fn code_verifies_exactly_once() {
        let cache = Arc::new(MemoryCache::new());
        let otp = echo_service(cache.clone());
        let m = mobile();

        let code = otp.send(OtpTarget::Mobile(&m)).await.unwrap().unwrap();
        let stored = cache.get("otp:9876543210").await.unwrap().unwrap();
        assert!(stored.starts_with("$argon2id$"));
        assert!(!stored.contains(code.as_str()));

        otp.verify(OtpTarget::Mobile(&m), &code).await.unwrap();
        assert!(matches!(
            otp.verify(OtpTarget::Mobile(&m), &code).await,
            Err(OtpError::Expired)
        ));
    }

    #[tokio::test]
    async fn wrong_code_is_invalid_and_keeps_the_live_code() {
        let otp = echo_service(Arc::new(MemoryCache::new()));
        let m = mobile();
        let code = otp.send(OtpTarget::Mobile(&m)).await.unwrap().unwrap();
        let wrong: OtpCode = if code.as_str() == "111111" { "222222" } else { "111111" }
            .parse()
            .unwrap();

        assert!(matches!(
            otp.verify(OtpTarget::Mobile(&m), &wrong).await,
            Err(OtpError::Invalid)
        ));
        otp.verify(OtpTarget::Mobile(&m), &code).await.unwrap();
    }

    #[tokio::test]
    async fn sixth_send_in_window_is_rejected() {
        let otp = echo_service(Arc::new(MemoryCache::new()));
        let m = mobile();
        for _ in 0..MAX_SENDS_PER_WINDOW {
            otp.send(OtpTarget::Mobile(&m)).await.unwrap();
        }
        assert!(matches!(
            otp.send(OtpTarget::Mobile(&m)).await,
            Err(OtpError::RateLimited)
        ));

        let other: Mobile = "9123456780".parse().unwrap();
        assert!(otp.send(OtpTarget::Mobile(&other)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn code_expires_after_ttl() {
        let otp = echo_service(Arc::new(MemoryCache::new()));
        let m = mobile();
        let code = otp.send(OtpTarget::Mobile(&m)).await.unwrap().unwrap();

        tokio::time::advance(OTP_TTL + Duration::from_secs(1)).await;
        assert!(matches!(
            otp.verify(OtpTarget::Mobile(&m), &code).await,
            Err(OtpError::Expired)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn send_window_resets_after_an_hour() {
        let otp = echo_service(Arc::new(MemoryCache::new()));
        let m = mobile();
        for _ in 0..MAX_SENDS_PER_WINDOW {
            otp.send(OtpTarget::Mobile(&m)).await.unwrap();
        }
        tokio::time::advance(ATTEMPTS_WINDOW).await;
        assert!(otp.send(OtpTarget::Mobile(&m)).await.is_ok());
    }

    #[tokio::test]
    async fn successful_verify_clears_the_send_counter() {
        let cache = Arc::new(MemoryCache::new());
        let otp = echo_service(cache.clone());
        let m = mobile();
        let code = otp.send(OtpTarget::Mobile(&m)).await.unwrap().unwrap();
        otp.verify(OtpTarget::Mobile(&m), &code).await.unwrap();
        assert!(cache.get("otp_attempts:9876543210").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn concurrent_verifications_have_one_winner() {
        let otp = Arc::new(echo_service(Arc::new(MemoryCache::new())));
        let m = mobile();
        let code = otp.send(OtpTarget::Mobile(&m)).await.unwrap().unwrap();

        let (a, b) = tokio::join!(
            otp.verify(OtpTarget::Mobile(&m), &code),
            otp.verify(OtpTarget::Mobile(&m), &code)
        );
        assert_eq!(usize::from(a.is_ok()) + usize::from(b.is_ok()), 1);
    }

    #[tokio::test]
    async fn aadhaar_codes_go_to_the_linked_mobile() {
        let cache = Arc::new(MemoryCache::new());
        let sender = Arc::new(RecordingSender::default());
        let otp = OtpService::new(cache.clone(), OtpDelivery::Gateway(sender.clone()))
            .with_params(cheap());
        let aadhaar: Aadhaar = "123456789012".parse().unwrap();
        let linked = mobile();
        let target = OtpTarget::Aadhaar {
            aadhaar: &aadhaar,
            linked_mobile: &linked,
        };

        assert!(otp.send(target).await.unwrap().is_none());
        assert!(cache.get("aadhaar_otp:123456789012").await.unwrap().is_some());
        assert!(cache.get("otp:9876543210").await.unwrap().is_none());

        let sent = sender.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "9876543210");
        assert!(sent[0].1.contains("OTP"));
    }
}
