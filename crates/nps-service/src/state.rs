//! Application state.

use std::sync::Arc;

use nps_core::GuardPolicy;
use nps_events::EventEmitter;
use nps_store::{Cache, Store};

use crate::auth::TokenIssuer;
use crate::blob::{BlobError, BlobStore, DemoBlobStore, S3Config, S3Presigner};
use crate::config::{ConfigError, ServiceConfig};
use crate::crypto::PathCipher;
use crate::ekyc::{EkycError, EkycProvider, HttpEkyc, SandboxEkyc};
use crate::otp::{OtpDelivery, OtpService};
use crate::sms::{SmsError, TwilioSender};

/// Reasons the service cannot be assembled.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The SMS client could not be built.
    #[error("SMS gateway: {0}")]
    Sms(#[from] SmsError),

    /// The eKYC client could not be built.
    #[error("eKYC provider: {0}")]
    Ekyc(#[from] EkycError),

    /// The blob storage client could not be built.
    #[error("blob storage: {0}")]
    Blob(#[from] BlobError),
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Ephemeral cache (OTPs, send counters, PFM catalogue).
    pub cache: Arc<dyn Cache>,

    /// OTP issuance and verification.
    pub otp: Arc<OtpService>,

    /// Access/refresh token signing.
    pub tokens: Arc<TokenIssuer>,

    /// Analytics producer.
    pub emitter: EventEmitter,

    /// Document object storage.
    pub blob: Arc<dyn BlobStore>,

    /// Aadhaar lookups.
    pub ekyc: Arc<dyn EkycProvider>,

    /// Cipher for stored document keys.
    pub cipher: PathCipher,

    /// Onboarding guard switches for this environment.
    pub policy: GuardPolicy,

    /// Service configuration.
    pub config: ServiceConfig,
}

impl AppState {
    /// Create a new application state, picking a real or development
    /// implementation for each external collaborator.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails validation or a client
    /// cannot be built.
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<dyn Cache>,
        emitter: EventEmitter,
        config: ServiceConfig,
    ) -> Result<Self, StartupError> {
        config.validate()?;

        let delivery = match (
            &config.twilio_account_sid,
            &config.twilio_auth_token,
            &config.twilio_whatsapp_number,
        ) {
            (Some(sid), Some(token), Some(from)) => {
                let sender = TwilioSender::new(&config.twilio_api_base, sid, token, from)?;
                tracing::info!("Twilio OTP delivery enabled");
                OtpDelivery::Gateway(Arc::new(sender))
            }
            _ => {
                tracing::warn!("SMS gateway not configured - OTPs will be echoed in responses");
                OtpDelivery::Echo
            }
        };

        let ekyc: Arc<dyn EkycProvider> = match (&config.ekyc_api_url, &config.ekyc_api_key) {
            (Some(url), Some(key)) => {
                tracing::info!(ekyc_url = %url, "eKYC provider enabled");
                Arc::new(HttpEkyc::new(url, key)?)
            }
            _ => {
                tracing::warn!("eKYC provider not configured - using sandbox identities");
                Arc::new(SandboxEkyc)
            }
        };

        let blob: Arc<dyn BlobStore> = match (
            &config.aws_s3_bucket,
            &config.aws_access_key_id,
            &config.aws_secret_access_key,
        ) {
            (Some(bucket), Some(access_key_id), Some(secret_access_key)) => {
                tracing::info!(bucket = %bucket, region = %config.aws_region, "S3 document storage enabled");
                Arc::new(S3Presigner::new(S3Config {
                    bucket: bucket.clone(),
                    region: config.aws_region.clone(),
                    access_key_id: access_key_id.clone(),
                    secret_access_key: secret_access_key.clone(),
                    endpoint: config.s3_endpoint.clone(),
                })?)
            }
            _ => {
                tracing::warn!("S3 not configured - upload URLs will be placeholders");
                Arc::new(DemoBlobStore)
            }
        };

        let policy = if config.environment.is_development() {
            GuardPolicy::DEVELOPMENT
        } else {
            GuardPolicy::STRICT
        };

        Ok(Self {
            otp: Arc::new(OtpService::new(cache.clone(), delivery)),
            tokens: Arc::new(TokenIssuer::new(&config.jwt_secret, &config.refresh_secret)),
            cipher: PathCipher::new(&config.encryption_key),
            store,
            cache,
            emitter,
            blob,
            ekyc,
            policy,
            config,
        })
    }

    /// Replace the OTP service, e.g. with cheaper hashing parameters.
    #[must_use]
    pub fn with_otp(mut self, otp: OtpService) -> Self {
        self.otp = Arc::new(otp);
        self
    }
}
