//! Service configuration.

use std::fmt;
use std::str::FromStr;

/// Development JWT secret. Rejected in production.
const DEV_JWT_SECRET: &str = "dev-jwt-secret";

/// Development refresh secret. Rejected in production.
const DEV_REFRESH_SECRET: &str = "dev-refresh-secret";

/// Development encryption key. Rejected in production.
pub const DEV_ENCRYPTION_KEY: &str = "dev_fallback_key_do_not_use_prod";

/// Deployment environment.
///
/// Development enables the OTP echo, demo upload URLs, the demo payment page,
/// simulated-payment PRAN issuance and a one-time analytics queue purge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    /// Local runs and tests.
    #[default]
    Development,
    /// Everything else.
    Production,
}

impl Environment {
    /// Whether development shortcuts are on.
    #[must_use]
    pub const fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(ConfigError::Invalid {
                key: "APP_ENV",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => f.write_str("development"),
            Self::Production => f.write_str("production"),
        }
    }
}

/// Configuration problems found at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A variable has a value that cannot be used.
    #[error("invalid value for {key}: {value}")]
    Invalid {
        /// Variable name.
        key: &'static str,
        /// Offending value.
        value: String,
    },

    /// A variable production cannot run without.
    #[error("{0} must be set in production")]
    Missing(&'static str),

    /// Access and refresh tokens signed with the same secret.
    #[error("JWT_SECRET and REFRESH_SECRET must differ")]
    SharedJwtSecret,

    /// A development default left in place.
    #[error("{0} still has its development default")]
    DevelopmentDefault(&'static str),
}

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Deployment environment (`APP_ENV`, default: development).
    pub environment: Environment,

    /// PostgreSQL URL. In-memory store when unset.
    pub database_url: Option<String>,

    /// Redis URL. In-memory cache when unset.
    pub redis_url: Option<String>,

    /// AMQP URL. In-process broker when unset.
    pub amqp_url: Option<String>,

    /// Durable analytics queue (default: "nps_events").
    pub analytics_queue: String,

    /// Access token signing secret.
    pub jwt_secret: String,

    /// Refresh token signing secret.
    pub refresh_secret: String,

    /// Secret the document storage keys are encrypted with.
    pub encryption_key: String,

    /// S3 region (default: "ap-south-1").
    pub aws_region: String,

    /// S3 bucket for uploaded documents.
    pub aws_s3_bucket: Option<String>,

    /// S3 access key id.
    pub aws_access_key_id: Option<String>,

    /// S3 secret access key.
    pub aws_secret_access_key: Option<String>,

    /// Custom S3-compatible endpoint, addressed path-style.
    pub s3_endpoint: Option<String>,

    /// Twilio account SID.
    pub twilio_account_sid: Option<String>,

    /// Twilio auth token.
    pub twilio_auth_token: Option<String>,

    /// WhatsApp sender number, e.g. `whatsapp:+14155238886`.
    pub twilio_whatsapp_number: Option<String>,

    /// Twilio API base URL.
    pub twilio_api_base: String,

    /// eKYC provider base URL. Sandbox identities when unset.
    pub ekyc_api_url: Option<String>,

    /// eKYC provider API key.
    pub ekyc_api_key: Option<String>,

    /// Payment page the client is redirected to.
    pub payment_gateway_url: Option<String>,

    /// Shared secret for `x-webhook-signature`. Unsigned callbacks accepted when unset.
    pub payment_webhook_secret: Option<String>,

    /// Contribution amount in whole rupees (default: 500).
    pub payment_amount: i64,

    /// Age after which a `CREATED` order expires (default: one day).
    pub payment_ttl_seconds: u64,

    /// Interval of the order expiry sweep (default: five minutes).
    pub payment_sweep_seconds: u64,

    /// Mobile number seeded as an admin at startup.
    pub admin_mobile: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn var_or(key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|| default.into())
}

fn parsed_or<T: FromStr>(key: &str, default: T) -> T {
    var(key).and_then(|s| s.parse().ok()).unwrap_or(default)
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` for an unknown `APP_ENV`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = match var("APP_ENV") {
            Some(value) => value.parse()?,
            None => Environment::Development,
        };

        Ok(Self {
            listen_addr: var_or("LISTEN_ADDR", "0.0.0.0:8080"),
            environment,
            database_url: var("DATABASE_URL"),
            redis_url: var("REDIS_URL"),
            amqp_url: var("AMQP_URL"),
            analytics_queue: var_or("ANALYTICS_QUEUE", nps_events::DEFAULT_QUEUE),
            jwt_secret: var_or("JWT_SECRET", DEV_JWT_SECRET),
            refresh_secret: var_or("REFRESH_SECRET", DEV_REFRESH_SECRET),
            encryption_key: var_or("ENCRYPTION_KEY", DEV_ENCRYPTION_KEY),
            aws_region: var_or("AWS_REGION", "ap-south-1"),
            aws_s3_bucket: var("AWS_S3_BUCKET"),
            aws_access_key_id: var("AWS_ACCESS_KEY_ID"),
            aws_secret_access_key: var("AWS_SECRET_ACCESS_KEY"),
            s3_endpoint: var("S3_ENDPOINT"),
            twilio_account_sid: var("TWILIO_ACCOUNT_SID"),
            twilio_auth_token: var("TWILIO_AUTH_TOKEN"),
            twilio_whatsapp_number: var("TWILIO_WHATSAPP_NUMBER"),
            twilio_api_base: var_or("TWILIO_API_BASE", crate::sms::TWILIO_API_BASE),
            ekyc_api_url: var("EKYC_API_URL"),
            ekyc_api_key: var("EKYC_API_KEY"),
            payment_gateway_url: var("PAYMENT_GATEWAY_URL"),
            payment_webhook_secret: var("PAYMENT_WEBHOOK_SECRET"),
            payment_amount: parsed_or("PAYMENT_AMOUNT", 500),
            payment_ttl_seconds: parsed_or("PAYMENT_TTL_SECONDS", 86_400),
            payment_sweep_seconds: parsed_or("PAYMENT_SWEEP_SECONDS", 300),
            admin_mobile: var("ADMIN_MOBILE"),
            cors_origins: var_or("CORS_ORIGINS", "*")
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: parsed_or("MAX_BODY_BYTES", 1024 * 1024), // 1MB
            request_timeout_seconds: parsed_or("REQUEST_TIMEOUT_SECONDS", 30),
        })
    }

    /// Check the settings the environment requires.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.payment_amount <= 0 {
            return Err(ConfigError::Invalid {
                key: "PAYMENT_AMOUNT",
                value: self.payment_amount.to_string(),
            });
        }
        if self.payment_sweep_seconds == 0 {
            return Err(ConfigError::Invalid {
                key: "PAYMENT_SWEEP_SECONDS",
                value: "0".into(),
            });
        }
        if self.jwt_secret == self.refresh_secret {
            return Err(ConfigError::SharedJwtSecret);
        }
        if self.environment.is_development() {
            return Ok(());
        }

        if self.database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }
        if self.payment_webhook_secret.is_none() {
            return Err(ConfigError::Missing("PAYMENT_WEBHOOK_SECRET"));
        }
        if self.jwt_secret == DEV_JWT_SECRET {
            return Err(ConfigError::DevelopmentDefault("JWT_SECRET"));
        }
        if self.refresh_secret == DEV_REFRESH_SECRET {
            return Err(ConfigError::DevelopmentDefault("REFRESH_SECRET"));
        }
        if self.encryption_key == DEV_ENCRYPTION_KEY {
            return Err(ConfigError::DevelopmentDefault("ENCRYPTION_KEY"));
        }
        if self.twilio_account_sid.is_none() {
            return Err(ConfigError::Missing("TWILIO_ACCOUNT_SID"));
        }
        if self.twilio_auth_token.is_none() {
            return Err(ConfigError::Missing("TWILIO_AUTH_TOKEN"));
        }
        if self.twilio_whatsapp_number.is_none() {
            return Err(ConfigError::Missing("TWILIO_WHATSAPP_NUMBER"));
        }
        if self.aws_s3_bucket.is_none() {
            return Err(ConfigError::Missing("AWS_S3_BUCKET"));
        }
        if self.aws_access_key_id.is_none() {
            return Err(ConfigError::Missing("AWS_ACCESS_KEY_ID"));
        }
        if self.aws_secret_access_key.is_none() {
            return Err(ConfigError::Missing("AWS_SECRET_ACCESS_KEY"));
        }
        if self.ekyc_api_url.is_none() {
            return Err(ConfigError::Missing("EKYC_API_URL"));
        }
        if self.ekyc_api_key.is_none() {
            return Err(ConfigError::Missing("EKYC_API_KEY"));
        }
        if self.payment_gateway_url.is_none() {
            return Err(ConfigError::Missing("PAYMENT_GATEWAY_URL"));
        }
        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            environment: Environment::Development,
            database_url: None,
            redis_url: None,
            amqp_url: None,
            analytics_queue: nps_events::DEFAULT_QUEUE.into(),
            jwt_secret: DEV_JWT_SECRET.into(),
            refresh_secret: DEV_REFRESH_SECRET.into(),
            encryption_key: DEV_ENCRYPTION_KEY.into(),
            aws_region: "ap-south-1".into(),
            aws_s3_bucket: None,
            aws_access_key_id: None,
            aws_secret_access_key: None,
            s3_endpoint: None,
            twilio_account_sid: None,
            twilio_auth_token: None,
            twilio_whatsapp_number: None,
            twilio_api_base: crate::sms::TWILIO_API_BASE.into(),
            ekyc_api_url: None,
            ekyc_api_key: None,
            payment_gateway_url: None,
            payment_webhook_secret: None,
            payment_amount: 500,
            payment_ttl_seconds: 86_400,
            payment_sweep_seconds: 300,
            admin_mobile: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
        }
    }
}
