//! NPS Onboarding HTTP API Service.
//!
//! This crate provides the HTTP API for pension account onboarding, including:
//!
//! - Mobile and Aadhaar OTP login
//! - KYC (Aadhaar, PAN, video)
//! - Profile, documents, fund manager selection and consent
//! - Payment orders, the gateway webhook and PRAN issuance
//! - Admin analytics
//!
//! # Authentication
//!
//! Users authenticate with short-lived HS256 access tokens obtained through an
//! OTP login. Admin routes additionally require the stored role `ADMIN`. The
//! payment webhook is public and optionally HMAC-signed.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers are async for routing uniformity

pub mod auth;
pub mod blob;
pub mod config;
pub mod crypto;
pub mod ekyc;
pub mod error;
pub mod handlers;
pub mod otp;
pub mod routes;
pub mod sms;
pub mod state;
pub mod sweeper;

pub use auth::{AdminUser, AuthUser, TokenIssuer, TokenPair};
pub use config::{Environment, ServiceConfig};
pub use error::ApiError;
pub use otp::{OtpDelivery, OtpService};
pub use routes::create_router;
pub use state::{AppState, StartupError};
pub use sweeper::run_payment_sweeper;
