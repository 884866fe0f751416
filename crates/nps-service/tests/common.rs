//! Common test utilities for onboarding integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use argon2::Params;
use axum::Router;
use axum_test::TestServer;
use serde_json::{json, Value};

use nps_core::{Mobile, Role, User};
use nps_events::{EventEmitter, MemoryBroker, QueueConnection, DEFAULT_QUEUE};
use nps_service::{create_router, AppState, OtpDelivery, OtpService, ServiceConfig};
use nps_store::{MemoryCache, MemoryStore, Store};

/// Aadhaar whose sandbox identity is linked to [`AADHAAR_LINKED_MOBILE`].
pub const SANDBOX_AADHAAR: &str = "123456789012";

/// Mobile the sandbox links to [`SANDBOX_AADHAAR`].
pub const AADHAAR_LINKED_MOBILE: &str = "9456789012";

/// Tokens from a login.
pub struct Session {
    /// Access token.
    pub token: String,
    /// Refresh token.
    pub refresh_token: String,
}

impl Session {
    /// Authorization header value for this session.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// The backing store, for setup and inspection.
    pub store: Arc<MemoryStore>,
    /// The analytics broker, for inspection.
    pub broker: MemoryBroker,
}

impl TestHarness {
    /// A development-mode service on fresh in-memory backends.
    pub fn new() -> Self {
        Self::with_config(ServiceConfig::default())
    }

    /// A service with `config` on fresh in-memory backends.
    pub fn with_config(config: ServiceConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let broker = MemoryBroker::new();

        let connection = Arc::new(QueueConnection::new(
            Arc::new(broker.clone()),
            DEFAULT_QUEUE,
        ));
        let emitter = EventEmitter::new(connection);

        let otp = OtpService::new(cache.clone(), OtpDelivery::Echo)
            .with_params(Params::new(1024, 1, 1, None).expect("valid argon2 params"));

        let state = AppState::new(store.clone(), cache, emitter, config)
            .expect("Failed to build app state")
            .with_otp(otp);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            broker,
        }
    }

    /// Log in with a mobile OTP.
    pub async fn login(&self, mobile: &str) -> Session {
        let sent = self
            .server
            .post("/auth/send-otp")
            .json(&json!({ "mobile": mobile }))
            .await;
        sent.assert_status_ok();
        let otp = sent.json::<Value>()["otp"]
            .as_str()
            .expect("echoed otp")
            .to_string();

        let verified = self
            .server
            .post("/auth/verify-otp")
            .json(&json!({ "mobile": mobile, "otp": otp }))
            .await;
        verified.assert_status_ok();
        let body: Value = verified.json();

        Session {
            token: body["token"].as_str().expect("token").to_string(),
            refresh_token: body["refreshToken"]
                .as_str()
                .expect("refresh token")
                .to_string(),
        }
    }

    /// Create an admin account for `mobile` and log in as it.
    pub async fn login_admin(&self, mobile: &str) -> Session {
        let mut admin = User::new(mobile.parse::<Mobile>().expect("valid mobile"));
        admin.role = Role::Admin;
        self.store.insert_user(&admin).await.expect("insert admin");
        self.login(mobile).await
    }

    /// POST `body` to `path` as `session`, asserting success.
    pub async fn post_ok(&self, session: &Session, path: &str, body: Value) -> Value {
        let response = self
            .server
            .post(path)
            .add_header("authorization", session.bearer())
            .json(&body)
            .await;
        response.assert_status_ok();
        response.json()
    }

    /// Walk a fresh user through KYC and profile.
    pub async fn complete_profile(&self, mobile: &str) -> Session {
        let session = self.login(mobile).await;
        self.post_ok(&session, "/kyc/aadhaar", json!({ "aadhaar": SANDBOX_AADHAAR }))
            .await;
        self.post_ok(&session, "/kyc/pan", json!({ "pan": "ABCDE1234F" }))
            .await;
        self.post_ok(
            &session,
            "/user/profile/personal",
            json!({ "fatherName": "Ramesh Kumar", "occupation": "Salaried" }),
        )
        .await;
        self.post_ok(
            &session,
            "/user/profile/address",
            json!({ "address": "12 MG Road, Bengaluru" }),
        )
        .await;
        self.post_ok(
            &session,
            "/user/profile/nominee",
            json!({ "nomineeName": "Sita Kumar" }),
        )
        .await;
        session
    }

    /// Walk a fresh user through to `PFM_SELECTED`.
    pub async fn select_pfm(&self, mobile: &str) -> Session {
        let session = self.complete_profile(mobile).await;
        self.post_ok(
            &session,
            "/pfm/select",
            json!({ "pfmId": 1, "allocationE": 50, "allocationC": 30, "allocationG": 20, "allocationA": 0 }),
        )
        .await;
        session
    }

    /// Create a payment order and return its id.
    pub async fn initiate_payment(&self, session: &Session) -> String {
        let body = self.post_ok(session, "/payment/initiate", json!({})).await;
        body["orderId"].as_str().expect("order id").to_string()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
