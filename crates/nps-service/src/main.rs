//! NPS Onboarding Service - HTTP API for pension account opening
//!
//! This is the main entry point for the onboarding service.

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nps_core::{Mobile, Role, User};
use nps_events::{AnalyticsConsumer, EventEmitter, QueueConnection, Transport};
use nps_service::{create_router, run_payment_sweeper, AppState, ServiceConfig};
use nps_store::{Cache, MemoryCache, MemoryStore, PgStore, Store};

const DATABASE_MAX_CONNECTIONS: u32 = 10;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,nps=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting NPS Onboarding Service");

    // Load configuration from environment
    let config = ServiceConfig::from_env()?;

    tracing::info!(
        listen_addr = %config.listen_addr,
        environment = %config.environment,
        database_configured = %config.database_url.is_some(),
        redis_configured = %config.redis_url.is_some(),
        amqp_configured = %config.amqp_url.is_some(),
        queue = %config.analytics_queue,
        "Service configuration loaded"
    );

    let store = open_store(&config).await?;
    let cache = open_cache(&config).await?;
    let transport = open_transport(&config);

    let connection = Arc::new(QueueConnection::new(
        transport,
        config.analytics_queue.clone(),
    ));
    let emitter = EventEmitter::new(connection.clone());

    seed_admin(store.as_ref(), config.admin_mobile.as_deref()).await?;

    // Background workers share one shutdown token
    let shutdown = CancellationToken::new();
    let consumer = tokio::spawn(
        AnalyticsConsumer::new(connection.clone(), store.clone())
            .with_purge_on_start(config.environment.is_development())
            .run(shutdown.clone()),
    );
    let sweeper = tokio::spawn(run_payment_sweeper(
        store.clone(),
        Duration::from_secs(config.payment_ttl_seconds),
        Duration::from_secs(config.payment_sweep_seconds),
        shutdown.clone(),
    ));

    // Build app state
    let listen_addr = config.listen_addr.clone();
    let state = AppState::new(store, cache, emitter, config)?;

    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown.cancel();
    let _ = tokio::join!(consumer, sweeper);
    connection.close().await;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

async fn open_store(config: &ServiceConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    if let Some(url) = &config.database_url {
        let store = PgStore::connect(url, DATABASE_MAX_CONNECTIONS).await?;
        store.migrate().await?;
        tracing::info!("Using PostgreSQL store");
        Ok(Arc::new(store))
    } else {
        tracing::warn!("DATABASE_URL not set - using in-memory store, data is lost on restart");
        Ok(Arc::new(MemoryStore::new()))
    }
}

#[cfg(feature = "redis")]
async fn open_cache(config: &ServiceConfig) -> Result<Arc<dyn Cache>, Box<dyn std::error::Error>> {
    if let Some(url) = &config.redis_url {
        let cache = nps_store::cache::RedisCache::connect(url).await?;
        tracing::info!("Using Redis cache");
        return Ok(Arc::new(cache));
    }
    tracing::warn!("REDIS_URL not set - using in-process cache");
    Ok(Arc::new(MemoryCache::new()))
}

#[cfg(not(feature = "redis"))]
async fn open_cache(config: &ServiceConfig) -> Result<Arc<dyn Cache>, Box<dyn std::error::Error>> {
    if config.redis_url.is_some() {
        tracing::warn!("REDIS_URL set but the redis feature is disabled - using in-process cache");
    }
    Ok(Arc::new(MemoryCache::new()))
}

#[cfg(feature = "amqp")]
fn open_transport(config: &ServiceConfig) -> Arc<dyn Transport> {
    if let Some(url) = &config.amqp_url {
        tracing::info!("Using AMQP analytics transport");
        return Arc::new(nps_events::AmqpTransport::new(url.clone()));
    }
    tracing::warn!("AMQP_URL not set - analytics events stay in process");
    Arc::new(nps_events::MemoryBroker::new())
}

#[cfg(not(feature = "amqp"))]
fn open_transport(config: &ServiceConfig) -> Arc<dyn Transport> {
    if config.amqp_url.is_some() {
        tracing::warn!("AMQP_URL set but the amqp feature is disabled - analytics events stay in process");
    }
    Arc::new(nps_events::MemoryBroker::new())
}

/// Make sure the configured admin mobile has an admin account.
async fn seed_admin(store: &dyn Store, admin_mobile: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(raw) = admin_mobile else {
        return Ok(());
    };
    let mobile: Mobile = raw.parse()?;

    match store.get_user_by_mobile(&mobile).await? {
        Some(user) if user.is_admin() => {
            tracing::debug!(user_id = %user.id, "Admin account present");
        }
        Some(user) => {
            tracing::warn!(
                user_id = %user.id,
                mobile = %mobile.masked(),
                "ADMIN_MOBILE belongs to an existing non-admin user; role left unchanged"
            );
        }
        None => {
            let mut admin = User::new(mobile);
            admin.role = Role::Admin;
            store.insert_user(&admin).await?;
            tracing::info!(user_id = %admin.id, "Admin account created");
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}
