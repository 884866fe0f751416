//! Background expiry of abandoned payment orders.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use nps_store::{Store, StoreError};

/// Expire `CREATED` orders older than `ttl`. Returns how many were expired.
///
/// # Errors
///
/// Returns an error if the store fails.
pub async fn sweep_once(store: &dyn Store, ttl: Duration) -> Result<u64, StoreError> {
    let Some(cutoff) = chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| Utc::now().checked_sub_signed(ttl))
    else {
        return Ok(0);
    };
    store.expire_payments(cutoff).await
}

/// Sweep every `interval` until `shutdown` fires.
pub async fn run_payment_sweeper(
    store: Arc<dyn Store>,
    ttl: Duration,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(
        ttl_seconds = ttl.as_secs(),
        interval_seconds = interval.as_secs(),
        "Payment sweeper started"
    );

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                tracing::info!("Payment sweeper stopped");
                return;
            }
            _ = ticker.tick() => {}
        }

        match sweep_once(store.as_ref(), ttl).await {
            Ok(0) => {}
            Ok(expired) => tracing::info!(expired, "Expired stale payment orders"),
            Err(e) => tracing::warn!(error = %e, "Payment sweep failed"),
        }
    }
}
