//! Analytics consumer.
//!
//! Reads [`QueueMessage`]s one at a time and appends an analytics row for each.
//! A message that cannot be parsed or stored is rejected without requeue. When
//! the delivery stream ends the consumer marks the connection down and retries
//! after [`RECONNECT_DELAY`] until shutdown.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use nps_core::QueueMessage;
use nps_store::Store;

use crate::connection::QueueConnection;
use crate::error::Result;
use crate::transport::Delivery;

/// Wait between reconnect attempts.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

const PREFETCH: u16 = 1;

/// Background task writing analytics rows.
pub struct AnalyticsConsumer {
    connection: Arc<QueueConnection>,
    store: Arc<dyn Store>,
    purge_on_start: bool,
    reconnect_delay: Duration,
}

impl AnalyticsConsumer {
    /// Consumer over a shared connection.
    #[must_use]
    pub fn new(connection: Arc<QueueConnection>, store: Arc<dyn Store>) -> Self {
        Self {
            connection,
            store,
            purge_on_start: false,
            reconnect_delay: RECONNECT_DELAY,
        }
    }

    /// Drop stale messages once, at the first successful start. Development only.
    #[must_use]
    pub fn with_purge_on_start(mut self, purge: bool) -> Self {
        self.purge_on_start = purge;
        self
    }

    /// Override the reconnect delay.
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Run until `shutdown` fires.
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!(queue = %self.connection.queue(), "Analytics consumer started");

        loop {
            match self.consume(&shutdown).await {
                Ok(()) if shutdown.is_cancelled() => break,
                Ok(()) => tracing::warn!("Analytics delivery stream ended"),
                Err(err) => tracing::warn!(error = %err, "Analytics consumer disconnected"),
            }
            self.connection.mark_disconnected().await;

            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(self.reconnect_delay) => {
                    tracing::info!("Reconnecting analytics consumer");
                }
            }
        }

        tracing::info!("Analytics consumer stopped");
    }

    async fn consume(&mut self, shutdown: &CancellationToken) -> Result<()> {
        let channel = self.connection.channel().await?;
        let queue = self.connection.queue().to_string();

        if self.purge_on_start {
            let purged = channel.purge(&queue).await?;
            self.purge_on_start = false;
            tracing::info!(purged, queue = %queue, "Purged analytics queue");
        }

        let mut deliveries = channel.consume(&queue, PREFETCH).await?;
        loop {
            tokio::select! {
                () = shutdown.cancelled() => return Ok(()),
                next = deliveries.next() => match next {
                    Some(Ok(delivery)) => self.handle(delivery).await,
                    Some(Err(err)) => return Err(err),
                    None => return Ok(()),
                },
            }
        }
    }

    async fn handle(&self, delivery: Delivery) {
        match self.record(&delivery.payload).await {
            Ok(event_type) => {
                if let Err(err) = delivery.ack().await {
                    tracing::warn!(error = %err, event_type = %event_type, "Failed to ack analytics message");
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "Dropping analytics message");
                if let Err(err) = delivery.nack(false).await {
                    tracing::warn!(error = %err, "Failed to reject analytics message");
                }
            }
        }
    }

    async fn record(&self, payload: &[u8]) -> Result<String> {
        let message: QueueMessage = serde_json::from_slice(payload)?;
        let event = message.into_event();
        self.store.record_event(&event).await?;
        tracing::debug!(event_type = %event.event_type, "Analytics event recorded");
        Ok(event.event_type)
    }
}
