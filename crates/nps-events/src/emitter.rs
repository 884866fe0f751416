//! Fire-and-forget analytics producer.

use std::sync::Arc;
use std::time::Duration;

use nps_core::{EventType, QueueMessage};

use crate::connection::QueueConnection;
use crate::error::{QueueError, Result};

/// Default bound on a synchronous reconnect from the request path.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Publishes [`QueueMessage`]s. Never fails the caller.
#[derive(Clone)]
pub struct EventEmitter {
    connection: Arc<QueueConnection>,
    connect_timeout: Duration,
}

impl EventEmitter {
    /// Emitter over a shared connection.
    #[must_use]
    pub fn new(connection: Arc<QueueConnection>) -> Self {
        Self {
            connection,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Override the reconnect bound.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Publish one event. Failures are logged and swallowed.
    pub async fn emit(&self, event_type: EventType, data: serde_json::Value) {
        let message = QueueMessage::new(event_type, data);
        match self.publish(&message).await {
            Ok(()) => tracing::debug!(event_type = %event_type, "Analytics event queued"),
            Err(err) => tracing::warn!(
                event_type = %event_type,
                error = %err,
                "Failed to emit analytics event"
            ),
        }
    }

    async fn publish(&self, message: &QueueMessage) -> Result<()> {
        let payload = serde_json::to_vec(message)?;
        let channel = tokio::time::timeout(self.connect_timeout, self.connection.channel())
            .await
            .map_err(|_| QueueError::Timeout)??;
        if let Err(err) = channel.publish(self.connection.queue(), &payload).await {
            self.connection.mark_disconnected().await;
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBroker;
    use serde_json::json;

    #[tokio::test]
    async fn publishes_wire_format() {
        let broker = MemoryBroker::new();
        let connection = Arc::new(QueueConnection::new(Arc::new(broker.clone()), "events"));
        let emitter = EventEmitter::new(connection);

        emitter
            .emit(EventType::UserRegistered, json!({ "mobile": "XXXXXX3210" }))
            .await;
        assert_eq!(broker.ready("events"), 1);
    }

    #[tokio::test]
    async fn broker_outage_is_swallowed() {
        let broker = MemoryBroker::new();
        broker.set_available(false);
        let connection = Arc::new(QueueConnection::new(Arc::new(broker.clone()), "events"));
        let emitter = EventEmitter::new(Arc::clone(&connection));

        emitter.emit(EventType::PanVerified, json!({})).await;
        assert_eq!(broker.ready("events"), 0);

        broker.set_available(true);
        emitter.emit(EventType::PanVerified, json!({})).await;
        assert_eq!(broker.ready("events"), 1);
    }
}
