//! Shared, lazily connected queue handle.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{watch, Mutex};

use crate::error::Result;
use crate::transport::{Channel, Transport};

/// Lifecycle of a [`QueueConnection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No open channel.
    Disconnected,
    /// A connect attempt is in progress.
    Connecting,
    /// A channel is open and the queue is declared.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        })
    }
}

/// One broker connection for one durable queue, shared by the emitter and the
/// consumer through `Arc`. Connects on first use and after every failure.
pub struct QueueConnection {
    transport: Arc<dyn Transport>,
    queue: String,
    channel: Mutex<Option<Arc<dyn Channel>>>,
    state: watch::Sender<ConnectionState>,
}

impl QueueConnection {
    /// A disconnected handle for `queue`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, queue: impl Into<String>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            transport,
            queue: queue.into(),
            channel: Mutex::new(None),
            state,
        }
    }

    /// The queue name.
    #[must_use]
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// The open channel, connecting and declaring the queue first if there is
    /// none. Concurrent callers wait for the same attempt.
    ///
    /// # Errors
    ///
    /// Returns the transport error when connecting or declaring fails. The handle
    /// is left disconnected.
    pub async fn channel(&self) -> Result<Arc<dyn Channel>> {
        let mut slot = self.channel.lock().await;
        if let Some(channel) = slot.as_ref() {
            if channel.is_open() {
                return Ok(Arc::clone(channel));
            }
            tracing::debug!(queue = %self.queue, "Queue channel closed, reconnecting");
        }

        let attempt = ConnectAttempt::start(&self.state);
        let connected = async {
            let channel = self.transport.open().await?;
            channel.declare_queue(&self.queue).await?;
            Ok::<_, crate::error::QueueError>(channel)
        }
        .await;

        match connected {
            Ok(channel) => {
                *slot = Some(Arc::clone(&channel));
                attempt.succeed();
                tracing::info!(queue = %self.queue, "Connected to message broker");
                Ok(channel)
            }
            Err(err) => {
                *slot = None;
                Err(err)
            }
        }
    }

    /// Forget the current channel after a failure so the next use reconnects.
    pub async fn mark_disconnected(&self) {
        let stale = self.channel.lock().await.take();
        if let Some(channel) = stale {
            if let Err(err) = channel.close().await {
                tracing::debug!(error = %err, "Ignoring error while closing stale channel");
            }
        }
        self.state.send_replace(ConnectionState::Disconnected);
    }

    /// Close the channel for shutdown.
    pub async fn close(&self) {
        self.mark_disconnected().await;
        tracing::info!(queue = %self.queue, "Message broker connection closed");
    }
}

/// Publishes `Connecting` for one connect attempt. Unless the attempt succeeds,
/// dropping it (failure or a cancelled future) publishes `Disconnected`.
struct ConnectAttempt<'a> {
    state: &'a watch::Sender<ConnectionState>,
    connected: bool,
}

impl<'a> ConnectAttempt<'a> {
    fn start(state: &'a watch::Sender<ConnectionState>) -> Self {
        state.send_replace(ConnectionState::Connecting);
        Self {
            state,
            connected: false,
        }
    }

    fn succeed(mut self) {
        self.connected = true;
        self.state.send_replace(ConnectionState::Connected);
    }
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        if !self.connected {
            self.state.send_replace(ConnectionState::Disconnected);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBroker;

    #[tokio::test]
    async fn reports_lifecycle() {
        let broker = MemoryBroker::new();
        let connection = QueueConnection::new(Arc::new(broker.clone()), "q");
        let mut states = connection.subscribe();
        assert_eq!(connection.state(), ConnectionState::Disconnected);

        connection.channel().await.unwrap();
        assert_eq!(connection.state(), ConnectionState::Connected);
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), ConnectionState::Connected);

        connection.mark_disconnected().await;
        assert_eq!(connection.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn reconnects_after_channel_loss() {
        let broker = MemoryBroker::new();
        let connection = QueueConnection::new(Arc::new(broker.clone()), "q");
        let first = connection.channel().await.unwrap();
        broker.drop_channels();
        assert!(!first.is_open());

        let second = connection.channel().await.unwrap();
        assert!(second.is_open());
    }

    #[tokio::test]
    async fn failed_connect_leaves_disconnected() {
        let broker = MemoryBroker::new();
        broker.set_available(false);
        let connection = QueueConnection::new(Arc::new(broker), "q");
        assert!(connection.channel().await.is_err());
        assert_eq!(connection.state(), ConnectionState::Disconnected);
    }

    struct StalledTransport;

    #[async_trait::async_trait]
    impl Transport for StalledTransport {
        async fn open(&self) -> Result<Arc<dyn Channel>> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_connect_leaves_disconnected() {
        let connection = QueueConnection::new(Arc::new(StalledTransport), "q");

        let attempt =
            tokio::time::timeout(std::time::Duration::from_secs(2), connection.channel()).await;
        assert!(attempt.is_err());
        assert_eq!(connection.state(), ConnectionState::Disconnected);
    }
}
