//! Broker abstraction.
//!
//! A [`Transport`] opens [`Channel`]s. A channel declares durable queues,
//! publishes persistent messages and hands out a stream of [`Delivery`]s that must
//! each be acknowledged or rejected.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::Result;

/// Stream of deliveries from one consumer. Ends (or yields an error) when the
/// channel goes away.
pub type DeliveryStream = BoxStream<'static, Result<Delivery>>;

/// Something that can open channels to a broker.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a fresh connection and channel.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Unavailable` when the broker cannot be reached.
    async fn open(&self) -> Result<Arc<dyn Channel>>;
}

/// An open channel.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Declare a durable queue. Declaring an existing queue is a no-op.
    async fn declare_queue(&self, queue: &str) -> Result<()>;

    /// Publish a persistent message through the default exchange.
    async fn publish(&self, queue: &str, payload: &[u8]) -> Result<()>;

    /// Drop every ready message. Returns how many were removed.
    async fn purge(&self, queue: &str) -> Result<u32>;

    /// Start consuming with at most `prefetch` unacknowledged deliveries.
    async fn consume(&self, queue: &str, prefetch: u16) -> Result<DeliveryStream>;

    /// Whether the channel can still be used.
    fn is_open(&self) -> bool;

    /// Close the channel and its connection.
    async fn close(&self) -> Result<()>;
}

/// Settles one delivery with the broker.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    /// Positive acknowledgement.
    async fn ack(&self) -> Result<()>;

    /// Negative acknowledgement. With `requeue == false` the message is dropped.
    async fn nack(&self, requeue: bool) -> Result<()>;
}

/// A message handed to a consumer.
pub struct Delivery {
    /// Raw message body.
    pub payload: Vec<u8>,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    /// Wrap a payload together with the handle that settles it.
    #[must_use]
    pub fn new(payload: Vec<u8>, acker: Box<dyn Acknowledger>) -> Self {
        Self { payload, acker }
    }

    /// Acknowledge.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Closed` if the channel died first.
    pub async fn ack(self) -> Result<()> {
        self.acker.ack().await
    }

    /// Reject.
    ///
    /// # Errors
    ///
    /// Returns `QueueError::Closed` if the channel died first.
    pub async fn nack(self, requeue: bool) -> Result<()> {
        self.acker.nack(requeue).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("bytes", &self.payload.len())
            .finish_non_exhaustive()
    }
}
