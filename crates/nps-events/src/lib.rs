//! Analytics event pipeline for the NPS onboarding service.
//!
//! Request handlers publish [`nps_core::QueueMessage`]s through an
//! [`EventEmitter`]; a background [`AnalyticsConsumer`] drains the durable queue
//! into the analytics log. Both share one [`QueueConnection`].
//!
//! # Transports
//!
//! - [`MemoryBroker`]: in-process queues with prefetch, redelivery and fault
//!   injection. Used by tests and local runs.
//! - `AmqpTransport` (feature `amqp`): RabbitMQ through `lapin`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

#[cfg(feature = "amqp")]
pub mod amqp;
pub mod connection;
pub mod consumer;
pub mod emitter;
pub mod error;
pub mod memory;
pub mod transport;

#[cfg(feature = "amqp")]
pub use amqp::AmqpTransport;
pub use connection::{ConnectionState, QueueConnection};
pub use consumer::{AnalyticsConsumer, RECONNECT_DELAY};
pub use emitter::EventEmitter;
pub use error::{QueueError, Result};
pub use memory::MemoryBroker;
pub use transport::{Acknowledger, Channel, Delivery, DeliveryStream, Transport};

/// Default durable queue name.
pub const DEFAULT_QUEUE: &str = "nps_events";
