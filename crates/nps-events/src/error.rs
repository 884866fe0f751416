//! Error types for the event pipeline.

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Errors raised by transports, the connection handle and the consumer.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// The broker could not be reached.
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    /// The channel was closed underneath the caller.
    #[error("channel closed")]
    Closed,

    /// Connecting took longer than allowed.
    #[error("timed out connecting to broker")]
    Timeout,

    /// The broker rejected an operation.
    #[error("broker error: {0}")]
    Broker(String),

    /// A message could not be encoded or decoded.
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Writing the analytics row failed.
    #[error(transparent)]
    Store(#[from] nps_store::StoreError),
}

#[cfg(feature = "amqp")]
impl From<lapin::Error> for QueueError {
    fn from(err: lapin::Error) -> Self {
        match err {
            lapin::Error::IOError(io) => Self::Unavailable(io.to_string()),
            lapin::Error::InvalidChannelState(_) | lapin::Error::InvalidConnectionState(_) => {
                Self::Closed
            }
            other => Self::Broker(other.to_string()),
        }
    }
}
