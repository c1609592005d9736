//! Error types for the message bus.

use modlink_types::MessageId;
use std::time::Duration;
use thiserror::Error;

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors surfaced to callers of the bus.
///
/// Handler failures never appear here; they are logged and counted.
#[derive(Debug, Error)]
pub enum BusError {
    /// No response arrived before the deadline.
    #[error("request {request_id} timed out after {}ms", timeout.as_millis())]
    Timeout {
        request_id: MessageId,
        timeout: Duration,
    },

    /// A router filter vetoed the request.
    #[error("request {0} was filtered by the router")]
    Filtered(MessageId),

    /// The response channel closed without a response.
    #[error("response channel closed for request {0}")]
    ChannelClosed(MessageId),
}

impl BusError {
    /// Returns true for the timeout variant.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}
