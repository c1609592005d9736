//! Error types for the sync manager.

use thiserror::Error;

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No sync config is registered for the module.
    #[error("module not registered for sync: {0}")]
    NotRegistered(String),

    /// The config cannot be scheduled.
    #[error("invalid sync config for {module_id}: {reason}")]
    InvalidConfig { module_id: String, reason: String },

    /// A sink rejected the flushed changes.
    #[error("sink error: {0}")]
    Sink(String),
}
