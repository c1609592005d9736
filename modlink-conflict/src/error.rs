//! Error types for conflict resolution.

use thiserror::Error;

/// Result type for conflict operations.
pub type Result<T> = std::result::Result<T, ConflictError>;

/// Errors raised by the engine or by strategies.
///
/// Strategy errors never reach the engine's caller; they become the reason
/// on a `failed` record.
#[derive(Debug, Error)]
pub enum ConflictError {
    /// A conflict needs at least two modules.
    #[error("a conflict needs at least two modules, got {0}")]
    TooFewModules(usize),

    /// A strategy with this name is already registered.
    #[error("strategy already registered: {0}")]
    DuplicateStrategy(String),

    /// Required metadata is absent.
    #[error("missing metadata: {0}")]
    MissingMetadata(String),

    /// Metadata is present but unusable.
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    /// The strategy could not pick a winner.
    #[error("resolution failed: {0}")]
    Unresolvable(String),
}
