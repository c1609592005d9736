//! Error types for the router.

use thiserror::Error;

/// Result type for router operations.
pub type Result<T> = std::result::Result<T, RouterError>;

/// Errors that can occur when mutating the router.
#[derive(Debug, Error)]
pub enum RouterError {
    /// A rule with this id is already registered.
    #[error("routing rule already registered: {0}")]
    DuplicateRule(String),

    /// A filter with this id is already registered.
    #[error("message filter already registered: {0}")]
    DuplicateFilter(String),
}
