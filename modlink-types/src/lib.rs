//! Core type definitions for modlink.
//!
//! This crate defines the plain value types shared by every component of the
//! communication core:
//! - Message identifiers and the process-wide id generator
//! - The immutable [`Message`] envelope with its type and priority
//! - The generic [`Payload`] map with typed accessors
//!
//! Components (bus, router, conflict engine, sync manager) live in their own
//! crates and only depend on these types.

mod ids;
mod message;
mod payload;

pub use ids::{MessageId, MessageIdGenerator};
pub use message::{Message, MessageType, Priority};
pub use payload::Payload;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, TypesError>;

/// Errors that can occur when reading typed values out of a payload.
#[derive(Debug, thiserror::Error)]
pub enum TypesError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("payload key not found: {0}")]
    MissingKey(String),

    #[error("payload key '{key}' is not a {expected}")]
    TypeMismatch { key: String, expected: &'static str },

    #[error("payload must be a JSON object, got {0}")]
    NotAnObject(&'static str),
}
