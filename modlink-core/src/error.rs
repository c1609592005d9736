//! Error types for core construction and configuration.

use modlink_router::RouterError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    /// The config file exists but could not be read.
    #[error("failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config is not valid TOML for [`CoreConfig`](crate::CoreConfig).
    #[error("invalid config in {origin}: {source}")]
    Config {
        origin: String,
        #[source]
        source: toml::de::Error,
    },

    /// A configured routing rule was rejected.
    #[error(transparent)]
    Router(#[from] RouterError),
}
