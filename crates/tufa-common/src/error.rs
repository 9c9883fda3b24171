//! Error types for tufa
//!
//! Errors raised by the shared types: identifier, path and replication
//! policy parsing, and configuration loading. Data-plane errors live in
//! `tufa-blob`.

use thiserror::Error;

/// Common result type for tufa operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for tufa
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    #[error("invalid replication policy: {0}")]
    InvalidPolicy(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("unknown alias: {0}")]
    UnknownAlias(String),

    #[error("resolving alias {alias:?}: {source}")]
    AliasResolution {
        alias: String,
        #[source]
        source: Box<Error>,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an invalid policy error
    pub fn invalid_policy(msg: impl Into<String>) -> Self {
        Self::InvalidPolicy(msg.into())
    }

    /// Create an invalid path error
    pub fn invalid_path(msg: impl Into<String>) -> Self {
        Self::InvalidPath(msg.into())
    }

    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
