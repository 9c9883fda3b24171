//! Blob data plane error types

use crate::protocol::StatusCode;
use thiserror::Error;

/// Blob data plane error
#[derive(Error, Debug)]
pub enum BlobError {
    /// Malformed header: bad magic, short buffer or unknown code
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Server reported `NotFound`
    #[error("object not found")]
    NotFound,

    /// Server reported `AlreadyExists`
    #[error("object already exists")]
    AlreadyExists,

    /// Server reported `Sealed`
    #[error("object is sealed")]
    Sealed,

    /// Server reported `IOError`
    #[error("I/O error")]
    IoError,

    /// Server reported `InvalidOp`
    #[error("invalid operation")]
    InvalidOp,

    /// Server reported `BadRequest`
    #[error("bad request")]
    BadRequest,

    /// Could not establish a connection
    #[error("connecting to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Connection failed mid-exchange
    #[error("{context}: {source}")]
    Transport {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Quorum writer has been closed
    #[error("quorum writer closed")]
    Closed,

    /// Write round deadline elapsed before the outcome was known
    #[error("timed out waiting for quorum")]
    Timeout,

    /// A write round is already in flight
    #[error("concurrent write_and_sync calls are not supported")]
    ConcurrentWrite,

    /// Quorum writer constructed without replicas
    #[error("no replicas")]
    NoReplicas,

    /// Could not start a replica worker thread
    #[error("spawning replica worker: {0}")]
    Spawn(#[source] std::io::Error),
}

impl BlobError {
    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Wrap a transport failure with what was being done
    pub fn transport(context: &'static str, source: std::io::Error) -> Self {
        Self::Transport { context, source }
    }

    /// The status code this error was translated from, if any
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::NotFound => Some(StatusCode::NotFound),
            Self::AlreadyExists => Some(StatusCode::AlreadyExists),
            Self::Sealed => Some(StatusCode::Sealed),
            Self::IoError => Some(StatusCode::IoError),
            Self::InvalidOp => Some(StatusCode::InvalidOp),
            Self::BadRequest => Some(StatusCode::BadRequest),
            _ => None,
        }
    }

    /// Check if this error came from a non-OK response status
    #[must_use]
    pub fn is_status(&self) -> bool {
        self.status().is_some()
    }

    /// Check if this error invalidated the connection
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::Transport { .. })
    }

    /// Check if retrying on a fresh connection may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.is_transport() || matches!(self, Self::Timeout | Self::IoError)
    }
}

/// Result type for blob operations
pub type BlobResult<T> = Result<T, BlobError>;
