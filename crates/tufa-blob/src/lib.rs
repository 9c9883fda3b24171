//! tufa Blob - Client side of the blob data plane
//!
//! This crate implements:
//! - The binary request/response protocol spoken by blob servers
//! - A single-connection data client (append, append+sync, sync, read)
//! - Bounded per-server connection pooling
//! - Majority-quorum replicated appends

pub mod data;
pub mod error;
pub mod pool;
pub mod protocol;
pub mod quorum;

#[cfg(test)]
mod test_server;

pub use data::{DataClient, DataOptions};
pub use error::{BlobError, BlobResult};
pub use pool::{DataClientPool, ServerPoolStats};
pub use protocol::{
    OpCode, PROTOCOL_MAGIC, REQUEST_HEADER_SIZE, RESPONSE_HEADER_SIZE, RequestHeader,
    ResponseHeader, StatusCode,
};
pub use quorum::{QuorumWriter, ReplicaConnection};
