//! tufa Common - Shared types and utilities
//!
//! This crate provides the identifiers, error definitions, object path and
//! replication policy parsing, and client configuration shared by the blob
//! data plane and its tooling.

pub mod config;
pub mod error;
pub mod path;
pub mod policy;
pub mod types;

pub use config::ClientConfig;
pub use error::{Error, Result};
pub use path::{AliasResolver, ParsedPath, is_remote_path};
pub use policy::ReplicationPolicy;
pub use types::*;
