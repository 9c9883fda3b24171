//! Core type definitions for tufa
//!
//! Identifiers and replica descriptors handed to the data plane by the
//! control plane.

use crate::error::{Error, Result};
use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Size of an object identifier in bytes
pub const OBJECT_ID_SIZE: usize = 16;

/// Unique identifier for an append-only object
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, From, Into)]
pub struct ObjectId(Uuid);

impl ObjectId {
    /// Generate a new random object ID
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The all-zero object ID
    #[must_use]
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Create from existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Create from raw bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; OBJECT_ID_SIZE]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Create from a byte slice, which must be exactly 16 bytes long
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; OBJECT_ID_SIZE] = bytes.try_into().map_err(|_| {
            Error::InvalidObjectId(format!("expected {OBJECT_ID_SIZE} bytes, got {}", bytes.len()))
        })?;
        Ok(Self::from_bytes(arr))
    }

    /// Get the underlying UUID
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// Get as bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; OBJECT_ID_SIZE] {
        self.0.as_bytes()
    }

    /// Whether this is the nil ID
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::nil()
    }
}

impl From<[u8; OBJECT_ID_SIZE]> for ObjectId {
    fn from(bytes: [u8; OBJECT_ID_SIZE]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| Error::InvalidObjectId(format!("{s:?}: {e}")))
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Data endpoint of one blob server holding a replica of an object
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{addr}")]
pub struct ReplicaInfo {
    /// `host:port` of the server's data endpoint
    pub addr: String,
}

impl ReplicaInfo {
    /// Create a replica descriptor for the given address
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

impl From<&str> for ReplicaInfo {
    fn from(addr: &str) -> Self {
        Self::new(addr)
    }
}

impl From<String> for ReplicaInfo {
    fn from(addr: String) -> Self {
        Self { addr }
    }
}

/// Majority quorum for `replicas` replicas: `floor(n/2) + 1`
#[must_use]
pub const fn majority(replicas: usize) -> usize {
    replicas / 2 + 1
}
