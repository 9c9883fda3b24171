//! Configuration types for tufa
//!
//! Client-side settings for the blob data plane. Every section has
//! defaults, so an empty TOML document is a valid configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Default maximum number of pooled connections per blob server
pub const DEFAULT_POOL_SIZE: usize = 8;

/// Root client configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Connection pool configuration
    pub pool: PoolConfig,
    /// Per-connection configuration
    pub data: DataConfig,
    /// Quorum writer configuration
    pub quorum: QuorumConfig,
    /// Named controller address lists for `///alias/path` paths
    pub aliases: BTreeMap<String, Vec<String>>,
}

impl ClientConfig {
    /// Parse a configuration from a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::configuration(e.to_string()))
    }

    /// Load a configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }
}

/// Connection pool configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum connections per server; zero or negative means the default
    pub max_connections_per_server: i64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections_per_server: DEFAULT_POOL_SIZE as i64,
        }
    }
}

impl PoolConfig {
    /// Effective pool size after applying the default for non-positive values
    #[must_use]
    pub fn effective_size(&self) -> usize {
        usize::try_from(self.max_connections_per_server)
            .ok()
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_POOL_SIZE)
    }
}

/// Data connection configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// TCP connect timeout in milliseconds (none = OS default)
    pub connect_timeout_ms: Option<u64>,
    /// Disable Nagle's algorithm on data connections
    pub nodelay: bool,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: None,
            nodelay: true,
        }
    }
}

impl DataConfig {
    /// Connect timeout as a duration
    #[must_use]
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }
}

/// Quorum writer configuration
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuorumConfig {
    /// Deadline for a single write round in milliseconds (none = wait forever)
    pub write_timeout_ms: Option<u64>,
}

impl QuorumConfig {
    /// Write round deadline as a duration
    #[must_use]
    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }
}
