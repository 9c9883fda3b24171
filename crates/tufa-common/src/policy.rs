//! Replication policy
//!
//! Describes how many replicas an object gets and where. Policies are
//! written as URL query strings (`ssd=3&hdd=1&zone=local`) on object paths
//! and handed to the control plane at create time.

use crate::error::{Error, Result};
use crate::types::majority;
use serde::{Deserialize, Serialize};

const DEFAULT_SSD_REPLICAS: u32 = 3;

/// Replication policy for an object
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationPolicy {
    /// Number of replicas on SSD-backed blob servers
    pub ssd_replicas: u32,
    /// Number of replicas on HDD-backed blob servers
    pub hdd_replicas: u32,
    /// Also tier the object to cloud object storage
    pub archive: bool,
    /// Restrict placement to this zone; `None` means cross-zone placement
    pub local_zone: Option<String>,
}

impl Default for ReplicationPolicy {
    fn default() -> Self {
        Self {
            ssd_replicas: DEFAULT_SSD_REPLICAS,
            hdd_replicas: 0,
            archive: false,
            local_zone: None,
        }
    }
}

impl ReplicationPolicy {
    /// Parse a policy from a query string, applying defaults first.
    ///
    /// Supported parameters:
    /// - `ssd=N`: SSD replicas (default 3)
    /// - `hdd=N`: HDD replicas (default 0)
    /// - `archive`: enable the archive tier (presence means true)
    /// - `zone=cross|local`: placement strategy (default cross)
    ///
    /// `zone=local` requires `local_zone`. Unknown parameters are rejected
    /// so typos like `sssd=3` do not silently fall back to defaults.
    pub fn parse(query: &str, local_zone: Option<&str>) -> Result<Self> {
        let mut policy = Self::default();
        if query.is_empty() {
            return Ok(policy);
        }

        let params = parse_query(query)?;

        if let Some((key, _)) = params
            .iter()
            .find(|(k, _)| !matches!(k.as_str(), "ssd" | "hdd" | "archive" | "zone"))
        {
            return Err(Error::invalid_policy(format!(
                "unknown query parameter: {key:?}"
            )));
        }

        if let Some(v) = first_value(&params, "ssd") {
            policy.ssd_replicas = parse_count("ssd", v)?;
        }
        if let Some(v) = first_value(&params, "hdd") {
            policy.hdd_replicas = parse_count("hdd", v)?;
        }
        if params.iter().any(|(k, _)| k == "archive") {
            policy.archive = true;
        }
        if let Some(v) = first_value(&params, "zone") {
            match v {
                "cross" => {}
                "local" => {
                    let zone = local_zone.filter(|z| !z.is_empty()).ok_or_else(|| {
                        Error::invalid_policy("zone=local requires a local zone")
                    })?;
                    policy.local_zone = Some(zone.to_string());
                }
                other => {
                    return Err(Error::invalid_policy(format!(
                        "invalid zone value {other:?}: must be \"cross\" or \"local\""
                    )));
                }
            }
        }

        if policy.total_replicas() < 1 && !policy.archive {
            return Err(Error::invalid_policy(
                "at least one replica required (ssd + hdd >= 1) unless archive is enabled",
            ));
        }

        Ok(policy)
    }

    /// Total number of live replicas
    #[must_use]
    pub const fn total_replicas(&self) -> u32 {
        self.ssd_replicas + self.hdd_replicas
    }

    /// Number of acknowledgments a write needs under this policy
    #[must_use]
    pub const fn quorum(&self) -> usize {
        majority(self.total_replicas() as usize)
    }

    /// Whether placement is restricted to a single zone
    #[must_use]
    pub fn is_zone_local(&self) -> bool {
        self.local_zone.is_some()
    }
}

fn parse_query(query: &str) -> Result<Vec<(String, String)>> {
    let mut params = Vec::new();
    for pair in query.split('&').filter(|p| !p.is_empty()) {
        if pair.contains(';') {
            return Err(Error::invalid_policy(format!(
                "invalid query string: semicolon in {pair:?}"
            )));
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        params.push((unescape(key)?, unescape(value)?));
    }
    Ok(params)
}

/// Decode one query component: `+` is a space, `%XX` an escaped byte
fn unescape(component: &str) -> Result<String> {
    let spaced = component.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(std::borrow::Cow::into_owned)
        .map_err(|e| Error::invalid_policy(format!("invalid query string: {component:?}: {e}")))
}

fn first_value<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .filter(|v| !v.is_empty())
}

fn parse_count(name: &str, value: &str) -> Result<u32> {
    let n: i32 = value
        .parse()
        .map_err(|e| Error::invalid_policy(format!("invalid {name} value {value:?}: {e}")))?;
    u32::try_from(n)
        .map_err(|_| Error::invalid_policy(format!("{name} must be non-negative, got {n}")))
}
