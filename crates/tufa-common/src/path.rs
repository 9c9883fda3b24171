//! Object path parsing
//!
//! Remote objects are named by a path that carries the controllers to talk
//! to, the namespace path and an optional replication policy:
//!
//! ```text
//! //host:port/dir/file?ssd=2&hdd=1        direct controller address
//! //host1:port,host2:port/dir/file        several controllers
//! ///alias/dir/file?zone=local            named alias, via an AliasResolver
//! tufa://host:port/dir/file               any of the above with a scheme
//! /dir/file                               local filesystem path
//! ```

use crate::error::{Error, Result};
use crate::policy::ReplicationPolicy;
use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

/// Optional scheme prefix for remote paths
pub const SCHEME: &str = "tufa:";

/// Resolves alias names to controller addresses
pub trait AliasResolver {
    fn resolve(&self, name: &str) -> Result<Vec<String>>;
}

impl AliasResolver for BTreeMap<String, Vec<String>> {
    fn resolve(&self, name: &str) -> Result<Vec<String>> {
        self.get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownAlias(name.to_string()))
    }
}

impl<S: BuildHasher> AliasResolver for HashMap<String, Vec<String>, S> {
    fn resolve(&self, name: &str) -> Result<Vec<String>> {
        self.get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownAlias(name.to_string()))
    }
}

/// Whether `path` names a remote object rather than a local file
#[must_use]
pub fn is_remote_path(path: &str) -> bool {
    path.starts_with("//") || path.strip_prefix(SCHEME).is_some_and(|p| p.starts_with("//"))
}

/// A parsed remote path
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedPath {
    controllers: Vec<String>,
    path: String,
    policy: ReplicationPolicy,
}

impl ParsedPath {
    /// Parse a path, returning `None` for local filesystem paths.
    ///
    /// The query string is parsed with [`ReplicationPolicy::parse`], so
    /// `zone=local` requires `local_zone`. Alias paths require `resolver`.
    pub fn parse(
        path: &str,
        local_zone: Option<&str>,
        resolver: Option<&dyn AliasResolver>,
    ) -> Result<Option<Self>> {
        let path = path.strip_prefix(SCHEME).unwrap_or(path);
        let Some(rest) = path.strip_prefix("//") else {
            return Ok(None);
        };

        let (rest, query) = rest.split_once('?').unwrap_or((rest, ""));

        let (controllers, ns_path) = match rest.strip_prefix('/') {
            Some(rest) => {
                let (alias, ns_path) = split_authority(rest);
                if alias.is_empty() {
                    return Err(Error::invalid_path("empty alias name"));
                }
                let resolver = resolver.ok_or_else(|| {
                    Error::invalid_path(format!("alias {alias:?} requires a resolver"))
                })?;
                let controllers = resolver.resolve(alias).map_err(|e| Error::AliasResolution {
                    alias: alias.to_string(),
                    source: Box::new(e),
                })?;
                (controllers, ns_path)
            }
            None => {
                let (addrs, ns_path) = split_authority(rest);
                if addrs.is_empty() {
                    return Err(Error::invalid_path("empty controller address"));
                }
                let controllers = addrs
                    .split(',')
                    .map(|addr| match addr.trim() {
                        "" => Err(Error::invalid_path("empty controller address in list")),
                        addr => Ok(addr.to_string()),
                    })
                    .collect::<Result<Vec<_>>>()?;
                (controllers, ns_path)
            }
        };

        Ok(Some(Self {
            controllers,
            path: ns_path.to_string(),
            policy: ReplicationPolicy::parse(query, local_zone)?,
        }))
    }

    /// Controller addresses serving this path
    #[must_use]
    pub fn controllers(&self) -> &[String] {
        &self.controllers
    }

    /// Namespace path without the query string; always starts with `/`
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Replication policy from the query string, defaults applied
    #[must_use]
    pub fn policy(&self) -> &ReplicationPolicy {
        &self.policy
    }

    /// Split the namespace path into directory and base name.
    ///
    /// `/a/b/c` gives `("/a/b", "c")`, `/a` gives `("", "a")` and `/` gives
    /// `("", "")`.
    #[must_use]
    pub fn split_path(&self) -> (&str, &str) {
        let trimmed = &self.path[1..];
        match trimmed.rfind('/') {
            Some(idx) => (&self.path[..=idx], &trimmed[idx + 1..]),
            None => ("", trimmed),
        }
    }
}

/// Split `authority/path` into the authority and the namespace path,
/// which is `/` when absent.
fn split_authority(rest: &str) -> (&str, &str) {
    match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, "/"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> BTreeMap<String, Vec<String>> {
        BTreeMap::from([(
            "prod".to_string(),
            vec!["ctl-1:26257".to_string(), "ctl-2:26257".to_string()],
        )])
    }

    fn parse(path: &str) -> Result<Option<ParsedPath>> {
        ParsedPath::parse(path, Some("us-east1-b"), Some(&resolver()))
    }

    #[test]
    fn test_local_paths() {
        for path in ["/tmp/file", "relative/file", "", "tufa:/tmp/file", "/"] {
            assert_eq!(parse(path).unwrap(), None, "{path:?}");
        }
    }

    #[test]
    fn test_parse_table() {
        // (path, controllers, namespace path, dir, base, ssd, hdd, archive, zone)
        let cases: &[(&str, &[&str], &str, &str, &str, u32, u32, bool, Option<&str>)] = &[
            ("//h:1/a/b/c", &["h:1"], "/a/b/c", "/a/b", "c", 3, 0, false, None),
            ("//h:1/file", &["h:1"], "/file", "", "file", 3, 0, false, None),
            ("//h:1", &["h:1"], "/", "", "", 3, 0, false, None),
            ("//h:1/", &["h:1"], "/", "", "", 3, 0, false, None),
            ("//h:1?ssd=1", &["h:1"], "/", "", "", 1, 0, false, None),
            ("//h1:1,h2:2/x", &["h1:1", "h2:2"], "/x", "", "x", 3, 0, false, None),
            ("//h1:1, h2:2 /x", &["h1:1", "h2:2"], "/x", "", "x", 3, 0, false, None),
            ("tufa://h:1/d/f?hdd=2", &["h:1"], "/d/f", "/d", "f", 3, 2, false, None),
            ("//h:1/d/f?ssd=0&archive", &["h:1"], "/d/f", "/d", "f", 0, 0, true, None),
            (
                "//h:1/d/f?zone=local",
                &["h:1"],
                "/d/f",
                "/d",
                "f",
                3,
                0,
                false,
                Some("us-east1-b"),
            ),
            (
                "///prod/logs/000001.log?ssd=2&hdd=1",
                &["ctl-1:26257", "ctl-2:26257"],
                "/logs/000001.log",
                "/logs",
                "000001.log",
                2,
                1,
                false,
                None,
            ),
            ("///prod", &["ctl-1:26257", "ctl-2:26257"], "/", "", "", 3, 0, false, None),
            ("tufa:///prod/x", &["ctl-1:26257", "ctl-2:26257"], "/x", "", "x", 3, 0, false, None),
        ];

        for &(input, controllers, path, dir, base, ssd, hdd, archive, zone) in cases {
            let parsed = parse(input).unwrap().unwrap();
            assert_eq!(parsed.controllers(), controllers, "{input}");
            assert_eq!(parsed.path(), path, "{input}");
            assert_eq!(parsed.split_path(), (dir, base), "{input}");
            let policy = parsed.policy();
            assert_eq!(policy.ssd_replicas, ssd, "{input}");
            assert_eq!(policy.hdd_replicas, hdd, "{input}");
            assert_eq!(policy.archive, archive, "{input}");
            assert_eq!(policy.local_zone.as_deref(), zone, "{input}");
        }
    }

    #[test]
    fn test_parse_errors() {
        let cases = [
            ("//", "empty controller address"),
            ("//?ssd=1", "empty controller address"),
            ("//h:1,,h:2/x", "empty controller address in list"),
            ("//h:1, /x", "empty controller address in list"),
            ("////x", "empty alias name"),
            ("//h:1/x?sssd=3", "unknown query parameter"),
            ("//h:1/x?ssd=0", "at least one replica"),
        ];
        for (input, want) in cases {
            let err = parse(input).unwrap_err();
            assert!(err.to_string().contains(want), "{input}: {err}");
        }
    }

    #[test]
    fn test_alias_resolution_errors() {
        let err = parse("///staging/x").unwrap_err();
        assert!(
            matches!(&err, Error::AliasResolution { alias, source }
                if alias == "staging" && matches!(**source, Error::UnknownAlias(_))),
            "{err}"
        );

        let err = ParsedPath::parse("///prod/x", None, None).unwrap_err();
        assert!(err.to_string().contains("requires a resolver"), "{err}");
    }

    #[test]
    fn test_zone_local_needs_local_zone() {
        let err = ParsedPath::parse("//h:1/x?zone=local", None, None).unwrap_err();
        assert!(matches!(err, Error::InvalidPolicy(_)));
    }

    #[test]
    fn test_is_remote_path() {
        assert!(is_remote_path("//h:1/x"));
        assert!(is_remote_path("///prod/x"));
        assert!(is_remote_path("tufa://h:1/x"));
        assert!(!is_remote_path("tufa:/x"));
        assert!(!is_remote_path("/x"));
        assert!(!is_remote_path("x"));
    }
}
