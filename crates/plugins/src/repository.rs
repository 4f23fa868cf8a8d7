//! Local plugin repository
//!
//! Layout: `<root>/<plugin id>/<version>/` with a complete plugin directory
//! (including `plugin.json`) below each version.

use crate::error::PluginError;
use semver::{Version, VersionReq};
use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A version picked from the repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVersion {
    pub version: String,
    pub dir: PathBuf,
}

pub struct LocalRepository {
    root: PathBuf,
}

impl LocalRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Available versions of `plugin_id`, lowest first
    pub fn versions(&self, plugin_id: &str) -> Result<Vec<String>, PluginError> {
        validate_plugin_id(plugin_id)?;

        let entries = match fs::read_dir(self.root.join(plugin_id)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(PluginError::Repository {
                    status: 404,
                    message: "Plugin not found".to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let mut versions: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        versions.sort_by(|a, b| compare_versions(a, b));
        Ok(versions)
    }

    /// Pick `version`, or the latest one when `version` is empty
    pub fn resolve(&self, plugin_id: &str, version: &str) -> Result<ResolvedVersion, PluginError> {
        let versions = self.versions(plugin_id)?;

        let picked = if version.is_empty() {
            versions.last().cloned()
        } else {
            versions
                .into_iter()
                .find(|v| compare_versions(v, version) == Ordering::Equal)
        };

        match picked {
            Some(version) => Ok(ResolvedVersion {
                dir: self.root.join(plugin_id).join(&version),
                version,
            }),
            None => Err(PluginError::VersionNotFound {
                plugin_id: plugin_id.to_string(),
                version: version.to_string(),
            }),
        }
    }

    pub fn latest_version(&self, plugin_id: &str) -> Option<String> {
        self.versions(plugin_id).ok()?.pop()
    }
}

/// Plugin ids may only hold ASCII alphanumerics, `.`, `_` and `-`
pub fn validate_plugin_id(plugin_id: &str) -> Result<(), PluginError> {
    let valid = !plugin_id.is_empty()
        && plugin_id != "."
        && plugin_id != ".."
        && plugin_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
    if valid {
        Ok(())
    } else {
        Err(PluginError::Repository {
            status: 400,
            message: "Invalid plugin ID".to_string(),
        })
    }
}

/// Parse a version leniently: a leading `v` is dropped and a missing minor
/// or patch counts as zero.
pub fn parse_version(version: &str) -> Option<Version> {
    let version = version.trim().trim_start_matches('v');
    if let Ok(parsed) = Version::parse(version) {
        return Some(parsed);
    }
    let (core, rest) = match version.find(['-', '+']) {
        Some(i) => version.split_at(i),
        None => (version, ""),
    };
    let parts = core.split('.').count();
    if parts >= 3 {
        return None;
    }
    Version::parse(&format!("{}{}{}", core, ".0".repeat(3 - parts), rest)).ok()
}

/// Order versions by semver precedence
///
/// Anything that is not a version sorts below every version, and two such
/// names compare lexically.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (parse_version(a), parse_version(b)) {
        (Some(a), Some(b)) => a.cmp_precedence(&b),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}

/// Check `host` against a `grafanaDependency` requirement
///
/// Accepts npm-style ranges: `>=8.0.0`, `>= 8.0.0`, `>=7.5 <9`, `^8.0.0`,
/// `~8.3.0`, `8.x` and `||` alternatives. An empty requirement or `*`
/// matches everything; a requirement that does not parse matches nothing.
pub fn satisfies(requirement: &str, host: &str) -> bool {
    let requirement = requirement.trim();
    if requirement.is_empty() || requirement == "*" {
        return true;
    }
    let Some(host) = parse_version(host) else {
        return false;
    };
    requirement.split("||").any(|alternative| {
        match VersionReq::parse(&normalize_requirement(alternative)) {
            Ok(req) => req.matches(&host),
            Err(e) => {
                debug!("Unparseable version requirement {:?}: {}", alternative, e);
                false
            }
        }
    })
}

/// Rewrite a space separated range into the comma separated form `semver` parses
fn normalize_requirement(alternative: &str) -> String {
    let mut clauses: Vec<String> = Vec::new();
    let mut pending_op = String::new();
    for token in alternative.split_whitespace() {
        if token.chars().all(|c| matches!(c, '>' | '<' | '=' | '^' | '~')) {
            pending_op.push_str(token);
            continue;
        }
        let clause = format!("{}{}", std::mem::take(&mut pending_op), token);
        let version_start = clause
            .find(|c: char| !matches!(c, '>' | '<' | '=' | '^' | '~'))
            .unwrap_or(clause.len());
        // `>=8.x` means `>=8`; only a bare `8.x` keeps its wildcard
        if version_start > 0 {
            let (op, version) = clause.split_at(version_start);
            let version = version.trim_end_matches(".x").trim_end_matches(".*");
            clauses.push(format!("{}{}", op, version));
        } else {
            clauses.push(clause);
        }
    }
    if !pending_op.is_empty() {
        clauses.push(pending_op);
    }
    if clauses.is_empty() {
        return "*".to_string();
    }
    clauses.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn repo_with(versions: &[&str]) -> (TempDir, LocalRepository) {
        let dir = TempDir::new().unwrap();
        for v in versions {
            fs::create_dir_all(dir.path().join("clock").join(v)).unwrap();
        }
        let repo = LocalRepository::new(dir.path());
        (dir, repo)
    }

    #[test]
    fn test_compare_versions() {
        assert_eq!(compare_versions("1.10.0", "1.9.3"), Ordering::Greater);
        assert_eq!(compare_versions("2.0", "2.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("v1.2.3", "1.2.3"), Ordering::Equal);
        assert_eq!(compare_versions("1.0.0-beta.1", "1.0.0"), Ordering::Less);
        assert_eq!(compare_versions("0.9.1", "1.0.0-beta.1"), Ordering::Less);
        assert_eq!(compare_versions("nightly", "0.0.1"), Ordering::Less);
        assert_eq!(compare_versions("beta", "alpha"), Ordering::Greater);
    }

    #[test]
    fn test_satisfies() {
        assert!(satisfies("", "8.3.0"));
        assert!(satisfies("*", "8.3.0"));
        assert!(satisfies(">=8.0.0", "8.3.0"));
        assert!(!satisfies(">=9.0.0", "8.3.0"));
        assert!(satisfies(">=7.5 <9", "8.3.0"));
        assert!(!satisfies(">=7.5 <8", "8.3.0"));
        assert!(satisfies("8.x", "8.3.0"));
        assert!(!satisfies("7.x", "8.3.0"));
        assert!(satisfies(">=8.x", "8.3.0"));
        assert!(!satisfies("not a range", "8.3.0"));
        assert!(!satisfies(">=", "8.3.0"));
    }

    #[test]
    fn test_satisfies_caret_and_tilde() {
        assert!(satisfies("^8.0.0", "8.3.0"));
        assert!(!satisfies("^9.0.0", "8.3.0"));
        assert!(satisfies("~8.3.0", "8.3.0"));
        assert!(!satisfies("~8.2.0", "8.3.0"));
    }

    #[test]
    fn test_satisfies_spaced_operators() {
        assert!(satisfies(">= 8.0.0", "8.3.0"));
        assert!(satisfies(">= 7.5 < 9", "8.3.0"));
        assert!(!satisfies(">= 9.0.0", "8.3.0"));
    }

    #[test]
    fn test_satisfies_alternatives() {
        assert!(satisfies(">=7.0.0 || >=8.0.0", "8.3.0"));
        assert!(satisfies("^7.0.0 || ^8.0.0", "8.3.0"));
        assert!(!satisfies("^6.0.0 || ^7.0.0", "8.3.0"));
    }

    #[test]
    fn test_non_semver_dirs_sort_first() {
        let (_dir, repo) = repo_with(&["1.0.0", "nightly", "0.9.0"]);
        assert_eq!(repo.versions("clock").unwrap(), vec!["nightly", "0.9.0", "1.0.0"]);
        assert_eq!(repo.resolve("clock", "").unwrap().version, "1.0.0");
        assert_eq!(repo.resolve("clock", "nightly").unwrap().version, "nightly");
    }

    #[test]
    fn test_resolve_latest_and_exact() {
        let (_dir, repo) = repo_with(&["1.2.0", "1.10.0", "1.9.0"]);

        assert_eq!(repo.versions("clock").unwrap(), vec!["1.2.0", "1.9.0", "1.10.0"]);
        assert_eq!(repo.resolve("clock", "").unwrap().version, "1.10.0");
        assert_eq!(repo.resolve("clock", "1.9.0").unwrap().version, "1.9.0");
        assert_eq!(repo.latest_version("clock").as_deref(), Some("1.10.0"));
    }

    #[test]
    fn test_resolve_missing_version() {
        let (_dir, repo) = repo_with(&["1.0.0"]);
        let err = repo.resolve("clock", "2.0.0").unwrap_err();
        assert!(matches!(err, PluginError::VersionNotFound { .. }));
    }

    #[test]
    fn test_unknown_plugin_is_client_error() {
        let (_dir, repo) = repo_with(&["1.0.0"]);
        let err = repo.resolve("nope", "").unwrap_err();
        assert!(matches!(err, PluginError::Repository { status: 404, .. }));
    }

    #[test]
    fn test_invalid_plugin_id() {
        let (_dir, repo) = repo_with(&[]);
        let err = repo.resolve("../etc", "").unwrap_err();
        assert!(matches!(err, PluginError::Repository { status: 400, .. }));
        assert!(validate_plugin_id("grafana-clock-panel").is_ok());
        assert!(validate_plugin_id("..").is_err());
    }
}
