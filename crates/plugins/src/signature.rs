//! Manifest-based plugin signature checks
//!
//! A signed plugin ships a `MANIFEST.json` in its root listing the sha256 of
//! every file it contains. Anything missing, altered or unlisted marks the
//! plugin as modified.

use crate::model::{SignatureStatus, SignatureType};
use crate::paths::{clean_rooted, relative_slash};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

pub const MANIFEST_FILE: &str = "MANIFEST.json";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub plugin: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub signature_type: Option<SignatureType>,
    #[serde(default)]
    pub signed_by_org: String,
    #[serde(default)]
    pub signed_by_org_name: String,
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

/// Outcome of checking a plugin directory against its manifest
#[derive(Debug, Clone, Default)]
pub struct SignatureCheck {
    pub status: SignatureStatus,
    pub signature_type: Option<SignatureType>,
    pub signed_by_org: String,
    pub files: HashSet<String>,
}

impl SignatureCheck {
    fn status(status: SignatureStatus) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }
}

/// Verify the plugin in `dir` against its manifest
pub fn verify_signature(plugin_id: &str, dir: &Path) -> io::Result<SignatureCheck> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let content = match fs::read(&manifest_path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Ok(SignatureCheck::status(SignatureStatus::Unsigned));
        }
        Err(e) => return Err(e),
    };

    let manifest: Manifest = match serde_json::from_slice(&content) {
        Ok(m) => m,
        Err(e) => {
            debug!("Invalid manifest for {}: {}", plugin_id, e);
            return Ok(SignatureCheck::status(SignatureStatus::Invalid));
        }
    };

    if manifest.plugin != plugin_id {
        debug!(
            "Manifest plugin id {} does not match {}",
            manifest.plugin, plugin_id
        );
        return Ok(SignatureCheck::status(SignatureStatus::Invalid));
    }

    for (rel, expected) in &manifest.files {
        if clean_rooted(rel) != *rel {
            debug!("{}: manifest lists path {} outside the plugin", plugin_id, rel);
            return Ok(SignatureCheck::status(SignatureStatus::Invalid));
        }
        let path = dir.join(rel);
        let digest = match fs::read(&path) {
            Ok(data) => hex::encode(Sha256::digest(&data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("{}: signed file {} is missing", plugin_id, rel);
                return Ok(SignatureCheck::status(SignatureStatus::Modified));
            }
            Err(e) => return Err(e),
        };
        if !digest.eq_ignore_ascii_case(expected) {
            debug!("{}: checksum mismatch for {}", plugin_id, rel);
            return Ok(SignatureCheck::status(SignatureStatus::Modified));
        }
    }

    for path in list_files(dir)? {
        let Some(rel) = relative_slash(dir, &path) else {
            continue;
        };
        if rel != MANIFEST_FILE && !manifest.files.contains_key(&rel) {
            debug!("{}: unsigned file {}", plugin_id, rel);
            return Ok(SignatureCheck::status(SignatureStatus::Modified));
        }
    }

    Ok(SignatureCheck {
        status: SignatureStatus::Valid,
        signature_type: manifest.signature_type,
        signed_by_org: manifest.signed_by_org_name,
        files: manifest.files.into_keys().collect(),
    })
}

/// Every non-directory entry below `dir`, symlinks included and not followed
pub fn list_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// Build a manifest body for the files currently in `dir`
pub fn manifest_for_dir(
    plugin_id: &str,
    dir: &Path,
    signature_type: SignatureType,
    org_name: &str,
) -> io::Result<serde_json::Value> {
    let mut files = serde_json::Map::new();
    for path in list_files(dir)? {
        let Some(rel) = relative_slash(dir, &path) else {
            continue;
        };
        if rel == MANIFEST_FILE || !path.is_file() {
            continue;
        }
        let digest = hex::encode(Sha256::digest(fs::read(&path)?));
        files.insert(rel, serde_json::Value::String(digest));
    }
    Ok(serde_json::json!({
        "plugin": plugin_id,
        "signatureType": signature_type,
        "signedByOrg": crate::paths::slugify(org_name),
        "signedByOrgName": org_name,
        "files": files,
    }))
}
