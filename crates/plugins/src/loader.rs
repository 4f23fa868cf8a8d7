//! Plugin discovery
//!
//! Every directory holding a `plugin.json` is a plugin. Plugins found below an
//! app plugin's directory are loaded as that app's children.

use crate::error::{PluginError, PluginErrorCode, PluginErrorInfo};
use crate::model::{PluginClass, PluginDef, SignatureStatus};
use crate::paths::relative_slash;
use crate::signature::verify_signature;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub const PLUGIN_JSON: &str = "plugin.json";

/// Loader settings
#[derive(Debug, Clone, Default)]
pub struct LoaderConfig {
    /// Sub path the UI is served under, used for navigation URLs
    pub app_sub_url: String,

    /// Plugin ids that may load without a valid signature
    pub allow_unsigned: Vec<String>,
}

/// Plugins and load errors found in one scan
#[derive(Debug, Default)]
pub struct LoadResult {
    pub plugins: Vec<PluginDef>,
    pub errors: Vec<PluginErrorInfo>,
}

impl LoadResult {
    fn extend(&mut self, other: LoadResult) {
        self.plugins.extend(other.plugins);
        self.errors.extend(other.errors);
    }
}

pub struct PluginLoader {
    config: LoaderConfig,
}

impl PluginLoader {
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    /// Scan every direct subdirectory of `root`
    pub fn load_all(&self, root: &Path, class: PluginClass) -> LoadResult {
        let mut result = LoadResult::default();

        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("Plugin directory {} does not exist", root.display());
                return result;
            }
            Err(e) => {
                warn!("Failed to read plugin directory {}: {}", root.display(), e);
                return result;
            }
        };

        let mut dirs: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
            .map(|e| e.path())
            .filter(|p| p.join(PLUGIN_JSON).is_file())
            .collect();
        dirs.sort();

        for dir in dirs {
            result.extend(self.load_one(&dir, class));
        }
        result
    }

    /// Load the plugin in `dir` along with any nested child plugins
    pub fn load_one(&self, dir: &Path, class: PluginClass) -> LoadResult {
        let mut result = LoadResult::default();

        let mut plugin = match read_plugin_json(dir) {
            Ok(p) => p,
            Err(e) => {
                warn!("Skipping plugin in {}: {}", dir.display(), e);
                result.errors.push(PluginErrorInfo {
                    plugin_id: dir_name(dir),
                    error_code: PluginErrorCode::InvalidManifest,
                });
                return result;
            }
        };
        plugin.class = class;
        plugin.plugin_dir = dir.to_path_buf();

        if class == PluginClass::Core {
            plugin.signature = SignatureStatus::Internal;
        } else {
            match verify_signature(&plugin.id, dir) {
                Ok(check) => {
                    plugin.signature = check.status;
                    plugin.signature_type = check.signature_type;
                    plugin.signature_org = check.signed_by_org;
                    plugin.signed_files = check.files;
                }
                Err(e) => {
                    warn!("Failed to verify signature of {}: {}", plugin.id, e);
                    plugin.signature = SignatureStatus::Invalid;
                }
            }
        }

        if let Some(code) = self.refusal(&plugin) {
            warn!(
                "Plugin {} has signature status {:?} and will not be loaded",
                plugin.id, plugin.signature
            );
            result.errors.push(PluginErrorInfo {
                plugin_id: plugin.id,
                error_code: code,
            });
            return result;
        }

        plugin.finalize_urls(&self.config.app_sub_url);

        if plugin.is_app() {
            for child_dir in nested_plugin_dirs(dir) {
                match read_plugin_json(&child_dir) {
                    Ok(mut child) => {
                        child.class = class;
                        child.plugin_dir = child_dir.clone();
                        child.included_in_app_id = Some(plugin.id.clone());
                        inherit_signature(&plugin, &mut child);
                        child.finalize_urls(&self.config.app_sub_url);
                        plugin.children.push(child.id.clone());
                        result.plugins.push(child);
                    }
                    Err(e) => {
                        warn!("Skipping nested plugin in {}: {}", child_dir.display(), e);
                        result.errors.push(PluginErrorInfo {
                            plugin_id: dir_name(&child_dir),
                            error_code: PluginErrorCode::InvalidManifest,
                        });
                    }
                }
            }
        }

        debug!("Loaded plugin {} from {}", plugin.id, dir.display());
        result.plugins.insert(0, plugin);
        result
    }

    fn refusal(&self, plugin: &PluginDef) -> Option<PluginErrorCode> {
        if plugin.signature.is_valid() || self.config.allow_unsigned.contains(&plugin.id) {
            return None;
        }
        match plugin.signature {
            SignatureStatus::Unsigned => Some(PluginErrorCode::SignatureMissing),
            SignatureStatus::Modified => Some(PluginErrorCode::SignatureModified),
            _ => Some(PluginErrorCode::SignatureInvalid),
        }
    }
}

/// Parse `<dir>/plugin.json`
pub fn read_plugin_json(dir: &Path) -> Result<PluginDef, PluginError> {
    let content = fs::read(dir.join(PLUGIN_JSON))?;
    let plugin: PluginDef = serde_json::from_slice(&content)?;
    Ok(plugin)
}

fn inherit_signature(parent: &PluginDef, child: &mut PluginDef) {
    child.signature = parent.signature;
    child.signature_type = parent.signature_type;
    child.signature_org = parent.signature_org.clone();

    let Some(prefix) = relative_slash(&parent.plugin_dir, &child.plugin_dir) else {
        return;
    };
    let prefix = format!("{}/", prefix);
    child.signed_files = parent
        .signed_files
        .iter()
        .filter_map(|f| f.strip_prefix(&prefix))
        .map(str::to_string)
        .collect();
}

/// Directories below `root` (excluding `root` itself) that hold a plugin.json
///
/// Symlinked directories and `node_modules` are not descended into.
fn nested_plugin_dirs(root: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.file_name() != "node_modules")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir() && e.path().join(PLUGIN_JSON).is_file())
        .map(|e| e.into_path())
        .collect();
    found.sort();
    found
}

fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
