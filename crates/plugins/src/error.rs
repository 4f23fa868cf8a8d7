//! Plugin lifecycle errors

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("plugin not found: {plugin_id}")]
    NotFound { plugin_id: String },

    #[error("plugin {plugin_id} is already installed")]
    Duplicate { plugin_id: String },

    #[error("{plugin_id} v{version} requires host version {requirement}")]
    VersionUnsupported {
        plugin_id: String,
        version: String,
        requirement: String,
    },

    #[error("{plugin_id} v{version} not found in repository")]
    VersionNotFound { plugin_id: String, version: String },

    #[error("repository responded {status}: {message}")]
    Repository { status: u16, message: String },

    #[error("cannot install or change a core plugin")]
    InstallCorePlugin,

    #[error("plugin is not installed")]
    NotInstalled,

    #[error("cannot uninstall a core plugin")]
    UninstallCorePlugin,

    #[error("cannot uninstall a plugin outside of the plugins directory")]
    UninstallOutsideOfPluginDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid plugin.json: {0}")]
    Manifest(#[from] serde_json::Error),
}

impl PluginError {
    pub fn not_found(plugin_id: impl Into<String>) -> Self {
        PluginError::NotFound {
            plugin_id: plugin_id.into(),
        }
    }
}

/// Error codes reported for plugins that were found but not loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PluginErrorCode {
    SignatureMissing,
    SignatureModified,
    SignatureInvalid,
    Duplicate,
    InvalidManifest,
}

/// A plugin load failure, as listed by `GET /api/plugins/errors`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginErrorInfo {
    pub plugin_id: String,
    pub error_code: PluginErrorCode,
}
