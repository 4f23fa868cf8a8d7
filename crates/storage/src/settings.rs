//! Per-organization plugin settings

use crate::error::StorageError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Settings of one plugin in one organization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSetting {
    pub org_id: i64,
    pub plugin_id: String,
    pub enabled: bool,
    pub pinned: bool,
    pub json_data: Map<String, Value>,

    /// Write-only secrets; only their keys are ever exposed
    pub secure_json_data: BTreeMap<String, String>,

    pub plugin_version: String,

    /// Last update, ms since epoch
    pub updated: u64,
}

impl PluginSetting {
    /// Keys of the stored secrets, each mapped to `true`
    pub fn secure_json_fields(&self) -> BTreeMap<String, bool> {
        self.secure_json_data
            .keys()
            .map(|k| (k.clone(), true))
            .collect()
    }
}

/// Body of `POST /api/plugins/:pluginId/settings`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePluginSettingCmd {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub json_data: Option<Map<String, Value>>,
    #[serde(default)]
    pub secure_json_data: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub plugin_version: String,

    #[serde(skip)]
    pub org_id: i64,
    #[serde(skip)]
    pub plugin_id: String,
}

pub trait PluginSettingsStore: Send + Sync {
    /// `StorageError::SettingNotFound` when the plugin has no settings in `org_id`
    fn get(&self, org_id: i64, plugin_id: &str) -> Result<PluginSetting, StorageError>;

    /// All settings of an organization
    fn list(&self, org_id: i64) -> Result<Vec<PluginSetting>, StorageError>;

    /// Insert or update; secrets not named in the command are kept
    fn update(&self, cmd: UpdatePluginSettingCmd) -> Result<PluginSetting, StorageError>;
}
