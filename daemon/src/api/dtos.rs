//! Request and response bodies

use crate::dashboards::ImportDashboardInput;
use gauge_plugins::{Dependencies, Include, Info, PluginDef, ReleaseState, SignatureStatus, SignatureType};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// One entry of `GET /api/plugins`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginListItem {
    pub name: String,
    #[serde(rename = "type")]
    pub plugin_type: String,
    pub id: String,
    pub enabled: bool,
    pub pinned: bool,
    pub info: Info,
    pub dependencies: Dependencies,
    pub latest_version: String,
    pub has_update: bool,
    pub default_nav_url: String,
    pub category: String,
    pub state: ReleaseState,
    pub signature: SignatureStatus,
    pub signature_type: Option<SignatureType>,
    pub signature_org: String,
}

impl From<&PluginDef> for PluginListItem {
    fn from(p: &PluginDef) -> Self {
        Self {
            name: p.name.clone(),
            plugin_type: p.plugin_type.to_string(),
            id: p.id.clone(),
            enabled: false,
            pinned: false,
            info: p.info.clone(),
            dependencies: p.dependencies.clone(),
            latest_version: p.latest_version.clone(),
            has_update: p.has_update,
            default_nav_url: p.default_nav_url.clone(),
            category: p.category.clone(),
            state: p.state,
            signature: p.signature,
            signature_type: p.signature_type,
            signature_org: p.signature_org.clone(),
        }
    }
}

/// Body of `GET /api/plugins/:pluginId/settings`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginSettingDto {
    #[serde(rename = "type")]
    pub plugin_type: String,
    pub id: String,
    pub name: String,
    pub info: Info,
    pub dependencies: Dependencies,
    pub includes: Vec<Include>,
    pub base_url: String,
    pub module: String,
    pub default_nav_url: String,
    pub latest_version: String,
    pub has_update: bool,
    pub state: ReleaseState,
    pub signature: SignatureStatus,
    pub signature_type: Option<SignatureType>,
    pub signature_org: String,
    pub enabled: bool,
    pub pinned: bool,
    pub json_data: Map<String, Value>,
    pub secure_json_fields: BTreeMap<String, bool>,
}

impl From<&PluginDef> for PluginSettingDto {
    fn from(p: &PluginDef) -> Self {
        Self {
            plugin_type: p.plugin_type.to_string(),
            id: p.id.clone(),
            name: p.name.clone(),
            info: p.info.clone(),
            dependencies: p.dependencies.clone(),
            includes: p.includes.clone(),
            base_url: p.base_url.clone(),
            module: p.module.clone(),
            default_nav_url: p.default_nav_url.clone(),
            latest_version: p.latest_version.clone(),
            has_update: p.has_update,
            state: p.state,
            signature: p.signature,
            signature_type: p.signature_type,
            signature_org: p.signature_org.clone(),
            enabled: false,
            pinned: false,
            json_data: Map::new(),
            secure_json_fields: BTreeMap::new(),
        }
    }
}

/// Body of `POST /api/plugins/:pluginId/install`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InstallPluginCommand {
    /// Latest when empty
    pub version: String,
}

/// Body of `POST /api/dashboards/import`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImportDashboardCommand {
    pub plugin_id: String,
    pub path: String,
    pub overwrite: bool,
    pub dashboard: Option<Value>,
    pub inputs: Vec<ImportDashboardInput>,
    pub folder_id: i64,
}
