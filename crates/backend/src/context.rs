//! Request context handed to backend plugins

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The user a plugin request is made on behalf of
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginUser {
    pub login: String,
    pub name: String,
    pub email: String,
    pub role: String,
}

/// Settings of an app plugin in the requesting organization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppInstanceSettings {
    pub json_data: Map<String, Value>,
    pub enabled: bool,
    /// Last update, ms since epoch
    pub updated: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginContext {
    pub org_id: i64,
    pub plugin_id: String,
    pub user: Option<PluginUser>,
    pub app_instance_settings: Option<AppInstanceSettings>,
}
