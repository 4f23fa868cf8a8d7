//! Dashboard persistence

use crate::error::StorageError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    /// Assigned on first save
    pub id: i64,
    /// Generated when empty
    pub uid: String,
    pub org_id: i64,
    pub folder_id: i64,
    pub title: String,
    pub slug: String,
    pub version: i64,

    /// Origin when imported from a plugin
    pub plugin_id: String,
    pub plugin_path: String,
    pub plugin_revision: i64,

    pub data: Value,
    pub updated: u64,
}

impl Dashboard {
    pub fn new(org_id: i64, title: impl Into<String>, data: Value) -> Self {
        Self {
            id: 0,
            uid: String::new(),
            org_id,
            folder_id: 0,
            title: title.into(),
            slug: String::new(),
            version: 0,
            plugin_id: String::new(),
            plugin_path: String::new(),
            plugin_revision: 0,
            data,
            updated: 0,
        }
    }

    /// `db/<slug>`, as reported by the import API
    pub fn uri(&self) -> String {
        format!("db/{}", self.slug)
    }

    /// `<app_sub_url>/d/<uid>/<slug>`
    pub fn url(&self, app_sub_url: &str) -> String {
        format!("{}/d/{}/{}", app_sub_url, self.uid, self.slug)
    }
}

pub trait DashboardStore: Send + Sync {
    fn get_by_uid(&self, org_id: i64, uid: &str) -> Result<Dashboard, StorageError>;

    fn list(&self, org_id: i64) -> Result<Vec<Dashboard>, StorageError>;

    /// Dashboards imported from `plugin_id`
    fn list_by_plugin(&self, org_id: i64, plugin_id: &str) -> Result<Vec<Dashboard>, StorageError>;

    fn count(&self, org_id: i64) -> Result<usize, StorageError>;

    /// Save, assigning id and uid as needed
    ///
    /// Without `overwrite`, an existing uid or an equal title in the same
    /// folder is rejected.
    fn save(&self, dashboard: Dashboard, overwrite: bool) -> Result<Dashboard, StorageError>;
}
