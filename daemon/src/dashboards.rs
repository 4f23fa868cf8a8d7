//! Plugin dashboards
//!
//! App plugins bundle dashboards as `dashboard` includes. The manager lists
//! them next to what has been imported into an organization and imports
//! them, evaluating the `__inputs` template on the way.

use gauge_plugins::paths::{join_clean, slugify};
use gauge_plugins::{PluginDef, PluginError, PluginStore};
use gauge_storage::{Dashboard, DashboardStore, StorageError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error("Dashboard input missing: {0}")]
    InputMissing(String),

    #[error("dashboard file not found: {0}")]
    FileNotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid dashboard JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A dashboard bundled with a plugin and its import state in one organization
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDashboardInfo {
    pub uid: String,
    pub plugin_id: String,
    pub title: String,
    pub imported: bool,
    pub imported_uri: String,
    pub imported_url: String,
    pub slug: String,
    pub dashboard_id: i64,
    pub folder_id: i64,
    pub imported_revision: i64,
    pub revision: i64,
    pub description: String,
    pub path: String,
    pub removed: bool,
}

/// A value for one `__inputs` entry of a dashboard template
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ImportDashboardInput {
    #[serde(rename = "type")]
    pub input_type: String,
    pub plugin_id: String,
    /// Input name, `*` matches any input of the same type
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default)]
pub struct ImportRequest {
    pub org_id: i64,
    pub plugin_id: String,
    pub path: String,
    pub folder_id: i64,
    pub dashboard: Option<Value>,
    pub overwrite: bool,
    pub inputs: Vec<ImportDashboardInput>,
}

pub struct DashboardManager {
    plugin_store: Arc<dyn PluginStore>,
    dashboards: Arc<dyn DashboardStore>,
    app_sub_url: String,
}

impl DashboardManager {
    pub fn new(
        plugin_store: Arc<dyn PluginStore>,
        dashboards: Arc<dyn DashboardStore>,
        app_sub_url: impl Into<String>,
    ) -> Self {
        Self {
            plugin_store,
            dashboards,
            app_sub_url: app_sub_url.into(),
        }
    }

    pub async fn plugin_dashboards(
        &self,
        org_id: i64,
        plugin_id: &str,
    ) -> Result<Vec<PluginDashboardInfo>, DashboardError> {
        let plugin = self.plugin(plugin_id).await?;
        let imported = self.dashboards.list_by_plugin(org_id, plugin_id)?;

        let mut result = Vec::new();
        let mut included_paths = Vec::new();
        for include in plugin.includes.iter().filter(|i| i.include_type == "dashboard") {
            let data = load_plugin_dashboard(&plugin, &include.path).await?;
            let mut info = info_from_data(plugin_id, &include.path, &data);

            if let Some(existing) = imported.iter().find(|d| d.plugin_path == include.path) {
                self.mark_imported(&mut info, existing);
            }
            included_paths.push(include.path.as_str());
            result.push(info);
        }

        for existing in &imported {
            if included_paths.contains(&existing.plugin_path.as_str()) {
                continue;
            }
            let mut info = info_from_data(plugin_id, &existing.plugin_path, &existing.data);
            self.mark_imported(&mut info, existing);
            info.removed = true;
            result.push(info);
        }

        Ok(result)
    }

    pub async fn import_dashboard(
        &self,
        req: ImportRequest,
    ) -> Result<PluginDashboardInfo, DashboardError> {
        let template = if req.plugin_id.is_empty() {
            req.dashboard.unwrap_or(Value::Object(Map::new()))
        } else {
            let plugin = self.plugin(&req.plugin_id).await?;
            load_plugin_dashboard(&plugin, &req.path).await?
        };

        let data = evaluate_template(template, &req.inputs)?;

        let title = str_field(&data, "title");
        let mut dashboard = Dashboard::new(req.org_id, title.clone(), data);
        dashboard.uid = str_field(&dashboard.data, "uid");
        dashboard.slug = slugify(&title);
        dashboard.folder_id = req.folder_id;
        dashboard.plugin_id = req.plugin_id.clone();
        dashboard.plugin_path = req.path.clone();
        dashboard.plugin_revision = int_field(&dashboard.data, "revision");

        let saved = self.dashboards.save(dashboard, req.overwrite)?;
        info!(
            "Imported dashboard {} ({}) into org {}",
            saved.title, saved.uid, saved.org_id
        );

        let mut info = info_from_data(&req.plugin_id, &req.path, &saved.data);
        self.mark_imported(&mut info, &saved);
        Ok(info)
    }

    async fn plugin(&self, plugin_id: &str) -> Result<PluginDef, DashboardError> {
        self.plugin_store
            .plugin(plugin_id)
            .await
            .ok_or_else(|| PluginError::not_found(plugin_id).into())
    }

    fn mark_imported(&self, info: &mut PluginDashboardInfo, dashboard: &Dashboard) {
        info.imported = true;
        info.uid = dashboard.uid.clone();
        info.imported_uri = dashboard.uri();
        info.imported_url = dashboard.url(&self.app_sub_url);
        info.slug = dashboard.slug.clone();
        info.dashboard_id = dashboard.id;
        info.folder_id = dashboard.folder_id;
        info.imported_revision = dashboard.plugin_revision;
    }
}

async fn load_plugin_dashboard(plugin: &PluginDef, path: &str) -> Result<Value, DashboardError> {
    let file = join_clean(&plugin.plugin_dir, path);
    debug!("Loading dashboard {} of {}", file.display(), plugin.id);
    match tokio::fs::read(&file).await {
        Ok(content) => Ok(serde_json::from_slice(&content)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            Err(DashboardError::FileNotFound(path.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

fn info_from_data(plugin_id: &str, path: &str, data: &Value) -> PluginDashboardInfo {
    PluginDashboardInfo {
        uid: str_field(data, "uid"),
        plugin_id: plugin_id.to_string(),
        title: str_field(data, "title"),
        revision: int_field(data, "revision"),
        description: str_field(data, "description"),
        path: path.to_string(),
        ..Default::default()
    }
}

fn str_field(data: &Value, key: &str) -> String {
    data.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn int_field(data: &Value, key: &str) -> i64 {
    data.get(key).and_then(Value::as_i64).unwrap_or_default()
}

/// Resolve `__inputs` against `inputs` and substitute `${NAME}` references
///
/// Every declared input needs a value of the same type, matched by name or
/// by a `*` input. The `__inputs` key is dropped from the result.
pub fn evaluate_template(
    template: Value,
    inputs: &[ImportDashboardInput],
) -> Result<Value, DashboardError> {
    let mut variables = HashMap::new();
    if let Some(declared) = template.get("__inputs").and_then(Value::as_array) {
        for def in declared {
            let name = str_field(def, "name");
            let input_type = str_field(def, "type");
            let input = inputs
                .iter()
                .find(|i| i.input_type == input_type && (i.name == name || i.name == "*"))
                .ok_or_else(|| DashboardError::InputMissing(name.clone()))?;
            variables.insert(name, input.value.clone());
        }
    }

    let mut result = match template {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(k, _)| k != "__inputs")
                .collect(),
        ),
        other => other,
    };
    substitute(&mut result, &variables);
    Ok(result)
}

fn substitute(value: &mut Value, variables: &HashMap<String, String>) {
    match value {
        Value::String(s) => {
            if s.contains("${") {
                *s = replace_vars(s, variables);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| substitute(v, variables)),
        Value::Object(map) => map.values_mut().for_each(|v| substitute(v, variables)),
        _ => {}
    }
}

/// Unknown variables are left as they are
fn replace_vars(s: &str, variables: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) if end > 0 => {
                let name = &after[..end];
                match variables.get(name) {
                    Some(v) => out.push_str(v),
                    None => out.push_str(&rest[start..start + 3 + end]),
                }
                rest = &after[end + 1..];
            }
            _ => {
                out.push_str(&rest[start..start + 2]);
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use gauge_plugins::{LoaderConfig, LocalPluginStore, StoreConfig};
    use gauge_storage::SledStore;
    use serde_json::json;
    use tempfile::TempDir;

    fn input(name: &str, input_type: &str, value: &str) -> ImportDashboardInput {
        ImportDashboardInput {
            input_type: input_type.to_string(),
            name: name.to_string(),
            value: value.to_string(),
            ..Default::default()
        }
    }

    fn manager(root: &TempDir) -> (DashboardManager, Arc<SledStore>) {
        let app = root.path().join("plugins/ops-app");
        std::fs::create_dir_all(app.join("dashboards")).unwrap();
        std::fs::write(
            app.join("plugin.json"),
            r#"{"id":"ops-app","type":"app","name":"Ops","includes":[
                {"type":"dashboard","name":"Overview","path":"dashboards/overview.json"}
            ]}"#,
        )
        .unwrap();
        std::fs::write(
            app.join("dashboards/overview.json"),
            json!({
                "__inputs": [{"name": "DS_PROM", "type": "datasource", "pluginId": "prometheus"}],
                "title": "Ops Overview",
                "uid": "ops-ovw",
                "revision": 3,
                "panels": [{"datasource": "${DS_PROM}", "title": "CPU"}]
            })
            .to_string(),
        )
        .unwrap();

        let store = Arc::new(LocalPluginStore::open(StoreConfig {
            plugins_dir: root.path().join("plugins"),
            core_plugins_dir: root.path().join("core"),
            repository_dir: root.path().join("repo"),
            host_version: "8.3.0".to_string(),
            loader: LoaderConfig {
                app_sub_url: String::new(),
                allow_unsigned: vec!["ops-app".to_string()],
            },
        }));
        let dashboards = Arc::new(SledStore::temporary().unwrap());
        (
            DashboardManager::new(store, dashboards.clone(), "/gauge"),
            dashboards,
        )
    }

    #[test]
    fn test_evaluate_template() {
        let template = json!({
            "__inputs": [{"name": "DS", "type": "datasource"}],
            "title": "T",
            "panels": [{"datasource": "${DS}", "legend": "${UNKNOWN} and ${DS}"}]
        });
        let result = evaluate_template(template, &[input("DS", "datasource", "prom-1")]).unwrap();

        assert!(result.get("__inputs").is_none());
        assert_eq!(result["panels"][0]["datasource"], "prom-1");
        assert_eq!(result["panels"][0]["legend"], "${UNKNOWN} and prom-1");
    }

    #[test]
    fn test_evaluate_template_wildcard_and_missing() {
        let template = json!({"__inputs": [{"name": "DS", "type": "datasource"}], "x": "${DS}"});

        let result = evaluate_template(template.clone(), &[input("*", "datasource", "any")]).unwrap();
        assert_eq!(result["x"], "any");

        let err = evaluate_template(template.clone(), &[input("DS", "constant", "v")]).unwrap_err();
        assert_eq!(err.to_string(), "Dashboard input missing: DS");

        assert!(matches!(
            evaluate_template(template, &[]),
            Err(DashboardError::InputMissing(name)) if name == "DS"
        ));
    }

    #[test]
    fn test_replace_vars_unterminated() {
        let vars = HashMap::from([("A".to_string(), "1".to_string())]);
        assert_eq!(replace_vars("${A}${", &vars), "1${");
        assert_eq!(replace_vars("${}", &vars), "${}");
        assert_eq!(replace_vars("x${A}y", &vars), "x1y");
    }

    #[tokio::test]
    async fn test_list_and_import_plugin_dashboard() {
        let root = TempDir::new().unwrap();
        let (manager, _) = manager(&root);

        let listed = manager.plugin_dashboards(1, "ops-app").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].title, "Ops Overview");
        assert_eq!(listed[0].revision, 3);
        assert!(!listed[0].imported);

        let info = manager
            .import_dashboard(ImportRequest {
                org_id: 1,
                plugin_id: "ops-app".to_string(),
                path: "dashboards/overview.json".to_string(),
                inputs: vec![input("DS_PROM", "datasource", "prom")],
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(info.imported);
        assert_eq!(info.uid, "ops-ovw");
        assert_eq!(info.slug, "ops-overview");
        assert_eq!(info.imported_uri, "db/ops-overview");
        assert_eq!(info.imported_url, "/gauge/d/ops-ovw/ops-overview");
        assert_eq!(info.imported_revision, 3);

        let listed = manager.plugin_dashboards(1, "ops-app").await.unwrap();
        assert!(listed[0].imported);
        assert!(!manager.plugin_dashboards(2, "ops-app").await.unwrap()[0].imported);
    }

    #[tokio::test]
    async fn test_removed_dashboards_are_reported() {
        let root = TempDir::new().unwrap();
        let (manager, dashboards) = manager(&root);
        let mut stale = Dashboard::new(1, "Old", json!({"title": "Old"}));
        stale.plugin_id = "ops-app".to_string();
        stale.plugin_path = "dashboards/old.json".to_string();
        dashboards.save(stale, false).unwrap();

        let listed = manager.plugin_dashboards(1, "ops-app").await.unwrap();
        assert_eq!(listed.len(), 2);
        let removed = listed.iter().find(|d| d.removed).unwrap();
        assert_eq!(removed.path, "dashboards/old.json");
        assert!(removed.imported);
    }

    #[tokio::test]
    async fn test_import_errors() {
        let root = TempDir::new().unwrap();
        let (manager, _) = manager(&root);

        let err = manager.plugin_dashboards(1, "nope").await.unwrap_err();
        assert!(matches!(err, DashboardError::Plugin(PluginError::NotFound { .. })));

        let missing_file = ImportRequest {
            org_id: 1,
            plugin_id: "ops-app".to_string(),
            path: "dashboards/none.json".to_string(),
            ..Default::default()
        };
        let err = manager.import_dashboard(missing_file).await.unwrap_err();
        assert!(matches!(err, DashboardError::FileNotFound(_)));

        let raw = ImportRequest {
            org_id: 1,
            dashboard: Some(json!({"title": "Mine", "uid": "mine"})),
            ..Default::default()
        };
        manager.import_dashboard(raw.clone()).await.unwrap();
        let err = manager.import_dashboard(raw).await.unwrap_err();
        assert!(matches!(err, DashboardError::Storage(StorageError::SameUidExists)));
    }
}
