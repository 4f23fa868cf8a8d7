//! Integration Test Harness
//!
//! Builds a plugin tree in a temp directory, wires the daemon's `AppState`
//! against it and drives the router in-process.
#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use bytes::Bytes;
use gauge_backend::SocketPluginClient;
use gauge_daemon::api::{AppState, router};
use gauge_daemon::config::DaemonConfig;
use gauge_daemon::metrics::Metrics;
use gauge_plugins::{LoaderConfig, LocalPluginStore, MANIFEST_FILE, SignatureType, StoreConfig, manifest_for_dir};
use gauge_storage::{
    Dashboard, DashboardStore, PluginSetting, PluginSettingsStore, SledStore, StorageError,
    UpdatePluginSettingCmd,
};
use http_body_util::BodyExt;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

pub const HOST_VERSION: &str = "8.3.0";

pub struct Fixture {
    pub root: TempDir,
    pub store: Arc<LocalPluginStore>,
    pub db: Arc<SledStore>,
    pub state: AppState,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(tweak: impl FnOnce(&mut DaemonConfig)) -> Self {
        Self::build(tweak, None)
    }

    /// Settings and dashboard reads and writes all fail
    pub fn with_broken_storage(tweak: impl FnOnce(&mut DaemonConfig)) -> Self {
        Self::build(tweak, Some(Arc::new(BrokenStore)))
    }

    fn build(tweak: impl FnOnce(&mut DaemonConfig), broken: Option<Arc<BrokenStore>>) -> Self {
        let root = TempDir::new().unwrap();
        write_tree(root.path());

        let mut config = DaemonConfig::default();
        config.server.app_sub_url = "/gauge".to_string();
        config.plugins.plugins_dir = root.path().join("plugins");
        config.plugins.core_plugins_dir = root.path().join("core");
        config.plugins.repository_dir = root.path().join("repository");
        config.plugins.socket_dir = root.path().join("sockets");
        config.plugins.allow_unsigned = vec!["echo".to_string(), "beta".to_string()];
        config.plugins.backend_timeout_secs = 2;
        config.storage.data_dir = root.path().join("data");
        tweak(&mut config);

        let store = Arc::new(LocalPluginStore::open(StoreConfig {
            plugins_dir: config.plugins.plugins_dir.clone(),
            core_plugins_dir: config.plugins.core_plugins_dir.clone(),
            repository_dir: config.plugins.repository_dir.clone(),
            host_version: HOST_VERSION.to_string(),
            loader: LoaderConfig {
                app_sub_url: config.server.app_sub_url.clone(),
                allow_unsigned: config.plugins.allow_unsigned.clone(),
            },
        }));
        let db = Arc::new(SledStore::temporary().unwrap());
        let client = Arc::new(SocketPluginClient::new(
            config.plugins.socket_dir.clone(),
            store.clone(),
            Duration::from_secs(config.plugins.backend_timeout_secs),
        ));
        let metrics = Arc::new(Metrics::new().unwrap());

        let settings: Arc<dyn PluginSettingsStore> = match &broken {
            Some(broken) => broken.clone(),
            None => db.clone(),
        };
        let dashboards: Arc<dyn DashboardStore> = match broken {
            Some(broken) => broken,
            None => db.clone(),
        };
        let state = AppState::new(config, store.clone(), settings, dashboards, client, metrics);
        Self {
            root,
            store,
            db,
            state,
        }
    }

    pub fn path(&self, rel: &str) -> std::path::PathBuf {
        self.root.path().join(rel)
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    pub async fn send(&self, req: Request<Body>) -> TestResponse {
        let response = self.router().oneshot(req).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(request(Method::GET, uri, "Admin", None)).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> TestResponse {
        self.send(request(Method::POST, uri, "Admin", Some(body))).await
    }
}

/// Storage double whose every call fails
pub struct BrokenStore;

fn storage_failure() -> StorageError {
    StorageError::Serialization(serde_json::from_str::<Value>("{").unwrap_err())
}

impl PluginSettingsStore for BrokenStore {
    fn get(&self, _org_id: i64, _plugin_id: &str) -> Result<PluginSetting, StorageError> {
        Err(storage_failure())
    }

    fn list(&self, _org_id: i64) -> Result<Vec<PluginSetting>, StorageError> {
        Err(storage_failure())
    }

    fn update(&self, _cmd: UpdatePluginSettingCmd) -> Result<PluginSetting, StorageError> {
        Err(storage_failure())
    }
}

impl DashboardStore for BrokenStore {
    fn get_by_uid(&self, _org_id: i64, _uid: &str) -> Result<Dashboard, StorageError> {
        Err(storage_failure())
    }

    fn list(&self, _org_id: i64) -> Result<Vec<Dashboard>, StorageError> {
        Err(storage_failure())
    }

    fn list_by_plugin(&self, _org_id: i64, _plugin_id: &str) -> Result<Vec<Dashboard>, StorageError> {
        Err(storage_failure())
    }

    fn count(&self, _org_id: i64) -> Result<usize, StorageError> {
        Err(storage_failure())
    }

    fn save(&self, _dashboard: Dashboard, _overwrite: bool) -> Result<Dashboard, StorageError> {
        Err(storage_failure())
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn message(&self) -> String {
        self.json()["message"].as_str().unwrap_or_default().to_string()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> &str {
        self.headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
    }
}

/// A request from org 1 with the given role
pub fn request(method: Method, uri: &str, role: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-gauge-org-id", "1")
        .header("x-gauge-role", role)
        .header("x-gauge-login", "tester");
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

pub fn sign(dir: &Path, plugin_id: &str) {
    let manifest = manifest_for_dir(plugin_id, dir, SignatureType::Community, "Gauge Labs").unwrap();
    fs::write(dir.join(MANIFEST_FILE), manifest.to_string()).unwrap();
}

pub const OVERVIEW_DASHBOARD: &str = r#"{
  "__inputs": [{"name": "DS_PROM", "type": "datasource", "pluginId": "prometheus"}],
  "uid": "ops-ovw",
  "title": "Ops Overview",
  "revision": 3,
  "description": "Service overview",
  "panels": [{"title": "Requests", "datasource": "${DS_PROM}"}]
}"#;

/// Core, external and repository plugins shared by all API tests
fn write_tree(root: &Path) {
    // Core
    write(root, "core/graph/plugin.json", r#"{"id":"graph","type":"panel","name":"Graph"}"#);
    write(
        root,
        "core/dashlist/plugin.json",
        r#"{"id":"dashlist","type":"panel","name":"Dashboard list","builtIn":true}"#,
    );
    write(
        root,
        "core/prometheus/plugin.json",
        r#"{"id":"prometheus","type":"datasource","name":"Prometheus"}"#,
    );

    // External
    let plugins = root.join("plugins");
    write(
        &plugins,
        "clock/plugin.json",
        r#"{"id":"clock","type":"panel","name":"Clock","info":{"version":"1.2.0","description":"A clock"}}"#,
    );
    write(&plugins, "clock/module.js", "define([], function() {});");
    write(&plugins, "clock/README.md", "# Clock\n");
    write(&plugins, "clock/img/logo.svg", "<svg/>");
    sign(&plugins.join("clock"), "clock");

    write(
        &plugins,
        "ops-app/plugin.json",
        r#"{
          "id": "ops-app",
          "type": "app",
          "name": "Ops",
          "autoEnabled": true,
          "info": {"version": "2.0.0"},
          "includes": [
            {"type": "dashboard", "name": "Overview", "path": "dashboards/overview.json"},
            {"type": "page", "name": "Status Board", "path": "/a/ops-app/status"}
          ]
        }"#,
    );
    write(&plugins, "ops-app/dashboards/overview.json", OVERVIEW_DASHBOARD);
    write(
        &plugins,
        "ops-app/panels/ops-panel/plugin.json",
        r#"{"id":"ops-panel","type":"panel","name":"Ops Panel"}"#,
    );
    sign(&plugins.join("ops-app"), "ops-app");

    write(
        &plugins,
        "echo/plugin.json",
        r#"{"id":"echo","type":"datasource","name":"Echo","backend":true,"executable":"gpx_echo"}"#,
    );
    write(&plugins, "echo/module.js", "define([], {});");
    write(
        &plugins,
        "beta/plugin.json",
        r#"{"id":"beta","type":"panel","name":"Beta","state":"alpha"}"#,
    );
    write(&plugins, "broken/plugin.json", r#"{"id":"broken","type":"panel","name":"Broken"}"#);

    // Repository
    let repo = root.join("repository");
    for version in ["1.0.0", "1.1.0"] {
        let dependencies = if version == "1.1.0" {
            r#"{"plugins":[{"id":"map-icons","type":"panel"}]}"#
        } else {
            "{}"
        };
        let rel = format!("worldmap/{}", version);
        write(
            &repo,
            &format!("{}/plugin.json", rel),
            &format!(
                r#"{{"id":"worldmap","type":"panel","name":"Worldmap","info":{{"version":"{}"}},"dependencies":{}}}"#,
                version, dependencies
            ),
        );
        write(&repo, &format!("{}/module.js", rel), "define([], {});");
        sign(&repo.join(&rel), "worldmap");
    }

    write(
        &repo,
        "map-icons/0.1.0/plugin.json",
        r#"{"id":"map-icons","type":"panel","name":"Map icons","info":{"version":"0.1.0"}}"#,
    );
    sign(&repo.join("map-icons/0.1.0"), "map-icons");

    for version in ["1.2.0", "1.3.0"] {
        let rel = format!("clock/{}", version);
        write(
            &repo,
            &format!("{}/plugin.json", rel),
            &format!(
                r#"{{"id":"clock","type":"panel","name":"Clock","info":{{"version":"{}"}}}}"#,
                version
            ),
        );
        sign(&repo.join(&rel), "clock");
    }

    write(
        &repo,
        "future-panel/1.0.0/plugin.json",
        r#"{"id":"future-panel","type":"panel","name":"Future","info":{"version":"1.0.0"},"dependencies":{"grafanaDependency":">=99.0.0"}}"#,
    );
    sign(&repo.join("future-panel/1.0.0"), "future-panel");

    write(
        &repo,
        "range-panel/1.0.0/plugin.json",
        r#"{"id":"range-panel","type":"panel","name":"Range","info":{"version":"1.0.0"},"dependencies":{"grafanaDependency":">= 9.0.0 || ^8.1.0"}}"#,
    );
    sign(&repo.join("range-panel/1.0.0"), "range-panel");
}
