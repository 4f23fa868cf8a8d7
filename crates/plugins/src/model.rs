//! Plugin definitions
//!
//! `PluginDef` is deserialized straight from `plugin.json`; the remaining
//! fields are filled in by the loader once the plugin directory, class and
//! signature are known.

use crate::paths::slugify;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    App,
    Datasource,
    Panel,
    Renderer,
    Secretsmanager,
}

impl PluginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginType::App => "app",
            PluginType::Datasource => "datasource",
            PluginType::Panel => "panel",
            PluginType::Renderer => "renderer",
            PluginType::Secretsmanager => "secretsmanager",
        }
    }
}

impl fmt::Display for PluginType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a plugin was loaded from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginClass {
    Core,
    #[default]
    External,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleaseState {
    #[default]
    #[serde(rename = "")]
    Released,
    #[serde(rename = "alpha")]
    Alpha,
    #[serde(rename = "beta")]
    Beta,
    #[serde(rename = "deprecated")]
    Deprecated,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureStatus {
    Internal,
    Valid,
    Invalid,
    Modified,
    #[default]
    Unsigned,
}

impl SignatureStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, SignatureStatus::Internal | SignatureStatus::Valid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureType {
    Grafana,
    Commercial,
    Community,
    Private,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Author {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Link {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Logos {
    pub small: String,
    pub large: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildInfo {
    pub time: i64,
    pub repo: String,
    pub branch: String,
    pub hash: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Screenshot {
    pub name: String,
    pub path: String,
}

/// Descriptive metadata shown in the plugin catalog
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Info {
    pub author: Author,
    pub description: String,
    pub links: Vec<Link>,
    pub logos: Logos,
    pub build: BuildInfo,
    pub screenshots: Vec<Screenshot>,
    pub version: String,
    pub updated: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginDependency {
    pub id: String,
    #[serde(rename = "type")]
    pub plugin_type: PluginType,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Dependencies {
    /// Host version requirement, e.g. `>=8.0.0`
    pub grafana_dependency: String,
    pub grafana_version: String,
    pub plugins: Vec<PluginDependency>,
}

impl Default for Dependencies {
    fn default() -> Self {
        Self {
            grafana_dependency: String::new(),
            grafana_version: "*".to_string(),
            plugins: Vec::new(),
        }
    }
}

/// A page, dashboard or nested plugin bundled by an app
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Include {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub include_type: String,
    pub component: String,
    pub role: String,
    pub add_to_nav: bool,
    pub default_nav: bool,
    pub slug: String,
    pub icon: String,
    pub uid: String,
    pub id: String,
}

/// An installed plugin
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDef {
    pub id: String,
    #[serde(rename = "type")]
    pub plugin_type: PluginType,
    pub name: String,
    #[serde(default)]
    pub info: Info,
    #[serde(default)]
    pub dependencies: Dependencies,
    #[serde(default)]
    pub includes: Vec<Include>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub state: ReleaseState,
    #[serde(default)]
    pub backend: bool,
    #[serde(default)]
    pub executable: String,
    #[serde(default)]
    pub built_in: bool,
    #[serde(default)]
    pub auto_enabled: bool,

    #[serde(skip)]
    pub class: PluginClass,
    #[serde(skip)]
    pub plugin_dir: PathBuf,
    #[serde(skip)]
    pub base_url: String,
    #[serde(skip)]
    pub module: String,
    #[serde(skip)]
    pub default_nav_url: String,
    #[serde(skip)]
    pub included_in_app_id: Option<String>,
    #[serde(skip)]
    pub signature: SignatureStatus,
    #[serde(skip)]
    pub signature_type: Option<SignatureType>,
    #[serde(skip)]
    pub signature_org: String,
    #[serde(skip)]
    pub signed_files: HashSet<String>,
    #[serde(skip)]
    pub latest_version: String,
    #[serde(skip)]
    pub has_update: bool,
    #[serde(skip)]
    pub children: Vec<String>,
}

impl PluginDef {
    pub fn is_core_plugin(&self) -> bool {
        self.class == PluginClass::Core
    }

    pub fn is_app(&self) -> bool {
        self.plugin_type == PluginType::App
    }

    pub fn is_backend(&self) -> bool {
        self.backend
    }

    /// Whether `rel` (a cleaned, slash separated path) is covered by the manifest
    pub fn included_in_signature(&self, rel: &str) -> bool {
        if self.is_core_plugin() {
            return true;
        }
        self.signed_files.contains(rel)
    }

    /// Fill in URLs, logos and include slugs once class and directory are known
    pub fn finalize_urls(&mut self, app_sub_url: &str) {
        match self.class {
            PluginClass::Core => {
                self.base_url = format!("public/app/plugins/{}/{}", self.plugin_type, self.id);
                self.module = format!("app/plugins/{}/{}/module", self.plugin_type, self.id);
            }
            PluginClass::External => {
                self.base_url = format!("public/plugins/{}", self.id);
                self.module = format!("plugins/{}/module", self.id);
            }
        }

        self.info.logos.small = self.logo_url(&self.info.logos.small);
        self.info.logos.large = self.logo_url(&self.info.logos.large);
        for screenshot in &mut self.info.screenshots {
            if !screenshot.path.is_empty() {
                screenshot.path = format!("{}/{}", self.base_url, screenshot.path);
            }
        }

        for include in &mut self.includes {
            if include.include_type == "page" && include.slug.is_empty() {
                include.slug = slugify(&include.name);
            }
        }

        self.default_nav_url = self.compute_default_nav_url(app_sub_url);
    }

    fn logo_url(&self, logo: &str) -> String {
        if logo.is_empty() {
            format!("public/img/icn-{}.svg", self.plugin_type)
        } else if logo.starts_with("http://") || logo.starts_with("https://") {
            logo.to_string()
        } else {
            format!("{}/{}", self.base_url, logo)
        }
    }

    fn compute_default_nav_url(&self, app_sub_url: &str) -> String {
        if !self.is_app() {
            return String::new();
        }
        let Some(include) = self.includes.iter().find(|i| i.default_nav) else {
            return String::new();
        };
        match include.include_type.as_str() {
            "page" => format!("{}/plugins/{}/page/{}", app_sub_url, self.id, include.slug),
            "dashboard" if !include.uid.is_empty() => format!("{}/d/{}", app_sub_url, include.uid),
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> PluginDef {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_parse_minimal_plugin_json() {
        let p = parse(r#"{"id": "clock-panel", "type": "panel", "name": "Clock"}"#);
        assert_eq!(p.plugin_type, PluginType::Panel);
        assert_eq!(p.state, ReleaseState::Released);
        assert_eq!(p.dependencies.grafana_version, "*");
        assert!(!p.backend);
        assert_eq!(p.class, PluginClass::External);
    }

    #[test]
    fn test_parse_state_and_includes() {
        let p = parse(
            r#"{
                "id": "ops-app", "type": "app", "name": "Ops", "state": "alpha",
                "autoEnabled": true,
                "includes": [
                    {"type": "page", "name": "Getting Started", "defaultNav": true},
                    {"type": "dashboard", "name": "Overview", "path": "dashboards/overview.json"}
                ]
            }"#,
        );
        assert_eq!(p.state, ReleaseState::Alpha);
        assert!(p.auto_enabled);
        assert_eq!(p.includes.len(), 2);
        assert!(p.includes[0].default_nav);
    }

    #[test]
    fn test_finalize_external_urls() {
        let mut p = parse(
            r#"{"id": "ops-app", "type": "app", "name": "Ops",
                "info": {"logos": {"small": "img/logo.svg"}, "screenshots": [{"name": "a", "path": "img/a.png"}]},
                "includes": [{"type": "page", "name": "Getting Started", "defaultNav": true}]}"#,
        );
        p.finalize_urls("/gauge");

        assert_eq!(p.base_url, "public/plugins/ops-app");
        assert_eq!(p.module, "plugins/ops-app/module");
        assert_eq!(p.info.logos.small, "public/plugins/ops-app/img/logo.svg");
        assert_eq!(p.info.logos.large, "public/img/icn-app.svg");
        assert_eq!(p.info.screenshots[0].path, "public/plugins/ops-app/img/a.png");
        assert_eq!(p.includes[0].slug, "getting-started");
        assert_eq!(p.default_nav_url, "/gauge/plugins/ops-app/page/getting-started");
    }

    #[test]
    fn test_finalize_core_urls_and_dashboard_nav() {
        let mut p = parse(
            r#"{"id": "stats", "type": "app", "name": "Stats",
                "includes": [{"type": "dashboard", "name": "Home", "uid": "abc123", "defaultNav": true}]}"#,
        );
        p.class = PluginClass::Core;
        p.finalize_urls("");

        assert_eq!(p.base_url, "public/app/plugins/app/stats");
        assert_eq!(p.module, "app/plugins/app/stats/module");
        assert_eq!(p.default_nav_url, "/d/abc123");
    }

    #[test]
    fn test_included_in_signature() {
        let mut p = parse(r#"{"id": "x", "type": "panel", "name": "X"}"#);
        p.signed_files.insert("module.js".to_string());
        assert!(p.included_in_signature("module.js"));
        assert!(!p.included_in_signature("extra.js"));

        p.class = PluginClass::Core;
        assert!(p.included_in_signature("extra.js"));
    }
}
