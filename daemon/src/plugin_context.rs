//! Builds the context sent along with backend plugin calls

use crate::api::SignedInUser;
use gauge_backend::{AppInstanceSettings, PluginContext};
use gauge_plugins::PluginStore;
use gauge_storage::{PluginSettingsStore, StorageError};
use std::sync::Arc;

pub struct PluginContextProvider {
    plugin_store: Arc<dyn PluginStore>,
    settings: Arc<dyn PluginSettingsStore>,
}

impl PluginContextProvider {
    pub fn new(plugin_store: Arc<dyn PluginStore>, settings: Arc<dyn PluginSettingsStore>) -> Self {
        Self {
            plugin_store,
            settings,
        }
    }

    /// `None` when the plugin is not installed
    ///
    /// App plugins carry their settings in the user's organization, if any.
    pub async fn get(
        &self,
        plugin_id: &str,
        user: &SignedInUser,
    ) -> Result<Option<PluginContext>, StorageError> {
        let Some(plugin) = self.plugin_store.plugin(plugin_id).await else {
            return Ok(None);
        };

        let mut ctx = PluginContext {
            org_id: user.org_id,
            plugin_id: plugin.id.clone(),
            user: Some(user.to_plugin_user()),
            app_instance_settings: None,
        };

        if plugin.is_app() {
            match self.settings.get(user.org_id, &plugin.id) {
                Ok(setting) => {
                    ctx.app_instance_settings = Some(AppInstanceSettings {
                        json_data: setting.json_data,
                        enabled: setting.enabled,
                        updated: setting.updated,
                    });
                }
                Err(StorageError::SettingNotFound) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(Some(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Role;
    use gauge_plugins::{LoaderConfig, LocalPluginStore, StoreConfig};
    use gauge_storage::{SledStore, UpdatePluginSettingCmd};
    use serde_json::json;
    use tempfile::TempDir;

    fn fixture(root: &TempDir) -> (PluginContextProvider, Arc<SledStore>) {
        let plugins_dir = root.path().join("plugins");
        for (id, kind) in [("ops-app", "app"), ("ops-ds", "datasource")] {
            let dir = plugins_dir.join(id);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(
                dir.join("plugin.json"),
                format!(r#"{{"id":"{id}","type":"{kind}","name":"{id}","backend":true}}"#),
            )
            .unwrap();
        }
        let store = Arc::new(LocalPluginStore::open(StoreConfig {
            plugins_dir,
            core_plugins_dir: root.path().join("core"),
            repository_dir: root.path().join("repo"),
            host_version: "8.3.0".to_string(),
            loader: LoaderConfig {
                app_sub_url: String::new(),
                allow_unsigned: vec!["ops-app".to_string(), "ops-ds".to_string()],
            },
        }));
        let settings = Arc::new(SledStore::temporary().unwrap());
        (PluginContextProvider::new(store, settings.clone()), settings)
    }

    fn user(org_id: i64) -> SignedInUser {
        SignedInUser {
            org_id,
            role: Role::Editor,
            login: "jane".to_string(),
        }
    }

    #[tokio::test]
    async fn test_unknown_plugin() {
        let root = TempDir::new().unwrap();
        let (provider, _) = fixture(&root);
        assert!(provider.get("nope", &user(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_app_settings_are_attached() {
        let root = TempDir::new().unwrap();
        let (provider, settings) = fixture(&root);
        settings
            .update(UpdatePluginSettingCmd {
                org_id: 4,
                plugin_id: "ops-app".to_string(),
                enabled: true,
                json_data: Some(json!({"region": "eu"}).as_object().unwrap().clone()),
                ..Default::default()
            })
            .unwrap();

        let ctx = provider.get("ops-app", &user(4)).await.unwrap().unwrap();
        assert_eq!(ctx.org_id, 4);
        assert_eq!(ctx.user.unwrap().login, "jane");
        let app = ctx.app_instance_settings.unwrap();
        assert!(app.enabled);
        assert_eq!(app.json_data["region"], "eu");

        let other_org = provider.get("ops-app", &user(5)).await.unwrap().unwrap();
        assert!(other_org.app_instance_settings.is_none());
    }

    #[tokio::test]
    async fn test_datasource_has_no_app_settings() {
        let root = TempDir::new().unwrap();
        let (provider, _) = fixture(&root);
        let ctx = provider.get("ops-ds", &user(1)).await.unwrap().unwrap();
        assert_eq!(ctx.plugin_id, "ops-ds");
        assert!(ctx.app_instance_settings.is_none());
    }
}
