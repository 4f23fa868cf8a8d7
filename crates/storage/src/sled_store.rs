//! sled-backed store
//!
//! Values are JSON. Keys are `<org_id>/<plugin_id>` in the `plugin_settings`
//! tree and `<org_id>/<uid>` in the `dashboards` tree.

use crate::dashboards::{Dashboard, DashboardStore};
use crate::error::StorageError;
use crate::now_millis;
use crate::settings::{PluginSetting, PluginSettingsStore, UpdatePluginSettingCmd};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

const SETTINGS_TREE: &str = "plugin_settings";
const DASHBOARDS_TREE: &str = "dashboards";
const UID_LEN: usize = 9;

pub struct SledStore {
    db: sled::Db,
    settings: sled::Tree,
    dashboards: sled::Tree,
    /// Serializes read-check-write sequences
    write_lock: Mutex<()>,
}

impl SledStore {
    /// Open or create the database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// In-memory database removed on drop
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, StorageError> {
        Ok(Self {
            settings: db.open_tree(SETTINGS_TREE)?,
            dashboards: db.open_tree(DASHBOARDS_TREE)?,
            db,
            write_lock: Mutex::new(()),
        })
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }

    fn scan<T: DeserializeOwned>(tree: &sled::Tree, org_id: i64) -> Result<Vec<T>, StorageError> {
        tree.scan_prefix(org_prefix(org_id))
            .map(|entry| -> Result<T, StorageError> {
                let (_, value) = entry?;
                Ok(serde_json::from_slice(&value)?)
            })
            .collect()
    }

    fn new_uid(&self, org_id: i64) -> Result<String, StorageError> {
        loop {
            let uid: String = uuid::Uuid::new_v4()
                .simple()
                .to_string()
                .chars()
                .take(UID_LEN)
                .collect();
            if !self.dashboards.contains_key(key(org_id, &uid))? {
                return Ok(uid);
            }
        }
    }
}

fn org_prefix(org_id: i64) -> String {
    format!("{}/", org_id)
}

fn key(org_id: i64, name: &str) -> String {
    format!("{}/{}", org_id, name)
}

impl PluginSettingsStore for SledStore {
    fn get(&self, org_id: i64, plugin_id: &str) -> Result<PluginSetting, StorageError> {
        match self.settings.get(key(org_id, plugin_id))? {
            Some(value) => Ok(serde_json::from_slice(&value)?),
            None => Err(StorageError::SettingNotFound),
        }
    }

    fn list(&self, org_id: i64) -> Result<Vec<PluginSetting>, StorageError> {
        Self::scan(&self.settings, org_id)
    }

    fn update(&self, cmd: UpdatePluginSettingCmd) -> Result<PluginSetting, StorageError> {
        let _guard = self.write_lock.lock();

        let mut setting = match PluginSettingsStore::get(self, cmd.org_id, &cmd.plugin_id) {
            Ok(existing) => existing,
            Err(StorageError::SettingNotFound) => PluginSetting {
                org_id: cmd.org_id,
                plugin_id: cmd.plugin_id.clone(),
                enabled: false,
                pinned: false,
                json_data: Default::default(),
                secure_json_data: Default::default(),
                plugin_version: String::new(),
                updated: 0,
            },
            Err(e) => return Err(e),
        };

        setting.enabled = cmd.enabled;
        setting.pinned = cmd.pinned;
        if let Some(json_data) = cmd.json_data {
            setting.json_data = json_data;
        }
        if let Some(secure) = cmd.secure_json_data {
            setting.secure_json_data.extend(secure);
        }
        if !cmd.plugin_version.is_empty() {
            setting.plugin_version = cmd.plugin_version;
        }
        setting.updated = now_millis();

        self.settings.insert(
            key(setting.org_id, &setting.plugin_id),
            serde_json::to_vec(&setting)?,
        )?;
        debug!(
            "Updated settings of {} in org {}",
            setting.plugin_id, setting.org_id
        );
        Ok(setting)
    }
}

impl DashboardStore for SledStore {
    fn get_by_uid(&self, org_id: i64, uid: &str) -> Result<Dashboard, StorageError> {
        match self.dashboards.get(key(org_id, uid))? {
            Some(value) => Ok(serde_json::from_slice(&value)?),
            None => Err(StorageError::DashboardNotFound),
        }
    }

    fn list(&self, org_id: i64) -> Result<Vec<Dashboard>, StorageError> {
        Self::scan(&self.dashboards, org_id)
    }

    fn list_by_plugin(&self, org_id: i64, plugin_id: &str) -> Result<Vec<Dashboard>, StorageError> {
        let all: Vec<Dashboard> = Self::scan(&self.dashboards, org_id)?;
        Ok(all.into_iter().filter(|d| d.plugin_id == plugin_id).collect())
    }

    fn count(&self, org_id: i64) -> Result<usize, StorageError> {
        Ok(self.dashboards.scan_prefix(org_prefix(org_id)).count())
    }

    fn save(&self, mut dashboard: Dashboard, overwrite: bool) -> Result<Dashboard, StorageError> {
        let _guard = self.write_lock.lock();
        let org_id = dashboard.org_id;

        let existing = if dashboard.uid.is_empty() {
            None
        } else {
            match DashboardStore::get_by_uid(self, org_id, &dashboard.uid) {
                Ok(d) => Some(d),
                Err(StorageError::DashboardNotFound) => None,
                Err(e) => return Err(e),
            }
        };
        if existing.is_some() && !overwrite {
            return Err(StorageError::SameUidExists);
        }

        let others: Vec<Dashboard> = Self::scan(&self.dashboards, org_id)?;
        let same_name = others.iter().find(|d| {
            d.uid != dashboard.uid
                && d.folder_id == dashboard.folder_id
                && d.title.eq_ignore_ascii_case(&dashboard.title)
        });
        if let Some(clash) = same_name {
            if !overwrite {
                return Err(StorageError::SameNameInFolderExists);
            }
            self.dashboards.remove(key(org_id, &clash.uid))?;
        }

        match existing {
            Some(existing) => {
                dashboard.id = existing.id;
                dashboard.version = existing.version + 1;
            }
            None => {
                dashboard.id = self.db.generate_id()? as i64 + 1;
                dashboard.version = 1;
                if dashboard.uid.is_empty() {
                    dashboard.uid = self.new_uid(org_id)?;
                }
            }
        }
        dashboard.updated = now_millis();

        if let Value::Object(map) = &mut dashboard.data {
            map.insert("id".to_string(), Value::from(dashboard.id));
            map.insert("uid".to_string(), Value::from(dashboard.uid.clone()));
            map.insert("version".to_string(), Value::from(dashboard.version));
        }

        self.dashboards
            .insert(key(org_id, &dashboard.uid), serde_json::to_vec(&dashboard)?)?;
        Ok(dashboard)
    }
}
