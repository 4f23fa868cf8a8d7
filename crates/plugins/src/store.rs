//! Plugin store
//!
//! `PluginStore` is the registry the HTTP layer queries and mutates.
//! `LocalPluginStore` keeps the loaded plugins in memory, installs from a
//! `LocalRepository` and removes plugins from the external plugins directory.

use crate::error::{PluginError, PluginErrorCode, PluginErrorInfo};
use crate::loader::{LoaderConfig, PluginLoader, read_plugin_json};
use crate::model::{PluginClass, PluginDef};
use crate::paths::join_clean;
use crate::repository::{LocalRepository, compare_versions, satisfies, validate_plugin_id};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Options for `PluginStore::add`
#[derive(Debug, Clone, Default)]
pub struct AddOpts {
    /// Do not install missing plugin dependencies
    pub skip_dependencies: bool,
}

#[async_trait]
pub trait PluginStore: Send + Sync {
    /// Look up an installed plugin
    async fn plugin(&self, plugin_id: &str) -> Option<PluginDef>;

    /// All installed plugins
    async fn plugins(&self) -> Vec<PluginDef>;

    /// Install `plugin_id` at `version` (latest when empty)
    async fn add(&self, plugin_id: &str, version: &str, opts: AddOpts) -> Result<(), PluginError>;

    /// Uninstall `plugin_id`
    async fn remove(&self, plugin_id: &str) -> Result<(), PluginError>;

    /// Plugins that were found but could not be loaded
    fn errors(&self) -> Vec<PluginErrorInfo>;
}

/// Local store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub plugins_dir: PathBuf,
    pub core_plugins_dir: PathBuf,
    pub repository_dir: PathBuf,

    /// Version of the host, checked against `grafanaDependency`
    pub host_version: String,

    pub loader: LoaderConfig,
}

#[derive(Default)]
struct Registry {
    plugins: BTreeMap<String, PluginDef>,
    errors: Vec<PluginErrorInfo>,
}

impl Registry {
    fn register(&mut self, plugins: Vec<PluginDef>, errors: Vec<PluginErrorInfo>) {
        let ids: HashSet<&str> = plugins.iter().map(|p| p.id.as_str()).collect();
        self.errors.retain(|e| !ids.contains(e.plugin_id.as_str()));
        self.errors.extend(errors);

        for plugin in plugins {
            if self.plugins.contains_key(&plugin.id) {
                warn!("Plugin {} is already registered, skipping duplicate", plugin.id);
                self.errors.push(PluginErrorInfo {
                    plugin_id: plugin.id,
                    error_code: PluginErrorCode::Duplicate,
                });
                continue;
            }
            self.plugins.insert(plugin.id.clone(), plugin);
        }
    }

    fn unregister(&mut self, plugin_id: &str) {
        if let Some(plugin) = self.plugins.remove(plugin_id) {
            for child in plugin.children {
                self.plugins.remove(&child);
            }
        }
        self.errors.retain(|e| e.plugin_id != plugin_id);
    }
}

pub struct LocalPluginStore {
    config: StoreConfig,
    loader: PluginLoader,
    repository: LocalRepository,
    registry: RwLock<Registry>,
    install_lock: Mutex<()>,
}

impl LocalPluginStore {
    /// Create the store and scan the core and external plugin directories
    pub fn open(config: StoreConfig) -> Self {
        let loader = PluginLoader::new(config.loader.clone());
        let repository = LocalRepository::new(&config.repository_dir);

        let mut registry = Registry::default();
        let core = loader.load_all(&config.core_plugins_dir, PluginClass::Core);
        registry.register(core.plugins, core.errors);
        let external = loader.load_all(&config.plugins_dir, PluginClass::External);
        registry.register(external.plugins, external.errors);

        info!(
            "Loaded {} plugins ({} failed)",
            registry.plugins.len(),
            registry.errors.len()
        );

        let store = Self {
            config,
            loader,
            repository,
            registry: RwLock::new(registry),
            install_lock: Mutex::new(()),
        };
        store.check_updates();
        store
    }

    pub fn repository(&self) -> &LocalRepository {
        &self.repository
    }

    /// Refresh `latest_version` and `has_update` from the repository
    pub fn check_updates(&self) {
        let ids: Vec<String> = self
            .registry
            .read()
            .plugins
            .values()
            .filter(|p| !p.is_core_plugin() && p.included_in_app_id.is_none())
            .map(|p| p.id.clone())
            .collect();

        // Scan without holding the registry lock
        let latest: Vec<(String, String)> = ids
            .into_iter()
            .filter_map(|id| self.repository.latest_version(&id).map(|v| (id, v)))
            .collect();

        let mut registry = self.registry.write();
        for (id, latest) in latest {
            if let Some(plugin) = registry.plugins.get_mut(&id) {
                plugin.has_update =
                    compare_versions(&latest, &plugin.info.version) == Ordering::Greater;
                plugin.latest_version = latest;
            }
        }
    }

    async fn install_one(&self, plugin_id: &str, version: &str) -> Result<PluginDef, PluginError> {
        validate_plugin_id(plugin_id)?;

        let existing = self.registry.read().plugins.get(plugin_id).cloned();
        if existing.as_ref().is_some_and(|p| p.is_core_plugin()) {
            return Err(PluginError::InstallCorePlugin);
        }

        let resolved = self.repository.resolve(plugin_id, version)?;
        if let Some(existing) = &existing {
            if compare_versions(&existing.info.version, &resolved.version) == Ordering::Equal {
                return Err(PluginError::Duplicate {
                    plugin_id: plugin_id.to_string(),
                });
            }
            // Upgrading replaces the old directory, which must be ours to remove
            if !is_direct_child(&self.config.plugins_dir, &existing.plugin_dir) {
                return Err(PluginError::UninstallOutsideOfPluginDir);
            }
        }

        let candidate = read_plugin_json(&resolved.dir)?;
        if candidate.id != plugin_id {
            return Err(PluginError::Repository {
                status: 400,
                message: format!("Repository entry {} holds plugin {}", plugin_id, candidate.id),
            });
        }
        let requirement = &candidate.dependencies.grafana_dependency;
        if !satisfies(requirement, &self.config.host_version) {
            return Err(PluginError::VersionUnsupported {
                plugin_id: plugin_id.to_string(),
                version: resolved.version,
                requirement: requirement.clone(),
            });
        }

        let target = self.config.plugins_dir.join(plugin_id);
        let staging = self.config.plugins_dir.join(format!(".install-{}", plugin_id));
        let source = resolved.dir.clone();
        let previous = existing.as_ref().map(|p| p.plugin_dir.clone());
        {
            let target = target.clone();
            tokio::task::spawn_blocking(move || -> io::Result<()> {
                if staging.exists() {
                    fs::remove_dir_all(&staging)?;
                }
                copy_dir_all(&source, &staging)?;
                if let Some(previous) = previous {
                    if previous.exists() {
                        fs::remove_dir_all(previous)?;
                    }
                }
                if target.exists() {
                    fs::remove_dir_all(&target)?;
                }
                fs::rename(&staging, &target)
            })
            .await
            .map_err(io::Error::other)??;
        }

        let loaded = self.loader.load_one(&target, PluginClass::External);
        {
            let mut registry = self.registry.write();
            registry.unregister(plugin_id);
            registry.register(loaded.plugins, loaded.errors);
        }
        self.check_updates();

        info!("Installed plugin {} v{}", plugin_id, resolved.version);
        Ok(candidate)
    }
}

#[async_trait]
impl PluginStore for LocalPluginStore {
    async fn plugin(&self, plugin_id: &str) -> Option<PluginDef> {
        self.registry.read().plugins.get(plugin_id).cloned()
    }

    async fn plugins(&self) -> Vec<PluginDef> {
        self.registry.read().plugins.values().cloned().collect()
    }

    async fn add(&self, plugin_id: &str, version: &str, opts: AddOpts) -> Result<(), PluginError> {
        let _guard = self.install_lock.lock().await;

        let installed = self.install_one(plugin_id, version).await?;
        if opts.skip_dependencies {
            return Ok(());
        }

        let mut visited: HashSet<String> = HashSet::from([plugin_id.to_string()]);
        let mut pending = installed.dependencies.plugins;
        while let Some(dep) = pending.pop() {
            if !visited.insert(dep.id.clone()) {
                continue;
            }
            if self.registry.read().plugins.contains_key(&dep.id) {
                debug!("Dependency {} already installed", dep.id);
                continue;
            }
            info!("Installing dependency {} of {}", dep.id, plugin_id);
            let dep_def = self.install_one(&dep.id, "").await?;
            pending.extend(dep_def.dependencies.plugins);
        }
        Ok(())
    }

    async fn remove(&self, plugin_id: &str) -> Result<(), PluginError> {
        let _guard = self.install_lock.lock().await;

        let plugin = self
            .registry
            .read()
            .plugins
            .get(plugin_id)
            .cloned()
            .ok_or(PluginError::NotInstalled)?;

        if plugin.is_core_plugin() {
            return Err(PluginError::UninstallCorePlugin);
        }
        if !is_direct_child(&self.config.plugins_dir, &plugin.plugin_dir) {
            return Err(PluginError::UninstallOutsideOfPluginDir);
        }

        let dir = plugin.plugin_dir.clone();
        tokio::task::spawn_blocking(move || fs::remove_dir_all(dir))
            .await
            .map_err(io::Error::other)??;

        self.registry.write().unregister(plugin_id);
        info!("Uninstalled plugin {}", plugin_id);
        Ok(())
    }

    fn errors(&self) -> Vec<PluginErrorInfo> {
        self.registry.read().errors.clone()
    }
}

/// Read `<NAME>.md`, falling back to `<name>.md`, from the plugin directory
///
/// Missing files yield empty content.
pub async fn plugin_markdown(
    store: &dyn PluginStore,
    plugin_id: &str,
    name: &str,
) -> Result<Vec<u8>, PluginError> {
    let plugin = store
        .plugin(plugin_id)
        .await
        .ok_or_else(|| PluginError::not_found(plugin_id))?;

    let mut path = join_clean(&plugin.plugin_dir, &format!("{}.md", name.to_uppercase()));
    if !tokio::fs::try_exists(&path).await? {
        path = join_clean(&plugin.plugin_dir, &format!("{}.md", name.to_lowercase()));
    }
    if !tokio::fs::try_exists(&path).await? {
        return Ok(Vec::new());
    }
    Ok(tokio::fs::read(&path).await?)
}

fn is_direct_child(parent: &Path, dir: &Path) -> bool {
    let parent = fs::canonicalize(parent).unwrap_or_else(|_| parent.to_path_buf());
    let dir = fs::canonicalize(dir).unwrap_or_else(|_| dir.to_path_buf());
    dir.parent() == Some(parent.as_path())
}

/// Copy the tree below `src` into `dst`; symlinks are skipped
fn copy_dir_all(src: &Path, dst: &Path) -> io::Result<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry?;
        let Ok(rel) = entry.path().strip_prefix(src) else {
            continue;
        };
        let target = dst.join(rel);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target)?;
        } else {
            debug!("Not copying {}", entry.path().display());
        }
    }
    Ok(())
}
