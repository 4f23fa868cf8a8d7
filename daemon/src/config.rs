//! Daemon configuration

use anyhow::Result;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Daemon configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DaemonConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Plugin directories and policy
    #[serde(default)]
    pub plugins: PluginsConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Per-organization quotas
    #[serde(default)]
    pub quota: QuotaConfig,

    /// Monitoring configuration
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl DaemonConfig {
    /// Load configuration from file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: DaemonConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load and merge configuration from file (incremental update)
    pub async fn load_merge(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let content = tokio::fs::read_to_string(path).await?;
        let other: DaemonConfig = toml::from_str(&content)?;
        self.merge(other);
        Ok(())
    }

    /// Merge another config into this one
    ///
    /// Scalars overwrite when the new value differs from the default.
    /// Lists are merged by value.
    pub fn merge(&mut self, other: DaemonConfig) {
        // Server
        if other.server.bind != default_bind() {
            self.server.bind = other.server.bind;
        }
        if !other.server.app_sub_url.is_empty() {
            self.server.app_sub_url = other.server.app_sub_url;
        }
        if other.server.env != Environment::default() {
            self.server.env = other.server.env;
        }

        // Plugins
        if other.plugins.plugins_dir != default_plugins_dir() {
            self.plugins.plugins_dir = other.plugins.plugins_dir;
        }
        if other.plugins.core_plugins_dir != default_core_plugins_dir() {
            self.plugins.core_plugins_dir = other.plugins.core_plugins_dir;
        }
        if other.plugins.repository_dir != default_repository_dir() {
            self.plugins.repository_dir = other.plugins.repository_dir;
        }
        if other.plugins.socket_dir != default_socket_dir() {
            self.plugins.socket_dir = other.plugins.socket_dir;
        }
        if other.plugins.enable_alpha {
            self.plugins.enable_alpha = true;
        }
        for id in other.plugins.allow_unsigned {
            if !self.plugins.allow_unsigned.contains(&id) {
                self.plugins.allow_unsigned.push(id);
            }
        }
        if other.plugins.backend_timeout_secs != default_backend_timeout() {
            self.plugins.backend_timeout_secs = other.plugins.backend_timeout_secs;
        }
        if other.plugins.update_check_interval_secs != default_update_check_interval() {
            self.plugins.update_check_interval_secs = other.plugins.update_check_interval_secs;
        }
        if other.plugins.max_resource_body_bytes != default_max_resource_body() {
            self.plugins.max_resource_body_bytes = other.plugins.max_resource_body_bytes;
        }

        // Storage
        if other.storage.data_dir != default_data_dir() {
            self.storage.data_dir = other.storage.data_dir;
        }

        // Quota
        if other.quota.dashboards != default_dashboard_quota() {
            self.quota.dashboards = other.quota.dashboards;
        }

        // Monitoring
        if other.monitoring.prometheus_bind != default_prometheus_bind() {
            self.monitoring.prometheus_bind = other.monitoring.prometheus_bind;
        }
        if !other.monitoring.prometheus_enabled {
            self.monitoring.prometheus_enabled = false;
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Production,
    Development,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// Sub path the UI is served under, e.g. `/gauge`
    #[serde(default)]
    pub app_sub_url: String,

    /// `development` disables asset caching
    #[serde(default)]
    pub env: Environment,
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            app_sub_url: String::new(),
            env: Environment::default(),
        }
    }
}

/// Plugin configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PluginsConfig {
    /// External plugins, installed and removed through the API
    #[serde(default = "default_plugins_dir")]
    pub plugins_dir: PathBuf,

    /// Core plugins shipped with the daemon
    #[serde(default = "default_core_plugins_dir")]
    pub core_plugins_dir: PathBuf,

    /// Local repository laid out as `<id>/<version>/`
    #[serde(default = "default_repository_dir")]
    pub repository_dir: PathBuf,

    /// Directory holding the `<id>.sock` sockets of backend plugins
    #[serde(default = "default_socket_dir")]
    pub socket_dir: PathBuf,

    /// List alpha plugins
    #[serde(default)]
    pub enable_alpha: bool,

    /// Plugin ids that load without a valid signature
    #[serde(default)]
    pub allow_unsigned: Vec<String>,

    /// Timeout of one backend plugin call
    #[serde(default = "default_backend_timeout")]
    pub backend_timeout_secs: u64,

    /// Repository update check interval, 0 disables
    #[serde(default = "default_update_check_interval")]
    pub update_check_interval_secs: u64,

    /// Largest request body forwarded to a backend plugin resource
    #[serde(default = "default_max_resource_body")]
    pub max_resource_body_bytes: usize,
}

fn default_plugins_dir() -> PathBuf {
    PathBuf::from("/var/lib/gauge/plugins")
}

fn default_core_plugins_dir() -> PathBuf {
    PathBuf::from("/usr/share/gauge/plugins")
}

fn default_repository_dir() -> PathBuf {
    PathBuf::from("/var/lib/gauge/repository")
}

fn default_socket_dir() -> PathBuf {
    PathBuf::from("/run/gauge/plugins")
}

fn default_backend_timeout() -> u64 {
    30
}

fn default_update_check_interval() -> u64 {
    600 // 10 minutes
}

fn default_max_resource_body() -> usize {
    2 * 1024 * 1024
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            plugins_dir: default_plugins_dir(),
            core_plugins_dir: default_core_plugins_dir(),
            repository_dir: default_repository_dir(),
            socket_dir: default_socket_dir(),
            enable_alpha: false,
            allow_unsigned: Vec::new(),
            backend_timeout_secs: default_backend_timeout(),
            update_check_interval_secs: default_update_check_interval(),
            max_resource_body_bytes: default_max_resource_body(),
        }
    }
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// sled database directory
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/gauge/data")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Quota configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QuotaConfig {
    /// Dashboards per organization, negative means unlimited
    #[serde(default = "default_dashboard_quota")]
    pub dashboards: i64,
}

fn default_dashboard_quota() -> i64 {
    -1
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            dashboards: default_dashboard_quota(),
        }
    }
}

/// Monitoring configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    /// Prometheus metrics bind address
    #[serde(default = "default_prometheus_bind")]
    pub prometheus_bind: SocketAddr,

    /// Enable Prometheus
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

fn default_prometheus_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9090))
}

fn default_true() -> bool {
    true
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            prometheus_bind: default_prometheus_bind(),
            prometheus_enabled: default_true(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.server.bind.port(), 3000);
        assert_eq!(config.server.env, Environment::Production);
        assert_eq!(config.quota.dashboards, -1);
        assert!(config.plugins.allow_unsigned.is_empty());
        assert!(config.monitoring.prometheus_enabled);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: DaemonConfig = toml::from_str(
            r#"
            [server]
            app_sub_url = "/gauge"
            env = "development"

            [plugins]
            plugins_dir = "/tmp/plugins"
            allow_unsigned = ["clock-panel"]

            [quota]
            dashboards = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.server.app_sub_url, "/gauge");
        assert_eq!(config.server.env, Environment::Development);
        assert_eq!(config.plugins.plugins_dir, PathBuf::from("/tmp/plugins"));
        assert_eq!(config.plugins.core_plugins_dir, default_core_plugins_dir());
        assert_eq!(config.plugins.allow_unsigned, vec!["clock-panel".to_string()]);
        assert_eq!(config.quota.dashboards, 5);
        assert_eq!(config.monitoring.prometheus_bind.port(), 9090);
        assert_eq!(config.plugins.max_resource_body_bytes, 2 * 1024 * 1024);
    }

    #[test]
    fn test_merge_scalars() {
        let mut config = DaemonConfig::default();
        let mut other = DaemonConfig::default();
        other.server.app_sub_url = "/gauge".to_string();
        other.plugins.backend_timeout_secs = 5;
        other.plugins.max_resource_body_bytes = 1024;
        other.monitoring.prometheus_enabled = false;

        config.merge(other);

        assert_eq!(config.server.app_sub_url, "/gauge");
        assert_eq!(config.plugins.backend_timeout_secs, 5);
        assert_eq!(config.plugins.max_resource_body_bytes, 1024);
        assert!(!config.monitoring.prometheus_enabled);
        assert_eq!(config.plugins.update_check_interval_secs, 600);
    }

    #[test]
    fn test_merge_keeps_values_set_by_earlier_files() {
        let mut config = DaemonConfig::default();
        config.quota.dashboards = 10;
        config.plugins.enable_alpha = true;

        config.merge(DaemonConfig::default());

        assert_eq!(config.quota.dashboards, 10);
        assert!(config.plugins.enable_alpha);
    }

    #[test]
    fn test_merge_allow_unsigned() {
        let mut config = DaemonConfig::default();
        config.plugins.allow_unsigned.push("a".to_string());
        let mut other = DaemonConfig::default();
        other.plugins.allow_unsigned = vec!["a".to_string(), "b".to_string()];

        config.merge(other);
        assert_eq!(config.plugins.allow_unsigned, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_load_merge_from_files() {
        let dir = tempfile::TempDir::new().unwrap();
        let base = dir.path().join("base.toml");
        let overlay = dir.path().join("overlay.toml");
        std::fs::write(&base, "[storage]\ndata_dir = \"/data\"\n").unwrap();
        std::fs::write(&overlay, "[plugins]\nenable_alpha = true\n").unwrap();

        let mut config = DaemonConfig::load(&base).await.unwrap();
        config.load_merge(&overlay).await.unwrap();

        assert_eq!(config.storage.data_dir, PathBuf::from("/data"));
        assert!(config.plugins.enable_alpha);
    }
}
