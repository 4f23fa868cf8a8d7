//! Gauge Daemon
//!
//! Loads plugins, opens the settings and dashboard store and serves the
//! plugin HTTP API.

use anyhow::{Context, Result};
use clap::Parser;
use gauge_backend::SocketPluginClient;
use gauge_daemon::api::{self, AppState};
use gauge_daemon::config::DaemonConfig;
use gauge_daemon::metrics::{self, Metrics};
use gauge_plugins::{LoaderConfig, LocalPluginStore, StoreConfig};
use gauge_storage::SledStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Host version checked against plugin `grafanaDependency` requirements
const HOST_VERSION: &str = "8.3.0";

/// Gauge Daemon - plugin host
#[derive(Parser, Debug)]
#[command(name = "gauged")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration files, later files override earlier ones
    #[arg(short, long)]
    config: Vec<String>,

    /// Run in verbose mode
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Gauge Daemon v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = DaemonConfig::default();
    for path in &args.config {
        config
            .load_merge(path)
            .await
            .with_context(|| format!("failed to load {}", path))?;
        info!("Loaded configuration from {}", path);
    }

    // Storage
    let db = Arc::new(
        SledStore::open(&config.storage.data_dir)
            .with_context(|| format!("failed to open {}", config.storage.data_dir.display()))?,
    );

    // Plugins
    let store_config = StoreConfig {
        plugins_dir: config.plugins.plugins_dir.clone(),
        core_plugins_dir: config.plugins.core_plugins_dir.clone(),
        repository_dir: config.plugins.repository_dir.clone(),
        host_version: HOST_VERSION.to_string(),
        loader: LoaderConfig {
            app_sub_url: config.server.app_sub_url.clone(),
            allow_unsigned: config.plugins.allow_unsigned.clone(),
        },
    };
    tokio::fs::create_dir_all(&store_config.plugins_dir)
        .await
        .with_context(|| format!("failed to create {}", store_config.plugins_dir.display()))?;
    let plugin_store = Arc::new(
        tokio::task::spawn_blocking(move || LocalPluginStore::open(store_config)).await?,
    );

    let plugin_client = Arc::new(SocketPluginClient::new(
        config.plugins.socket_dir.clone(),
        plugin_store.clone(),
        Duration::from_secs(config.plugins.backend_timeout_secs),
    ));

    // Periodic repository update check
    let update_handle = (config.plugins.update_check_interval_secs > 0).then(|| {
        let store = plugin_store.clone();
        let period = Duration::from_secs(config.plugins.update_check_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                debug!("Checking repository for plugin updates");
                let store = store.clone();
                if let Err(e) = tokio::task::spawn_blocking(move || store.check_updates()).await {
                    warn!("Update check failed: {}", e);
                }
            }
        })
    });

    // Start metrics server
    let metrics = Arc::new(Metrics::new()?);
    let metrics_handle = metrics::start_server(&config.monitoring, metrics.clone());

    let state = AppState::new(
        config,
        plugin_store,
        db.clone(),
        db.clone(),
        plugin_client,
        metrics,
    );
    state.refresh_installed_gauge().await;

    let result = tokio::select! {
        result = api::start_server(state) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
            Ok(())
        }
    };

    // Cleanup
    metrics_handle.abort();
    if let Some(handle) = update_handle {
        handle.abort();
    }
    db.flush()?;

    result
}
