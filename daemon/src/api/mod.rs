//! HTTP API
//!
//! Plugin catalog, settings, assets, dashboard import and the proxies to
//! backend plugins. Handlers only talk to the collaborators held in
//! `AppState`.

mod assets;
mod backend;
mod dashboards;
mod dtos;
mod error;
mod identity;
mod plugins;

pub use backend::translate_backend_error;
pub use dashboards::dashboard_error_to_api;
pub use dtos::*;
pub use error::ApiError;
pub use identity::*;

use crate::config::DaemonConfig;
use crate::dashboards::DashboardManager;
use crate::metrics::{self, Metrics};
use crate::plugin_context::PluginContextProvider;
use crate::quota::QuotaService;
use anyhow::Result;
use axum::Router;
use axum::middleware;
use axum::routing::{any, get, post};
use gauge_backend::BackendPluginClient;
use gauge_plugins::PluginStore;
use gauge_storage::{DashboardStore, PluginSettingsStore};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<DaemonConfig>,
    pub plugin_store: Arc<dyn PluginStore>,
    pub settings: Arc<dyn PluginSettingsStore>,
    pub plugin_client: Arc<dyn BackendPluginClient>,
    pub context_provider: Arc<PluginContextProvider>,
    pub dashboards: Arc<DashboardManager>,
    pub quota: Arc<QuotaService>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        config: DaemonConfig,
        plugin_store: Arc<dyn PluginStore>,
        settings: Arc<dyn PluginSettingsStore>,
        dashboard_store: Arc<dyn DashboardStore>,
        plugin_client: Arc<dyn BackendPluginClient>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let context_provider = PluginContextProvider::new(plugin_store.clone(), settings.clone());
        let dashboards = DashboardManager::new(
            plugin_store.clone(),
            dashboard_store.clone(),
            config.server.app_sub_url.clone(),
        );
        let quota = QuotaService::new(dashboard_store, config.quota.dashboards);

        Self {
            config: Arc::new(config),
            plugin_store,
            settings,
            plugin_client,
            context_provider: Arc::new(context_provider),
            dashboards: Arc::new(dashboards),
            quota: Arc::new(quota),
            metrics,
        }
    }

    pub async fn refresh_installed_gauge(&self) {
        let count = self.plugin_store.plugins().await.len();
        self.metrics.plugins_installed.set(count as i64);
    }
}

pub fn router(state: AppState) -> Router {
    let http_metrics = state.metrics.clone();

    Router::new()
        .route("/api/plugins", get(plugins::list))
        .route("/api/plugins/errors", get(plugins::errors))
        .route(
            "/api/plugins/:plugin_id/settings",
            get(plugins::get_settings).post(plugins::update_settings),
        )
        .route("/api/plugins/:plugin_id/dashboards", get(plugins::dashboards))
        .route("/api/plugins/:plugin_id/markdown/:name", get(plugins::markdown))
        .route("/api/plugins/:plugin_id/metrics", get(backend::plugin_metrics))
        .route("/api/plugins/:plugin_id/health", get(backend::check_health))
        .route("/api/plugins/:plugin_id/resources", any(backend::call_resource))
        .route("/api/plugins/:plugin_id/resources/*path", any(backend::call_resource))
        .route("/api/plugins/:plugin_id/install", post(plugins::install))
        .route("/api/plugins/:plugin_id/uninstall", post(plugins::uninstall))
        .route("/api/dashboards/import", post(dashboards::import))
        .route("/public/plugins/:plugin_id/*path", get(assets::serve_asset))
        .layer(middleware::from_fn_with_state(http_metrics, metrics::track_http))
        .with_state(state)
}

/// Start the API server
pub async fn start_server(state: AppState) -> Result<()> {
    let bind = state.config.server.bind;
    let app = router(state);

    info!("HTTP API listening on {}", bind);
    let listener = TcpListener::bind(bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
