//! Plugin catalog, settings and lifecycle handlers

use super::AppState;
use super::dtos::{InstallPluginCommand, PluginListItem, PluginSettingDto};
use super::error::{ApiError, success};
use super::identity::SignedInUser;
use crate::dashboards::{DashboardError, PluginDashboardInfo};
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use gauge_plugins::{AddOpts, PluginError, PluginErrorInfo, PluginStore, ReleaseState, plugin_markdown};
use gauge_storage::{PluginSetting, PluginSettingsStore, StorageError, UpdatePluginSettingCmd};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::info;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    #[serde(rename = "type")]
    pub plugin_type: String,
    pub enabled: String,
    pub embedded: String,
    pub core: String,
}

/// `GET /api/plugins`
pub async fn list(
    State(state): State<AppState>,
    user: SignedInUser,
    Query(mut query): Query<ListQuery>,
) -> Result<Json<Vec<PluginListItem>>, ApiError> {
    // Only admins see external plugins
    if !user.is_admin() {
        query.core = "1".to_string();
    }

    let settings: HashMap<String, PluginSetting> = state
        .settings
        .list(user.org_id)
        .map_err(|e| ApiError::internal("Failed to get list of plugins", e))?
        .into_iter()
        .map(|s| (s.plugin_id.clone(), s))
        .collect();

    let mut result = Vec::new();
    for plugin in state.plugin_store.plugins().await {
        if query.embedded == "0" && plugin.included_in_app_id.is_some() {
            continue;
        }
        if (query.core == "0" && plugin.is_core_plugin())
            || (query.core == "1" && !plugin.is_core_plugin())
        {
            continue;
        }
        if !query.plugin_type.is_empty() && query.plugin_type != plugin.plugin_type.as_str() {
            continue;
        }
        if plugin.state == ReleaseState::Alpha && !state.config.plugins.enable_alpha {
            continue;
        }

        let mut item = PluginListItem::from(&plugin);
        if let Some(setting) = settings.get(&plugin.id) {
            item.enabled = setting.enabled;
            item.pinned = setting.pinned;
        }
        if item.default_nav_url.is_empty() || !item.enabled {
            item.default_nav_url =
                format!("{}/plugins/{}/", state.config.server.app_sub_url, item.id);
        }

        if query.enabled == "1" && !item.enabled {
            continue;
        }
        if plugin.built_in {
            continue;
        }
        result.push(item);
    }

    result.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(Json(result))
}

/// `GET /api/plugins/errors`
pub async fn errors(State(state): State<AppState>) -> Json<Vec<PluginErrorInfo>> {
    Json(state.plugin_store.errors())
}

/// `GET /api/plugins/:pluginId/settings`
pub async fn get_settings(
    State(state): State<AppState>,
    user: SignedInUser,
    Path(plugin_id): Path<String>,
) -> Result<Json<PluginSettingDto>, ApiError> {
    let plugin = state.plugin_store.plugin(&plugin_id).await.ok_or_else(|| {
        ApiError::not_found("Plugin not found, no installed plugin with that id")
    })?;

    let mut dto = PluginSettingDto::from(&plugin);
    if plugin.is_app() {
        dto.enabled = plugin.auto_enabled;
        dto.pinned = plugin.auto_enabled;
    }

    match state.settings.get(user.org_id, &plugin_id) {
        Ok(setting) => {
            dto.enabled = setting.enabled;
            dto.pinned = setting.pinned;
            dto.secure_json_fields = setting.secure_json_fields();
            dto.json_data = setting.json_data;
        }
        Err(StorageError::SettingNotFound) => {}
        Err(e) => return Err(ApiError::internal("Failed to get login settings", e)),
    }

    Ok(Json(dto))
}

/// `POST /api/plugins/:pluginId/settings`
pub async fn update_settings(
    State(state): State<AppState>,
    user: SignedInUser,
    Path(plugin_id): Path<String>,
    Json(mut cmd): Json<UpdatePluginSettingCmd>,
) -> Result<Json<Value>, ApiError> {
    if state.plugin_store.plugin(&plugin_id).await.is_none() {
        return Err(ApiError::not_found("Plugin not installed"));
    }

    cmd.org_id = user.org_id;
    cmd.plugin_id = plugin_id;
    state
        .settings
        .update(cmd)
        .map_err(|e| ApiError::internal("Failed to update plugin setting", e))?;

    Ok(success("Plugin settings updated"))
}

/// `GET /api/plugins/:pluginId/dashboards`
pub async fn dashboards(
    State(state): State<AppState>,
    user: SignedInUser,
    Path(plugin_id): Path<String>,
) -> Result<Json<Vec<PluginDashboardInfo>>, ApiError> {
    state
        .dashboards
        .plugin_dashboards(user.org_id, &plugin_id)
        .await
        .map(Json)
        .map_err(|e| match e {
            DashboardError::Plugin(not_found @ PluginError::NotFound { .. }) => {
                ApiError::not_found(not_found.to_string())
            }
            other => ApiError::internal("Failed to get plugin dashboards", other),
        })
}

/// `GET /api/plugins/:pluginId/markdown/:name`
pub async fn markdown(
    State(state): State<AppState>,
    Path((plugin_id, name)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let store = state.plugin_store.as_ref();
    let mut content = plugin_markdown(store, &plugin_id, &name)
        .await
        .map_err(|e| match e {
            PluginError::NotFound { .. } => ApiError::not_found(e.to_string()),
            other => ApiError::internal("Could not get markdown file", other),
        })?;

    if content.is_empty() {
        content = plugin_markdown(store, &plugin_id, "readme")
            .await
            .map_err(|e| {
                ApiError::with_cause(StatusCode::NOT_IMPLEMENTED, "Could not get markdown file", e)
            })?;
    }

    Ok(([(CONTENT_TYPE, "text/plain; charset=utf-8")], content).into_response())
}

/// `POST /api/plugins/:pluginId/install`
pub async fn install(
    State(state): State<AppState>,
    Path(plugin_id): Path<String>,
    body: Option<Json<InstallPluginCommand>>,
) -> Result<Json<Value>, ApiError> {
    let version = body.map(|Json(cmd)| cmd.version).unwrap_or_default();

    state
        .plugin_store
        .add(&plugin_id, &version, AddOpts::default())
        .await
        .map_err(install_error_to_api)?;

    info!("Plugin {} installed via API", plugin_id);
    state.refresh_installed_gauge().await;
    Ok(Json(Value::Object(Default::default())))
}

/// `POST /api/plugins/:pluginId/uninstall`
pub async fn uninstall(
    State(state): State<AppState>,
    Path(plugin_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    state
        .plugin_store
        .remove(&plugin_id)
        .await
        .map_err(uninstall_error_to_api)?;

    info!("Plugin {} uninstalled via API", plugin_id);
    state.refresh_installed_gauge().await;
    Ok(Json(Value::Object(Default::default())))
}

fn install_error_to_api(err: PluginError) -> ApiError {
    match &err {
        PluginError::Duplicate { .. } => {
            ApiError::with_cause(StatusCode::CONFLICT, "Plugin already installed", &err)
        }
        PluginError::VersionUnsupported { .. } => {
            ApiError::with_cause(StatusCode::CONFLICT, "Plugin version not supported", &err)
        }
        PluginError::VersionNotFound { .. } => {
            ApiError::with_cause(StatusCode::NOT_FOUND, "Plugin version not found", &err)
        }
        PluginError::Repository { status, message } => {
            let status = StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_REQUEST);
            ApiError::with_cause(status, message.clone(), &err)
        }
        PluginError::InstallCorePlugin => ApiError::with_cause(
            StatusCode::FORBIDDEN,
            "Cannot install or change a Core plugin",
            &err,
        ),
        _ => ApiError::internal("Failed to install plugin", &err),
    }
}

fn uninstall_error_to_api(err: PluginError) -> ApiError {
    match &err {
        PluginError::NotInstalled => {
            ApiError::with_cause(StatusCode::NOT_FOUND, "Plugin not installed", &err)
        }
        PluginError::UninstallCorePlugin => {
            ApiError::with_cause(StatusCode::FORBIDDEN, "Cannot uninstall a Core plugin", &err)
        }
        PluginError::UninstallOutsideOfPluginDir => ApiError::with_cause(
            StatusCode::FORBIDDEN,
            "Cannot uninstall a plugin outside of the plugins directory",
            &err,
        ),
        _ => ApiError::internal("Failed to uninstall plugin", &err),
    }
}
