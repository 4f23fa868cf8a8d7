//! Plugin static assets

use super::AppState;
use super::error::ApiError;
use crate::config::Environment;
use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::header::CACHE_CONTROL;
use axum::http::{HeaderValue, StatusCode};
use axum::response::Response;
use gauge_plugins::PluginStore;
use gauge_plugins::paths::clean_rooted;
use std::io;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::warn;

const CACHE_DEV: &str = "max-age=0, must-revalidate, no-cache";
const CACHE_PROD: &str = "public, max-age=3600";

/// `GET /public/plugins/:pluginId/*path`
pub async fn serve_asset(
    State(state): State<AppState>,
    Path((plugin_id, path)): Path<(String, String)>,
    req: Request,
) -> Result<Response, ApiError> {
    let plugin = state
        .plugin_store
        .plugin(&plugin_id)
        .await
        .ok_or_else(|| ApiError::not_found("Plugin not found"))?;

    let rel = clean_rooted(&path);
    if !plugin.included_in_signature(&rel) {
        warn!(
            "Plugin {} file {} is not included in the plugin signature",
            plugin.id, rel
        );
    }

    let plugin_dir = std::path::absolute(&plugin.plugin_dir)
        .map_err(|e| ApiError::internal("Failed to get plugin absolute path", e))?;
    let file = plugin_dir.join(&rel);

    match tokio::fs::metadata(&file).await {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return Err(ApiError::not_found("Plugin file not found")),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ApiError::with_cause(StatusCode::NOT_FOUND, "Plugin file not found", e));
        }
        Err(e) => return Err(ApiError::internal("Plugin file exists but could not open", e)),
    }

    // ServeFile handles ranges, conditional requests and the content type
    let response = match ServeFile::new(&file).oneshot(req).await {
        Ok(response) => response,
        Err(never) => match never {},
    };
    let mut response = response.map(Body::new);

    let cache_control = match state.config.server.env {
        Environment::Development => CACHE_DEV,
        Environment::Production => CACHE_PROD,
    };
    response
        .headers_mut()
        .insert(CACHE_CONTROL, HeaderValue::from_static(cache_control));
    Ok(response)
}
