//! Backend plugin proxies: health, metrics and resources

use super::AppState;
use super::error::ApiError;
use super::identity::SignedInUser;
use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::header::{CONTENT_TYPE, COOKIE};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use gauge_backend::{BackendError, BackendPluginClient, CallResourceRequest, Headers, HealthStatus};
use gauge_plugins::PluginStore;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::warn;

const ENDPOINT_HEALTH: &str = "checkHealth";
const ENDPOINT_METRICS: &str = "collectMetrics";
const ENDPOINT_RESOURCE: &str = "callResource";

/// Plugin request errors as API responses
pub fn translate_backend_error(err: &BackendError) -> ApiError {
    match err {
        BackendError::NotRegistered => ApiError::with_cause(StatusCode::NOT_FOUND, "Plugin not found", err),
        BackendError::MethodNotImplemented => {
            ApiError::with_cause(StatusCode::NOT_FOUND, "Not found", err)
        }
        BackendError::HealthCheckFailed => ApiError::internal("Plugin health check failed", err),
        BackendError::Unavailable => {
            ApiError::with_cause(StatusCode::SERVICE_UNAVAILABLE, "Plugin unavailable", err)
        }
        _ => ApiError::internal("Plugin request failed", err),
    }
}

fn outcome<T>(result: &Result<T, BackendError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(BackendError::NotRegistered) => "not_registered",
        Err(BackendError::MethodNotImplemented) => "not_implemented",
        Err(BackendError::HealthCheckFailed) => "health_check_failed",
        Err(BackendError::Unavailable) => "unavailable",
        Err(BackendError::Protocol(_)) => "error",
    }
}

/// `GET /api/plugins/:pluginId/metrics`
pub async fn plugin_metrics(
    State(state): State<AppState>,
    Path(plugin_id): Path<String>,
) -> Result<Response, ApiError> {
    let plugin = state
        .plugin_store
        .plugin(&plugin_id)
        .await
        .ok_or_else(|| ApiError::not_found("Plugin not found"))?;

    let result = state.plugin_client.collect_metrics(&plugin.id).await;
    state
        .metrics
        .backend_request(&plugin.id, ENDPOINT_METRICS, outcome(&result));
    let text = result.map_err(|e| translate_backend_error(&e))?;

    Ok(([(CONTENT_TYPE, "text/plain")], text).into_response())
}

/// `GET /api/plugins/:pluginId/health`
pub async fn check_health(
    State(state): State<AppState>,
    user: SignedInUser,
    Path(plugin_id): Path<String>,
) -> Result<Response, ApiError> {
    let ctx = state
        .context_provider
        .get(&plugin_id, &user)
        .await
        .map_err(|e| ApiError::internal("Failed to get plugin settings", e))?
        .ok_or_else(|| ApiError::not_found("Plugin not found"))?;

    let result = state.plugin_client.check_health(&ctx).await;
    state
        .metrics
        .backend_request(&plugin_id, ENDPOINT_HEALTH, outcome(&result));
    let resp = result.map_err(|e| translate_backend_error(&e))?;

    let mut payload = Map::new();
    payload.insert("status".to_string(), Value::String(resp.status.to_string()));
    payload.insert("message".to_string(), Value::String(resp.message));

    if !resp.json_details.is_empty() {
        let details: Map<String, Value> = serde_json::from_str(&resp.json_details).map_err(|e| {
            ApiError::internal("Failed to unmarshal detailed response from backend plugin", e)
        })?;
        payload.insert("details".to_string(), Value::Object(details));
    }

    let status = if resp.status == HealthStatus::Ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    Ok((status, Json(Value::Object(payload))).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ResourcePath {
    pub plugin_id: String,
    #[serde(default)]
    pub path: String,
}

/// `ANY /api/plugins/:pluginId/resources/*path`
pub async fn call_resource(
    State(state): State<AppState>,
    user: SignedInUser,
    Path(params): Path<ResourcePath>,
    req: Request,
) -> Result<Response, ApiError> {
    let ctx = state
        .context_provider
        .get(&params.plugin_id, &user)
        .await
        .map_err(|e| ApiError::internal("Failed to get plugin settings", e))?
        .ok_or_else(|| ApiError::not_found("Plugin not found"))?;

    let (parts, body) = req.into_parts();
    let body = Limited::new(body, state.config.plugins.max_resource_body_bytes)
        .collect()
        .await
        .map_err(|e| {
            if e.is::<LengthLimitError>() {
                ApiError::new(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
            } else {
                ApiError::with_cause(StatusCode::BAD_REQUEST, "Failed to read request body", e)
            }
        })?
        .to_bytes();

    let mut headers = Headers::new();
    for (name, value) in parts.headers.iter() {
        if *name == COOKIE {
            continue;
        }
        if let Ok(value) = value.to_str() {
            headers
                .entry(name.as_str().to_string())
                .or_default()
                .push(value.to_string());
        }
    }

    let url = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| parts.uri.path().to_string());

    let result = state
        .plugin_client
        .call_resource(
            &ctx,
            CallResourceRequest {
                path: params.path,
                method: parts.method.to_string(),
                url,
                headers,
                body,
            },
        )
        .await;
    state
        .metrics
        .backend_request(&params.plugin_id, ENDPOINT_RESOURCE, outcome(&result));
    let resp = result.map_err(|e| translate_backend_error(&e))?;

    let status = StatusCode::from_u16(resp.status).map_err(|e| {
        ApiError::internal("Plugin request failed", format!("invalid status {}: {}", resp.status, e))
    })?;
    let mut response = Response::new(Body::from(resp.body));
    *response.status_mut() = status;
    for (name, values) in resp.headers {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            warn!("Dropping invalid header {:?} from plugin {}", name, params.plugin_id);
            continue;
        };
        for value in values {
            match HeaderValue::from_str(&value) {
                Ok(value) => {
                    response.headers_mut().append(name.clone(), value);
                }
                Err(_) => warn!("Dropping invalid value of header {} from plugin {}", name, params.plugin_id),
            }
        }
    }
    Ok(response)
}
