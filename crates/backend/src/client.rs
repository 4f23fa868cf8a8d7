//! Backend plugin client interface

use crate::context::PluginContext;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("plugin not registered")]
    NotRegistered,

    #[error("method not implemented")]
    MethodNotImplemented,

    #[error("plugin health check failed")]
    HealthCheckFailed,

    #[error("plugin unavailable")]
    Unavailable,

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::Protocol(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    #[default]
    Unknown,
    Ok,
    Error,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HealthStatus::Unknown => "UNKNOWN",
            HealthStatus::Ok => "OK",
            HealthStatus::Error => "ERROR",
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckHealthResult {
    pub status: HealthStatus,
    #[serde(default)]
    pub message: String,
    /// Raw JSON object with extra details, may be empty
    #[serde(default)]
    pub json_details: String,
}

pub type Headers = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallResourceRequest {
    /// Path below `/resources`, without a leading slash
    pub path: String,
    pub method: String,
    /// Original request URL including the query string
    pub url: String,
    pub headers: Headers,
    pub body: Bytes,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallResourceResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Bytes,
}

#[async_trait]
pub trait BackendPluginClient: Send + Sync {
    async fn check_health(&self, ctx: &PluginContext) -> Result<CheckHealthResult, BackendError>;

    async fn call_resource(
        &self,
        ctx: &PluginContext,
        req: CallResourceRequest,
    ) -> Result<CallResourceResponse, BackendError>;

    /// Prometheus text exposition of the plugin's own metrics
    async fn collect_metrics(&self, plugin_id: &str) -> Result<Bytes, BackendError>;
}
