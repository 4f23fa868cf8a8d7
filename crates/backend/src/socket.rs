//! Unix socket backend plugin client

use crate::client::{
    BackendError, BackendPluginClient, CallResourceRequest, CallResourceResponse, CheckHealthResult,
};
use crate::context::PluginContext;
use crate::wire::{WireMetrics, WireRequest, WireResourceResponse, WireResponse};
use async_trait::async_trait;
use bytes::Bytes;
use gauge_plugins::PluginStore;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Socket path of a backend plugin inside `socket_dir`
pub fn socket_path(socket_dir: &Path, plugin_id: &str) -> PathBuf {
    socket_dir.join(format!("{}.sock", plugin_id))
}

pub struct SocketPluginClient {
    socket_dir: PathBuf,
    store: Arc<dyn PluginStore>,
    timeout: Duration,
}

impl SocketPluginClient {
    pub fn new(socket_dir: impl Into<PathBuf>, store: Arc<dyn PluginStore>, timeout: Duration) -> Self {
        Self {
            socket_dir: socket_dir.into(),
            store,
            timeout,
        }
    }

    /// Only installed plugins that declare `backend: true` can be called
    async fn ensure_registered(&self, plugin_id: &str) -> Result<(), BackendError> {
        match self.store.plugin(plugin_id).await {
            Some(plugin) if plugin.is_backend() => Ok(()),
            _ => Err(BackendError::NotRegistered),
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        plugin_id: &str,
        request: WireRequest,
    ) -> Result<T, BackendError> {
        self.ensure_registered(plugin_id).await?;

        let path = socket_path(&self.socket_dir, plugin_id);
        let response = match tokio::time::timeout(self.timeout, exchange(&path, &request)).await {
            Ok(response) => response?,
            Err(_) => {
                warn!("Backend plugin {} timed out after {:?}", plugin_id, self.timeout);
                return Err(BackendError::Unavailable);
            }
        };

        if let Some(error) = response.error {
            return Err(error.into_backend_error());
        }
        let result = response
            .result
            .ok_or_else(|| BackendError::Protocol("empty response".to_string()))?;
        Ok(serde_json::from_value(result)?)
    }
}

#[cfg(unix)]
async fn exchange(path: &Path, request: &WireRequest) -> Result<WireResponse, BackendError> {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::UnixStream;

    let stream = UnixStream::connect(path).await.map_err(|e| {
        debug!("Cannot connect to {}: {}", path.display(), e);
        BackendError::Unavailable
    })?;
    let (read, mut write) = stream.into_split();

    let mut line = serde_json::to_vec(request)?;
    line.push(b'\n');
    write.write_all(&line).await.map_err(|e| {
        debug!("Write to {} failed: {}", path.display(), e);
        BackendError::Unavailable
    })?;

    let mut reader = BufReader::new(read);
    let mut buf = String::new();
    let n = reader.read_line(&mut buf).await.map_err(|e| {
        debug!("Read from {} failed: {}", path.display(), e);
        BackendError::Unavailable
    })?;
    if n == 0 {
        return Err(BackendError::Unavailable);
    }

    Ok(serde_json::from_str(&buf)?)
}

#[cfg(not(unix))]
async fn exchange(_path: &Path, _request: &WireRequest) -> Result<WireResponse, BackendError> {
    Err(BackendError::Unavailable)
}

#[async_trait]
impl BackendPluginClient for SocketPluginClient {
    async fn check_health(&self, ctx: &PluginContext) -> Result<CheckHealthResult, BackendError> {
        self.call(
            &ctx.plugin_id,
            WireRequest::CheckHealth {
                plugin_context: ctx.clone(),
            },
        )
        .await
    }

    async fn call_resource(
        &self,
        ctx: &PluginContext,
        req: CallResourceRequest,
    ) -> Result<CallResourceResponse, BackendError> {
        let resp: WireResourceResponse = self
            .call(
                &ctx.plugin_id,
                WireRequest::CallResource {
                    plugin_context: ctx.clone(),
                    request: req.into(),
                },
            )
            .await?;
        resp.try_into()
    }

    async fn collect_metrics(&self, plugin_id: &str) -> Result<Bytes, BackendError> {
        let metrics: WireMetrics = self
            .call(
                plugin_id,
                WireRequest::CollectMetrics {
                    plugin_id: plugin_id.to_string(),
                },
            )
            .await?;
        Ok(Bytes::from(metrics.prometheus_metrics))
    }
}
