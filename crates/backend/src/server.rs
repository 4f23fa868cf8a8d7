//! Plugin side of the backend protocol
//!
//! A backend plugin implements `BackendPlugin` and runs `PluginServer` on its
//! socket. Unimplemented methods answer `methodNotImplemented`.

use crate::client::{BackendError, CallResourceRequest, CallResourceResponse, CheckHealthResult};
use crate::context::PluginContext;
use crate::wire::{WireMetrics, WireRequest, WireResourceResponse, WireResponse};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info};

#[async_trait]
pub trait BackendPlugin: Send + Sync + 'static {
    async fn check_health(&self, _ctx: PluginContext) -> Result<CheckHealthResult, BackendError> {
        Err(BackendError::MethodNotImplemented)
    }

    async fn call_resource(
        &self,
        _ctx: PluginContext,
        _req: CallResourceRequest,
    ) -> Result<CallResourceResponse, BackendError> {
        Err(BackendError::MethodNotImplemented)
    }

    async fn collect_metrics(&self, _plugin_id: &str) -> Result<String, BackendError> {
        Err(BackendError::MethodNotImplemented)
    }
}

pub struct PluginServer<P: BackendPlugin> {
    socket_path: PathBuf,
    plugin: Arc<P>,
}

impl<P: BackendPlugin> PluginServer<P> {
    pub fn new(socket_path: impl Into<PathBuf>, plugin: P) -> Self {
        Self {
            socket_path: socket_path.into(),
            plugin: Arc::new(plugin),
        }
    }

    /// Bind the socket (replacing a stale one) and serve until the task is dropped
    #[cfg(unix)]
    pub async fn start(self) -> std::io::Result<()> {
        use tokio::net::UnixListener;

        info!("Starting backend plugin server on {}", self.socket_path.display());

        if std::fs::metadata(&self.socket_path).is_ok() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
        let listener = UnixListener::bind(&self.socket_path)?;
        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    tokio::spawn(handle_connection(stream, self.plugin.clone()));
                }
                Err(e) => error!("Plugin connection error: {}", e),
            }
        }
    }
}

#[cfg(unix)]
async fn handle_connection<P: BackendPlugin>(stream: tokio::net::UnixStream, plugin: Arc<P>) {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    debug!("Host connected");
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                error!("Failed to read request: {}", e);
                break;
            }
        };

        let response = match serde_json::from_str::<WireRequest>(&line) {
            Ok(request) => dispatch(plugin.as_ref(), request).await,
            Err(e) => WireResponse::err(&BackendError::Protocol(e.to_string())),
        };

        let mut out = match serde_json::to_vec(&response) {
            Ok(out) => out,
            Err(e) => {
                error!("Failed to encode response: {}", e);
                break;
            }
        };
        out.push(b'\n');
        if let Err(e) = write.write_all(&out).await {
            error!("Failed to write response: {}", e);
            break;
        }
    }
}

async fn dispatch<P: BackendPlugin>(plugin: &P, request: WireRequest) -> WireResponse {
    let result = match request {
        WireRequest::CheckHealth { plugin_context } => plugin
            .check_health(plugin_context)
            .await
            .and_then(|r| Ok(serde_json::to_value(r)?)),
        WireRequest::CallResource {
            plugin_context,
            request,
        } => match CallResourceRequest::try_from(request) {
            Ok(req) => plugin
                .call_resource(plugin_context, req)
                .await
                .and_then(|r| Ok(serde_json::to_value(WireResourceResponse::from(r))?)),
            Err(e) => Err(e),
        },
        WireRequest::CollectMetrics { plugin_id } => plugin
            .collect_metrics(&plugin_id)
            .await
            .and_then(|text| {
                Ok(serde_json::to_value(WireMetrics {
                    prometheus_metrics: text,
                })?)
            }),
    };

    match result {
        Ok(value) => WireResponse::ok(value),
        Err(e) => WireResponse::err(&e),
    }
}
