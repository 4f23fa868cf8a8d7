//! Prometheus metrics

use crate::config::MonitoringConfig;
use axum::extract::{MatchedPath, Request, State};
use axum::middleware::Next;
use axum::response::Response;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Daemon metrics, registered in their own registry
pub struct Metrics {
    registry: Registry,

    // Counters
    pub http_requests: IntCounterVec,
    pub backend_requests: IntCounterVec,

    // Gauges
    pub plugins_installed: IntGauge,

    // Histograms
    pub http_request_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let http_requests = IntCounterVec::new(
            Opts::new("gauge_http_requests_total", "Total number of HTTP requests"),
            &["route", "status"],
        )?;

        let backend_requests = IntCounterVec::new(
            Opts::new(
                "gauge_backend_requests_total",
                "Total number of backend plugin requests",
            ),
            &["plugin", "endpoint", "outcome"],
        )?;

        let plugins_installed = IntGauge::with_opts(Opts::new(
            "gauge_plugins_installed",
            "Number of installed plugins",
        ))?;

        let http_request_duration = HistogramVec::new(
            HistogramOpts::new(
                "gauge_http_request_duration_seconds",
                "HTTP request duration in seconds",
            ),
            &["route"],
        )?;

        registry.register(Box::new(http_requests.clone()))?;
        registry.register(Box::new(backend_requests.clone()))?;
        registry.register(Box::new(plugins_installed.clone()))?;
        registry.register(Box::new(http_request_duration.clone()))?;

        Ok(Self {
            registry,
            http_requests,
            backend_requests,
            plugins_installed,
            http_request_duration,
        })
    }

    /// Count one backend call; `outcome` is `ok` or the error kind
    pub fn backend_request(&self, plugin_id: &str, endpoint: &str, outcome: &str) {
        self.backend_requests
            .with_label_values(&[plugin_id, endpoint, outcome])
            .inc();
    }

    /// Text exposition of every registered metric
    pub fn encode(&self) -> prometheus::Result<Vec<u8>> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }
}

/// Records request count and latency per matched route
pub async fn track_http(State(metrics): State<Arc<Metrics>>, req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let start = Instant::now();
    let response = next.run(req).await;

    metrics
        .http_request_duration
        .with_label_values(&[&route])
        .observe(start.elapsed().as_secs_f64());
    metrics
        .http_requests
        .with_label_values(&[&route, response.status().as_str()])
        .inc();
    response
}

/// Start the metrics server
pub fn start_server(config: &MonitoringConfig, metrics: Arc<Metrics>) -> JoinHandle<()> {
    let bind = config.prometheus_bind;
    let enabled = config.prometheus_enabled;

    tokio::spawn(async move {
        if !enabled {
            info!("Prometheus metrics disabled");
            return;
        }

        use bytes::Bytes;
        use http_body_util::Full;
        use hyper::header::{CONTENT_TYPE, HeaderValue};
        use hyper::{Response, StatusCode, server::conn::http1, service::service_fn};
        use hyper_util::rt::TokioIo;

        let listener = match tokio::net::TcpListener::bind(bind).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind metrics server: {}", e);
                return;
            }
        };

        info!("Prometheus metrics server listening on {}", bind);

        loop {
            let (stream, _) = match listener.accept().await {
                Ok(r) => r,
                Err(e) => {
                    error!("Metrics accept error: {}", e);
                    continue;
                }
            };

            let io = TokioIo::new(stream);
            let metrics = metrics.clone();

            tokio::spawn(async move {
                let service = service_fn(move |_req| {
                    let metrics = metrics.clone();
                    async move {
                        let mut response = match metrics.encode() {
                            Ok(buffer) => Response::new(Full::new(Bytes::from(buffer))),
                            Err(e) => {
                                error!("Failed to encode metrics: {}", e);
                                let mut response = Response::new(Full::new(Bytes::new()));
                                *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                                response
                            }
                        };
                        response
                            .headers_mut()
                            .insert(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
                        Ok::<_, std::convert::Infallible>(response)
                    }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Metrics connection error: {}", e);
                }
            });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_contains_registered_metrics() {
        let metrics = Metrics::new().unwrap();
        metrics.plugins_installed.set(3);
        metrics.backend_request("ops-ds", "checkHealth", "ok");

        let text = String::from_utf8(metrics.encode().unwrap()).unwrap();
        assert!(text.contains("gauge_plugins_installed 3"));
        assert!(text.contains(
            "gauge_backend_requests_total{endpoint=\"checkHealth\",outcome=\"ok\",plugin=\"ops-ds\"} 1"
        ));
    }

    #[test]
    fn test_instances_do_not_share_a_registry() {
        let a = Metrics::new().unwrap();
        let b = Metrics::new().unwrap();
        a.plugins_installed.set(7);
        assert_eq!(b.plugins_installed.get(), 0);
    }
}
