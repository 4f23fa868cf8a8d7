//! Gauge Daemon
//!
//! Hosts the plugin HTTP API: catalog and settings, static assets,
//! dashboard import, installation and the proxies to backend plugins.

pub mod api;
pub mod config;
pub mod dashboards;
pub mod metrics;
pub mod plugin_context;
pub mod quota;

pub use api::{AppState, router};
pub use config::DaemonConfig;
