//! Gauge Storage - persistence for plugin settings and dashboards
//!
//! This crate provides:
//! - `PluginSettingsStore`: per-organization plugin settings
//! - `DashboardStore`: dashboards, including those imported from plugins
//! - `SledStore`: a sled-backed implementation of both

mod dashboards;
mod error;
mod settings;
mod sled_store;

pub use dashboards::*;
pub use error::*;
pub use settings::*;
pub use sled_store::*;

/// Milliseconds since the unix epoch
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
