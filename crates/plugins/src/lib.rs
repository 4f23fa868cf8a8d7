//! Gauge Plugins - plugin model and lifecycle
//!
//! This crate provides:
//! - `PluginDef`: a parsed `plugin.json` plus the fields computed at load time
//! - Discovery of plugin directories (including plugins nested in apps)
//! - Manifest-based signature checks
//! - A local repository installer
//! - `PluginStore`: the registry the HTTP layer talks to

mod error;
mod loader;
mod model;
pub mod paths;
mod repository;
mod signature;
mod store;

pub use error::*;
pub use loader::*;
pub use model::*;
pub use repository::*;
pub use signature::*;
pub use store::*;
