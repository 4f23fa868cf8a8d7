//! Gauge Backend - talking to backend plugin processes
//!
//! Backend plugins listen on a Unix socket named `<plugin id>.sock` and speak
//! newline-delimited JSON: one request line, one response line.
//!
//! This crate provides:
//! - `BackendPluginClient`: health checks, resource calls and metrics
//! - `SocketPluginClient`: the socket implementation used by the daemon
//! - `BackendPlugin` + `PluginServer`: the plugin side of the same protocol

mod client;
mod context;
mod server;
mod socket;
mod wire;

pub use client::*;
pub use context::*;
pub use server::*;
pub use socket::*;
