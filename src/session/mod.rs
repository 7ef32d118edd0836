//! Per-resource session state
//!
//! Every active resource (an RTMP application or an HTTP path) gets one
//! `Handler` shared by all connections using it. Handlers are looked up
//! through the registry and carry the resource's disk streams, connect
//! parameters, and queued outbound data.

pub mod handler;
pub mod plugin;

pub use handler::{ConnectParams, Handler, Protocol, ResourceKey};
pub use plugin::{CommandPlugin, PluginSet};
