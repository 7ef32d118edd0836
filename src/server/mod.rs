//! Server assembly
//!
//! Configuration, the shared context, the accept loops, the per-connection
//! event loops, the RTMPT tunnel table, and the admin console.

pub mod admin;
pub mod config;
pub mod connection;
pub mod context;
pub mod listener;
pub mod tunnel;

pub use config::ServerConfig;
pub use context::ServerContext;
pub use listener::run;
pub use tunnel::TunnelManager;
