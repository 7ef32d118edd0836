//! Shared server context
//!
//! One explicitly constructed `ServerContext` carries everything the
//! listeners and connection tasks share: config, the handler registry, the
//! plugin set, counters, and the RTMPT tunnel table. There are no global
//! singletons; everything reachable from a connection came in through this
//! struct.

use std::sync::Arc;

use crate::registry::HandlerRegistry;
use crate::session::{CommandPlugin, PluginSet};
use crate::stats::ServerStats;

use super::config::ServerConfig;
use super::tunnel::TunnelManager;

#[derive(Debug)]
pub struct ServerContext {
    pub config: ServerConfig,
    pub registry: Arc<HandlerRegistry>,
    pub plugins: PluginSet,
    pub stats: Arc<ServerStats>,
    pub tunnels: TunnelManager,
}

impl ServerContext {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            registry: Arc::new(HandlerRegistry::new()),
            plugins: PluginSet::new(),
            stats: Arc::new(ServerStats::new()),
            tunnels: TunnelManager::new(),
        }
    }

    /// Register a command plugin; call before the listeners start
    pub fn register_plugin(&mut self, plugin: Arc<dyn CommandPlugin>) {
        self.plugins.register(plugin);
    }

    /// Start the registry's idle-handler sweep
    pub fn start_cleanup(&self) {
        self.registry.spawn_cleanup_task(
            self.config.registry_sweep_interval,
            self.config.handler_max_idle,
        );
    }
}
