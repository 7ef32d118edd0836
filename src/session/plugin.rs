//! Command plugins
//!
//! Server-side methods beyond the built-in command set are provided by
//! plugins registered at startup. A plugin inspects a raw invoke body and
//! either claims it by returning a reply body or passes by returning
//! `None`, in which case the next plugin is consulted.

use std::sync::Arc;

use bytes::Bytes;

/// One pluggable command handler
pub trait CommandPlugin: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Handle a raw invoke body, returning a reply body to send back, or
    /// `None` when the command is not one this plugin serves
    fn handle_command(&self, body: &[u8]) -> Option<Bytes>;
}

/// Plugins consulted in registration order
#[derive(Clone, Default)]
pub struct PluginSet {
    plugins: Vec<Arc<dyn CommandPlugin>>,
}

impl PluginSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Arc<dyn CommandPlugin>) {
        tracing::info!(plugin = plugin.name(), "registered command plugin");
        self.plugins.push(plugin);
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Offer a command body to each plugin in turn; first claim wins
    pub fn dispatch(&self, body: &[u8]) -> Option<Bytes> {
        for plugin in &self.plugins {
            if let Some(reply) = plugin.handle_command(body) {
                tracing::debug!(plugin = plugin.name(), "plugin claimed command");
                return Some(reply);
            }
        }
        None
    }
}

impl std::fmt::Debug for PluginSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginSet")
            .field("count", &self.plugins.len())
            .finish()
    }
}
