//! Handler registry
//!
//! Maps resource keys to their shared handlers. Connections look handlers
//! up here so every client of a resource shares one set of streams, and a
//! background task evicts entries that have sat idle with no clients.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::session::{Handler, ResourceKey};

/// Idle handlers older than this are dropped by the cleanup task
pub const DEFAULT_MAX_IDLE: Duration = Duration::from_secs(300);

/// How often the cleanup task sweeps
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared map of active resource handlers
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    inner: RwLock<HashMap<ResourceKey, Arc<Handler>>>,
}

/// One registry entry as reported on the admin port
#[derive(Debug, Clone)]
pub struct HandlerSummary {
    pub key: ResourceKey,
    pub clients: usize,
    pub streams: usize,
    pub idle_secs: u64,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing handler for the key, or a freshly created one
    pub async fn find_or_create(&self, key: &ResourceKey) -> Arc<Handler> {
        if let Some(handler) = self.inner.read().await.get(key) {
            handler.touch();
            return Arc::clone(handler);
        }

        let mut map = self.inner.write().await;
        // Another task may have created it between the locks
        if let Some(handler) = map.get(key) {
            return Arc::clone(handler);
        }
        let handler = Arc::new(Handler::new(key.clone()));
        map.insert(key.clone(), Arc::clone(&handler));
        tracing::info!(
            protocol = key.protocol.name(),
            path = %key.path,
            "created resource handler"
        );
        handler
    }

    pub async fn get(&self, key: &ResourceKey) -> Option<Arc<Handler>> {
        self.inner.read().await.get(key).map(Arc::clone)
    }

    pub async fn remove(&self, key: &ResourceKey) -> bool {
        self.inner.write().await.remove(key).is_some()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Per-handler usage summary for the admin console
    pub async fn summaries(&self) -> Vec<HandlerSummary> {
        self.inner
            .read()
            .await
            .values()
            .map(|handler| HandlerSummary {
                key: handler.key().clone(),
                clients: handler.active_clients(),
                streams: handler.stream_count(),
                idle_secs: handler.idle_for().as_secs(),
            })
            .collect()
    }

    /// Drop handlers with no clients that have been idle past `max_idle`
    ///
    /// Returns the number of handlers evicted. Handlers with connected
    /// clients are never evicted regardless of age.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut map = self.inner.write().await;
        let before = map.len();
        map.retain(|key, handler| {
            let keep = handler.active_clients() > 0 || handler.idle_for() <= max_idle;
            if !keep {
                tracing::info!(
                    protocol = key.protocol.name(),
                    path = %key.path,
                    idle_secs = handler.idle_for().as_secs(),
                    "evicting idle handler"
                );
            }
            keep
        });
        before - map.len()
    }

    /// Periodic eviction sweep as a background task
    pub fn spawn_cleanup_task(self: &Arc<Self>, interval: Duration, max_idle: Duration) {
        let registry = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let evicted = registry.evict_idle(max_idle).await;
                if evicted > 0 {
                    tracing::debug!(evicted = evicted, "registry sweep");
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Protocol;

    fn key(path: &str) -> ResourceKey {
        ResourceKey::new(Protocol::Rtmp, path)
    }

    #[tokio::test]
    async fn test_find_or_create_shares_one_handler() {
        let registry = HandlerRegistry::new();
        let a = registry.find_or_create(&key("oflaDemo")).await;
        let b = registry.find_or_create(&key("oflaDemo")).await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_distinct_handlers() {
        let registry = HandlerRegistry::new();
        let a = registry.find_or_create(&key("a")).await;
        let b = registry.find_or_create(&key("b")).await;
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_evict_drops_idle_handlers() {
        let registry = HandlerRegistry::new();
        registry.find_or_create(&key("stale")).await;

        let evicted = registry.evict_idle(Duration::ZERO).await;
        assert_eq!(evicted, 1);
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn test_evict_keeps_handlers_with_clients() {
        let registry = HandlerRegistry::new();
        let handler = registry.find_or_create(&key("busy")).await;
        handler.client_joined();

        let evicted = registry.evict_idle(Duration::ZERO).await;
        assert_eq!(evicted, 0);
        assert!(registry.get(&key("busy")).await.is_some());
    }

    #[tokio::test]
    async fn test_evict_respects_max_idle() {
        let registry = HandlerRegistry::new();
        registry.find_or_create(&key("fresh")).await;

        // A generous window keeps a freshly touched handler alive
        let evicted = registry.evict_idle(Duration::from_secs(3600)).await;
        assert_eq!(evicted, 0);
    }

    #[tokio::test]
    async fn test_remove() {
        let registry = HandlerRegistry::new();
        registry.find_or_create(&key("gone")).await;
        assert!(registry.remove(&key("gone")).await);
        assert!(!registry.remove(&key("gone")).await);
    }
}
