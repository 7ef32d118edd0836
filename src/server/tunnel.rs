//! RTMPT tunnel table
//!
//! Each tunneled client gets an id from `/open` and an `RtmpSession` held
//! here between its HTTP polls. `/send` feeds posted bytes through the
//! session, `/idle` collects anything the server produced meanwhile, and
//! both reply with a one-byte poll-interval hint followed by raw RTMP
//! bytes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::Mutex;

use crate::buffer::Buffer;
use crate::error::Result;
use crate::protocol::RtmpSession;
use crate::queue::BufferQueue;

/// Poll-interval hint sent as the first byte of every tunnel reply
const POLL_HINT: u8 = 0x01;

struct TunnelEntry {
    session: RtmpSession,
    /// Server buffers produced since the last poll
    outbox: BufferQueue,
}

#[derive(Default)]
pub struct TunnelManager {
    next_id: AtomicU64,
    entries: Mutex<HashMap<u64, TunnelEntry>>,
}

impl TunnelManager {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Register a new tunneled client and hand back its id
    pub async fn open(&self, session: RtmpSession) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.lock().await.insert(
            id,
            TunnelEntry {
                session,
                outbox: BufferQueue::new(),
            },
        );
        tracing::info!(client = id, "tunnel opened");
        id
    }

    /// Feed posted client bytes through the session; reply with whatever
    /// the server has ready
    pub async fn send(&self, client: u64, body: &[u8]) -> Option<Result<Bytes>> {
        let mut entries = self.entries.lock().await;
        let entry = entries.get_mut(&client)?;
        Some(Self::pump(entry, body).await)
    }

    /// Collect buffered server bytes without sending anything
    pub async fn idle(&self, client: u64) -> Option<Result<Bytes>> {
        let mut entries = self.entries.lock().await;
        let entry = entries.get_mut(&client)?;
        Some(Self::pump(entry, &[]).await)
    }

    pub async fn close(&self, client: u64) -> bool {
        let removed = self.entries.lock().await.remove(&client);
        if let Some(mut entry) = removed {
            entry.session.detach();
            tracing::info!(client = client, "tunnel closed");
            true
        } else {
            false
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    async fn pump(entry: &mut TunnelEntry, body: &[u8]) -> Result<Bytes> {
        if !body.is_empty() {
            for reply in entry.session.receive(body).await? {
                entry.outbox.push(Buffer::from(&reply[..]));
            }
        }
        for page in entry.session.service()? {
            entry.outbox.push(Buffer::from(&page[..]));
        }

        let mut out = BytesMut::new();
        out.put_u8(POLL_HINT);
        while let Some(buffer) = entry.outbox.pop() {
            out.put_slice(buffer.as_slice());
        }
        Ok(out.freeze())
    }
}

impl std::fmt::Debug for TunnelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelManager").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::HandlerRegistry;
    use crate::session::PluginSet;
    use crate::stats::ServerStats;
    use std::sync::Arc;

    fn fresh_session() -> RtmpSession {
        RtmpSession::new(
            Arc::new(HandlerRegistry::new()),
            PluginSet::new(),
            Arc::new(ServerStats::new()),
            std::env::temp_dir(),
        )
    }

    #[tokio::test]
    async fn test_open_assigns_increasing_ids() {
        let tunnels = TunnelManager::new();
        let a = tunnels.open(fresh_session()).await;
        let b = tunnels.open(fresh_session()).await;
        assert!(b > a);
        assert_eq!(tunnels.len().await, 2);
    }

    #[tokio::test]
    async fn test_send_to_unknown_client_is_none() {
        let tunnels = TunnelManager::new();
        assert!(tunnels.send(99, b"").await.is_none());
    }

    #[tokio::test]
    async fn test_idle_reply_carries_poll_hint() {
        let tunnels = TunnelManager::new();
        let id = tunnels.open(fresh_session()).await;
        let reply = tunnels.idle(id).await.unwrap().unwrap();
        assert_eq!(reply[0], POLL_HINT);
        assert_eq!(reply.len(), 1);
    }

    #[tokio::test]
    async fn test_send_runs_handshake_through_tunnel() {
        use crate::protocol::constants::{HANDSHAKE_SIZE, RTMP_VERSION};

        let tunnels = TunnelManager::new();
        let id = tunnels.open(fresh_session()).await;

        let mut c0c1 = vec![RTMP_VERSION];
        c0c1.extend_from_slice(&[7u8; HANDSHAKE_SIZE]);
        let reply = tunnels.send(id, &c0c1).await.unwrap().unwrap();

        assert_eq!(reply[0], POLL_HINT);
        assert_eq!(reply.len(), 1 + 1 + HANDSHAKE_SIZE * 2);
        assert_eq!(reply[1], RTMP_VERSION);
    }

    #[tokio::test]
    async fn test_close_removes_client() {
        let tunnels = TunnelManager::new();
        let id = tunnels.open(fresh_session()).await;
        assert!(tunnels.close(id).await);
        assert!(!tunnels.close(id).await);
        assert!(tunnels.idle(id).await.is_none());
    }
}
