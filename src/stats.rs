//! Server counters
//!
//! Lock-free counters shared across every connection task. The admin
//! console's STATUS and POLL commands read these through `snapshot`.

use std::sync::atomic::{AtomicU64, Ordering};

/// Running totals for the whole server
#[derive(Debug, Default)]
pub struct ServerStats {
    connections_total: AtomicU64,
    connections_active: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    messages_in: AtomicU64,
    messages_out: AtomicU64,
    files_served: AtomicU64,
}

/// A point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub messages_in: u64,
    pub messages_out: u64,
    pub files_served: u64,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn add_bytes_in(&self, n: u64) {
        self.bytes_in.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_bytes_out(&self, n: u64) {
        self.bytes_out.fetch_add(n, Ordering::Relaxed);
    }

    pub fn message_in(&self) {
        self.messages_in.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_out(&self) {
        self.messages_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn file_served(&self) {
        self.files_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
            messages_in: self.messages_in.load(Ordering::Relaxed),
            messages_out: self.messages_out.load(Ordering::Relaxed),
            files_served: self.files_served.load(Ordering::Relaxed),
        }
    }
}

impl StatsSnapshot {
    /// Multi-line report for the admin console
    pub fn report(&self) -> String {
        format!(
            "connections: {} total, {} active\r\n\
             bytes: {} in, {} out\r\n\
             messages: {} in, {} out\r\n\
             files served: {}\r\n",
            self.connections_total,
            self.connections_active,
            self.bytes_in,
            self.bytes_out,
            self.messages_in,
            self.messages_out,
            self.files_served,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_counting() {
        let stats = ServerStats::new();
        stats.connection_opened();
        stats.connection_opened();
        stats.connection_closed();

        let snap = stats.snapshot();
        assert_eq!(snap.connections_total, 2);
        assert_eq!(snap.connections_active, 1);
    }

    #[test]
    fn test_byte_totals() {
        let stats = ServerStats::new();
        stats.add_bytes_in(1500);
        stats.add_bytes_in(500);
        stats.add_bytes_out(100);

        let snap = stats.snapshot();
        assert_eq!(snap.bytes_in, 2000);
        assert_eq!(snap.bytes_out, 100);
    }

    #[test]
    fn test_report_mentions_every_counter() {
        let stats = ServerStats::new();
        stats.connection_opened();
        stats.file_served();

        let report = stats.snapshot().report();
        assert!(report.contains("1 total"));
        assert!(report.contains("files served: 1"));
    }
}
