//! Server configuration
//!
//! Built with chained `with_*` setters on top of usable defaults. The port
//! offset shifts every listener together, which keeps multiple instances on
//! one host out of each other's way.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::registry::{DEFAULT_MAX_IDLE, DEFAULT_SWEEP_INTERVAL};

pub const DEFAULT_RTMP_PORT: u16 = 1935;
pub const DEFAULT_HTTP_PORT: u16 = 4080;
pub const DEFAULT_ADMIN_PORT: u16 = 1111;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: IpAddr,
    pub rtmp_port: u16,
    pub http_port: u16,
    pub admin_port: u16,
    pub port_offset: u16,
    pub admin_enabled: bool,
    pub docroot: PathBuf,
    /// Hard cap on concurrent connections; when unset the limit is derived
    /// from the processor count and `fds_per_thread`
    pub max_connections: Option<usize>,
    /// Connections allowed per processor when `max_connections` is unset
    pub fds_per_thread: usize,
    /// How long the event loop waits for socket data between stream steps
    pub poll_interval: Duration,
    /// Idle disconnect for connections with nothing playing
    pub read_timeout: Duration,
    pub handler_max_idle: Duration,
    pub registry_sweep_interval: Duration,
    /// Run connections inline instead of spawning, for debugging
    pub single_threaded: bool,
    pub testing: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            rtmp_port: DEFAULT_RTMP_PORT,
            http_port: DEFAULT_HTTP_PORT,
            admin_port: DEFAULT_ADMIN_PORT,
            port_offset: 0,
            admin_enabled: false,
            docroot: PathBuf::from("/var/www/html"),
            max_connections: None,
            fds_per_thread: 1,
            poll_interval: Duration::from_millis(50),
            read_timeout: Duration::from_secs(60),
            handler_max_idle: DEFAULT_MAX_IDLE,
            registry_sweep_interval: DEFAULT_SWEEP_INTERVAL,
            single_threaded: false,
            testing: false,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_docroot(mut self, docroot: impl Into<PathBuf>) -> Self {
        self.docroot = docroot.into();
        self
    }

    pub fn with_bind_addr(mut self, addr: IpAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_port_offset(mut self, offset: u16) -> Self {
        self.port_offset = offset;
        self
    }

    pub fn with_admin(mut self, enabled: bool) -> Self {
        self.admin_enabled = enabled;
        self
    }

    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = Some(max);
        self
    }

    pub fn with_fds_per_thread(mut self, fds: usize) -> Self {
        self.fds_per_thread = fds;
        self
    }

    pub fn with_single_threaded(mut self, single: bool) -> Self {
        self.single_threaded = single;
        self
    }

    pub fn with_testing(mut self, testing: bool) -> Self {
        self.testing = testing;
        self
    }

    pub fn rtmp_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.rtmp_port + self.port_offset)
    }

    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.http_port + self.port_offset)
    }

    pub fn admin_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.admin_port + self.port_offset)
    }

    /// How many connections may be in flight at once
    ///
    /// An explicit `max_connections` wins; otherwise one slot per processor,
    /// scaled by `fds_per_thread`.
    pub fn spawn_limit(&self) -> usize {
        if let Some(max) = self.max_connections {
            return max;
        }
        let processors = std::thread::available_parallelism()
            .map(usize::from)
            .unwrap_or(1);
        processors * self.fds_per_thread.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::new();
        assert_eq!(config.rtmp_addr().port(), 1935);
        assert_eq!(config.http_addr().port(), 4080);
        assert!(!config.admin_enabled);
    }

    #[test]
    fn test_port_offset_shifts_every_listener() {
        let config = ServerConfig::new().with_port_offset(4000);
        assert_eq!(config.rtmp_addr().port(), 5935);
        assert_eq!(config.http_addr().port(), 8080);
        assert_eq!(config.admin_addr().port(), 5111);
    }

    #[test]
    fn test_builder_chain() {
        let config = ServerConfig::new()
            .with_docroot("/srv/media")
            .with_admin(true)
            .with_max_connections(5);
        assert_eq!(config.docroot, PathBuf::from("/srv/media"));
        assert!(config.admin_enabled);
        assert_eq!(config.spawn_limit(), 5);
    }

    #[test]
    fn test_spawn_limit_scales_with_processors() {
        let processors = std::thread::available_parallelism()
            .map(usize::from)
            .unwrap_or(1);

        let config = ServerConfig::new();
        assert_eq!(config.spawn_limit(), processors);

        let config = ServerConfig::new().with_fds_per_thread(8);
        assert_eq!(config.spawn_limit(), processors * 8);
    }

    #[test]
    fn test_explicit_max_overrides_derived_limit() {
        let config = ServerConfig::new()
            .with_fds_per_thread(8)
            .with_max_connections(3);
        assert_eq!(config.spawn_limit(), 3);
    }
}
