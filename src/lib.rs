//! Cascade is a streaming media server speaking RTMP, RTMPT, and HTTP.
//!
//! One process serves three jobs: native RTMP playback of media files from
//! a document root, the same protocol tunneled over HTTP POST for clients
//! behind restrictive proxies, and plain HTTP file serving. A textual admin
//! console can be enabled on a separate port.
//!
//! The protocol engines are sans-IO state machines; the `server` module
//! owns the sockets and the timing. Start a server with a [`ServerConfig`],
//! a [`ServerContext`], and [`server::run`].

pub mod amf;
pub mod buffer;
pub mod error;
pub mod http;
pub mod media;
pub mod protocol;
pub mod queue;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;

pub use buffer::Buffer;
pub use error::{Error, Result};
pub use queue::BufferQueue;
pub use server::{ServerConfig, ServerContext};
