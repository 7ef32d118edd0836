//! RTMP protocol engine
//!
//! Handshake, chunk framing, and the message codecs the server emits and
//! consumes. The engine is written sans-IO: state machines consume byte
//! buffers and hand back byte buffers, and the connection layer owns the
//! sockets.

pub mod chunk;
pub mod constants;
pub mod engine;
pub mod handshake;
pub mod message;

pub use chunk::{ChunkDecoder, ChunkEncoder, ChunkHeader, ChunkHeaderSize, RtmpMessage};
pub use engine::RtmpSession;
pub use handshake::{HandshakeOutcome, ServerHandshake};
pub use message::{Command, MessageType, PingKind, Status, UserControl};
