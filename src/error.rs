//! Crate-wide error types
//!
//! One top-level `Error` wraps the focused sub-errors from each layer.
//! Transport and protocol failures close the affected connection; nothing
//! here is expected to terminate the process.

use thiserror::Error;

/// Convenience result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug, Error)]
pub enum Error {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    Chunk(#[from] ChunkError),

    #[error(transparent)]
    Amf(#[from] AmfError),

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("buffer copy of {src} bytes exceeds capacity {cap}")]
    BufferOverflow { src: usize, cap: usize },

    #[error("stream {0} is in state {1} and cannot be played")]
    BadStreamState(u32, &'static str),

    #[error("read timed out")]
    Timeout,

    #[error("connection closed by peer")]
    Closed,
}

/// RTMP handshake failures
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("unsupported protocol version {0}")]
    InvalidVersion(u8),

    #[error("handshake packet truncated after {0} bytes")]
    Truncated(usize),

    #[error("first command after handshake was {0:?}, expected connect")]
    NotConnect(String),
}

/// RTMP chunk framing failures
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("chunk header truncated")]
    Truncated,

    #[error("no previous body size recorded for channel {0}")]
    UnknownBodySize(u8),

    #[error("suspicious body size {0}")]
    BodySizeOutOfRange(usize),

    #[error("unknown message type 0x{0:02x}")]
    UnknownType(u8),
}

/// AMF0 codec failures
#[derive(Debug, Error)]
pub enum AmfError {
    #[error("truncated AMF value")]
    Truncated,

    #[error("unsupported AMF0 marker 0x{0:02x}")]
    UnsupportedMarker(u8),

    #[error("expected {0}")]
    Expected(&'static str),
}

/// HTTP request parsing failures
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("malformed request line")]
    BadRequestLine,

    #[error("unrecognized request method")]
    UnknownMethod,

    #[error("malformed header line: {0:?}")]
    BadHeader(String),

    #[error("body shorter than Content-Length")]
    ShortBody,

    #[error("not an RTMPT command path: {0:?}")]
    BadRtmptPath(String),
}
