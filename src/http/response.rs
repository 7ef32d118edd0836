//! HTTP response building
//!
//! Responses carry a fixed header set in a fixed order: Date, Server,
//! Connection, Content-Length, Content-Type. Error responses get a minimal
//! HTML body so browsers render something readable.

use bytes::{BufMut, Bytes, BytesMut};
use chrono::Utc;

const SERVER_NAME: &str = concat!("Cascade/", env!("CARGO_PKG_VERSION"));

/// Content type by file extension
///
/// Unknown extensions fall back to a generic binary type.
pub fn content_type_for(path: &str) -> &'static str {
    let ext = path
        .rsplit('.')
        .next()
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "html" | "htm" => "text/html; charset=UTF-8",
        "swf" => "application/x-shockwave-flash",
        "flv" => "video/x-flv",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        "ogg" => "audio/ogg",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "txt" => "text/plain",
        "xml" => "application/xml",
        _ => "application/octet-stream",
    }
}

/// One response, formatted on demand
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: u16,
    reason: &'static str,
    content_type: &'static str,
    keep_alive: bool,
    body: Bytes,
}

impl HttpResponse {
    pub fn ok(content_type: &'static str, body: Bytes) -> Self {
        Self {
            status: 200,
            reason: "OK",
            content_type,
            keep_alive: false,
            body,
        }
    }

    /// An error response with a minimal HTML body
    pub fn error(status: u16, reason: &'static str) -> Self {
        let body = format!(
            "<html><head><title>{status} {reason}</title></head>\
             <body><h1>{reason}</h1></body></html>\r\n"
        );
        Self {
            status,
            reason,
            content_type: "text/html; charset=UTF-8",
            keep_alive: false,
            body: Bytes::from(body),
        }
    }

    pub fn not_found() -> Self {
        Self::error(404, "Not Found")
    }

    pub fn bad_request() -> Self {
        Self::error(400, "Bad Request")
    }

    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Status line and headers for a body that will be streamed separately
    pub fn stream_head(content_type: &'static str, content_length: u64) -> Bytes {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT");
        let head = format!(
            "HTTP/1.1 200 OK\r\n\
             Date: {date}\r\n\
             Server: {SERVER_NAME}\r\n\
             Connection: close\r\n\
             Content-Length: {content_length}\r\n\
             Content-Type: {content_type}\r\n\
             \r\n"
        );
        Bytes::from(head)
    }

    /// Serialize the status line, headers, and body
    pub fn format(&self) -> Bytes {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT");
        let connection = if self.keep_alive { "Keep-Alive" } else { "close" };

        let head = format!(
            "HTTP/1.1 {} {}\r\n\
             Date: {}\r\n\
             Server: {}\r\n\
             Connection: {}\r\n\
             Content-Length: {}\r\n\
             Content-Type: {}\r\n\
             \r\n",
            self.status,
            self.reason,
            date,
            SERVER_NAME,
            connection,
            self.body.len(),
            self.content_type,
        );

        let mut out = BytesMut::with_capacity(head.len() + self.body.len());
        out.put_slice(head.as_bytes());
        out.put_slice(&self.body);
        out.freeze()
    }
}
