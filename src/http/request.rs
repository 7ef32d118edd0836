//! HTTP request parsing
//!
//! Enough of HTTP/1.1 to serve media files and carry tunneled RTMP. The
//! method is classified from the leading bytes so a connection sniffer can
//! tell HTTP from RTMP before committing to a parser.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::error::{HttpError, Result};

/// Request methods recognized on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Head,
    Put,
    Delete,
    Options,
    Trace,
    Connect,
}

impl Method {
    /// Classify a request by its leading bytes
    pub fn classify(data: &[u8]) -> std::result::Result<Method, HttpError> {
        const METHODS: [(&[u8], Method); 8] = [
            (b"GET ", Method::Get),
            (b"POST ", Method::Post),
            (b"HEAD ", Method::Head),
            (b"PUT ", Method::Put),
            (b"DELETE ", Method::Delete),
            (b"OPTIONS ", Method::Options),
            (b"TRACE ", Method::Trace),
            (b"CONNECT ", Method::Connect),
        ];
        for (prefix, method) in METHODS {
            if data.starts_with(prefix) {
                return Ok(method);
            }
        }
        Err(HttpError::UnknownMethod)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Head => "HEAD",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
        }
    }
}

/// A parsed request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub version: String,
    headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpRequest {
    /// Parse a complete request, header block and body included
    ///
    /// Fails with `ShortBody` when fewer body bytes are present than the
    /// Content-Length header declares; the caller should read more and
    /// retry.
    pub fn parse(data: &[u8]) -> Result<HttpRequest> {
        let head_end = find_header_end(data).ok_or(HttpError::BadRequestLine)?;
        let head =
            std::str::from_utf8(&data[..head_end]).map_err(|_| HttpError::BadRequestLine)?;
        let mut lines = head.split("\r\n");

        let request_line = lines.next().ok_or(HttpError::BadRequestLine)?;
        let mut parts = request_line.split_whitespace();
        let method_token = parts.next().ok_or(HttpError::BadRequestLine)?;
        let path = parts.next().ok_or(HttpError::BadRequestLine)?.to_string();
        let version = parts.next().unwrap_or("HTTP/1.0").to_string();

        let method = Method::classify(format!("{} ", method_token).as_bytes())?;

        let mut headers = HashMap::new();
        for line in lines {
            if line.is_empty() {
                continue;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| HttpError::BadHeader(line.to_string()))?;
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }

        let declared = headers
            .get("content-length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
        let body_start = head_end + 4;
        let available = data.len().saturating_sub(body_start);
        if available < declared {
            return Err(HttpError::ShortBody.into());
        }
        let body = Bytes::copy_from_slice(&data[body_start..body_start + declared]);

        Ok(HttpRequest {
            method,
            path,
            version,
            headers,
            body,
        })
    }

    /// Header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// A comma-list header as ordered tokens, quality parameters dropped
    ///
    /// `Accept-Language: en-us,en;q=0.5` becomes `["en-us", "en"]`.
    pub fn list_header(&self, name: &str) -> Vec<String> {
        self.header(name)
            .map(|value| {
                value
                    .split(',')
                    .map(|tok| {
                        tok.split(';').next().unwrap_or("").trim().to_string()
                    })
                    .filter(|tok| !tok.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn keep_alive(&self) -> bool {
        match self.header("connection") {
            Some(value) => value.eq_ignore_ascii_case("keep-alive"),
            None => self.version == "HTTP/1.1",
        }
    }

    /// Map the request path onto the document root
    ///
    /// Directory requests get `index.html` appended; path segments that
    /// climb out of the root are stripped.
    pub fn resolve(&self, docroot: &Path) -> PathBuf {
        let mut path = self.path.as_str();
        if let Some(q) = path.find('?') {
            path = &path[..q];
        }

        let mut resolved = docroot.to_path_buf();
        for segment in path.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                continue;
            }
            resolved.push(segment);
        }
        if path.ends_with('/') || path.is_empty() {
            resolved.push("index.html");
        }
        resolved
    }
}

/// Find the blank line separating headers from the body
fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_get(path: &str, extra: &str) -> HttpRequest {
        let raw = format!(
            "GET {} HTTP/1.1\r\nHost: localhost:4080\r\n{}\r\n",
            path, extra
        );
        HttpRequest::parse(raw.as_bytes()).unwrap()
    }

    #[test]
    fn test_classify_by_leading_bytes() {
        assert_eq!(Method::classify(b"GET /index.html HTTP/1.1").unwrap(), Method::Get);
        assert_eq!(Method::classify(b"POST /open/1 HTTP/1.1").unwrap(), Method::Post);
        assert_eq!(Method::classify(b"HEAD / HTTP/1.1").unwrap(), Method::Head);
        assert!(Method::classify(b"\x03\x00\x00\x01").is_err());
    }

    #[test]
    fn test_parse_request_line() {
        let req = simple_get("/index.html", "");
        assert_eq!(req.method, Method::Get);
        assert_eq!(req.path, "/index.html");
        assert_eq!(req.version, "HTTP/1.1");
    }

    #[test]
    fn test_headers_case_insensitive() {
        let req = simple_get("/", "User-Agent: Gnash/0.8.10\r\n");
        assert_eq!(req.header("user-agent"), Some("Gnash/0.8.10"));
        assert_eq!(req.header("USER-AGENT"), Some("Gnash/0.8.10"));
    }

    #[test]
    fn test_list_header_ordered_without_quality() {
        let req = simple_get(
            "/",
            "Accept-Language: en-us,en;q=0.5\r\nAccept-Encoding: gzip,deflate\r\n",
        );
        assert_eq!(req.list_header("accept-language"), vec!["en-us", "en"]);
        assert_eq!(req.list_header("accept-encoding"), vec!["gzip", "deflate"]);
        assert!(req.list_header("te").is_empty());
    }

    #[test]
    fn test_body_by_content_length() {
        let raw = b"POST /send/42/1 HTTP/1.1\r\nContent-Length: 5\r\n\r\nhello";
        let req = HttpRequest::parse(raw).unwrap();
        assert_eq!(&req.body[..], b"hello");
    }

    #[test]
    fn test_short_body_rejected() {
        let raw = b"POST /send/42/1 HTTP/1.1\r\nContent-Length: 10\r\n\r\nhel";
        assert!(HttpRequest::parse(raw).is_err());
    }

    #[test]
    fn test_resolve_appends_index_for_directories() {
        let req = simple_get("/", "");
        assert_eq!(
            req.resolve(Path::new("/var/www")),
            PathBuf::from("/var/www/index.html")
        );
    }

    #[test]
    fn test_resolve_strips_parent_segments() {
        let req = simple_get("/../../etc/passwd", "");
        assert_eq!(
            req.resolve(Path::new("/var/www")),
            PathBuf::from("/var/www/etc/passwd")
        );
    }

    #[test]
    fn test_resolve_drops_query_string() {
        let req = simple_get("/video.flv?start=0", "");
        assert_eq!(
            req.resolve(Path::new("/var/www")),
            PathBuf::from("/var/www/video.flv")
        );
    }
}
