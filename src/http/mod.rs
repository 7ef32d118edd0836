//! HTTP protocol engine
//!
//! Serves files out of the document root and carries RTMP tunneled over
//! HTTP POST for clients behind restrictive proxies. `HttpSession` is
//! sans-IO like the RTMP engine: the connection task hands it parsed
//! requests and writes whatever comes back.

pub mod request;
pub mod response;
pub mod rtmpt;

pub use request::{HttpRequest, Method};
pub use response::{content_type_for, HttpResponse};
pub use rtmpt::RtmptCommand;

use std::path::PathBuf;
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::amf::{amf0, AmfValue};
use crate::media::{DiskStream, PageEvent};
use crate::stats::ServerStats;

/// What `process_request` produced
#[derive(Debug)]
pub enum HttpReply {
    /// A complete response; nothing more to send for this request
    Full(Bytes),
    /// Head plus the first page; keep calling `service` for the rest
    Streaming(Bytes),
}

/// One HTTP client session
#[derive(Debug)]
pub struct HttpSession {
    docroot: PathBuf,
    stats: Arc<ServerStats>,
    stream: Option<DiskStream>,
}

impl HttpSession {
    pub fn new(docroot: PathBuf, stats: Arc<ServerStats>) -> Self {
        Self {
            docroot,
            stats,
            stream: None,
        }
    }

    pub fn is_streaming(&self) -> bool {
        self.stream.is_some()
    }

    pub fn process_request(&mut self, req: &HttpRequest) -> HttpReply {
        match req.method {
            Method::Get => self.serve_file(req, true),
            Method::Head => self.serve_file(req, false),
            Method::Post => self.handle_post(req),
            other => {
                tracing::debug!(method = other.as_str(), path = %req.path, "method not served");
                HttpReply::Full(HttpResponse::error(501, "Not Implemented").format())
            }
        }
    }

    /// Next page of the file being streamed, or `None` when it is finished
    pub fn service(&mut self) -> Option<Bytes> {
        let stream = self.stream.as_mut()?;
        match stream.play_step() {
            Ok(PageEvent::Page(page)) => Some(page),
            Ok(PageEvent::Idle) => Some(Bytes::new()),
            Ok(PageEvent::Eof) | Err(_) => {
                self.stream = None;
                None
            }
        }
    }

    fn serve_file(&mut self, req: &HttpRequest, with_body: bool) -> HttpReply {
        let path = req.resolve(&self.docroot);
        let mut stream = DiskStream::new(1);
        if let Err(err) = stream.open(&path) {
            tracing::info!(path = %path.display(), error = %err, "file not served");
            return HttpReply::Full(HttpResponse::not_found().format());
        }

        let content_type = content_type_for(&path.to_string_lossy());
        let head = HttpResponse::stream_head(content_type, stream.file_size());
        self.stats.file_served();

        if !with_body {
            return HttpReply::Full(head);
        }

        // First page rides with the head; the event loop streams the rest
        let mut out = BytesMut::from(&head[..]);
        if stream.play().is_ok() {
            match stream.play_step() {
                Ok(PageEvent::Page(page)) => {
                    out.put_slice(&page);
                    if stream.state() == crate::media::StreamState::Play {
                        self.stream = Some(stream);
                    }
                }
                _ => {}
            }
        }
        if self.stream.is_some() {
            HttpReply::Streaming(out.freeze())
        } else {
            HttpReply::Full(out.freeze())
        }
    }

    fn handle_post(&mut self, req: &HttpRequest) -> HttpReply {
        let content_type = req.header("content-type").unwrap_or("");

        if content_type.starts_with("application/x-www-form-urlencoded") {
            // Form posts are captured to disk next to the requested path
            let mut path = req.resolve(&self.docroot);
            path.set_extension("post");
            return match std::fs::write(&path, &req.body) {
                Ok(()) => HttpReply::Full(HttpResponse::ok("text/plain", Bytes::new()).format()),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "post capture failed");
                    HttpReply::Full(HttpResponse::error(500, "Internal Server Error").format())
                }
            };
        }

        if content_type.starts_with("application/x-amf") {
            return match parse_echo_request(&req.body) {
                Some(echo) => {
                    let body = format_echo_response(&echo.response_id, &echo.value);
                    HttpReply::Full(HttpResponse::ok("application/x-amf", body).format())
                }
                None => HttpReply::Full(HttpResponse::bad_request().format()),
            };
        }

        tracing::debug!(content_type = content_type, "unhandled post");
        HttpReply::Full(HttpResponse::error(501, "Not Implemented").format())
    }
}

/// Leading bytes of an echo-test request; skipped, not interpreted
const ECHO_HEADER_SIZE: usize = 6;

/// Fixed binary blobs framing the echo reply, as the Red5 echo test expects
const ECHO_PREAMBLE: [u8; 6] = [0x00, 0x00, 0x00, 0x00, 0x00, 0x01];
const ECHO_TRAILER: [u8; 4] = [0xff, 0xff, 0xff, 0xff];

/// One parsed Flash echo-test POST
struct EchoRequest {
    /// The response id string from the request, e.g. `/2`
    response_id: String,
    /// The value to echo back
    value: AmfValue,
}

/// Parse the echo-test body: six header bytes, two raw strings (target and
/// response id, length-prefixed with no type marker), then two AMF values;
/// the second value is the one echoed back
fn parse_echo_request(body: &[u8]) -> Option<EchoRequest> {
    let mut data = Bytes::copy_from_slice(body.get(ECHO_HEADER_SIZE..)?);
    let _target = read_raw_string(&mut data)?;
    let response_id = read_raw_string(&mut data)?;
    let _first = amf0::decode(&mut data).ok()?;
    let value = amf0::decode(&mut data).ok()?;
    Some(EchoRequest { response_id, value })
}

/// Echo reply body: the fixed preamble, `<id>/onResult` and `null` as raw
/// strings, the fixed trailer, then the echoed value. An undefined value
/// comes back as null, matching the reference server.
fn format_echo_response(response_id: &str, value: &AmfValue) -> Bytes {
    let mut out = BytesMut::new();
    out.put_slice(&ECHO_PREAMBLE);
    put_raw_string(&mut out, &format!("{response_id}/onResult"));
    put_raw_string(&mut out, "null");
    out.put_slice(&ECHO_TRAILER);

    let echoed = if matches!(value, AmfValue::Undefined) {
        &AmfValue::Null
    } else {
        value
    };
    amf0::encode(echoed, &mut out);
    out.freeze()
}

fn read_raw_string(data: &mut Bytes) -> Option<String> {
    if data.len() < 2 {
        return None;
    }
    let len = data.get_u16() as usize;
    if data.len() < len {
        return None;
    }
    String::from_utf8(data.split_to(len).to_vec()).ok()
}

fn put_raw_string(out: &mut BytesMut, s: &str) {
    out.put_u16(s.len() as u16);
    out.put_slice(s.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amf::AmfValue;
    use std::io::Write;
    use std::path::Path;

    fn scratch_docroot(tag: &str) -> PathBuf {
        let mut dir = std::env::temp_dir();
        dir.push(format!("cascade-http-{}-{}", std::process::id(), tag));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn session(docroot: &Path) -> HttpSession {
        HttpSession::new(docroot.to_path_buf(), Arc::new(ServerStats::new()))
    }

    fn get(path: &str) -> HttpRequest {
        let raw = format!("GET {} HTTP/1.1\r\nHost: localhost\r\n\r\n", path);
        HttpRequest::parse(raw.as_bytes()).unwrap()
    }

    #[test]
    fn test_get_index_html() {
        let docroot = scratch_docroot("index");
        let page = b"<html><body>hello</body></html>";
        std::fs::File::create(docroot.join("index.html"))
            .unwrap()
            .write_all(page)
            .unwrap();

        let mut s = session(&docroot);
        let reply = s.process_request(&get("/index.html"));
        let wire = match reply {
            HttpReply::Full(b) => b,
            HttpReply::Streaming(b) => b,
        };
        let text = std::str::from_utf8(&wire).unwrap();

        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Type: text/html; charset=UTF-8\r\n"));
        assert!(text.contains(&format!("Content-Length: {}\r\n", page.len())));
        assert!(text.ends_with("<html><body>hello</body></html>"));

        std::fs::remove_dir_all(docroot).ok();
    }

    #[test]
    fn test_get_missing_file_is_404() {
        let docroot = scratch_docroot("missing");
        let mut s = session(&docroot);
        match s.process_request(&get("/nope.html")) {
            HttpReply::Full(wire) => {
                assert!(wire.starts_with(b"HTTP/1.1 404 Not Found\r\n"));
            }
            other => panic!("expected full reply, got {:?}", other),
        }
        std::fs::remove_dir_all(docroot).ok();
    }

    #[test]
    fn test_get_directory_resolves_index() {
        let docroot = scratch_docroot("dir");
        std::fs::File::create(docroot.join("index.html"))
            .unwrap()
            .write_all(b"front door")
            .unwrap();

        let mut s = session(&docroot);
        let wire = match s.process_request(&get("/")) {
            HttpReply::Full(b) | HttpReply::Streaming(b) => b,
        };
        assert!(std::str::from_utf8(&wire).unwrap().ends_with("front door"));

        std::fs::remove_dir_all(docroot).ok();
    }

    #[test]
    fn test_large_file_streams_remaining_pages() {
        let docroot = scratch_docroot("stream");
        let body: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::File::create(docroot.join("video.flv"))
            .unwrap()
            .write_all(&body)
            .unwrap();

        let mut s = session(&docroot);
        let head = match s.process_request(&get("/video.flv")) {
            HttpReply::Streaming(b) => b,
            other => panic!("expected streaming reply, got {:?}", other),
        };
        assert!(std::str::from_utf8(&head[..head.len().min(200)])
            .unwrap_or("")
            .contains("video/x-flv"));

        let mut served: Vec<u8> = Vec::new();
        let body_start = head.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
        served.extend_from_slice(&head[body_start..]);
        while let Some(page) = s.service() {
            served.extend_from_slice(&page);
        }
        assert_eq!(served, body);
        assert!(!s.is_streaming());

        std::fs::remove_dir_all(docroot).ok();
    }

    #[test]
    fn test_head_omits_body() {
        let docroot = scratch_docroot("head");
        std::fs::File::create(docroot.join("index.html"))
            .unwrap()
            .write_all(b"content")
            .unwrap();

        let raw = b"HEAD /index.html HTTP/1.1\r\n\r\n";
        let req = HttpRequest::parse(raw).unwrap();
        let mut s = session(&docroot);
        let wire = match s.process_request(&req) {
            HttpReply::Full(b) => b,
            other => panic!("expected full reply, got {:?}", other),
        };
        let text = std::str::from_utf8(&wire).unwrap();
        assert!(text.contains("Content-Length: 7\r\n"));
        assert!(text.ends_with("\r\n\r\n"));

        std::fs::remove_dir_all(docroot).ok();
    }

    #[test]
    fn test_post_form_captured_to_disk() {
        let docroot = scratch_docroot("post");
        let raw = b"POST /feedback HTTP/1.1\r\n\
                    Content-Type: application/x-www-form-urlencoded\r\n\
                    Content-Length: 9\r\n\r\nname=gnash";
        // Content-Length of 9 truncates to "name=gnas"
        let req = HttpRequest::parse(raw).unwrap();

        let mut s = session(&docroot);
        let wire = match s.process_request(&req) {
            HttpReply::Full(b) => b,
            other => panic!("expected full reply, got {:?}", other),
        };
        assert!(wire.starts_with(b"HTTP/1.1 200 OK\r\n"));
        assert_eq!(
            std::fs::read(docroot.join("feedback.post")).unwrap(),
            b"name=gnas"
        );

        std::fs::remove_dir_all(docroot).ok();
    }

    fn echo_post_body(target: &str, response_id: &str, value: &AmfValue) -> Vec<u8> {
        let mut posted = BytesMut::new();
        posted.put_slice(&[0u8; ECHO_HEADER_SIZE]);
        put_raw_string(&mut posted, target);
        put_raw_string(&mut posted, response_id);
        amf0::encode(&AmfValue::Number(0.0), &mut posted);
        amf0::encode(value, &mut posted);
        posted.to_vec()
    }

    fn echo_post(docroot: &Path, body: &[u8]) -> Bytes {
        let mut raw = format!(
            "POST /echo HTTP/1.1\r\nContent-Type: application/x-amf\r\nContent-Length: {}\r\n\r\n",
            body.len()
        )
        .into_bytes();
        raw.extend_from_slice(body);
        let req = HttpRequest::parse(&raw).unwrap();

        let mut s = session(docroot);
        match s.process_request(&req) {
            HttpReply::Full(b) => b,
            other => panic!("expected full reply, got {:?}", other),
        }
    }

    fn reply_body(wire: &Bytes) -> Bytes {
        let body_start = wire.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
        Bytes::copy_from_slice(&wire[body_start..])
    }

    #[test]
    fn test_post_amf_echo() {
        let docroot = scratch_docroot("amf");
        let posted = echo_post_body("echo", "/2", &AmfValue::Number(42.0));
        let wire = echo_post(&docroot, &posted);
        let body = reply_body(&wire);

        let mut expected = BytesMut::new();
        expected.put_slice(&ECHO_PREAMBLE);
        put_raw_string(&mut expected, "/2/onResult");
        put_raw_string(&mut expected, "null");
        expected.put_slice(&ECHO_TRAILER);
        amf0::encode(&AmfValue::Number(42.0), &mut expected);
        assert_eq!(&body[..], &expected[..]);

        std::fs::remove_dir_all(docroot).ok();
    }

    #[test]
    fn test_post_amf_echo_undefined_comes_back_null() {
        let docroot = scratch_docroot("amf-undef");
        let posted = echo_post_body("echo", "/7", &AmfValue::Undefined);
        let wire = echo_post(&docroot, &posted);
        let mut body = reply_body(&wire);

        // Skip the fixed framing and the two raw strings
        body.advance(ECHO_PREAMBLE.len());
        let name = read_raw_string(&mut body).unwrap();
        assert_eq!(name, "/7/onResult");
        let null_str = read_raw_string(&mut body).unwrap();
        assert_eq!(null_str, "null");
        body.advance(ECHO_TRAILER.len());
        assert_eq!(amf0::decode(&mut body).unwrap(), AmfValue::Null);

        std::fs::remove_dir_all(docroot).ok();
    }

    #[test]
    fn test_post_amf_truncated_is_400() {
        let docroot = scratch_docroot("amf-bad");
        let wire = echo_post(&docroot, &[0u8; 4]);
        assert!(wire.starts_with(b"HTTP/1.1 400 Bad Request\r\n"));
        std::fs::remove_dir_all(docroot).ok();
    }

    #[test]
    fn test_put_not_implemented() {
        let docroot = scratch_docroot("put");
        let req = HttpRequest::parse(b"PUT /x HTTP/1.1\r\n\r\n").unwrap();
        let mut s = session(&docroot);
        match s.process_request(&req) {
            HttpReply::Full(wire) => {
                assert!(wire.starts_with(b"HTTP/1.1 501 Not Implemented\r\n"));
            }
            other => panic!("expected full reply, got {:?}", other),
        }
        std::fs::remove_dir_all(docroot).ok();
    }
}
