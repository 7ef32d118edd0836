//! Resource handlers
//!
//! A `Handler` is the shared state for one served resource: the disk
//! streams created under it, the parameters of the connect that opened it,
//! and the bookkeeping the registry uses to evict idle entries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::amf::AmfValue;
use crate::error::{Error, Result};
use crate::media::{DiskStream, PageEvent};

/// Wire protocol a connection was classified as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Rtmp,
    Rtmpt,
    Http,
}

impl Protocol {
    pub fn name(self) -> &'static str {
        match self {
            Protocol::Rtmp => "rtmp",
            Protocol::Rtmpt => "rtmpt",
            Protocol::Http => "http",
        }
    }
}

/// Registry key: the protocol plus the resource path it serves
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub protocol: Protocol,
    pub path: String,
}

impl ResourceKey {
    pub fn new(protocol: Protocol, path: impl Into<String>) -> Self {
        Self {
            protocol,
            path: path.into(),
        }
    }
}

/// Parameters from an RTMP connect object
#[derive(Debug, Clone, Default)]
pub struct ConnectParams {
    pub app: Option<String>,
    pub flash_ver: Option<String>,
    pub swf_url: Option<String>,
    pub tc_url: Option<String>,
    pub page_url: Option<String>,
    pub object_encoding: Option<f64>,
}

impl ConnectParams {
    pub fn from_object(object: &AmfValue) -> Self {
        let get = |name: &str| {
            object
                .property(name)
                .and_then(AmfValue::as_str)
                .map(str::to_string)
        };
        Self {
            app: get("app"),
            flash_ver: get("flashVer"),
            swf_url: get("swfUrl"),
            tc_url: get("tcUrl"),
            page_url: get("pageUrl"),
            object_encoding: object
                .property("objectEncoding")
                .and_then(AmfValue::as_number),
        }
    }
}

#[derive(Debug, Default)]
struct HandlerInner {
    streams: HashMap<u32, DiskStream>,
    next_stream_id: u32,
    connect: Option<ConnectParams>,
}

/// Shared state for one active resource
#[derive(Debug)]
pub struct Handler {
    key: ResourceKey,
    inner: Mutex<HandlerInner>,
    clients: AtomicUsize,
    last_active: Mutex<Instant>,
}

impl Handler {
    pub fn new(key: ResourceKey) -> Self {
        Self {
            key,
            inner: Mutex::new(HandlerInner {
                streams: HashMap::new(),
                // id 0 is the control stream; media streams start at 1
                next_stream_id: 1,
                connect: None,
            }),
            clients: AtomicUsize::new(0),
            last_active: Mutex::new(Instant::now()),
        }
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn client_joined(&self) {
        self.clients.fetch_add(1, Ordering::Relaxed);
        self.touch();
    }

    pub fn client_left(&self) {
        self.clients.fetch_sub(1, Ordering::Relaxed);
        self.touch();
    }

    pub fn active_clients(&self) -> usize {
        self.clients.load(Ordering::Relaxed)
    }

    /// Mark the handler as recently used
    pub fn touch(&self) {
        *self.last_active.lock().expect("activity lock poisoned") = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_active
            .lock()
            .expect("activity lock poisoned")
            .elapsed()
    }

    pub fn set_connect_params(&self, params: ConnectParams) {
        self.inner.lock().expect("handler lock poisoned").connect = Some(params);
    }

    pub fn connect_params(&self) -> Option<ConnectParams> {
        self.inner
            .lock()
            .expect("handler lock poisoned")
            .connect
            .clone()
    }

    /// Allocate the next stream id and its stream
    pub fn create_stream(&self) -> u32 {
        let mut inner = self.inner.lock().expect("handler lock poisoned");
        let id = inner.next_stream_id;
        inner.next_stream_id += 1;
        inner.streams.insert(id, DiskStream::new(id));
        self.touch();
        id
    }

    /// Open a media file on an existing stream
    pub fn open_stream(&self, id: u32, path: &std::path::Path) -> Result<()> {
        let mut inner = self.inner.lock().expect("handler lock poisoned");
        let stream = inner
            .streams
            .get_mut(&id)
            .ok_or(Error::BadStreamState(id, "not created"))?;
        stream.open(path)
    }

    pub fn play_stream(&self, id: u32) -> Result<()> {
        let mut inner = self.inner.lock().expect("handler lock poisoned");
        let stream = inner
            .streams
            .get_mut(&id)
            .ok_or(Error::BadStreamState(id, "not created"))?;
        stream.play()
    }

    pub fn pause_stream(&self, id: u32) -> Result<()> {
        let mut inner = self.inner.lock().expect("handler lock poisoned");
        let stream = inner
            .streams
            .get_mut(&id)
            .ok_or(Error::BadStreamState(id, "not created"))?;
        stream.pause()
    }

    pub fn seek_stream(&self, id: u32, offset: u64) -> Result<()> {
        let mut inner = self.inner.lock().expect("handler lock poisoned");
        let stream = inner
            .streams
            .get_mut(&id)
            .ok_or(Error::BadStreamState(id, "not created"))?;
        stream.seek(offset)
    }

    /// Serve the next page of a playing stream
    pub fn step_stream(&self, id: u32) -> Result<PageEvent> {
        let mut inner = self.inner.lock().expect("handler lock poisoned");
        let stream = inner
            .streams
            .get_mut(&id)
            .ok_or(Error::BadStreamState(id, "not created"))?;
        let event = stream.play_step();
        if matches!(event, Ok(PageEvent::Eof)) {
            inner.streams.remove(&id);
        }
        event
    }

    pub fn has_stream(&self, id: u32) -> bool {
        self.inner
            .lock()
            .expect("handler lock poisoned")
            .streams
            .contains_key(&id)
    }

    pub fn stream_state(&self, id: u32) -> Option<crate::media::StreamState> {
        self.inner
            .lock()
            .expect("handler lock poisoned")
            .streams
            .get(&id)
            .map(|s| s.state())
    }

    pub fn close_stream(&self, id: u32) {
        let mut inner = self.inner.lock().expect("handler lock poisoned");
        if let Some(mut stream) = inner.streams.remove(&id) {
            stream.close();
        }
    }

    /// Ids of streams currently in the Play state
    pub fn playing_stream_ids(&self) -> Vec<u32> {
        let inner = self.inner.lock().expect("handler lock poisoned");
        inner
            .streams
            .iter()
            .filter(|(_, s)| s.state() == crate::media::StreamState::Play)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn stream_count(&self) -> usize {
        self.inner.lock().expect("handler lock poisoned").streams.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio_test::assert_ok;

    fn handler() -> Handler {
        Handler::new(ResourceKey::new(Protocol::Rtmp, "oflaDemo"))
    }

    fn scratch_file(name: &str, contents: &[u8]) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("cascade-handler-{}-{}", std::process::id(), name));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        path
    }

    #[test]
    fn test_stream_ids_start_at_one() {
        let h = handler();
        assert_eq!(h.create_stream(), 1);
        assert_eq!(h.create_stream(), 2);
        assert_eq!(h.stream_count(), 2);
    }

    #[test]
    fn test_open_unknown_stream_fails() {
        let h = handler();
        assert!(h.open_stream(9, std::path::Path::new("/tmp/x")).is_err());
    }

    #[test]
    fn test_play_through_handler() {
        let path = scratch_file("clip.flv", &[3u8; 64]);
        let h = handler();
        let id = h.create_stream();
        tokio_test::assert_ok!(h.open_stream(id, &path));
        h.play_stream(id).unwrap();

        assert!(matches!(h.step_stream(id).unwrap(), PageEvent::Page(_)));
        assert_eq!(h.step_stream(id).unwrap(), PageEvent::Eof);
        // Stream is gone after end of file
        assert_eq!(h.stream_count(), 0);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_playing_ids_reflect_state() {
        let path = scratch_file("idle.flv", &[1u8; 16]);
        let h = handler();
        let playing = h.create_stream();
        let parked = h.create_stream();
        h.open_stream(playing, &path).unwrap();
        h.play_stream(playing).unwrap();

        let ids = h.playing_stream_ids();
        assert_eq!(ids, vec![playing]);
        assert_ne!(ids, vec![parked]);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_connect_params_from_object() {
        let object = AmfValue::object([
            ("app", AmfValue::string("oflaDemo")),
            ("tcUrl", AmfValue::string("rtmp://localhost/oflaDemo")),
            ("objectEncoding", AmfValue::Number(3.0)),
        ]);
        let params = ConnectParams::from_object(&object);
        assert_eq!(params.app.as_deref(), Some("oflaDemo"));
        assert_eq!(params.tc_url.as_deref(), Some("rtmp://localhost/oflaDemo"));
        assert_eq!(params.object_encoding, Some(3.0));
        assert!(params.page_url.is_none());
    }

    #[test]
    fn test_client_counting() {
        let h = handler();
        h.client_joined();
        h.client_joined();
        assert_eq!(h.active_clients(), 2);
        h.client_left();
        assert_eq!(h.active_clients(), 1);
    }
}
