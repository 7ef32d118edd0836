//! Per-connection RTMP session
//!
//! Drives one client from handshake through steady-state command dispatch.
//! The session is sans-IO: `receive` takes bytes off the socket and returns
//! the wire-ready replies, `service` advances any playing streams by one
//! page. The connection task owns the socket and the timing.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use crate::error::{Error, HandshakeError, Result};
use crate::media::{PageEvent, StreamState};
use crate::registry::HandlerRegistry;
use crate::session::{ConnectParams, Handler, PluginSet, Protocol, ResourceKey};
use crate::stats::ServerStats;

use super::chunk::{ChunkDecoder, ChunkEncoder, ChunkHeaderSize, RtmpMessage};
use super::constants::{
    DEFAULT_CHUNK_SIZE, DEFAULT_PEER_BANDWIDTH, DEFAULT_WINDOW_ACK_SIZE, STREAM_CHANNEL,
    SYSTEM_CHANNEL,
};
use super::handshake::{HandshakeOutcome, ServerHandshake};
use super::message::{
    self, Command, MessageType, PingKind, Status, UserControl,
};

/// Channel used for outbound media pages
const DATA_CHANNEL: u8 = 5;
const AUDIO_CHANNEL: u8 = 6;
const VIDEO_CHANNEL: u8 = 7;

/// One RTMP client session
pub struct RtmpSession {
    registry: Arc<HandlerRegistry>,
    plugins: PluginSet,
    stats: Arc<ServerStats>,
    docroot: PathBuf,
    handshake: ServerHandshake,
    decoder: ChunkDecoder,
    encoder: ChunkEncoder,
    handler: Option<Arc<Handler>>,
    inbuf: BytesMut,
}

impl RtmpSession {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        plugins: PluginSet,
        stats: Arc<ServerStats>,
        docroot: PathBuf,
    ) -> Self {
        Self {
            registry,
            plugins,
            stats,
            docroot,
            handshake: ServerHandshake::new(),
            decoder: ChunkDecoder::new(),
            encoder: ChunkEncoder::new(),
            handler: None,
            inbuf: BytesMut::new(),
        }
    }

    pub fn handler(&self) -> Option<&Arc<Handler>> {
        self.handler.as_ref()
    }

    pub fn handshake_done(&self) -> bool {
        self.handshake.is_done()
    }

    /// Feed bytes read from the socket; returns wire-ready replies in order
    pub async fn receive(&mut self, data: &[u8]) -> Result<Vec<Bytes>> {
        self.inbuf.extend_from_slice(data);
        let mut out = Vec::new();

        if !self.handshake.is_done() {
            match self.handshake.process(&mut self.inbuf)? {
                HandshakeOutcome::Pending => return Ok(out),
                HandshakeOutcome::Respond(reply) => {
                    out.push(reply);
                    return Ok(out);
                }
                HandshakeOutcome::Done { leftover } => {
                    self.inbuf.extend_from_slice(&leftover);
                }
            }
        }

        let messages = self.decoder.split(&mut self.inbuf)?;
        for msg in messages {
            self.stats.message_in();
            self.dispatch(msg, &mut out).await?;
        }
        self.stats_out(&out);
        Ok(out)
    }

    /// Advance every playing stream by one page
    pub fn service(&mut self) -> Result<Vec<Bytes>> {
        let mut out = Vec::new();
        let handler = match self.handler {
            Some(ref h) => Arc::clone(h),
            None => return Ok(out),
        };

        for sid in handler.playing_stream_ids() {
            match handler.step_stream(sid) {
                Ok(PageEvent::Page(page)) => {
                    out.push(self.encoder.encode_message(
                        DATA_CHANNEL,
                        ChunkHeaderSize::Bytes12,
                        MessageType::Notify,
                        sid,
                        &page,
                    ));
                }
                Ok(PageEvent::Eof) => {
                    out.push(self.invoke(sid, message::encode_status(Status::PlayStop)));
                    out.push(self.control(
                        MessageType::User,
                        message::encode_user_control(UserControl::StreamEof, sid),
                    ));
                }
                Ok(PageEvent::Idle) => {}
                // The stream vanished between listing and stepping
                Err(_) => continue,
            }
        }
        self.stats_out(&out);
        Ok(out)
    }

    /// Drop the reference to the shared handler on the way out
    pub fn detach(&mut self) {
        if let Some(handler) = self.handler.take() {
            handler.client_left();
        }
    }

    fn stats_out(&self, out: &[Bytes]) {
        for _ in out {
            self.stats.message_out();
        }
    }

    /// Wrap an invoke body in a chunk on the command channel
    fn invoke(&self, stream_id: u32, body: Bytes) -> Bytes {
        self.encoder.encode_message(
            STREAM_CHANNEL,
            ChunkHeaderSize::Bytes12,
            MessageType::Invoke,
            stream_id,
            &body,
        )
    }

    /// Wrap a control body in a chunk on the system channel
    fn control(&self, msg_type: MessageType, body: Bytes) -> Bytes {
        self.encoder.encode_message(
            SYSTEM_CHANNEL,
            ChunkHeaderSize::Bytes12,
            msg_type,
            0,
            &body,
        )
    }

    async fn dispatch(&mut self, msg: RtmpMessage, out: &mut Vec<Bytes>) -> Result<()> {
        match msg.msg_type {
            MessageType::ChunkSize => {
                if msg.body.len() >= 4 {
                    let size = u32::from_be_bytes([
                        msg.body[0], msg.body[1], msg.body[2], msg.body[3],
                    ]);
                    self.decoder.set_chunk_size(size as usize);
                    tracing::debug!(size = size, "peer chunk size");
                }
            }
            MessageType::BytesRead => {
                tracing::trace!("bytes-read report");
            }
            MessageType::User => self.handle_user(&msg, out),
            t if t.is_invoke() => {
                // AMF3 invokes carry a one-byte format marker before the
                // command body, which is plain AMF0 in practice
                let body = if t == MessageType::Amf3Invoke && !msg.body.is_empty() {
                    msg.body.slice(1..)
                } else {
                    msg.body.clone()
                };
                let cmd = Command::decode(body)?;
                self.handle_command(cmd, &msg, out).await?;
            }
            MessageType::Amf3Notify | MessageType::Amf3SharedObj => {
                tracing::debug!(kind = ?msg.msg_type, "AMF3 message ignored");
            }
            other => {
                tracing::debug!(kind = ?other, size = msg.body.len(), "unhandled message");
            }
        }
        Ok(())
    }

    fn handle_user(&mut self, msg: &RtmpMessage, out: &mut Vec<Bytes>) {
        if msg.body.len() < 6 {
            return;
        }
        let kind = u16::from_be_bytes([msg.body[0], msg.body[1]]);
        let param = u32::from_be_bytes([msg.body[2], msg.body[3], msg.body[4], msg.body[5]]);
        if kind == PingKind::Client as u16 {
            out.push(self.control(
                MessageType::User,
                message::encode_ping(PingKind::Pong, param),
            ));
        } else {
            tracing::trace!(kind = kind, "user control event");
        }
    }

    async fn handle_command(
        &mut self,
        cmd: Command,
        msg: &RtmpMessage,
        out: &mut Vec<Bytes>,
    ) -> Result<()> {
        if self.handler.is_none() && cmd.name != "connect" {
            return Err(HandshakeError::NotConnect(cmd.name).into());
        }

        match cmd.name.as_str() {
            "connect" => self.handle_connect(&cmd, out).await,
            "createStream" => {
                let handler = self.require_handler()?;
                let sid = handler.create_stream();
                out.push(self.invoke(
                    0,
                    message::encode_create_stream_result(cmd.transaction_id, sid),
                ));
            }
            "play" => self.handle_play(&cmd, msg, out)?,
            "pause" | "togglePause" => self.handle_pause(&cmd, msg, out)?,
            "resume" => {
                let handler = self.require_handler()?;
                handler.play_stream(msg.stream_id)?;
                out.push(self.invoke(
                    msg.stream_id,
                    message::encode_status(Status::UnpauseNotify),
                ));
            }
            "seek" => {
                let handler = self.require_handler()?;
                let offset = cmd
                    .args
                    .first()
                    .and_then(crate::amf::AmfValue::as_number)
                    .unwrap_or(0.0);
                handler.seek_stream(msg.stream_id, offset.max(0.0) as u64)?;
                out.push(self.invoke(msg.stream_id, message::encode_status(Status::SeekNotify)));
            }
            "closeStream" | "deleteStream" | "close" => {
                let handler = self.require_handler()?;
                handler.close_stream(msg.stream_id);
            }
            "publish" => {
                out.push(self.invoke(
                    msg.stream_id,
                    message::encode_status(Status::PublishStart),
                ));
            }
            "FCSubscribe" => {
                out.push(self.invoke(
                    0,
                    message::encode_echo_result(cmd.transaction_id, &cmd.args),
                ));
            }
            "_error" => {
                tracing::warn!(txid = cmd.transaction_id, "client reported an error");
            }
            other => {
                if let Some(reply) = self.plugins.dispatch(&msg.body) {
                    out.push(self.invoke(msg.stream_id, reply));
                } else {
                    tracing::debug!(command = other, "unknown command echoed");
                    out.push(self.invoke(
                        0,
                        message::encode_echo_result(cmd.transaction_id, &cmd.args),
                    ));
                }
            }
        }
        Ok(())
    }

    async fn handle_connect(&mut self, cmd: &Command, out: &mut Vec<Bytes>) {
        let params = cmd
            .object_props()
            .map(ConnectParams::from_object)
            .unwrap_or_default();
        let app = params
            .app
            .clone()
            .or_else(|| {
                params
                    .tc_url
                    .as_deref()
                    .and_then(|url| url.rsplit('/').next().map(str::to_string))
            })
            .unwrap_or_default();

        let key = ResourceKey::new(Protocol::Rtmp, app);
        let handler = self.registry.find_or_create(&key).await;
        handler.set_connect_params(params.clone());
        handler.client_joined();
        tracing::info!(app = %key.path, "client connected");

        // Legacy clients that declare no object encoding get onBWDone first
        if params.object_encoding.is_none() {
            out.push(self.invoke(0, message::encode_on_bw_done()));
        }
        out.push(self.control(
            MessageType::WindowSize,
            message::encode_window_ack(DEFAULT_WINDOW_ACK_SIZE),
        ));
        out.push(self.control(
            MessageType::SetBandwidth,
            message::encode_set_bandwidth(DEFAULT_PEER_BANDWIDTH, 2),
        ));
        out.push(self.control(
            MessageType::User,
            message::encode_ping(PingKind::Reset, 0),
        ));
        out.push(self.invoke(
            0,
            message::encode_connect_result(cmd.transaction_id, params.object_encoding),
        ));

        self.handler = Some(handler);
    }

    fn handle_play(
        &mut self,
        cmd: &Command,
        msg: &RtmpMessage,
        out: &mut Vec<Bytes>,
    ) -> Result<()> {
        let handler = self.require_handler()?;
        let name = match cmd.args.first().and_then(crate::amf::AmfValue::as_str) {
            Some(name) => name.to_string(),
            None => {
                out.push(self.invoke(
                    msg.stream_id,
                    message::encode_status(Status::PlayStreamNotFound),
                ));
                return Ok(());
            }
        };

        let sid = if handler.has_stream(msg.stream_id) {
            msg.stream_id
        } else {
            handler.create_stream()
        };

        let opened = resolve_media(&self.docroot, &name)
            .ok_or(Error::BadStreamState(sid, "no such file"))
            .and_then(|path| handler.open_stream(sid, &path))
            .and_then(|_| handler.play_stream(sid));

        if let Err(err) = opened {
            tracing::info!(stream = %name, error = %err, "play failed");
            handler.close_stream(sid);
            out.push(self.invoke(
                sid,
                message::encode_status_for(Status::PlayStreamNotFound, &name),
            ));
            return Ok(());
        }

        tracing::info!(stream = %name, id = sid, "playing");
        out.push(self.control(
            MessageType::ChunkSize,
            message::encode_set_chunk_size(DEFAULT_CHUNK_SIZE as u32),
        ));
        out.push(self.invoke(sid, message::encode_status(Status::PlayReset)));
        out.push(self.invoke(sid, message::encode_status(Status::PlayStart)));
        out.push(self.control(
            MessageType::User,
            message::encode_user_control(UserControl::StreamLive, sid),
        ));
        out.push(self.encoder.encode_message(
            AUDIO_CHANNEL,
            ChunkHeaderSize::Bytes12,
            MessageType::AudioData,
            sid,
            &[],
        ));
        out.push(self.encoder.encode_message(
            VIDEO_CHANNEL,
            ChunkHeaderSize::Bytes12,
            MessageType::VideoData,
            sid,
            &[],
        ));
        out.push(self.control(
            MessageType::User,
            message::encode_user_control(UserControl::StreamStart, sid),
        ));

        if let Ok(PageEvent::Page(page)) = handler.step_stream(sid) {
            self.stats.file_served();
            out.push(self.encoder.encode_message(
                DATA_CHANNEL,
                ChunkHeaderSize::Bytes12,
                MessageType::Notify,
                sid,
                &page,
            ));
        }
        Ok(())
    }

    fn handle_pause(
        &mut self,
        cmd: &Command,
        msg: &RtmpMessage,
        out: &mut Vec<Bytes>,
    ) -> Result<()> {
        let handler = self.require_handler()?;
        // `pause` carries an explicit flag; `togglePause` flips the state
        let pausing = match cmd.args.first().and_then(crate::amf::AmfValue::as_bool) {
            Some(flag) => flag,
            None => handler.stream_state(msg.stream_id) == Some(StreamState::Play),
        };
        if pausing {
            handler.pause_stream(msg.stream_id)?;
            out.push(self.invoke(msg.stream_id, message::encode_status(Status::PauseNotify)));
        } else {
            handler.play_stream(msg.stream_id)?;
            out.push(self.invoke(
                msg.stream_id,
                message::encode_status(Status::UnpauseNotify),
            ));
        }
        Ok(())
    }

    fn require_handler(&self) -> Result<Arc<Handler>> {
        self.handler
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| HandshakeError::NotConnect("<none>".into()).into())
    }
}

/// Find the media file for a stream name under the document root
///
/// The name is tried as given, then with an `.flv` extension appended, the
/// way players usually ask for streams by bare name.
fn resolve_media(docroot: &Path, name: &str) -> Option<PathBuf> {
    let clean: PathBuf = name
        .split('/')
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .collect();

    let direct = docroot.join(&clean);
    if direct.is_file() {
        return Some(direct);
    }
    let with_ext = docroot.join(format!("{}.flv", clean.display()));
    if with_ext.is_file() {
        return Some(with_ext);
    }
    None
}
