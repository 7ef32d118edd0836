//! RTMP message types and command codecs
//!
//! Message type numbers, ping and user-control events, NetConnection and
//! NetStream status codes, and the AMF command bodies the server builds in
//! reply to `connect`, `createStream`, and `play`.

use std::collections::HashMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::amf::{amf0, AmfValue};
use crate::error::{AmfError, ChunkError, Result};

/// RTMP message type, as carried in the chunk header's type byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    ChunkSize = 0x1,
    Abort = 0x2,
    BytesRead = 0x3,
    User = 0x4,
    WindowSize = 0x5,
    SetBandwidth = 0x6,
    Route = 0x7,
    AudioData = 0x8,
    VideoData = 0x9,
    SharedObj = 0xa,
    Amf3Notify = 0xf,
    Amf3SharedObj = 0x10,
    Amf3Invoke = 0x11,
    Notify = 0x12,
    Invoke = 0x14,
    FlvData = 0x16,
}

impl MessageType {
    pub fn from_byte(byte: u8) -> std::result::Result<Self, ChunkError> {
        Ok(match byte {
            0x1 => MessageType::ChunkSize,
            0x2 => MessageType::Abort,
            0x3 => MessageType::BytesRead,
            0x4 => MessageType::User,
            0x5 => MessageType::WindowSize,
            0x6 => MessageType::SetBandwidth,
            0x7 => MessageType::Route,
            0x8 => MessageType::AudioData,
            0x9 => MessageType::VideoData,
            0xa => MessageType::SharedObj,
            0xf => MessageType::Amf3Notify,
            0x10 => MessageType::Amf3SharedObj,
            0x11 => MessageType::Amf3Invoke,
            0x12 => MessageType::Notify,
            0x14 => MessageType::Invoke,
            0x16 => MessageType::FlvData,
            other => return Err(ChunkError::UnknownType(other)),
        })
    }

    pub fn as_byte(self) -> u8 {
        self as u8
    }

    /// AMF3 variants share their handling with the AMF0 form after the
    /// leading format byte is skipped
    pub fn is_invoke(self) -> bool {
        matches!(self, MessageType::Invoke | MessageType::Amf3Invoke)
    }
}

/// Ping event types carried in User messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum PingKind {
    Clear = 0,
    Play = 1,
    Time = 3,
    Reset = 4,
    Client = 6,
    Pong = 7,
}

/// User-control stream events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum UserControl {
    StreamStart = 0,
    StreamEof = 1,
    StreamNoData = 2,
    StreamBuffer = 3,
    StreamLive = 4,
    StreamPing = 6,
    StreamPong = 7,
}

/// NetConnection and NetStream status codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    ConnectSuccess,
    ConnectFailed,
    ConnectRejected,
    PlayReset,
    PlayStart,
    PlayStop,
    PlayStreamNotFound,
    PauseNotify,
    UnpauseNotify,
    SeekNotify,
    PublishStart,
    PublishBadName,
    DataStart,
}

impl Status {
    pub fn code(self) -> &'static str {
        match self {
            Status::ConnectSuccess => "NetConnection.Connect.Success",
            Status::ConnectFailed => "NetConnection.Connect.Failed",
            Status::ConnectRejected => "NetConnection.Connect.Rejected",
            Status::PlayReset => "NetStream.Play.Reset",
            Status::PlayStart => "NetStream.Play.Start",
            Status::PlayStop => "NetStream.Play.Stop",
            Status::PlayStreamNotFound => "NetStream.Play.StreamNotFound",
            Status::PauseNotify => "NetStream.Pause.Notify",
            Status::UnpauseNotify => "NetStream.Unpause.Notify",
            Status::SeekNotify => "NetStream.Seek.Notify",
            Status::PublishStart => "NetStream.Publish.Start",
            Status::PublishBadName => "NetStream.Publish.BadName",
            Status::DataStart => "NetStream.Data.Start",
        }
    }

    pub fn level(self) -> &'static str {
        match self {
            Status::ConnectFailed
            | Status::ConnectRejected
            | Status::PlayStreamNotFound
            | Status::PublishBadName => "error",
            _ => "status",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Status::ConnectSuccess => "Connection succeeded.",
            Status::ConnectFailed => "Connection failed.",
            Status::ConnectRejected => "Connection rejected.",
            Status::PlayReset => "Playing and resetting stream.",
            Status::PlayStart => "Started playing stream.",
            Status::PlayStop => "Stopped playing stream.",
            Status::PlayStreamNotFound => "Stream not found.",
            Status::PauseNotify => "Stream paused.",
            Status::UnpauseNotify => "Stream resumed.",
            Status::SeekNotify => "Seek completed.",
            Status::PublishStart => "Started publishing stream.",
            Status::PublishBadName => "Stream name already in use.",
            Status::DataStart => "Data started.",
        }
    }

    fn info_object(self, extra: Option<(&str, AmfValue)>) -> AmfValue {
        let mut props: HashMap<String, AmfValue> = HashMap::new();
        props.insert("level".into(), AmfValue::string(self.level()));
        props.insert("code".into(), AmfValue::string(self.code()));
        props.insert(
            "description".into(),
            AmfValue::string(self.description()),
        );
        if let Some((name, value)) = extra {
            props.insert(name.into(), value);
        }
        AmfValue::Object(props)
    }
}

/// A decoded invoke or notify command
#[derive(Debug, Clone)]
pub struct Command {
    pub name: String,
    pub transaction_id: f64,
    /// The command object, when the first argument is an object or null
    pub object: Option<AmfValue>,
    /// Remaining positional arguments
    pub args: Vec<AmfValue>,
}

impl Command {
    /// Decode a command from an invoke body
    pub fn decode(body: Bytes) -> Result<Command> {
        let mut data = body;
        let name = match amf0::decode(&mut data)? {
            AmfValue::String(s) => s,
            _ => return Err(AmfError::Expected("command name string").into()),
        };
        let transaction_id = match amf0::decode(&mut data)? {
            AmfValue::Number(n) => n,
            _ => return Err(AmfError::Expected("transaction id number").into()),
        };

        let mut object = None;
        let mut args = Vec::new();
        if data.has_remaining() {
            object = Some(amf0::decode(&mut data)?);
        }
        while data.has_remaining() {
            args.push(amf0::decode(&mut data)?);
        }

        Ok(Command {
            name,
            transaction_id,
            object,
            args,
        })
    }

    /// The command object, unless it was AMF null
    pub fn object_props(&self) -> Option<&AmfValue> {
        match self.object {
            Some(ref v) if !v.is_null_or_undefined() => Some(v),
            _ => None,
        }
    }
}

/// Ping body: two-byte event type, four-byte parameter
pub fn encode_ping(kind: PingKind, param: u32) -> Bytes {
    let mut out = BytesMut::with_capacity(6);
    out.put_u16(kind as u16);
    out.put_u32(param);
    out.freeze()
}

/// User-control body: same layout as a ping
pub fn encode_user_control(event: UserControl, stream_id: u32) -> Bytes {
    let mut out = BytesMut::with_capacity(6);
    out.put_u16(event as u16);
    out.put_u32(stream_id);
    out.freeze()
}

/// Window acknowledgement size body
pub fn encode_window_ack(size: u32) -> Bytes {
    let mut out = BytesMut::with_capacity(4);
    out.put_u32(size);
    out.freeze()
}

/// Peer bandwidth body: the size plus a one-byte limit type
pub fn encode_set_bandwidth(size: u32, limit_type: u8) -> Bytes {
    let mut out = BytesMut::with_capacity(5);
    out.put_u32(size);
    out.put_u8(limit_type);
    out.freeze()
}

/// Outgoing chunk size body
pub fn encode_set_chunk_size(size: u32) -> Bytes {
    let mut out = BytesMut::with_capacity(4);
    out.put_u32(size);
    out.freeze()
}

/// `_result` reply to `connect`
///
/// The info object carries `objectEncoding` only when the client declared
/// one in its connect object.
pub fn encode_connect_result(transaction_id: f64, object_encoding: Option<f64>) -> Bytes {
    let properties = AmfValue::object([
        ("fmsVer", AmfValue::string("FMS/3,5,0,0")),
        ("capabilities", AmfValue::Number(31.0)),
    ]);
    let extra = object_encoding.map(|e| ("objectEncoding", AmfValue::Number(e)));
    let info = Status::ConnectSuccess.info_object(extra);
    amf0::encode_all(&[
        AmfValue::string("_result"),
        AmfValue::Number(transaction_id),
        properties,
        info,
    ])
}

/// `_result` reply to `createStream`: a bare numeric stream id
pub fn encode_create_stream_result(transaction_id: f64, stream_id: u32) -> Bytes {
    amf0::encode_all(&[
        AmfValue::string("_result"),
        AmfValue::Number(transaction_id),
        AmfValue::Null,
        AmfValue::Number(f64::from(stream_id)),
    ])
}

/// `onStatus` notification
pub fn encode_status(status: Status) -> Bytes {
    amf0::encode_all(&[
        AmfValue::string("onStatus"),
        AmfValue::Number(0.0),
        AmfValue::Null,
        status.info_object(None),
    ])
}

/// `onStatus` notification carrying the stream name in a `details` field
pub fn encode_status_for(status: Status, stream_name: &str) -> Bytes {
    amf0::encode_all(&[
        AmfValue::string("onStatus"),
        AmfValue::Number(0.0),
        AmfValue::Null,
        status.info_object(Some(("details", AmfValue::string(stream_name)))),
    ])
}

/// `onBWDone`, sent before the connect reply to legacy clients
pub fn encode_on_bw_done() -> Bytes {
    amf0::encode_all(&[
        AmfValue::string("onBWDone"),
        AmfValue::Number(0.0),
        AmfValue::Null,
    ])
}

/// `_result` echoing a command's arguments back, for unknown methods
pub fn encode_echo_result(transaction_id: f64, args: &[AmfValue]) -> Bytes {
    let mut values = vec![
        AmfValue::string("_result"),
        AmfValue::Number(transaction_id),
        AmfValue::Null,
    ];
    values.extend_from_slice(args);
    amf0::encode_all(&values)
}
