//! RTMP chunk framing
//!
//! Every message rides inside chunks. The first header byte carries the
//! header size in its top two bits and the channel number in the low six:
//!
//! ```text
//! bits 00 -> 12 byte header: timestamp, body size, type, stream id
//! bits 01 ->  8 byte header: timestamp, body size, type
//! bits 10 ->  4 byte header: timestamp only
//! bits 11 ->  1 byte header: everything reused from the channel's state
//! ```
//!
//! Bodies longer than the chunk size (128 bytes by default) are split with a
//! one-byte continuation header at every boundary. The continuation bytes
//! are not counted in the body size and must be stripped before the command
//! codec sees the body.

use std::collections::HashMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::constants::*;
use super::message::MessageType;
use crate::error::{ChunkError, Result};

/// The four header layouts, as their first-byte bit patterns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ChunkHeaderSize {
    Bytes12 = 0x00,
    Bytes8 = 0x40,
    Bytes4 = 0x80,
    Bytes1 = 0xc0,
}

impl ChunkHeaderSize {
    pub fn byte_count(self) -> usize {
        match self {
            ChunkHeaderSize::Bytes12 => 12,
            ChunkHeaderSize::Bytes8 => 8,
            ChunkHeaderSize::Bytes4 => 4,
            ChunkHeaderSize::Bytes1 => 1,
        }
    }
}

/// Header size in bytes, from the top two bits of the first header byte
pub fn header_size(first_byte: u8) -> usize {
    match first_byte & HEADSIZE_MASK {
        0x00 => 12,
        0x40 => 8,
        0x80 => 4,
        _ => 1,
    }
}

/// Channel number, from the low six bits of the first header byte
pub fn channel_of(first_byte: u8) -> u8 {
    first_byte & CHANNEL_MASK
}

/// A decoded chunk header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub channel: u8,
    pub head_size: usize,
    pub timestamp: u32,
    pub body_size: usize,
    pub msg_type: MessageType,
    pub stream_id: u32,
}

/// A fully reassembled message for one channel
#[derive(Debug, Clone)]
pub struct RtmpMessage {
    pub channel: u8,
    pub msg_type: MessageType,
    pub timestamp: u32,
    pub stream_id: u32,
    pub body: Bytes,
}

#[derive(Debug)]
struct Assembly {
    header: ChunkHeader,
    body: BytesMut,
}

/// Streaming chunk decoder
///
/// Small headers reuse the body size, type, and stream id last seen on the
/// same channel, so the decoder carries that state per channel across calls.
#[derive(Debug)]
pub struct ChunkDecoder {
    chunk_size: usize,
    last_body_size: [usize; MAX_CHANNELS],
    last_type: [Option<MessageType>; MAX_CHANNELS],
    last_stream_id: [u32; MAX_CHANNELS],
    pending: HashMap<u8, Assembly>,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            last_body_size: [0; MAX_CHANNELS],
            last_type: [None; MAX_CHANNELS],
            last_stream_id: [0; MAX_CHANNELS],
            pending: HashMap::new(),
        }
    }

    /// Inbound chunk size, adjustable by the peer's ChunkSize message
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn set_chunk_size(&mut self, size: usize) {
        self.chunk_size = size.max(1);
    }

    /// Decode one chunk header from the start of `data`
    pub fn decode_header(&mut self, data: &[u8]) -> Result<ChunkHeader> {
        if data.is_empty() {
            return Err(ChunkError::Truncated.into());
        }
        let first = data[0];
        let head_size = header_size(first);
        if data.len() < head_size {
            return Err(ChunkError::Truncated.into());
        }
        let channel = channel_of(first);
        let ch = channel as usize;

        let timestamp = if head_size >= 4 {
            u32::from(data[1]) << 16 | u32::from(data[2]) << 8 | u32::from(data[3])
        } else {
            0
        };

        let body_size = if head_size >= 8 {
            let size = (usize::from(data[4]) << 16) | (usize::from(data[5]) << 8) | usize::from(data[6]);
            self.last_body_size[ch] = size;
            size
        } else {
            // 1 and 4 byte headers reuse the previous body size
            let size = self.last_body_size[ch];
            if size == 0 {
                return Err(ChunkError::UnknownBodySize(channel).into());
            }
            size
        };
        if body_size > MAX_BODY_SIZE {
            return Err(ChunkError::BodySizeOutOfRange(body_size).into());
        }

        let msg_type = if head_size >= 8 {
            let t = MessageType::from_byte(data[7])?;
            self.last_type[ch] = Some(t);
            t
        } else {
            self.last_type[ch].ok_or(ChunkError::UnknownBodySize(channel))?
        };

        let stream_id = if head_size == 12 {
            let id = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);
            self.last_stream_id[ch] = id;
            id
        } else {
            self.last_stream_id[ch]
        };

        Ok(ChunkHeader {
            channel,
            head_size,
            timestamp,
            body_size,
            msg_type,
            stream_id,
        })
    }

    /// Demultiplex raw bytes into completed per-channel messages
    ///
    /// Consumes whole chunks from `buf` and leaves any partial tail for the
    /// next read. Messages spanning several continuation chunks are held in
    /// per-channel assembly buffers until their full body size arrives.
    pub fn split(&mut self, buf: &mut BytesMut) -> Result<Vec<RtmpMessage>> {
        let mut out = Vec::new();

        loop {
            if buf.is_empty() {
                break;
            }
            let first = buf[0];
            let head_size = header_size(first);
            if buf.len() < head_size {
                break;
            }
            let channel = channel_of(first);

            let continuing = head_size == 1 && self.pending.contains_key(&channel);
            if continuing {
                let assembly = self
                    .pending
                    .get_mut(&channel)
                    .expect("pending assembly checked above");
                let remaining = assembly.header.body_size - assembly.body.len();
                let run = remaining.min(self.chunk_size);
                if buf.len() < head_size + run {
                    break;
                }
                buf.advance(head_size);
                assembly.body.put_slice(&buf[..run]);
                buf.advance(run);
            } else {
                let header = self.decode_header(&buf[..])?;
                let run = header.body_size.min(self.chunk_size);
                if buf.len() < head_size + run {
                    break;
                }
                buf.advance(head_size);
                let mut body = BytesMut::with_capacity(header.body_size);
                body.put_slice(&buf[..run]);
                buf.advance(run);
                self.pending.insert(channel, Assembly { header, body });
            }

            let complete = self
                .pending
                .get(&channel)
                .map(|a| a.body.len() >= a.header.body_size)
                .unwrap_or(false);
            if complete {
                let assembly = self
                    .pending
                    .remove(&channel)
                    .expect("completed assembly present");
                out.push(RtmpMessage {
                    channel: assembly.header.channel,
                    msg_type: assembly.header.msg_type,
                    timestamp: assembly.header.timestamp,
                    stream_id: assembly.header.stream_id,
                    body: assembly.body.freeze(),
                });
            }
        }

        Ok(out)
    }
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Strip the one-byte continuation headers from a body that still contains
/// them, returning the contiguous payload
pub fn dechunk(data: &[u8], chunk_size: usize) -> Bytes {
    let mut out = BytesMut::with_capacity(data.len());
    let mut off = 0;
    while off < data.len() {
        let run = chunk_size.min(data.len() - off);
        out.put_slice(&data[off..off + run]);
        off += run + 1; // skip the continuation byte between runs
    }
    out.freeze()
}

/// Chunk encoder for outbound messages
#[derive(Debug)]
pub struct ChunkEncoder {
    chunk_size: usize,
}

impl ChunkEncoder {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn set_chunk_size(&mut self, size: usize) {
        self.chunk_size = size.max(1);
    }

    /// Encode a bare chunk header
    pub fn encode_header(
        channel: u8,
        size: ChunkHeaderSize,
        timestamp: u32,
        body_size: usize,
        msg_type: MessageType,
        stream_id: u32,
    ) -> Bytes {
        let mut out = BytesMut::with_capacity(size.byte_count());
        out.put_u8((size as u8) | (channel & CHANNEL_MASK));

        if size.byte_count() >= 4 {
            out.put_u8((timestamp >> 16) as u8);
            out.put_u8((timestamp >> 8) as u8);
            out.put_u8(timestamp as u8);
        }
        if size.byte_count() >= 8 {
            out.put_u8((body_size >> 16) as u8);
            out.put_u8((body_size >> 8) as u8);
            out.put_u8(body_size as u8);
            out.put_u8(msg_type.as_byte());
        }
        if size.byte_count() == 12 {
            out.put_u32(stream_id);
        }

        out.freeze()
    }

    /// Encode a full message: header, body, and continuation headers at
    /// every chunk boundary
    pub fn encode_message(
        &self,
        channel: u8,
        size: ChunkHeaderSize,
        msg_type: MessageType,
        stream_id: u32,
        body: &[u8],
    ) -> Bytes {
        let header = Self::encode_header(channel, size, 0, body.len(), msg_type, stream_id);
        let mut out = BytesMut::with_capacity(header.len() + body.len() + body.len() / self.chunk_size);
        out.put_slice(&header);

        let continuation = ChunkHeaderSize::Bytes1 as u8 | (channel & CHANNEL_MASK);
        let mut off = 0;
        while off < body.len() {
            if off > 0 {
                out.put_u8(continuation);
            }
            let run = self.chunk_size.min(body.len() - off);
            out.put_slice(&body[off..off + run]);
            off += run;
        }

        out.freeze()
    }
}

impl Default for ChunkEncoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_size_from_top_bits() {
        assert_eq!(header_size(0b0000_0011), 12);
        assert_eq!(header_size(0b0100_0011), 8);
        assert_eq!(header_size(0b1000_0011), 4);
        assert_eq!(header_size(0b1100_0011), 1);
    }

    #[test]
    fn test_channel_from_low_bits() {
        assert_eq!(channel_of(0xc3), 3);
        assert_eq!(channel_of(0xff), 0x3f);
        assert_eq!(channel_of(0x02), 2);
    }

    #[test]
    fn test_decode_full_header() {
        let mut dec = ChunkDecoder::new();
        let data = [
            0x03, // 12-byte header, channel 3
            0x00, 0x00, 0x01, // timestamp 1
            0x00, 0x00, 0x81, // body size 129
            0x14, // invoke
            0x00, 0x00, 0x00, 0x00, // stream id 0
        ];
        let header = dec.decode_header(&data).unwrap();
        assert_eq!(header.channel, 3);
        assert_eq!(header.head_size, 12);
        assert_eq!(header.timestamp, 1);
        assert_eq!(header.body_size, 129);
        assert_eq!(header.msg_type, MessageType::Invoke);
        assert_eq!(header.stream_id, 0);
    }

    #[test]
    fn test_short_header_reuses_channel_state() {
        let mut dec = ChunkDecoder::new();
        let full = [
            0x43, 0x00, 0x00, 0x00, 0x00, 0x00, 0x10, 0x14, // 8 bytes, body 16, invoke
        ];
        dec.decode_header(&full).unwrap();

        let short = [0x83, 0x00, 0x00, 0x05]; // 4-byte header, same channel
        let header = dec.decode_header(&short).unwrap();
        assert_eq!(header.body_size, 16);
        assert_eq!(header.msg_type, MessageType::Invoke);
    }

    #[test]
    fn test_short_header_without_state_fails() {
        let mut dec = ChunkDecoder::new();
        let short = [0x85, 0x00, 0x00, 0x05];
        assert!(dec.decode_header(&short).is_err());
    }

    #[test]
    fn test_header_roundtrip() {
        let encoded = ChunkEncoder::encode_header(
            3,
            ChunkHeaderSize::Bytes12,
            0,
            600,
            MessageType::Notify,
            1,
        );
        let mut dec = ChunkDecoder::new();
        let header = dec.decode_header(&encoded).unwrap();
        assert_eq!(header.channel, 3);
        assert_eq!(header.body_size, 600);
        assert_eq!(header.msg_type, MessageType::Notify);
        assert_eq!(header.stream_id, 1);
    }

    #[test]
    fn test_dechunk_roundtrip() {
        let body: Vec<u8> = (0..300u32).map(|i| (i % 256) as u8).collect();

        // Chunk it by hand: a continuation byte every 128 bytes
        let mut chunked = Vec::new();
        for (i, chunk) in body.chunks(DEFAULT_CHUNK_SIZE).enumerate() {
            if i > 0 {
                chunked.push(0xc3);
            }
            chunked.extend_from_slice(chunk);
        }

        let restored = dechunk(&chunked, DEFAULT_CHUNK_SIZE);
        assert_eq!(&restored[..], &body[..]);
    }

    #[test]
    fn test_split_single_small_message() {
        let enc = ChunkEncoder::new();
        let body = vec![0xABu8; 50];
        let wire = enc.encode_message(3, ChunkHeaderSize::Bytes12, MessageType::Invoke, 0, &body);

        let mut dec = ChunkDecoder::new();
        let mut buf = BytesMut::from(&wire[..]);
        let messages = dec.split(&mut buf).unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].channel, 3);
        assert_eq!(messages[0].msg_type, MessageType::Invoke);
        assert_eq!(&messages[0].body[..], &body[..]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_split_reassembles_continuation_chunks() {
        let enc = ChunkEncoder::new();
        let body: Vec<u8> = (0..400u32).map(|i| (i % 256) as u8).collect();
        let wire = enc.encode_message(3, ChunkHeaderSize::Bytes12, MessageType::Notify, 1, &body);

        let mut dec = ChunkDecoder::new();
        let mut buf = BytesMut::from(&wire[..]);
        let messages = dec.split(&mut buf).unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(&messages[0].body[..], &body[..]);
        assert_eq!(messages[0].stream_id, 1);
    }

    #[test]
    fn test_split_interleaved_channels() {
        let enc = ChunkEncoder::new();
        let a = enc.encode_message(3, ChunkHeaderSize::Bytes12, MessageType::Invoke, 0, &[1, 2, 3]);
        let b = enc.encode_message(5, ChunkHeaderSize::Bytes12, MessageType::User, 0, &[9, 9]);

        let mut wire = BytesMut::new();
        wire.put_slice(&a);
        wire.put_slice(&b);

        let mut dec = ChunkDecoder::new();
        let messages = dec.split(&mut wire).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].channel, 3);
        assert_eq!(messages[1].channel, 5);
    }

    #[test]
    fn test_split_keeps_partial_tail() {
        let enc = ChunkEncoder::new();
        let body = vec![7u8; 64];
        let wire = enc.encode_message(3, ChunkHeaderSize::Bytes12, MessageType::Invoke, 0, &body);

        // Feed all but the last 10 bytes
        let mut dec = ChunkDecoder::new();
        let mut buf = BytesMut::from(&wire[..wire.len() - 10]);
        let messages = dec.split(&mut buf).unwrap();
        assert!(messages.is_empty());
        // The undecodable prefix is left for the next read
        assert_eq!(buf.len(), wire.len() - 10);

        buf.put_slice(&wire[wire.len() - 10..]);
        let messages = dec.split(&mut buf).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(&messages[0].body[..], &body[..]);
    }
}
