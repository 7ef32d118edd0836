//! Server-side RTMP handshake
//!
//! ```text
//! Client                                   Server
//!   |------- C0 (1 byte: version) --------->|
//!   |------- C1 (1536 bytes: time+random) ->|
//!   |<------ S0 S1 S2 (one single write) ---|
//!   |------- C2 (1536 bytes: echo) -------->|
//!   |          [Handshake Complete]          |
//! ```
//!
//! The S0+S1+S2 response must go out as one contiguous write; splitting it
//! causes subtle timing problems with some players. S1 is a zeroed block and
//! S2 carries the server timestamp, a zero field, and an echo of the
//! client's random payload.
//!
//! The finish comparison tolerates up to one differing byte in the echoed
//! payload rather than requiring exact equality. That matches the observed
//! leniency of deployed clients; whether it papers over an off-by-one in
//! the original capture logic is an open product question, so the tolerance
//! is a named constant rather than a magic number.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{HandshakeError, Result};
use crate::protocol::constants::{
    HANDSHAKE_ECHO_TOLERANCE, HANDSHAKE_HEADER_SIZE, HANDSHAKE_SIZE, RTMP_VERSION,
};

/// What the caller should do next
#[derive(Debug)]
pub enum HandshakeOutcome {
    /// Not enough bytes yet; read more and call `process` again
    Pending,
    /// Send these bytes to the client as a single write
    Respond(Bytes),
    /// Handshake complete; `leftover` holds any pipelined protocol bytes
    /// that arrived after the fixed-size completion packet
    Done { leftover: Bytes },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeState {
    AwaitingRequest,
    AwaitingAck,
    Done,
}

/// Handshake state machine for the accepting side
#[derive(Debug)]
pub struct ServerHandshake {
    state: HandshakeState,
    client_packet: Option<Box<[u8; HANDSHAKE_SIZE]>>,
}

impl ServerHandshake {
    pub fn new() -> Self {
        Self {
            state: HandshakeState::AwaitingRequest,
            client_packet: None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == HandshakeState::Done
    }

    /// Feed received bytes; consumes what it uses and leaves the rest
    pub fn process(&mut self, data: &mut BytesMut) -> Result<HandshakeOutcome> {
        match self.state {
            HandshakeState::AwaitingRequest => self.process_request(data),
            HandshakeState::AwaitingAck => self.process_ack(data),
            HandshakeState::Done => Ok(HandshakeOutcome::Done {
                leftover: data.split().freeze(),
            }),
        }
    }

    /// C0 + C1: version byte plus the client's handshake packet
    fn process_request(&mut self, data: &mut BytesMut) -> Result<HandshakeOutcome> {
        if data.len() < 1 + HANDSHAKE_SIZE {
            return Ok(HandshakeOutcome::Pending);
        }

        let version = data.get_u8();
        if version < RTMP_VERSION {
            return Err(HandshakeError::InvalidVersion(version).into());
        }
        if version != RTMP_VERSION {
            // Some encoders send higher values; accept anything >= 3
            tracing::debug!(version = version, "nonstandard handshake version");
        }

        let mut c1 = Box::new([0u8; HANDSHAKE_SIZE]);
        c1.copy_from_slice(&data.split_to(HANDSHAKE_SIZE));

        let response = build_response(&c1);
        self.client_packet = Some(c1);
        self.state = HandshakeState::AwaitingAck;
        Ok(HandshakeOutcome::Respond(response))
    }

    /// C2: the client's completion packet, often with the first command
    /// message pipelined right behind it
    fn process_ack(&mut self, data: &mut BytesMut) -> Result<HandshakeOutcome> {
        if data.len() < HANDSHAKE_SIZE {
            return Ok(HandshakeOutcome::Pending);
        }

        let c2 = data.split_to(HANDSHAKE_SIZE);
        if let Some(ref c1) = self.client_packet {
            let diff = payload_diff(c1.as_ref(), &c2);
            if diff > HANDSHAKE_ECHO_TOLERANCE {
                // The original server only logs this and carries on, and
                // deployed clients echo loosely, so a mismatch is not fatal.
                tracing::warn!(differing_bytes = diff, "handshake echo mismatch");
            }
        }

        self.state = HandshakeState::Done;
        Ok(HandshakeOutcome::Done {
            leftover: data.split().freeze(),
        })
    }
}

impl Default for ServerHandshake {
    fn default() -> Self {
        Self::new()
    }
}

/// Build S0+S1+S2 as one buffer
fn build_response(c1: &[u8; HANDSHAKE_SIZE]) -> Bytes {
    let mut out = BytesMut::with_capacity(1 + HANDSHAKE_SIZE * 2);

    // S0: version
    out.put_u8(RTMP_VERSION);

    // S1: zeroed block
    out.put_bytes(0, HANDSHAKE_SIZE);

    // S2: server timestamp, zero field, echo of the client's random payload
    out.put_u32(unix_time());
    out.put_u32(0);
    out.put_slice(&c1[HANDSHAKE_HEADER_SIZE..]);

    out.freeze()
}

/// Count differing bytes in the random payload region of two packets
fn payload_diff(a: &[u8], b: &[u8]) -> usize {
    a[HANDSHAKE_HEADER_SIZE..]
        .iter()
        .zip(&b[HANDSHAKE_HEADER_SIZE..])
        .filter(|(x, y)| x != y)
        .count()
}

fn unix_time() -> u32 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}
