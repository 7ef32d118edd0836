//! RTMP protocol constants

/// The protocol version byte; always 3 on the wire today
pub const RTMP_VERSION: u8 = 3;

/// Size of one handshake packet, not counting the version byte
pub const HANDSHAKE_SIZE: usize = 1536;

/// The handshake header is two 32-bit words: timestamp, then a zero field
pub const HANDSHAKE_HEADER_SIZE: usize = 8;

/// Byte differences tolerated when comparing the echoed handshake payload
pub const HANDSHAKE_ECHO_TOLERANCE: usize = 1;

/// Number of times a handshake-phase read is retried before giving up
pub const HANDSHAKE_READ_RETRIES: u32 = 3;

/// Default chunk size: message bodies longer than this are split with
/// one-byte continuation headers at every boundary
pub const DEFAULT_CHUNK_SIZE: usize = 128;

/// Number of multiplexing channels in one connection
pub const MAX_CHANNELS: usize = 64;

/// Channel reserved for protocol control messages
pub const SYSTEM_CHANNEL: u8 = 2;

/// Channel the server uses for stream command replies
pub const STREAM_CHANNEL: u8 = 3;

/// Top two bits of the first header byte select the header size
pub const HEADSIZE_MASK: u8 = 0xc0;

/// Low six bits of the first header byte select the channel
pub const CHANNEL_MASK: u8 = 0x3f;

/// Body sizes are carried in three bytes but anything past this is treated
/// as a framing error
pub const MAX_BODY_SIZE: usize = 65_535;

/// Nominal network read size; a read shorter than this marks the tail of a
/// message split across multiple reads
pub const NETBUF_SIZE: usize = 1448;

/// Default window acknowledgement size advertised to clients
pub const DEFAULT_WINDOW_ACK_SIZE: u32 = 2_500_000;

/// Default peer bandwidth advertised to clients
pub const DEFAULT_PEER_BANDWIDTH: u32 = 2_500_000;
