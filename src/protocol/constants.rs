//! Wire protocol constants

/// Size of the big-endian frame length prefix
pub const FRAME_HEADER_SIZE: usize = 4;

/// Default maximum payload size of a single frame (1 MiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Default limit on responses read from the relay
///
/// History replies carry the whole log, which only grows, so this is the
/// largest length the prefix can express.
pub const DEFAULT_MAX_RESPONSE_SIZE: usize = u32::MAX as usize;

// Request kinds
pub const KIND_REGISTER: u8 = 0x01;
pub const KIND_UNREGISTER: u8 = 0x02;
pub const KIND_SEND: u8 = 0x03;
pub const KIND_HISTORY: u8 = 0x04;
pub const KIND_RECEIVE: u8 = 0x10;

// Response kinds
pub const KIND_OK: u8 = 0x80;
pub const KIND_HISTORY_REPLY: u8 = 0x81;
pub const KIND_ERROR: u8 = 0x8F;

/// Default relay listen address
pub const DEFAULT_RELAY_ADDR: &str = "127.0.0.1:1234";
