//! Error types for the relay
//!
//! Only registration reports failure to a facade caller. Delivery errors stay
//! inside the broadcast engine and end in eviction.

use std::fmt;
use std::io;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// Underlying socket error
    Io(io::Error),
    /// Malformed or unexpected wire data
    Protocol(ProtocolError),
    /// The callback address given at registration could not be reached
    Registration {
        id: String,
        addr: String,
        source: Box<Error>,
    },
    /// Peer closed the connection (or the endpoint was already closed)
    ConnectionClosed,
    /// Connect or delivery did not finish in time
    Timeout,
    /// Peer answered with an error response
    Rejected(String),
}

/// Wire-level decoding errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame length exceeds the configured maximum
    FrameTooLarge { size: usize, max: usize },
    /// Payload ended before a field was complete
    UnexpectedEof,
    /// Unknown request or response kind byte
    UnknownKind(u8),
    /// String field is not valid UTF-8
    InvalidUtf8,
    /// Bytes left over after the last field
    TrailingBytes(usize),
    /// Well-formed message that makes no sense at this point
    UnexpectedMessage(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Protocol(e) => write!(f, "Protocol error: {}", e),
            Error::Registration { id, addr, source } => {
                write!(f, "dial client {} at {}: {}", id, addr, source)
            }
            Error::ConnectionClosed => write!(f, "Connection closed"),
            Error::Timeout => write!(f, "Operation timed out"),
            Error::Rejected(msg) => write!(f, "Rejected by peer: {}", msg),
        }
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::FrameTooLarge { size, max } => {
                write!(f, "frame of {} bytes exceeds limit of {}", size, max)
            }
            ProtocolError::UnexpectedEof => write!(f, "unexpected end of payload"),
            ProtocolError::UnknownKind(kind) => write!(f, "unknown message kind 0x{:02x}", kind),
            ProtocolError::InvalidUtf8 => write!(f, "string field is not valid UTF-8"),
            ProtocolError::TrailingBytes(n) => write!(f, "{} trailing bytes after message", n),
            ProtocolError::UnexpectedMessage(msg) => write!(f, "unexpected message: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Protocol(e) => Some(e),
            Error::Registration { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl std::error::Error for ProtocolError {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::BrokenPipe => Error::ConnectionClosed,
            _ => Error::Io(e),
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Error::Protocol(e)
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Timeout
    }
}
