//! Request and response messages
//!
//! Payload layout (inside a frame):
//! ```text
//! +------+------------------------------+
//! | kind | fields...                    |
//! | u8   |                              |
//! +------+------------------------------+
//!
//! string = u32 BE length + UTF-8 bytes
//! list   = u32 BE count + string*
//! ```
//!
//! | Kind | Message    | Fields                 |
//! |------|------------|------------------------|
//! | 0x01 | Register   | id, callback_addr      |
//! | 0x02 | Unregister | id, callback_addr      |
//! | 0x03 | Send       | sender, text           |
//! | 0x04 | History    | -                      |
//! | 0x10 | Receive    | sender, text           |
//! | 0x80 | Ok         | -                      |
//! | 0x81 | History    | messages (list)        |
//! | 0x8F | Error      | message                |

use bytes::{Buf, BufMut, Bytes, BytesMut};

use super::constants::*;
use crate::error::ProtocolError;
use crate::registry::Message;

/// A call made to the relay, or by the relay to a client callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// Register `id`; the relay dials back `callback_addr`
    Register { id: String, callback_addr: String },
    /// Remove `id` from the relay
    Unregister { id: String, callback_addr: String },
    /// Post a message; answered with the full history
    Send(Message),
    /// Fetch the full history
    History,
    /// Relay to client: deliver a broadcast message
    Receive(Message),
}

/// Reply to a [`Request`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Empty success
    Ok,
    /// History snapshot
    History(Vec<String>),
    /// Failure with a human-readable reason
    Error(String),
}

impl Request {
    /// Encode into a frame payload
    ///
    /// Fails if a string is too long for its u32 length prefix.
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::new();
        match self {
            Request::Register { id, callback_addr } => {
                buf.put_u8(KIND_REGISTER);
                put_string(&mut buf, id)?;
                put_string(&mut buf, callback_addr)?;
            }
            Request::Unregister { id, callback_addr } => {
                buf.put_u8(KIND_UNREGISTER);
                put_string(&mut buf, id)?;
                put_string(&mut buf, callback_addr)?;
            }
            Request::Send(msg) => {
                buf.put_u8(KIND_SEND);
                put_message(&mut buf, msg)?;
            }
            Request::History => buf.put_u8(KIND_HISTORY),
            Request::Receive(msg) => {
                buf.put_u8(KIND_RECEIVE);
                put_message(&mut buf, msg)?;
            }
        }
        Ok(buf.freeze())
    }

    /// Decode a complete frame payload
    pub fn decode(mut buf: Bytes) -> Result<Self, ProtocolError> {
        if buf.is_empty() {
            return Err(ProtocolError::UnexpectedEof);
        }

        let request = match buf.get_u8() {
            KIND_REGISTER => Request::Register {
                id: get_string(&mut buf)?,
                callback_addr: get_string(&mut buf)?,
            },
            KIND_UNREGISTER => Request::Unregister {
                id: get_string(&mut buf)?,
                callback_addr: get_string(&mut buf)?,
            },
            KIND_SEND => Request::Send(get_message(&mut buf)?),
            KIND_HISTORY => Request::History,
            KIND_RECEIVE => Request::Receive(get_message(&mut buf)?),
            kind => return Err(ProtocolError::UnknownKind(kind)),
        };

        ensure_consumed(&buf)?;
        Ok(request)
    }

    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Request::Register { .. } => "register",
            Request::Unregister { .. } => "unregister",
            Request::Send(_) => "send",
            Request::History => "history",
            Request::Receive(_) => "receive",
        }
    }
}

impl Response {
    /// Encode into a frame payload
    pub fn encode(&self) -> Result<Bytes, ProtocolError> {
        let mut buf = BytesMut::new();
        match self {
            Response::Ok => buf.put_u8(KIND_OK),
            Response::History(messages) => {
                buf.put_u8(KIND_HISTORY_REPLY);
                put_len(&mut buf, messages.len())?;
                for entry in messages {
                    put_string(&mut buf, entry)?;
                }
            }
            Response::Error(reason) => {
                buf.put_u8(KIND_ERROR);
                put_string(&mut buf, reason)?;
            }
        }
        Ok(buf.freeze())
    }

    /// Decode a complete frame payload
    pub fn decode(mut buf: Bytes) -> Result<Self, ProtocolError> {
        if buf.is_empty() {
            return Err(ProtocolError::UnexpectedEof);
        }

        let response = match buf.get_u8() {
            KIND_OK => Response::Ok,
            KIND_HISTORY_REPLY => {
                if buf.remaining() < 4 {
                    return Err(ProtocolError::UnexpectedEof);
                }
                let count = buf.get_u32() as usize;
                // Every entry needs at least its length prefix
                if count > buf.remaining() / 4 {
                    return Err(ProtocolError::UnexpectedEof);
                }
                let mut messages = Vec::with_capacity(count);
                for _ in 0..count {
                    messages.push(get_string(&mut buf)?);
                }
                Response::History(messages)
            }
            KIND_ERROR => Response::Error(get_string(&mut buf)?),
            kind => return Err(ProtocolError::UnknownKind(kind)),
        };

        ensure_consumed(&buf)?;
        Ok(response)
    }
}

/// Write a u32 length or count prefix
pub(crate) fn put_len(buf: &mut BytesMut, len: usize) -> Result<(), ProtocolError> {
    let prefix = u32::try_from(len).map_err(|_| ProtocolError::FrameTooLarge {
        size: len,
        max: u32::MAX as usize,
    })?;
    buf.put_u32(prefix);
    Ok(())
}

fn put_string(buf: &mut BytesMut, s: &str) -> Result<(), ProtocolError> {
    put_len(buf, s.len())?;
    buf.put_slice(s.as_bytes());
    Ok(())
}

fn put_message(buf: &mut BytesMut, msg: &Message) -> Result<(), ProtocolError> {
    put_string(buf, &msg.sender)?;
    put_string(buf, &msg.text)
}

fn get_string(buf: &mut Bytes) -> Result<String, ProtocolError> {
    if buf.remaining() < 4 {
        return Err(ProtocolError::UnexpectedEof);
    }
    let len = buf.get_u32() as usize;
    if buf.remaining() < len {
        return Err(ProtocolError::UnexpectedEof);
    }
    let raw = buf.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
}

fn get_message(buf: &mut Bytes) -> Result<Message, ProtocolError> {
    let sender = get_string(buf)?;
    let text = get_string(buf)?;
    Ok(Message { sender, text })
}

fn ensure_consumed(buf: &Bytes) -> Result<(), ProtocolError> {
    if buf.has_remaining() {
        Err(ProtocolError::TrailingBytes(buf.remaining()))
    } else {
        Ok(())
    }
}
