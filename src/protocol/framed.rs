//! Length-prefixed framing over a byte stream
//!
//! ```text
//! +-----------------+---------------------+
//! | length (u32 BE) | payload (length B)  |
//! +-----------------+---------------------+
//! ```
//!
//! Reads are buffered so partial frames across TCP segments are reassembled.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::constants::FRAME_HEADER_SIZE;
use super::message::{put_len, Request, Response};
use crate::error::{Error, ProtocolError, Result};

/// A stream that exchanges whole frames
pub struct Framed<S> {
    stream: S,
    buffer: BytesMut,
    max_frame_size: usize,
}

impl<S> Framed<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap a stream
    pub fn new(stream: S, max_frame_size: usize) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(4096),
            max_frame_size,
        }
    }

    /// Read the next frame payload
    ///
    /// Returns `Ok(None)` on a clean EOF between frames. EOF in the middle of
    /// a frame is `Error::ConnectionClosed`.
    pub async fn read_frame(&mut self) -> Result<Option<Bytes>> {
        loop {
            if let Some(frame) = self.parse_frame()? {
                return Ok(Some(frame));
            }

            if self.stream.read_buf(&mut self.buffer).await? == 0 {
                if self.buffer.is_empty() {
                    return Ok(None);
                }
                return Err(Error::ConnectionClosed);
            }
        }
    }

    fn parse_frame(&mut self) -> Result<Option<Bytes>> {
        if self.buffer.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let len = (&self.buffer[..FRAME_HEADER_SIZE]).get_u32() as usize;
        if len > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: len,
                max: self.max_frame_size,
            }
            .into());
        }

        if self.buffer.len() < FRAME_HEADER_SIZE + len {
            self.buffer.reserve(FRAME_HEADER_SIZE + len - self.buffer.len());
            return Ok(None);
        }

        self.buffer.advance(FRAME_HEADER_SIZE);
        Ok(Some(self.buffer.split_to(len).freeze()))
    }

    /// Write one frame and flush
    ///
    /// `max_frame_size` only bounds what this side reads. Outgoing frames are
    /// limited by the u32 length prefix alone, so a history reply can grow
    /// past the request limit.
    pub async fn write_frame(&mut self, payload: &[u8]) -> Result<()> {
        let mut out = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
        put_len(&mut out, payload.len())?;
        out.put_slice(payload);

        self.stream.write_all(&out).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read and decode the next request, `None` on clean EOF
    pub async fn read_request(&mut self) -> Result<Option<Request>> {
        match self.read_frame().await? {
            Some(payload) => Ok(Some(Request::decode(payload)?)),
            None => Ok(None),
        }
    }

    pub async fn write_request(&mut self, request: &Request) -> Result<()> {
        self.write_frame(&request.encode()?).await
    }

    pub async fn write_response(&mut self, response: &Response) -> Result<()> {
        self.write_frame(&response.encode()?).await
    }

    /// Send a request and wait for its response
    pub async fn call(&mut self, request: &Request) -> Result<Response> {
        self.write_request(request).await?;
        match self.read_frame().await? {
            Some(payload) => Ok(Response::decode(payload)?),
            None => Err(Error::ConnectionClosed),
        }
    }

    /// Shut down the write half of the stream
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}
