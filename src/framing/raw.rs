//! Raw concatenated-JSON framing.
//!
//! Messages are adjacent JSON values with no delimiters; boundaries are
//! found by incremental decoding. The reader accumulates bytes in a
//! buffer and asks `serde_json`'s streaming deserializer for the byte
//! offset of the first complete value; whitespace between values is
//! tolerated. A JSON syntax error makes the next boundary undecidable and
//! is therefore fatal to the connection, unlike header framing where each
//! frame fails independently.

use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use serde::de::IgnoredAny;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::transport::TransportError;

use super::{FrameReader, FrameWriter};

const READ_CHUNK: usize = 4096;

/// Frame reader for raw framing.
pub struct RawFrameReader<R> {
    inner: R,
    buf: BytesMut,
    max_frame_bytes: usize,
}

impl<R: AsyncRead + Unpin + Send> RawFrameReader<R> {
    /// Wraps a byte reader. `max_frame_bytes` bounds buffer growth while
    /// searching for a value boundary.
    pub fn new(reader: R, max_frame_bytes: usize) -> Self {
        Self {
            inner: reader,
            buf: BytesMut::with_capacity(READ_CHUNK),
            max_frame_bytes,
        }
    }

    /// Attempts to carve one complete JSON value off the front of the
    /// buffer. Returns `None` when more bytes are needed.
    fn try_split_value(&mut self) -> Result<Option<Bytes>, TransportError> {
        // Discard inter-value whitespace so EOF detection sees an empty buffer.
        while self.buf.first().is_some_and(|b| b.is_ascii_whitespace()) {
            self.buf.advance(1);
        }
        if self.buf.is_empty() {
            return Ok(None);
        }

        let mut values = serde_json::Deserializer::from_slice(&self.buf).into_iter::<IgnoredAny>();
        match values.next() {
            Some(Ok(_)) => {
                let end = values.byte_offset();
                let frame = self.buf.split_to(end).freeze();
                trace!(bytes = frame.len(), "read raw-framed payload");
                Ok(Some(frame))
            }
            Some(Err(e)) if e.is_eof() => Ok(None),
            Some(Err(e)) => Err(TransportError::RawDecode(e.to_string())),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> FrameReader for RawFrameReader<R> {
    async fn read_frame(&mut self) -> Result<Option<Bytes>, TransportError> {
        loop {
            if let Some(frame) = self.try_split_value()? {
                return Ok(Some(frame));
            }
            if self.buf.len() >= self.max_frame_bytes {
                return Err(TransportError::FrameTooLarge {
                    size: self.buf.len(),
                    max_size: self.max_frame_bytes,
                });
            }

            let read = self.inner.read_buf(&mut self.buf).await?;
            if read == 0 {
                // End of stream: clean only at a value boundary.
                if self.buf.iter().all(|b| b.is_ascii_whitespace()) {
                    return Ok(None);
                }
                return Err(TransportError::UnexpectedEof);
            }
        }
    }
}

/// Frame writer for raw framing.
///
/// A trailing newline is emitted after each value; it is insignificant
/// whitespace to any conforming reader and keeps piped output line-friendly.
pub struct RawFrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin + Send> RawFrameWriter<W> {
    /// Wraps a byte writer.
    pub fn new(writer: W) -> Self {
        Self { inner: writer }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> FrameWriter for RawFrameWriter<W> {
    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.inner.write_all(frame).await?;
        self.inner.write_all(b"\n").await?;
        self.inner.flush().await?;
        trace!(bytes = frame.len(), "wrote raw-framed payload");
        Ok(())
    }
}
