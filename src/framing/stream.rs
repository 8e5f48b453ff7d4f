//! Message stream: a framed reader/writer pair speaking the wire model.
//!
//! [`RpcStream`] pairs a [`FrameReader`] with a [`FrameWriter`] and moves
//! whole payloads. Reads distinguish per-message decode faults (which the
//! connection answers on the wire) from transport failures (which are
//! fatal). Neither half is safe for concurrent use with itself; the
//! connection enforces single-reader/single-writer.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::FramingKind;
use crate::error::transport::TransportError;
use crate::error::CoreResult;
use crate::protocol::jsonrpc::{codec, DecodeError, Payload};

use super::header::{HeaderFrameReader, HeaderFrameWriter};
use super::raw::{RawFrameReader, RawFrameWriter};
use super::{FrameReader, FrameWriter};

/// One inbound stream item: a decoded payload or a per-message fault.
#[derive(Debug)]
pub enum Inbound {
    /// A well-formed single message or batch
    Payload(Payload),
    /// A frame that failed to decode; the connection answers it and
    /// continues reading
    Malformed(DecodeError),
}

/// A framed, bidirectional JSON-RPC message stream.
pub struct RpcStream {
    reader: StreamReader,
    writer: StreamWriter,
}

impl RpcStream {
    /// Wraps a byte reader/writer pair with the chosen framing.
    pub fn framed<R, W>(reader: R, writer: W, framing: FramingKind, max_frame_bytes: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        match framing {
            FramingKind::Header => Self::from_parts(
                Box::new(HeaderFrameReader::new(reader, max_frame_bytes)),
                Box::new(HeaderFrameWriter::new(writer)),
            ),
            FramingKind::Raw => Self::from_parts(
                Box::new(RawFrameReader::new(reader, max_frame_bytes)),
                Box::new(RawFrameWriter::new(writer)),
            ),
        }
    }

    /// Builds a stream from already-framed halves, for custom framings.
    pub fn from_parts(reader: Box<dyn FrameReader>, writer: Box<dyn FrameWriter>) -> Self {
        Self {
            reader: StreamReader { inner: reader },
            writer: StreamWriter { inner: writer },
        }
    }

    /// Reads the next payload. See [`StreamReader::read`].
    pub async fn read(&mut self) -> Result<Option<Inbound>, TransportError> {
        self.reader.read().await
    }

    /// Serializes and writes one payload. See [`StreamWriter::write`].
    pub async fn write(&mut self, payload: &Payload) -> CoreResult<()> {
        self.writer.write(payload).await
    }

    /// Splits the stream into its read and write halves.
    pub fn into_split(self) -> (StreamReader, StreamWriter) {
        (self.reader, self.writer)
    }
}

/// The read half of an [`RpcStream`].
pub struct StreamReader {
    inner: Box<dyn FrameReader>,
}

impl StreamReader {
    /// Reads and decodes the next payload.
    ///
    /// Blocks until a complete frame arrives, the stream ends, or the
    /// transport fails. `Ok(None)` is a clean end of input.
    pub async fn read(&mut self) -> Result<Option<Inbound>, TransportError> {
        match self.inner.read_frame().await? {
            None => Ok(None),
            Some(frame) => match codec::decode_payload(&frame) {
                Ok(payload) => Ok(Some(Inbound::Payload(payload))),
                Err(fault) => Ok(Some(Inbound::Malformed(fault))),
            },
        }
    }
}

/// The write half of an [`RpcStream`].
pub struct StreamWriter {
    inner: Box<dyn FrameWriter>,
}

impl StreamWriter {
    /// Serializes and writes one payload atomically.
    ///
    /// Returns once the bytes have been handed to the byte writer.
    pub async fn write(&mut self, payload: &Payload) -> CoreResult<()> {
        let bytes = codec::encode_payload(payload)?;
        self.inner.write_frame(&bytes).await?;
        Ok(())
    }
}
