//! Byte-stream framing for the Makai RPC runtime.
//!
//! A framer delimits JSON-RPC payloads on an otherwise opaque byte stream.
//! Two framings are provided: [`header`] (`Content-Length` prefixed, as
//! used by LSP) and [`raw`] (concatenated JSON values, suited to plain
//! pipes and sockets). Both wrap a byte reader into a frame reader and a
//! byte writer into a frame writer; neither is safe for concurrent use
//! with itself; the connection serializes access.

pub mod header;
pub mod raw;
pub mod stream;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::transport::TransportError;

/// Reads whole frames from a byte stream.
#[async_trait]
pub trait FrameReader: Send {
    /// Reads the next complete frame.
    ///
    /// Returns `Ok(None)` on a clean end of stream at a message boundary.
    /// End of stream in the middle of a frame is a
    /// [`TransportError::UnexpectedEof`].
    async fn read_frame(&mut self) -> Result<Option<Bytes>, TransportError>;
}

/// Writes whole frames to a byte stream.
#[async_trait]
pub trait FrameWriter: Send {
    /// Writes one frame atomically and flushes the underlying writer.
    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), TransportError>;
}
