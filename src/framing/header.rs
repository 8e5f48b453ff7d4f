//! `Content-Length` header framing.
//!
//! Each message is preceded by an ASCII header block: one or more
//! `Name: value` lines terminated by CRLF, then a blank line, then exactly
//! `Content-Length` bytes of UTF-8 payload. `Content-Length` is the only
//! header the reader interprets (case-insensitively); unknown headers such
//! as `Content-Type` are ignored on read and omitted on write.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::trace;

use crate::error::transport::TransportError;

use super::{FrameReader, FrameWriter};

/// Frame reader for header framing.
pub struct HeaderFrameReader<R> {
    inner: BufReader<R>,
    max_frame_bytes: usize,
}

impl<R: AsyncRead + Unpin + Send> HeaderFrameReader<R> {
    /// Wraps a byte reader. `max_frame_bytes` bounds the declared
    /// Content-Length of any single frame.
    pub fn new(reader: R, max_frame_bytes: usize) -> Self {
        Self {
            inner: BufReader::new(reader),
            max_frame_bytes,
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> FrameReader for HeaderFrameReader<R> {
    async fn read_frame(&mut self) -> Result<Option<Bytes>, TransportError> {
        let mut content_length: Option<usize> = None;
        let mut line = String::new();
        let mut fresh = true;

        loop {
            line.clear();
            let read = self.inner.read_line(&mut line).await?;
            if read == 0 {
                // End of stream. Clean only if no bytes of this message
                // have been consumed yet.
                if fresh {
                    return Ok(None);
                }
                return Err(TransportError::UnexpectedEof);
            }
            fresh = false;

            if !line.ends_with("\r\n") {
                return Err(TransportError::MalformedHeader(line.clone()));
            }
            let trimmed = &line[..line.len() - 2];
            if trimmed.is_empty() {
                break;
            }

            let (name, value) = trimmed
                .split_once(':')
                .ok_or_else(|| TransportError::MalformedHeader(trimmed.to_string()))?;
            if name.eq_ignore_ascii_case("content-length") {
                let size: usize = value
                    .trim()
                    .parse()
                    .map_err(|_| TransportError::InvalidContentLength(value.trim().to_string()))?;
                if size == 0 {
                    return Err(TransportError::InvalidContentLength("0".to_string()));
                }
                content_length = Some(size);
            }
            // Unknown headers ignored.
        }

        let size = content_length.ok_or(TransportError::MissingContentLength)?;
        if size > self.max_frame_bytes {
            return Err(TransportError::FrameTooLarge {
                size,
                max_size: self.max_frame_bytes,
            });
        }

        let mut payload = vec![0u8; size];
        self.inner.read_exact(&mut payload).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                TransportError::UnexpectedEof
            } else {
                TransportError::Io(e)
            }
        })?;

        trace!(bytes = size, "read header-framed payload");
        Ok(Some(Bytes::from(payload)))
    }
}

/// Frame writer for header framing.
pub struct HeaderFrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin + Send> HeaderFrameWriter<W> {
    /// Wraps a byte writer.
    pub fn new(writer: W) -> Self {
        Self { inner: writer }
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> FrameWriter for HeaderFrameWriter<W> {
    async fn write_frame(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        let header = format!("Content-Length: {}\r\n\r\n", frame.len());
        self.inner.write_all(header.as_bytes()).await?;
        self.inner.write_all(frame).await?;
        self.inner.flush().await?;
        trace!(bytes = frame.len(), "wrote header-framed payload");
        Ok(())
    }
}
