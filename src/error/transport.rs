//! Transport error module.
//!
//! This module defines error types for byte-stream framing and the
//! underlying reader/writer pair. Unlike [`super::protocol`] faults, these
//! errors are fatal to the connection: once framing is lost there is no
//! reliable way to find the next message boundary.

use std::io;
use thiserror::Error;

/// Errors that can occur during framing and transport operations.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Error when a header line is not terminated by CRLF or cannot be
    /// split into a name/value pair.
    #[error("malformed framing header: {0:?}")]
    MalformedHeader(String),

    /// Error when a header block ends without a Content-Length header.
    #[error("missing Content-Length header")]
    MissingContentLength,

    /// Error when the Content-Length value is zero or not a decimal integer.
    #[error("invalid Content-Length: {0:?}")]
    InvalidContentLength(String),

    /// Error when a frame exceeds the configured size limit.
    #[error("frame size exceeds maximum allowed: {size} > {max_size}")]
    FrameTooLarge {
        /// The declared or accumulated size of the frame in bytes
        size: usize,
        /// The maximum allowed size in bytes
        max_size: usize,
    },

    /// Error when the byte stream ends in the middle of a message.
    #[error("unexpected end of stream mid-message")]
    UnexpectedEof,

    /// Error when raw framing cannot find a message boundary because the
    /// stream contains malformed JSON.
    #[error("undecodable raw frame: {0}")]
    RawDecode(String),

    /// Error when the underlying byte stream fails.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error when a write is attempted on a closed transport.
    #[error("transport closed")]
    Closed,
}
