//! Protocol error module.
//!
//! This module defines error types for structurally invalid JSON-RPC
//! messages. These faults are per-message: the connection answers them on
//! the wire and keeps running.

use thiserror::Error;

/// Errors that can occur while interpreting a decoded JSON value as a
/// JSON-RPC message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Error when the `jsonrpc` version tag is not exactly "2.0".
    #[error("unsupported protocol version: {0:?}")]
    UnsupportedVersion(String),

    /// Error when a batch array contains no elements.
    #[error("empty batch")]
    EmptyBatch,

    /// Error when two calls in one batch carry the same ID.
    #[error("duplicate ID in batch: {0}")]
    DuplicateBatchId(String),

    /// Error when the message shape matches neither a request nor a response.
    #[error("invalid JSON-RPC message: {0}")]
    InvalidMessage(String),

    /// Error when a request's method name is empty.
    #[error("empty method name")]
    EmptyMethod,

    /// Error when a response carries both or neither of result and error.
    #[error("response must carry exactly one of result and error")]
    AmbiguousResponse,
}
