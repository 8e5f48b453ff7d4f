//! Error module for the Makai RPC runtime.
//!
//! This module provides the error handling framework for the whole crate,
//! following Rust's idiomatic error handling patterns with explicit error
//! types and proper propagation. The top-level [`CoreError`] distinguishes
//! the failure modes a caller needs to tell apart: connection-level
//! sentinels, per-message protocol faults, and transport failures.

use thiserror::Error;

pub mod config;
pub mod protocol;
pub mod transport;

use crate::protocol::jsonrpc::ErrorObject;

/// Result type alias used throughout the Makai RPC runtime.
pub type CoreResult<T> = Result<T, CoreError>;

/// Core error enum for the Makai RPC runtime.
#[derive(Error, Debug)]
pub enum CoreError {
    /// The connection has been closed, either locally or by the peer.
    /// Outstanding calls are unblocked with this error on teardown.
    #[error("connection closed")]
    ConnectionClosed,

    /// The connection terminated because it was idle for longer than the
    /// configured idle timeout.
    #[error("connection idle timeout")]
    IdleTimeout,

    /// The caller's cancellation token fired while a call was in flight.
    #[error("request cancelled")]
    Cancelled,

    /// The peer answered a call with an error response.
    #[error("remote error: {0}")]
    Remote(ErrorObject),

    /// Errors in the structure of a JSON-RPC message.
    #[error("protocol error: {0}")]
    Protocol(#[from] protocol::ProtocolError),

    /// Errors in the byte-stream framing or the underlying transport.
    #[error("transport error: {0}")]
    Transport(#[from] transport::TransportError),

    /// Errors validating a [`crate::config::ConnectionConfig`].
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Serialization/Deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An operation was attempted in a connection state that forbids it,
    /// e.g. a second call to `run`.
    #[error("invalid connection state: {0}")]
    InvalidState(&'static str),
}

impl CoreError {
    /// Returns true if this error indicates the connection is unusable.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CoreError::ConnectionClosed | CoreError::IdleTimeout | CoreError::Transport(_)
        )
    }
}
