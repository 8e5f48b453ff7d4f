//! Makai RPC Library
//!
//! This library contains the core of a bidirectional JSON-RPC 2.0 runtime:
//! the wire model and codec, byte-stream framing, the connection state
//! machine, and the handler middleware chain. It is designed to be embedded
//! by language servers, MCP implementations, and similar peer-symmetric
//! protocols; the embedder supplies the transport and the method surface.
//!
//! # Architecture
//!
//! The library is designed with the following principles in mind:
//! - Strict component boundaries
//! - Async-first approach built on the tokio runtime
//! - Comprehensive error handling and propagation
//! - Cooperative cancellation in both directions
//! - No global state; everything lives on [`Connection`] instances

// Re-export public modules
pub mod config;
pub mod connection;
pub mod error;
pub mod framing;
pub mod protocol;

pub use config::{ConnectionConfig, FramingKind};
pub use connection::handler::{
    Handler, MethodNotFound, MethodRouter, MustReply, Replier, RequestCtx,
};
pub use connection::Connection;
pub use error::{CoreError, CoreResult};
pub use framing::stream::RpcStream;
pub use protocol::jsonrpc::{ErrorCode, ErrorObject, Id, Message, Payload, Request, Response};

/// Version information for the Makai RPC library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
