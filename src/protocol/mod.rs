//! Protocol layer for the Makai RPC runtime.
//!
//! Contains the JSON-RPC 2.0 wire model and codec.

pub mod jsonrpc;
