// Copyright (c) 2025 Makai RPC Authors
//
// Licensed under dual license:
// - MIT License (LICENSE-MIT or https://opensource.org/licenses/MIT)
// - Apache License, Version 2.0 (LICENSE-APACHE or https://www.apache.org/licenses/LICENSE-2.0)

//! Types for the JSON-RPC 2.0 protocol.
//!
//! This module defines the core data structures for JSON-RPC 2.0 requests,
//! responses, and related types according to the
//! [specification](https://www.jsonrpc.org/specification).

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::ErrorObject;

/// The protocol version tag carried by every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC request identifier.
///
/// Can be a number or a string as per the JSON-RPC 2.0 specification.
/// Absence of an identifier is modeled as `Option<Id>` on [`Request`] and
/// [`Response`]; an incoming `"id": null` deserializes to `None`. Two IDs
/// are equal only if they share both variant and value: a numeric `92` and
/// the string `"92"` never match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Id {
    /// Numeric identifier
    Number(i64),

    /// String identifier
    String(String),
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Number(n) => write!(f, "{n}"),
            // Debug formatting keeps `92` and `"92"` distinguishable in logs.
            Id::String(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<i64> for Id {
    fn from(n: i64) -> Self {
        Id::Number(n)
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Id::String(s)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Id::String(s.to_string())
    }
}

/// A JSON-RPC 2.0 request object.
///
/// A request with an `id` is a call and must elicit exactly one response
/// bearing the same `id`; a request without one is a notification.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Request {
    /// JSON-RPC protocol version, always "2.0"
    pub jsonrpc: String,

    /// Name of the method to be invoked
    pub method: String,

    /// Method parameters, positional (array) or named (object)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,

    /// Request identifier; `None` marks a notification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Id>,
}

impl Request {
    /// Creates a new JSON-RPC 2.0 request.
    pub fn new(
        method: impl Into<String>,
        params: Option<serde_json::Value>,
        id: Option<Id>,
    ) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id,
        }
    }

    /// Creates a new call bearing the given identifier.
    pub fn call(method: impl Into<String>, params: Option<serde_json::Value>, id: Id) -> Self {
        Self::new(method, params, Some(id))
    }

    /// Creates a new JSON-RPC notification (no id).
    pub fn notification(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self::new(method, params, None)
    }

    /// Returns true if this request is a notification (no id).
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// A JSON-RPC 2.0 response object.
///
/// Contains either a result or an error, never both. The `id` is `None`
/// only for the parse-error case where the original request's identifier
/// could not be recovered; it then serializes as `"id": null`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Response {
    /// JSON-RPC protocol version, always "2.0"
    pub jsonrpc: String,

    /// The result of the method invocation, if successful
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// The error object, if an error occurred
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,

    /// Same identifier as the request this is responding to
    pub id: Option<Id>,
}

impl Response {
    /// Creates a new successful JSON-RPC 2.0 response.
    pub fn success(id: Id, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id: Some(id),
        }
    }

    /// Creates a new error JSON-RPC 2.0 response. `id` may be `None` when
    /// the offending request's identifier could not be recovered.
    pub fn error(id: Option<Id>, error: ErrorObject) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }

    /// Returns true if this response contains a successful result.
    pub fn is_success(&self) -> bool {
        self.result.is_some() && self.error.is_none()
    }

    /// Returns true if this response contains an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Consumes the response, yielding the result value or the error object.
    pub fn into_result(self) -> Result<serde_json::Value, ErrorObject> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result.unwrap_or(serde_json::Value::Null)),
        }
    }
}

/// A decoded JSON-RPC message: one of the closed set of wire shapes.
///
/// Calls and notifications are both [`Request`]s, distinguished by the
/// presence of an identifier; successful and failed responses are both
/// [`Response`]s, distinguished by which of result/error is set.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// A call or a notification
    Request(Request),
    /// A success or error response
    Response(Response),
}

impl Message {
    /// The identifier carried by this message, if any.
    pub fn id(&self) -> Option<&Id> {
        match self {
            Message::Request(req) => req.id.as_ref(),
            Message::Response(resp) => resp.id.as_ref(),
        }
    }
}

impl From<Request> for Message {
    fn from(request: Request) -> Message {
        Message::Request(request)
    }
}

impl From<Response> for Message {
    fn from(response: Response) -> Message {
        Message::Response(response)
    }
}

/// One framing-level unit: a single message or a batch.
///
/// A batch preserves the order in which its members appeared in the JSON
/// array so the connection can record batch membership for response
/// coalescing.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A single top-level JSON object
    Single(Message),
    /// A top-level JSON array of messages
    Batch(Vec<Message>),
}
