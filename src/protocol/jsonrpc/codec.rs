// Copyright (c) 2025 Makai RPC Authors
//
// Licensed under dual license:
// - MIT License (LICENSE-MIT or https://opensource.org/licenses/MIT)
// - Apache License, Version 2.0 (LICENSE-APACHE or https://www.apache.org/licenses/LICENSE-2.0)

//! JSON-RPC 2.0 codec: payload decoding, classification, and encoding.
//!
//! Decoding works on one framed payload at a time. The top-level JSON may
//! be an object (single message) or an array (batch); each object is
//! classified by the rule from the specification: if `method` is present
//! it is a request (a call when `id` is present, else a notification);
//! otherwise, if `result` or `error` is present it is a response; anything
//! else is malformed. Classification recovers the message identifier where
//! possible so the connection can address its wire-level error reply.

use serde_json::Value;
use thiserror::Error;

use crate::error::protocol::ProtocolError;

use super::error::ErrorObject;
use super::types::{Id, Message, Payload, Request, Response, JSONRPC_VERSION};

/// A per-message decode fault.
///
/// These faults are recoverable at the connection level: the read loop
/// answers them with an error response and keeps the stream alive.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The payload is not valid JSON.
    #[error("malformed JSON: {0}")]
    Parse(#[source] serde_json::Error),

    /// The payload is valid JSON but not a valid JSON-RPC message.
    #[error("invalid message: {fault}")]
    Invalid {
        /// Identifier recovered from the offending message, if any
        id: Option<Id>,
        /// The structural fault
        fault: ProtocolError,
    },
}

impl DecodeError {
    fn invalid(id: Option<Id>, fault: ProtocolError) -> Self {
        DecodeError::Invalid { id, fault }
    }

    /// Builds the wire response answering this fault: a ParseError with a
    /// null identifier for malformed JSON, an InvalidRequest carrying the
    /// recovered identifier otherwise.
    pub fn to_response(&self) -> Response {
        match self {
            DecodeError::Parse(_) => Response::error(None, ErrorObject::parse_error()),
            DecodeError::Invalid { id, fault } => {
                Response::error(id.clone(), ErrorObject::invalid_request(fault.to_string()))
            }
        }
    }
}

/// Decodes one framed payload into a single message or a batch.
pub fn decode_payload(bytes: &[u8]) -> Result<Payload, DecodeError> {
    let value: Value = serde_json::from_slice(bytes).map_err(DecodeError::Parse)?;
    match value {
        Value::Array(items) => {
            if items.is_empty() {
                return Err(DecodeError::invalid(None, ProtocolError::EmptyBatch));
            }
            let mut messages = Vec::with_capacity(items.len());
            for item in items {
                messages.push(classify_value(item)?);
            }
            Ok(Payload::Batch(messages))
        }
        object @ Value::Object(_) => Ok(Payload::Single(classify_value(object)?)),
        other => Err(DecodeError::invalid(
            None,
            ProtocolError::InvalidMessage(format!(
                "top level must be an object or array, got {}",
                json_type_name(&other)
            )),
        )),
    }
}

/// Classifies one JSON value as a request or response.
pub fn classify_value(value: Value) -> Result<Message, DecodeError> {
    let obj = match value {
        Value::Object(map) => map,
        other => {
            return Err(DecodeError::invalid(
                None,
                ProtocolError::InvalidMessage(format!(
                    "message must be an object, got {}",
                    json_type_name(&other)
                )),
            ))
        }
    };

    // Recover the identifier first so structural faults can carry it.
    // `"id": null` is treated as absent for classification.
    let id: Option<Id> = match obj.get("id") {
        None | Some(Value::Null) => None,
        Some(v) => Some(serde_json::from_value(v.clone()).map_err(|_| {
            DecodeError::invalid(
                None,
                ProtocolError::InvalidMessage("id must be a number or string".to_string()),
            )
        })?),
    };

    match obj.get("jsonrpc") {
        Some(Value::String(version)) if version == JSONRPC_VERSION => {}
        other => {
            let got = other.map(|v| v.to_string()).unwrap_or_else(|| "absent".to_string());
            return Err(DecodeError::invalid(
                id,
                ProtocolError::UnsupportedVersion(got),
            ));
        }
    }

    if let Some(method_value) = obj.get("method") {
        let method = method_value.as_str().ok_or_else(|| {
            DecodeError::invalid(
                id.clone(),
                ProtocolError::InvalidMessage("method must be a string".to_string()),
            )
        })?;
        if method.is_empty() {
            return Err(DecodeError::invalid(id, ProtocolError::EmptyMethod));
        }

        let params = match obj.get("params") {
            None | Some(Value::Null) => None,
            Some(p) if p.is_object() || p.is_array() => Some(p.clone()),
            Some(_) => {
                return Err(DecodeError::invalid(
                    id,
                    ProtocolError::InvalidMessage(
                        "params must be an object or array".to_string(),
                    ),
                ))
            }
        };

        return Ok(Message::Request(Request {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params,
            id,
        }));
    }

    // No method: a response. The error member wins over a null result.
    let error = match obj.get("error") {
        None | Some(Value::Null) => None,
        Some(e) => Some(serde_json::from_value::<ErrorObject>(e.clone()).map_err(|e| {
            DecodeError::invalid(
                id.clone(),
                ProtocolError::InvalidMessage(format!("malformed error object: {e}")),
            )
        })?),
    };
    let has_result = obj.contains_key("result");
    let has_error = error.is_some();

    match (has_error, has_result) {
        (true, true) => Err(DecodeError::invalid(id, ProtocolError::AmbiguousResponse)),
        (false, false) => Err(DecodeError::invalid(id, ProtocolError::AmbiguousResponse)),
        (false, true) if id.is_none() => {
            // A null id is only legitimate on an error response answering an
            // unparseable request.
            Err(DecodeError::invalid(
                None,
                ProtocolError::InvalidMessage("success response without id".to_string()),
            ))
        }
        _ => Ok(Message::Response(Response {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: if has_result {
                Some(obj.get("result").cloned().unwrap_or(Value::Null))
            } else {
                None
            },
            error,
            id,
        })),
    }
}

/// Serializes one message to bytes.
pub fn encode_message(message: &Message) -> Result<Vec<u8>, serde_json::Error> {
    match message {
        Message::Request(req) => serde_json::to_vec(req),
        Message::Response(resp) => serde_json::to_vec(resp),
    }
}

/// Serializes one payload (single message or batch) to bytes.
pub fn encode_payload(payload: &Payload) -> Result<Vec<u8>, serde_json::Error> {
    match payload {
        Payload::Single(message) => encode_message(message),
        Payload::Batch(messages) => {
            let values: Vec<Value> = messages
                .iter()
                .map(|m| match m {
                    Message::Request(req) => serde_json::to_value(req),
                    Message::Response(resp) => serde_json::to_value(resp),
                })
                .collect::<Result<_, _>>()?;
            serde_json::to_vec(&values)
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
