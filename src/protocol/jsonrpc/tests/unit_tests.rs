// Copyright (c) 2025 Makai RPC Authors
//
// Licensed under dual license:
// - MIT License (LICENSE-MIT or https://opensource.org/licenses/MIT)
// - Apache License, Version 2.0 (LICENSE-APACHE or https://www.apache.org/licenses/LICENSE-2.0)

//! Unit tests for codec classification and wire shapes.

use serde_json::{json, Value};
use test_case::test_case;

use crate::protocol::jsonrpc::{
    codec, DecodeError, ErrorObject, Id, Message, Payload, Request, Response,
};

#[test]
fn test_call_wire_shape() {
    let request = Request::call("add", Some(json!([2, 3])), Id::Number(1));
    let bytes = codec::encode_message(&Message::Request(request)).unwrap();
    assert_eq!(
        std::str::from_utf8(&bytes).unwrap(),
        r#"{"jsonrpc":"2.0","method":"add","params":[2,3],"id":1}"#
    );
}

#[test]
fn test_success_response_wire_shape() {
    let response = Response::success(Id::Number(1), json!(5));
    let bytes = codec::encode_message(&Message::Response(response)).unwrap();
    assert_eq!(
        std::str::from_utf8(&bytes).unwrap(),
        r#"{"jsonrpc":"2.0","result":5,"id":1}"#
    );
}

#[test]
fn test_error_response_wire_shape() {
    let response = Response::error(
        Some(Id::String("x".to_string())),
        ErrorObject::method_not_found("nope"),
    );
    let bytes = codec::encode_message(&Message::Response(response)).unwrap();
    let value: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["error"]["code"], json!(-32601));
    assert_eq!(value["id"], json!("x"));
}

#[test]
fn test_notification_wire_shape_has_no_id() {
    let request = Request::notification("log", Some(json!(["hi"])));
    let bytes = codec::encode_message(&Message::Request(request)).unwrap();
    let value: Value = serde_json::from_slice(&bytes).unwrap();
    assert!(value.get("id").is_none());
    assert_eq!(value["jsonrpc"], json!("2.0"));
}

#[test]
fn test_batch_encode_preserves_order() {
    let batch = Payload::Batch(vec![
        Message::Request(Request::call("a", None, Id::Number(1))),
        Message::Request(Request::notification("b", None)),
        Message::Request(Request::call("c", None, Id::Number(2))),
    ]);
    let bytes = codec::encode_payload(&batch).unwrap();
    let value: Value = serde_json::from_slice(&bytes).unwrap();
    let items = value.as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0]["method"], json!("a"));
    assert_eq!(items[1]["method"], json!("b"));
    assert_eq!(items[2]["method"], json!("c"));
}

#[test_case(r#"{"jsonrpc":"1.0","id":1,"method":"m"}"# ; "wrong version")]
#[test_case(r#"{"id":1,"method":"m"}"# ; "missing version")]
#[test_case(r#"{"jsonrpc":"2.0","id":1,"method":""}"# ; "empty method")]
#[test_case(r#"{"jsonrpc":"2.0","id":1}"# ; "neither request nor response")]
#[test_case(r#"{"jsonrpc":"2.0","id":1,"method":42}"# ; "non-string method")]
#[test_case(r#"{"jsonrpc":"2.0","id":true,"method":"m"}"# ; "boolean id")]
#[test_case("[]" ; "empty batch")]
#[test_case("42" ; "scalar top level")]
#[test_case(r#""text""# ; "string top level")]
fn test_structurally_invalid_payloads(payload: &str) {
    let err = codec::decode_payload(payload.as_bytes()).unwrap_err();
    assert!(matches!(err, DecodeError::Invalid { .. }), "got {err:?}");
    let response = err.to_response();
    assert_eq!(response.error.unwrap().code, -32600);
}

#[test_case("{bad json}" ; "bare words")]
#[test_case(r#"{"jsonrpc": "2.0","# ; "truncated object")]
#[test_case("" ; "empty input")]
fn test_malformed_payloads(payload: &str) {
    let err = codec::decode_payload(payload.as_bytes()).unwrap_err();
    assert!(matches!(err, DecodeError::Parse(_)), "got {err:?}");
    let response = err.to_response();
    assert_eq!(response.id, None);
    assert_eq!(response.error.unwrap().code, -32700);
}

#[test]
fn test_invalid_element_rejects_batch() {
    let err = codec::decode_payload(
        br#"[{"jsonrpc":"2.0","id":1,"method":"ok"},{"jsonrpc":"1.0","id":2,"method":"bad"}]"#,
    )
    .unwrap_err();
    match err {
        DecodeError::Invalid { id, .. } => assert_eq!(id, Some(Id::Number(2))),
        other => panic!("expected invalid, got {other:?}"),
    }
}

#[test]
fn test_responses_allowed_inside_batch() {
    let payload = codec::decode_payload(
        br#"[{"jsonrpc":"2.0","id":9,"result":"ok"},{"jsonrpc":"2.0","id":10,"error":{"code":-32603,"message":"x"}}]"#,
    )
    .unwrap();
    match payload {
        Payload::Batch(messages) => {
            assert!(messages.iter().all(|m| matches!(m, Message::Response(_))));
        }
        other => panic!("expected batch, got {other:?}"),
    }
}
