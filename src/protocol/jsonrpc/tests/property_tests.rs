// Copyright (c) 2025 Makai RPC Authors
//
// Licensed under dual license:
// - MIT License (LICENSE-MIT or https://opensource.org/licenses/MIT)
// - Apache License, Version 2.0 (LICENSE-APACHE or https://www.apache.org/licenses/LICENSE-2.0)

//! Property-based tests for the JSON-RPC 2.0 codec.
//! These tests verify that decoding then re-encoding any valid message
//! produces a semantically equivalent value, and that classification and
//! validation hold for randomly generated inputs.

use proptest::prelude::*;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::protocol::jsonrpc::{codec, ErrorObject, Id, Message, Payload, Request, Response};

// Generate a valid method name (alphanumeric with underscores and slashes)
fn method_name_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9_/]{1,20}".prop_map(String::from)
}

// Generate a valid ID (number or string)
fn id_strategy() -> impl Strategy<Value = Id> {
    prop_oneof![
        any::<i64>().prop_map(Id::Number),
        "[a-zA-Z0-9_-]{1,10}".prop_map(Id::String),
    ]
}

// Generate valid params (object, array, or none)
fn params_strategy() -> impl Strategy<Value = Option<Value>> {
    prop_oneof![
        Just(None),
        // Object params
        prop::collection::hash_map("[a-z]{1,5}", -100i32..100, 0..5).prop_map(|map| {
            let object = map
                .into_iter()
                .map(|(k, v)| (k, json!(v)))
                .collect::<HashMap<_, _>>();
            Some(json!(object))
        }),
        // Array params
        prop::collection::vec(any::<i32>(), 0..5).prop_map(|vec| Some(json!(vec))),
    ]
}

// Generate a valid request: call or notification
fn request_strategy() -> impl Strategy<Value = Request> {
    (
        method_name_strategy(),
        params_strategy(),
        prop::option::of(id_strategy()),
    )
        .prop_map(|(method, params, id)| Request::new(method, params, id))
}

// Generate a valid response: success with an id, or error with an
// optional id
fn response_strategy() -> impl Strategy<Value = Response> {
    prop_oneof![
        (id_strategy(), any::<i64>())
            .prop_map(|(id, n)| Response::success(id, json!(n))),
        (prop::option::of(id_strategy()), -32099i64..-32000, "[a-z ]{1,20}").prop_map(
            |(id, code, message)| Response::error(id, ErrorObject::with_code(code, message))
        ),
    ]
}

proptest! {
    // Decoding then re-encoding a request is the identity.
    #[test]
    fn prop_request_round_trip(request in request_strategy()) {
        let encoded = codec::encode_message(&Message::Request(request.clone())).unwrap();
        let decoded = codec::decode_payload(&encoded).unwrap();
        prop_assert_eq!(decoded, Payload::Single(Message::Request(request)));
    }
}

proptest! {
    // Decoding then re-encoding a response is the identity.
    #[test]
    fn prop_response_round_trip(response in response_strategy()) {
        let encoded = codec::encode_message(&Message::Response(response.clone())).unwrap();
        let decoded = codec::decode_payload(&encoded).unwrap();
        prop_assert_eq!(decoded, Payload::Single(Message::Response(response)));
    }
}

proptest! {
    // Every encoded message carries the exact version tag.
    #[test]
    fn prop_encoded_version_tag(request in request_strategy()) {
        let encoded = codec::encode_message(&Message::Request(request)).unwrap();
        let value: Value = serde_json::from_slice(&encoded).unwrap();
        prop_assert_eq!(&value["jsonrpc"], &json!("2.0"));
    }
}

proptest! {
    // Any version tag other than "2.0" is rejected.
    #[test]
    fn prop_wrong_version_rejected(
        request in request_strategy(),
        version in "[0-9]\\.[0-9]".prop_filter("must differ from 2.0", |v| v != "2.0"),
    ) {
        let mut value = serde_json::to_value(&request).unwrap();
        value["jsonrpc"] = json!(version);
        let encoded = serde_json::to_vec(&value).unwrap();
        prop_assert!(codec::decode_payload(&encoded).is_err());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]
    // Batches decode to the same number of messages, in array order.
    #[test]
    fn prop_batch_preserves_length_and_order(requests in prop::collection::vec(request_strategy(), 1..6)) {
        let batch = Payload::Batch(requests.iter().cloned().map(Message::Request).collect());
        let encoded = codec::encode_payload(&batch).unwrap();
        let decoded = codec::decode_payload(&encoded).unwrap();
        match decoded {
            Payload::Batch(messages) => {
                prop_assert_eq!(messages.len(), requests.len());
                for (message, request) in messages.iter().zip(&requests) {
                    prop_assert_eq!(message, &Message::Request(request.clone()));
                }
            }
            other => prop_assert!(false, "expected batch, got {:?}", other),
        }
    }
}

proptest! {
    // Classification: a request with an id is a call, without one a
    // notification; ids survive the trip with their variant intact.
    #[test]
    fn prop_classification_matches_id_presence(request in request_strategy()) {
        let encoded = codec::encode_message(&Message::Request(request.clone())).unwrap();
        match codec::decode_payload(&encoded).unwrap() {
            Payload::Single(Message::Request(decoded)) => {
                prop_assert_eq!(decoded.is_notification(), request.is_notification());
                prop_assert_eq!(decoded.id, request.id);
            }
            other => prop_assert!(false, "expected request, got {:?}", other),
        }
    }
}
