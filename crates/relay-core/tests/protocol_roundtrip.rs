//! Integration tests for the relay-core codec.
//!
//! The host encodes requests with [`encode_request`]; a browser peer decodes
//! them with the same classification rules the host applies to inbound
//! frames.  These tests play both sides through the public API.

use relay_core::{
    decode_inbound, encode_peer_reply, encode_request,
    protocol::{messages::RelayRequest, RequestIdCounter},
    ErrorKind, Inbound, PeerReply, ReplyPayload,
};
use serde_json::{json, Map, Value};

/// Encodes a request and decodes it the way the peer would, returning the
/// request the peer sees.
fn as_seen_by_peer(request: &RelayRequest) -> RelayRequest {
    let text = encode_request(request).expect("encode must succeed");
    match decode_inbound(&text).expect("decode must succeed") {
        Inbound::PeerRequest(req) => req,
        other => panic!("expected a request on the peer side, got {other:?}"),
    }
}

fn kwargs(value: Value) -> Map<String, Value> {
    value.as_object().cloned().expect("kwargs must be an object")
}

#[test]
fn test_request_round_trip_preserves_attribute_args_and_kwargs() {
    // Arrange
    let ids = RequestIdCounter::new();
    let original = RelayRequest::new(
        "collectPaymentMethod",
        vec![json!("pi_123_secret_abc")],
        kwargs(json!({"config_override": {"skip_tipping": true}})),
    )
    .with_id(ids.next_id());

    // Act
    let seen = as_seen_by_peer(&original);

    // Assert
    assert_eq!(seen.attribute, original.attribute);
    assert_eq!(seen.args, original.args);
    assert_eq!(seen.kwargs, original.kwargs);
    assert_eq!(seen.id, Some(1));
}

#[test]
fn test_request_round_trip_with_no_arguments() {
    let original = RelayRequest::new("getConnectionStatus", vec![], Map::new());
    assert_eq!(as_seen_by_peer(&original), original);
}

#[test]
fn test_request_round_trip_with_nested_and_unicode_arguments() {
    let original = RelayRequest::new(
        "setReaderDisplay",
        vec![json!({
            "type": "cart",
            "cart": {
                "line_items": [{"description": "Café crème ☕", "amount": 450, "quantity": 2}],
                "tax": 0,
                "total": 900,
                "currency": "eur"
            }
        })],
        Map::new(),
    );
    assert_eq!(as_seen_by_peer(&original), original);
}

#[test]
fn test_discover_readers_scenario_on_the_wire() {
    // Arrange: the host asks for simulated readers
    let request = RelayRequest::new(
        "discoverReaders",
        vec![],
        kwargs(json!({"simulated": true})),
    );

    // Act: the peer receives it, runs the SDK and answers
    let seen = as_seen_by_peer(&request);
    let reply = decode_inbound(r#"{"discoveredReaders":[{"id":"r1"}]}"#).unwrap();

    // Assert
    assert_eq!(seen.attribute, "discoverReaders");
    assert_eq!(seen.kwargs["simulated"], json!(true));
    match reply {
        Inbound::Reply(r) => {
            assert_eq!(r.id, None);
            assert_eq!(
                r.payload,
                ReplyPayload::Value(json!({"discoveredReaders": [{"id": "r1"}]}))
            );
        }
        other => panic!("expected Reply, got {other:?}"),
    }
}

#[test]
fn test_peer_reply_round_trip_is_classified_as_peer_reply() {
    let original = PeerReply {
        attribute: "connection_token".to_string(),
        result: json!({"secret": "pst_test_123"}),
    };
    let text = encode_peer_reply(&original).unwrap();
    assert_eq!(decode_inbound(&text).unwrap(), Inbound::PeerReply(original));
}

#[test]
fn test_every_error_kind_survives_the_error_tag() {
    for kind in ErrorKind::ALL {
        let text = json!({"error": [kind.as_str(), "boom"]}).to_string();
        match decode_inbound(&text).unwrap() {
            Inbound::Reply(r) => match r.payload {
                ReplyPayload::Error(e) => assert_eq!(e.kind, kind),
                other => panic!("expected Error for {kind}, got {other:?}"),
            },
            other => panic!("expected Reply, got {other:?}"),
        }
    }
}
