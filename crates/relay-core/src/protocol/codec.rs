//! Text codec for relay frames.
//!
//! Outbound frames are plain `serde_json` serialisations of
//! [`RelayRequest`] / [`PeerReply`].  Inbound frames need classification
//! because the protocol carries no type tag:
//!
//! 1. `undefined`, an empty frame or JSON `null` → the peer has no such
//!    attribute ([`ReplyPayload::Undefined`]).
//! 2. An object with `attribute` and `args` or `kwargs` → [`Inbound::PeerRequest`].
//! 3. An object with a string `attribute` and `result` and no other key →
//!    [`Inbound::PeerReply`].
//! 4. An object with exactly `id` and `reply` → a tagged reply.
//! 5. Anything else → an untagged reply; an `error` key turns it into a
//!    classified [`SdkError`].

use serde_json::{Map, Value};
use thiserror::Error;

use crate::errors::SdkError;
use crate::protocol::messages::{Inbound, PeerReply, RawReply, RelayRequest, ReplyPayload};

/// Literal the browser sends when the requested SDK attribute does not exist
/// (`JSON.stringify(undefined)` produces no JSON at all).
pub const UNDEFINED_LITERAL: &str = "undefined";

/// Errors that can occur while encoding or decoding a frame.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ProtocolError {
    /// The frame is not valid JSON.
    #[error("invalid JSON frame: {0}")]
    InvalidJson(String),

    /// A peer request whose fields have the wrong types.
    #[error("malformed peer request: {0}")]
    MalformedRequest(String),

    /// A reply that cannot be interpreted.  `id` is the envelope id of a
    /// tagged reply.
    #[error("malformed reply: {reason}")]
    MalformedReply { id: Option<u64>, reason: String },

    /// A value could not be serialised.
    #[error("failed to serialize frame: {0}")]
    Serialize(String),
}

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Encodes a host → peer request as a JSON text frame.
///
/// # Errors
///
/// Returns [`ProtocolError::Serialize`] if an argument cannot be serialised
/// (only possible for maps with non-string keys, which `Value` cannot hold).
///
/// # Examples
///
/// ```rust
/// use relay_core::protocol::{encode_request, RelayRequest};
///
/// let req = RelayRequest::new("discoverReaders", vec![], Default::default());
/// let text = encode_request(&req).unwrap();
/// assert_eq!(text, r#"{"attribute":"discoverReaders","args":[],"kwargs":{}}"#);
/// ```
pub fn encode_request(request: &RelayRequest) -> Result<String, ProtocolError> {
    serde_json::to_string(request).map_err(|e| ProtocolError::Serialize(e.to_string()))
}

/// Encodes the host's reply to a peer request.
///
/// # Errors
///
/// Returns [`ProtocolError::Serialize`] if the result cannot be serialised.
pub fn encode_peer_reply(reply: &PeerReply) -> Result<String, ProtocolError> {
    serde_json::to_string(reply).map_err(|e| ProtocolError::Serialize(e.to_string()))
}

// ── Decoding ──────────────────────────────────────────────────────────────────

/// Decodes and classifies one inbound text frame.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidJson`] for frames that are not JSON (other
/// than the `undefined` literal), [`ProtocolError::MalformedRequest`] for a
/// peer request with mistyped fields and [`ProtocolError::MalformedReply`]
/// for a reply with an unreadable `error` tag.
///
/// # Examples
///
/// ```rust
/// use relay_core::protocol::{decode_inbound, Inbound, ReplyPayload};
///
/// let inbound = decode_inbound("undefined").unwrap();
/// assert!(matches!(inbound, Inbound::Reply(r) if r.payload == ReplyPayload::Undefined));
/// ```
pub fn decode_inbound(text: &str) -> Result<Inbound, ProtocolError> {
    let trimmed = text.trim();
    if trimmed.is_empty() || trimmed == UNDEFINED_LITERAL {
        return Ok(Inbound::Reply(RawReply::untagged(ReplyPayload::Undefined)));
    }

    let value: Value =
        serde_json::from_str(trimmed).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;

    if let Value::Object(map) = &value {
        if map.contains_key("attribute") {
            if map.contains_key("args") || map.contains_key("kwargs") {
                let request: RelayRequest = serde_json::from_value(value)
                    .map_err(|e| ProtocolError::MalformedRequest(e.to_string()))?;
                return Ok(Inbound::PeerRequest(request));
            }
        }

        if let Some(reply) = peer_reply(map) {
            return Ok(Inbound::PeerReply(reply));
        }

        if let Some(id) = tagged_reply_id(map) {
            let inner = map.get("reply").cloned().unwrap_or(Value::Null);
            let payload = decode_reply_value(inner).map_err(|e| match e {
                ProtocolError::MalformedReply { reason, .. } => ProtocolError::MalformedReply {
                    id: Some(id),
                    reason,
                },
                other => other,
            })?;
            return Ok(Inbound::Reply(RawReply {
                id: Some(id),
                payload,
            }));
        }
    }

    Ok(Inbound::Reply(RawReply::untagged(decode_reply_value(value)?)))
}

/// Interprets an already-parsed reply value.
///
/// `null` means "no such attribute"; an object carrying an `error` key is a
/// classified SDK failure; everything else is returned unchanged.
///
/// The `error` tag is accepted in two forms: the relay's own
/// `["kind", "message"]` pair and the SDK's native `{"code", "message"}`
/// object.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedReply`] (without an id) when the
/// `error` tag matches neither form.
pub fn decode_reply_value(value: Value) -> Result<ReplyPayload, ProtocolError> {
    match value {
        Value::Null => Ok(ReplyPayload::Undefined),
        Value::Object(ref map) if map.contains_key("error") => parse_error_tag(&map["error"])
            .map(ReplyPayload::Error)
            .map_err(|reason| ProtocolError::MalformedReply { id: None, reason }),
        other => Ok(ReplyPayload::Value(other)),
    }
}

/// Returns the peer reply an `{"attribute": name, "result": value}` object
/// carries.  Any extra key makes it an ordinary SDK value.
fn peer_reply(map: &Map<String, Value>) -> Option<PeerReply> {
    if map.len() != 2 {
        return None;
    }
    match (map.get("attribute"), map.get("result")) {
        (Some(Value::String(attribute)), Some(result)) => Some(PeerReply {
            attribute: attribute.clone(),
            result: result.clone(),
        }),
        _ => None,
    }
}

/// Returns the id of a `{"id": n, "reply": ...}` envelope.
fn tagged_reply_id(map: &Map<String, Value>) -> Option<u64> {
    if map.len() != 2 || !map.contains_key("reply") {
        return None;
    }
    map.get("id").and_then(Value::as_u64)
}

fn parse_error_tag(tag: &Value) -> Result<SdkError, String> {
    match tag {
        Value::Array(items) if items.len() == 2 => match (&items[0], &items[1]) {
            (Value::String(kind), Value::String(message)) => {
                Ok(SdkError::from_wire(kind, message.clone()))
            }
            (Value::String(kind), other) => Ok(SdkError::from_wire(kind, other.to_string())),
            _ => Err(format!("error kind must be a string, got {tag}")),
        },
        Value::Object(fields) => {
            let kind = ["code", "type", "name"]
                .iter()
                .find_map(|key| fields.get(*key).and_then(Value::as_str))
                .unwrap_or("Error");
            let message = fields
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default();
            Ok(SdkError::from_wire(kind, message))
        }
        _ => Err(format!("error tag must be [kind, message], got {tag}")),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
