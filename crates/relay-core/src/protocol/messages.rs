//! Message shapes exchanged between the host and the browser peer.
//!
//! Every frame on the channel is a JSON text frame.  There are only two
//! shapes in each direction, distinguished by their keys rather than by an
//! explicit `"type"` tag:
//!
//! ```text
//! Host → Peer   request   {"id": 7, "attribute": "discoverReaders", "args": [], "kwargs": {}}
//! Peer → Host   reply     <any JSON value> | {"error": [kind, message]} | undefined
//! Peer → Host   request   {"attribute": "connection_token", "args": [], "kwargs": {}}
//! Host → Peer   reply     {"attribute": "connection_token", "result": {...}}
//! ```
//!
//! A peer that supports request ids may wrap its reply as
//! `{"id": 7, "reply": <value>}` so it is routed to exactly one caller.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::SdkError;

/// Name of the SDK-side property or method a host stub maps to.
pub type RemoteAttributeName = String;

/// A call across the channel: host → peer (SDK call) or peer → host
/// (callback into the host).
///
/// The two directions share one shape; which side receives the frame decides
/// how it is interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayRequest {
    /// Request id assigned by the host.  Peers that echo it let the host
    /// correlate replies without relying on arrival order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    /// Attribute to read or invoke on the receiving side.
    pub attribute: RemoteAttributeName,

    /// Positional arguments, in call order.
    #[serde(default)]
    pub args: Vec<Value>,

    /// Keyword arguments.
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

/// A request the browser makes of the host.
pub type PeerRequest = RelayRequest;

impl RelayRequest {
    /// Builds an untagged request.
    pub fn new(
        attribute: impl Into<RemoteAttributeName>,
        args: Vec<Value>,
        kwargs: Map<String, Value>,
    ) -> Self {
        Self {
            id: None,
            attribute: attribute.into(),
            args,
            kwargs,
        }
    }

    /// Returns the same request stamped with `id`.
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }
}

/// The host's answer to a [`PeerRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerReply {
    /// Echo of the requested attribute; the page keys its waiters on it.
    pub attribute: String,
    /// Return value of the host method, or the host property's value.
    pub result: Value,
}

/// Decoded content of a peer reply to a host-initiated request.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplyPayload {
    /// The SDK call succeeded and produced this value.
    Value(Value),
    /// The SDK call failed with a classified error.
    Error(SdkError),
    /// The peer has no attribute of the requested name (`undefined` / empty).
    Undefined,
}

/// A reply from the peer, optionally tagged with the request id it answers.
#[derive(Debug, Clone, PartialEq)]
pub struct RawReply {
    /// Request id echoed by the peer, when it supports tagging.
    pub id: Option<u64>,
    /// Decoded payload.
    pub payload: ReplyPayload,
}

impl RawReply {
    /// An untagged reply.
    pub fn untagged(payload: ReplyPayload) -> Self {
        Self { id: None, payload }
    }
}

/// Classification of one inbound frame received by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// The browser is calling a host attribute.
    PeerRequest(PeerRequest),
    /// An `{attribute, result}` frame; the host never initiates these, so it
    /// is only logged.
    PeerReply(PeerReply),
    /// A reply to whichever host-initiated request it correlates with.
    Reply(RawReply),
}
