//! # relay-core
//!
//! Shared, I/O-free building blocks of the browser terminal relay.
//!
//! The relay lets a host process drive a payment-terminal SDK that only runs
//! inside a browser page.  Host and page talk over one WebSocket using small
//! JSON frames; this crate defines those frames and nothing else.
//!
//! - **`protocol`** – Message shapes ([`RelayRequest`], [`PeerReply`]), the
//!   codec that classifies inbound frames ([`decode_inbound`]) and the
//!   request-id counter used to correlate replies.
//!
//! - **`errors`** – The flat [`ErrorKind`] enumeration of SDK failures and the
//!   [`SdkError`] carried by a tagged error reply.
//!
//! The crate has no async runtime and no sockets, so a test can play the
//! browser's part with nothing but `serde_json`.

pub mod errors;
pub mod protocol;

pub use errors::{ErrorKind, SdkError};
pub use protocol::codec::{decode_inbound, encode_peer_reply, encode_request, ProtocolError};
pub use protocol::messages::{
    Inbound, PeerReply, PeerRequest, RawReply, RelayRequest, RemoteAttributeName, ReplyPayload,
};
