//! Relay protocol: message shapes, the text codec and request ids.

pub mod codec;
pub mod messages;
pub mod sequence;

pub use codec::{
    decode_inbound, decode_reply_value, encode_peer_reply, encode_request, ProtocolError,
    UNDEFINED_LITERAL,
};
pub use messages::*;
pub use sequence::RequestIdCounter;
