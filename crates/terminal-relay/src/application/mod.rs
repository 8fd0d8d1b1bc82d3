//! Application layer for terminal-relay.
//!
//! The application layer knows *what* a relay call means: which attribute a
//! host method maps to, how a reply is correlated with its call, what an
//! `undefined` or error-tagged reply turns into, and how requests from the
//! page reach host callbacks.  It never touches a socket; the infrastructure
//! layer feeds it text frames and drains its outbound queue.
//!
//! - [`interface`] – interface definitions and their builder
//! - [`binder`] – SDK-method stubs bound to a correlator
//! - [`correlator`] – request ids, pending calls, timeouts, cancellation
//! - [`session`] – inbound frame dispatch and the disconnect handler
//! - [`terminal`] – the payment-terminal interface
//! - [`error`] – [`RelayError`]

pub mod binder;
pub mod correlator;
pub mod error;
pub mod interface;
pub mod session;
pub mod terminal;

pub use binder::{bind_interface, BoundInterface, BoundStub};
pub use correlator::{ConnectionState, Correlator, CorrelatorSettings, PeerHandle};
pub use error::RelayError;
pub use interface::{
    BoundMethodDescriptor, HostAttribute, InterfaceBuilder, InterfaceDefinition,
};
pub use session::{
    default_disconnect_handler, DisconnectHandler, DisconnectReason, RelaySession,
    CONNECTION_TOKEN, UNEXPECTED_READER_DISCONNECT,
};
pub use terminal::{terminal_builder, terminal_interface, TERMINAL_TYPE_NAME};
