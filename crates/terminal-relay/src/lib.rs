//! # terminal-relay
//!
//! Drives a payment-terminal SDK that only runs inside a browser page from a
//! host process.  The page connects to the relay over a WebSocket; the host
//! calls SDK methods through typed stubs and the page can call back into
//! host attributes (the SDK's connection-token and reader-disconnect hooks).
//!
//! ```text
//! host code
//!    │ relay.call("discover_readers", args)
//!    ▼
//! [terminal-relay]
//!   ├── domain/           CallArgs, RelayConfig
//!   ├── application/      interface definitions, stubs, correlation, dispatch
//!   └── infrastructure/
//!         ├── ws_server/  WebSocket accept loop (tokio-tungstenite)
//!         ├── launcher/   starts the browser client
//!         ├── token/      connection tokens
//!         └── lifecycle/  Relay + process singleton
//!    ▲
//!    │ JSON over WebSocket
//! browser page running the SDK
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O.
//! - `application` depends on `domain` and `relay-core`, and never opens a
//!   socket.
//! - `infrastructure` wires everything to Tokio and the network.

/// Domain layer: configuration and call arguments.
pub mod domain;

/// Application layer: binding, correlation and dispatch.
pub mod application;

/// Infrastructure layer: WebSocket server, launcher, tokens, lifecycle.
pub mod infrastructure;

pub use application::{
    terminal_interface, DisconnectReason, InterfaceDefinition, RelayError,
};
pub use domain::{CallArgs, RelayConfig};
pub use infrastructure::{relay_instance, Relay};
