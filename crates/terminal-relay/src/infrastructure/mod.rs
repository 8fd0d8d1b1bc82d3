//! Infrastructure layer for terminal-relay.
//!
//! Everything that touches the outside world lives here:
//!
//! - [`ws_server`] – the WebSocket accept loop and per-connection handler
//! - [`launcher`] – starting the browser client
//! - [`token`] – connection tokens for the SDK
//! - [`lifecycle`] – [`Relay`] startup and the process-wide singleton
//!
//! Protocol meaning (what a frame is, which call it answers) stays in the
//! application layer.

pub mod launcher;
pub mod lifecycle;
pub mod token;
pub mod ws_server;

pub use launcher::{launcher_from_config, ClientLauncher, CommandLauncher, NoopLauncher};
pub use lifecycle::{relay_instance, Relay, SessionGuard};
pub use token::{
    issuer_from_config, CommandTokenIssuer, ConnectionToken, StaticTokenIssuer, TokenIssuer,
    UnconfiguredTokenIssuer,
};
pub use ws_server::{run_server, MessageHandler};
