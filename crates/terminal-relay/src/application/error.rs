//! The error type surfaced by every relay operation.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use relay_core::{ErrorKind, ProtocolError, SdkError};

/// Everything a relay call, a host callback or relay startup can fail with.
///
/// SDK failures reported by the page arrive as [`RelayError::Sdk`] and keep
/// their [`ErrorKind`]; the remaining variants describe failures of the relay
/// itself.  [`RelayError::kind`] maps every variant onto the SDK taxonomy so
/// callers can branch on one enum.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The SDK call ran and failed.
    #[error(transparent)]
    Sdk(#[from] SdkError),

    /// The page answered `undefined`: the SDK object has no such attribute.
    #[error("'{type_name}' object has no attribute '{method}'")]
    AttributeNotFound { type_name: String, method: String },

    /// The host asked for a method the interface never declared.
    #[error("'{type_name}' declares no SDK method '{method}'")]
    UnknownMethod { type_name: String, method: String },

    /// No browser peer attached within the connect timeout.
    #[error("no browser peer connected")]
    NotConnected,

    /// The peer went away (or was replaced) while the call was in flight.
    #[error("browser peer disconnected before replying")]
    Disconnected,

    /// The peer did not reply within the call timeout.
    #[error("no reply from browser peer within {0:?}")]
    Timeout(Duration),

    /// The caller cancelled the call.
    #[error("call cancelled")]
    Cancelled,

    /// Result of the default disconnect handler.
    #[error("terminal disconnected")]
    TerminalDisconnected,

    /// A frame could not be encoded or a reply had an unusable shape.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A reply handler or host callback rejected its input.
    #[error("handler failed: {0}")]
    Handler(String),

    /// The browser client could not be started.
    #[error("failed to launch browser client: {0}")]
    Launch(String),

    /// The WebSocket listener could not be bound.
    #[error("failed to bind relay listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

impl RelayError {
    /// Projects this error onto the SDK error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RelayError::Sdk(e) => e.kind,
            RelayError::AttributeNotFound { .. } | RelayError::UnknownMethod { .. } => {
                ErrorKind::AttributeNotFound
            }
            RelayError::NotConnected | RelayError::TerminalDisconnected => {
                ErrorKind::NoEstablishedConnection
            }
            RelayError::Disconnected => ErrorKind::NetworkError,
            RelayError::Timeout(_) => ErrorKind::NetworkTimeout,
            RelayError::Cancelled => ErrorKind::Canceled,
            RelayError::Protocol(_)
            | RelayError::Handler(_)
            | RelayError::Launch(_)
            | RelayError::Bind { .. } => ErrorKind::GenericError,
        }
    }

    /// `true` when retrying the same call later can reasonably succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            RelayError::Sdk(e) => e.kind.is_recoverable(),
            RelayError::NotConnected
            | RelayError::Disconnected
            | RelayError::Timeout(_)
            | RelayError::Cancelled => true,
            _ => false,
        }
    }

    /// Shorthand for a [`RelayError::Handler`] built from anything printable.
    pub fn handler(message: impl std::fmt::Display) -> Self {
        RelayError::Handler(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sdk_error_keeps_its_kind() {
        let err = RelayError::from(SdkError {
            kind: ErrorKind::NetworkTimeout,
            message: "request timed out".to_string(),
        });
        assert_eq!(err.kind(), ErrorKind::NetworkTimeout);
        assert!(err.is_recoverable());
        assert_eq!(err.to_string(), "network_timeout: request timed out");
    }

    #[test]
    fn test_attribute_not_found_message_names_type_and_method() {
        let err = RelayError::AttributeNotFound {
            type_name: "StripeTerminal".to_string(),
            method: "discover_readers".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "'StripeTerminal' object has no attribute 'discover_readers'"
        );
        assert_eq!(err.kind(), ErrorKind::AttributeNotFound);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_transport_failures_are_recoverable() {
        assert!(RelayError::NotConnected.is_recoverable());
        assert!(RelayError::Disconnected.is_recoverable());
        assert!(RelayError::Timeout(Duration::from_secs(1)).is_recoverable());
        assert!(RelayError::Cancelled.is_recoverable());
    }

    #[test]
    fn test_terminal_disconnected_is_fatal() {
        let err = RelayError::TerminalDisconnected;
        assert_eq!(err.to_string(), "terminal disconnected");
        assert_eq!(err.kind(), ErrorKind::NoEstablishedConnection);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_sdk_reader_error_is_not_recoverable() {
        let err = RelayError::Sdk(SdkError::from_wire("reader_error", "card removed"));
        assert_eq!(err.kind(), ErrorKind::ReaderError);
        assert!(!err.is_recoverable());
    }
}
