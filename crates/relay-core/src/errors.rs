//! Error kinds reported by the browser-side terminal SDK.
//!
//! When an SDK operation fails inside the browser, the peer replies with a
//! tagged error instead of a value:
//!
//! ```json
//! {"error": ["network_timeout", "timed out"]}
//! ```
//!
//! The first element names the failure; [`ErrorKind::from_wire`] turns it into
//! a variant of a flat enumeration so calling code can branch on the cause
//! (retry after a timeout, give up after a protocol error, ...).
//!
//! The SDK's own error table contains a couple of misspelt names.  They are
//! accepted as aliases so an unmodified page keeps working.

use std::fmt;

use thiserror::Error;

/// Flat enumeration of every failure cause the relay can surface.
///
/// The variants are not hierarchical: a caller matches on exactly one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The SDK has no reader connection to run the command against.
    NoEstablishedConnection,
    /// A collect-payment-method cancel arrived with nothing to cancel.
    NoActiveCollectPaymentMethodAttempt,
    /// A read-reusable-card cancel arrived with nothing to cancel.
    NoActiveReadReusableCardAttempt,
    /// The command was cancelled before it completed.
    Canceled,
    /// A cancel was requested for a command that was already cancelled.
    CancelableAlreadyCanceled,
    /// The reader or the SDK backend could not be reached.
    NetworkError,
    /// The reader or the SDK backend did not answer in time.
    NetworkTimeout,
    /// A connect was requested while a reader is already connected.
    AlreadyConnected,
    /// The SDK could not obtain a connection token from the host.
    FailedFetchConnectionToken,
    /// Discovery found more readers than the SDK can handle at once.
    DiscoveredTooManyReaders,
    /// The reader runs a software version the SDK does not support.
    InvalidReaderVersion,
    /// The reader reported an internal failure.
    ReaderError,
    /// Another command is still running on the reader.
    CommandAlreadyInProgress,
    /// Any failure the SDK did not classify more precisely.
    GenericError,
    /// The peer has no attribute with the requested name.
    AttributeNotFound,
}

impl ErrorKind {
    /// Every kind, in declaration order.
    pub const ALL: [ErrorKind; 15] = [
        ErrorKind::NoEstablishedConnection,
        ErrorKind::NoActiveCollectPaymentMethodAttempt,
        ErrorKind::NoActiveReadReusableCardAttempt,
        ErrorKind::Canceled,
        ErrorKind::CancelableAlreadyCanceled,
        ErrorKind::NetworkError,
        ErrorKind::NetworkTimeout,
        ErrorKind::AlreadyConnected,
        ErrorKind::FailedFetchConnectionToken,
        ErrorKind::DiscoveredTooManyReaders,
        ErrorKind::InvalidReaderVersion,
        ErrorKind::ReaderError,
        ErrorKind::CommandAlreadyInProgress,
        ErrorKind::GenericError,
        ErrorKind::AttributeNotFound,
    ];

    /// Canonical wire name of this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NoEstablishedConnection => "no_established_connection",
            ErrorKind::NoActiveCollectPaymentMethodAttempt => {
                "no_active_collect_payment_method_attempt"
            }
            ErrorKind::NoActiveReadReusableCardAttempt => "no_active_read_reusable_card_attempt",
            ErrorKind::Canceled => "canceled",
            ErrorKind::CancelableAlreadyCanceled => "cancelable_already_canceled",
            ErrorKind::NetworkError => "network_error",
            ErrorKind::NetworkTimeout => "network_timeout",
            ErrorKind::AlreadyConnected => "already_connected",
            ErrorKind::FailedFetchConnectionToken => "failed_fetch_connection_token",
            ErrorKind::DiscoveredTooManyReaders => "discovered_too_many_readers",
            ErrorKind::InvalidReaderVersion => "invalid_reader_version",
            ErrorKind::ReaderError => "reader_error",
            ErrorKind::CommandAlreadyInProgress => "command_already_in_progress",
            ErrorKind::GenericError => "Error",
            ErrorKind::AttributeNotFound => "attribute_not_found",
        }
    }

    /// Parses a kind name sent by the peer.
    ///
    /// Unknown names map to [`ErrorKind::GenericError`]: the peer's message is
    /// still delivered, only the classification is lost.
    pub fn from_wire(name: &str) -> Self {
        match name {
            "no_established_connection" => ErrorKind::NoEstablishedConnection,
            "no_active_collect_payment_method_attempt"
            | "no_active_colect_payment_method_attempt" => {
                ErrorKind::NoActiveCollectPaymentMethodAttempt
            }
            "no_active_read_reusable_card_attempt" => ErrorKind::NoActiveReadReusableCardAttempt,
            "canceled" | "cancelled" => ErrorKind::Canceled,
            "cancelable_already_canceled" => ErrorKind::CancelableAlreadyCanceled,
            "network_error" => ErrorKind::NetworkError,
            "network_timeout" => ErrorKind::NetworkTimeout,
            "already_connected" => ErrorKind::AlreadyConnected,
            "failed_fetch_connection_token" => ErrorKind::FailedFetchConnectionToken,
            "discovered_too_many_readers" | "discovered_too_manu_readers" => {
                ErrorKind::DiscoveredTooManyReaders
            }
            "invalid_reader_version" => ErrorKind::InvalidReaderVersion,
            "reader_error" => ErrorKind::ReaderError,
            "command_already_in_progress" => ErrorKind::CommandAlreadyInProgress,
            "attribute_not_found" => ErrorKind::AttributeNotFound,
            "Error" | "error" => ErrorKind::GenericError,
            other => {
                tracing::debug!(kind = other, "unrecognised SDK error kind; treating as generic");
                ErrorKind::GenericError
            }
        }
    }

    /// Returns `true` for causes a caller can reasonably retry.
    ///
    /// Transient network conditions and user cancellations are recoverable;
    /// everything else points at a programming or configuration problem.
    pub fn is_recoverable(self) -> bool {
        matches!(
            self,
            ErrorKind::NetworkError
                | ErrorKind::NetworkTimeout
                | ErrorKind::Canceled
                | ErrorKind::CommandAlreadyInProgress
                | ErrorKind::FailedFetchConnectionToken
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure reported by the browser-side SDK, already classified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct SdkError {
    /// Classified cause.
    pub kind: ErrorKind,
    /// Human-readable message exactly as the peer sent it.
    pub message: String,
}

impl SdkError {
    /// Builds an error from the raw `[kind, message]` pair sent by the peer.
    pub fn from_wire(kind: &str, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::from_wire(kind),
            message: message.into(),
        }
    }
}
