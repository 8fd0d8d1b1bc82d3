//! The payment-terminal interface: the SDK methods of the browser's
//! `StripeTerminal` object, exposed to the host as relay stubs.
//!
//! The page calls `terminal[attribute](...args, kwargs)`, so keyword
//! arguments arrive as the SDK method's trailing options object.  Most SDK
//! promises resolve to either `{"error": ...}` (turned into
//! [`RelayError::Sdk`] before any handler runs) or an object holding one
//! interesting field; the handlers below pick that field out.
//!
//! | host method                       | SDK attribute                  | returns               |
//! |-----------------------------------|--------------------------------|-----------------------|
//! | `discover_readers`                | `discoverReaders`              | `discoveredReaders`   |
//! | `connect_reader`                  | `connectReader`                | `reader`              |
//! | `disconnect_reader`               | `disconnectReader`             | reply as-is           |
//! | `get_connection_status`           | `getConnectionStatus`          | status string         |
//! | `get_payment_status`              | `getPaymentStatus`             | status string         |
//! | `clear_cached_credentials`        | `clearCachedCredentials`       | reply as-is           |
//! | `collect_payment_method`          | `collectPaymentMethod`         | `paymentIntent`       |
//! | `cancel_collect_payment_method`   | `cancelCollectPaymentMethod`   | reply as-is           |
//! | `process_payment`                 | `processPayment`               | `paymentIntent`       |
//! | `read_reusable_card`              | `readReusableCard`             | `payment_method`      |
//! | `cancel_read_reusable_card`       | `cancelReadReusableCard`       | reply as-is           |
//! | `set_reader_display`              | `setReaderDisplay`             | reply as-is           |
//! | `clear_reader_display`            | `clearReaderDisplay`           | reply as-is           |
//! | `set_simulator_configuration`     | `setSimulatorConfiguration`    | reply as-is           |
//!
//! `setSimulatorConfiguration` resolves to nothing in the SDK, which the page
//! forwards as `undefined`; callers see [`RelayError::AttributeNotFound`]
//! after the configuration has been applied.

use serde_json::Value;

use crate::application::error::RelayError;
use crate::application::interface::{InterfaceBuilder, InterfaceDefinition};
use crate::domain::CallArgs;

/// Host-side type name of the terminal interface.
pub const TERMINAL_TYPE_NAME: &str = "StripeTerminal";

/// Returns `reply[field]`.
///
/// # Errors
///
/// [`RelayError::Handler`] if the reply is not an object with `field`.
pub fn extract_field(reply: Value, field: &str) -> Result<Value, RelayError> {
    match reply {
        Value::Object(mut map) => map
            .remove(field)
            .ok_or_else(|| RelayError::handler(format!("SDK reply has no '{field}' field"))),
        other => Err(RelayError::handler(format!(
            "expected an object with '{field}', got {other}"
        ))),
    }
}

fn field_of(field: &'static str) -> impl Fn(Value, &CallArgs) -> Result<Value, RelayError> {
    move |reply, _args| extract_field(reply, field)
}

/// Builder pre-loaded with every terminal SDK method, so a host can add its
/// own attributes before building.
pub fn terminal_builder() -> InterfaceBuilder {
    InterfaceDefinition::builder(TERMINAL_TYPE_NAME)
        // Readers
        .sdk_method_sync(
            "discover_readers",
            "discoverReaders",
            field_of("discoveredReaders"),
        )
        .sdk_method_sync("connect_reader", "connectReader", field_of("reader"))
        .passthrough("disconnect_reader", "disconnectReader")
        .passthrough("get_connection_status", "getConnectionStatus")
        .passthrough("get_payment_status", "getPaymentStatus")
        .passthrough("clear_cached_credentials", "clearCachedCredentials")
        // Payments
        .sdk_method_sync(
            "collect_payment_method",
            "collectPaymentMethod",
            field_of("paymentIntent"),
        )
        .passthrough("cancel_collect_payment_method", "cancelCollectPaymentMethod")
        .sdk_method_sync("process_payment", "processPayment", field_of("paymentIntent"))
        .sdk_method_sync(
            "read_reusable_card",
            "readReusableCard",
            field_of("payment_method"),
        )
        .passthrough("cancel_read_reusable_card", "cancelReadReusableCard")
        // Reader display and simulator
        .passthrough("set_reader_display", "setReaderDisplay")
        .passthrough("clear_reader_display", "clearReaderDisplay")
        .passthrough("set_simulator_configuration", "setSimulatorConfiguration")
}

/// The terminal interface with no extra host attributes.
pub fn terminal_interface() -> InterfaceDefinition {
    terminal_builder().build()
}
