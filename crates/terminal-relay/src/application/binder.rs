//! Remote method binding: turns the SDK methods of an
//! [`InterfaceDefinition`] into stubs that call through the [`Correlator`].
//!
//! Binding happens once per definition.  Each stub:
//!
//! 1. Builds `{"attribute": <remote name>, "args": [...], "kwargs": {...}}`.
//! 2. Sends it and waits for the correlated reply.
//! 3. Maps `undefined` to [`RelayError::AttributeNotFound`] and an error tag
//!    to [`RelayError::Sdk`]; the handler never runs in either case.
//! 4. Otherwise runs the method's handler with `(reply, args)` and returns
//!    the handler's result.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use relay_core::{RelayRequest, ReplyPayload};

use crate::application::correlator::Correlator;
use crate::application::error::RelayError;
use crate::application::interface::{BoundMethodDescriptor, InterfaceDefinition};
use crate::domain::CallArgs;

/// Builds the wire request for one invocation of `descriptor`.
pub fn build_request(descriptor: &BoundMethodDescriptor, args: &CallArgs) -> RelayRequest {
    RelayRequest::new(
        descriptor.attribute(),
        args.args.clone(),
        args.kwargs.clone(),
    )
}

/// Turns a decoded reply into the stub's result.
///
/// # Errors
///
/// - [`RelayError::AttributeNotFound`] for an `undefined` reply.
/// - [`RelayError::Sdk`] for an error-tagged reply.
/// - Whatever the handler returns otherwise.
pub async fn translate_reply(
    type_name: &str,
    descriptor: &BoundMethodDescriptor,
    payload: ReplyPayload,
    args: CallArgs,
) -> Result<Value, RelayError> {
    match payload {
        ReplyPayload::Undefined => Err(RelayError::AttributeNotFound {
            type_name: type_name.to_string(),
            method: descriptor.name().to_string(),
        }),
        ReplyPayload::Error(e) => Err(RelayError::Sdk(e)),
        ReplyPayload::Value(reply) => descriptor.handle(reply, args).await,
    }
}

/// A host-callable proxy for one SDK method.
#[derive(Debug, Clone)]
pub struct BoundStub {
    type_name: Arc<str>,
    descriptor: BoundMethodDescriptor,
    correlator: Arc<Correlator>,
}

impl BoundStub {
    /// The definition this stub was bound from.
    pub fn descriptor(&self) -> &BoundMethodDescriptor {
        &self.descriptor
    }

    /// Invokes the SDK method and returns the handler's result.
    pub async fn call(&self, args: CallArgs) -> Result<Value, RelayError> {
        self.call_with_cancel(args, &CancellationToken::new()).await
    }

    /// Like [`call`](Self::call), aborting with [`RelayError::Cancelled`]
    /// when `cancel` fires.
    pub async fn call_with_cancel(
        &self,
        args: CallArgs,
        cancel: &CancellationToken,
    ) -> Result<Value, RelayError> {
        let request = build_request(&self.descriptor, &args);
        let payload = self.correlator.send_and_await(request, cancel).await?;
        debug!(method = self.descriptor.name(), "relay reply received");
        translate_reply(&self.type_name, &self.descriptor, payload, args).await
    }
}

/// All stubs of one bound definition, keyed by host-side method name.
#[derive(Debug, Clone)]
pub struct BoundInterface {
    type_name: Arc<str>,
    stubs: HashMap<String, BoundStub>,
}

impl BoundInterface {
    /// Host type name.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Looks up a stub.
    ///
    /// # Errors
    ///
    /// [`RelayError::UnknownMethod`] if the definition declared no such
    /// method.
    pub fn stub(&self, method: &str) -> Result<&BoundStub, RelayError> {
        self.stubs.get(method).ok_or_else(|| RelayError::UnknownMethod {
            type_name: self.type_name.to_string(),
            method: method.to_string(),
        })
    }

    /// Names of every bound method.
    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.stubs.keys().map(String::as_str)
    }
}

/// Binds every SDK method of `definition` to `correlator`.
pub fn bind_interface(
    definition: &InterfaceDefinition,
    correlator: Arc<Correlator>,
) -> BoundInterface {
    let type_name: Arc<str> = Arc::from(definition.type_name());
    let stubs = definition
        .sdk_methods()
        .map(|descriptor| {
            let stub = BoundStub {
                type_name: Arc::clone(&type_name),
                descriptor: descriptor.clone(),
                correlator: Arc::clone(&correlator),
            };
            (descriptor.name().to_string(), stub)
        })
        .collect();
    BoundInterface { type_name, stubs }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use relay_core::{decode_inbound, ErrorKind, Inbound, RawReply, SdkError};
    use serde_json::json;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use crate::application::correlator::{CorrelatorSettings, PeerHandle};

    fn definition(calls: Arc<AtomicUsize>) -> InterfaceDefinition {
        InterfaceDefinition::builder("StripeTerminal")
            .sdk_method_sync("discover_readers", "discoverReaders", move |reply, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(reply["discoveredReaders"].clone())
            })
            .build()
    }

    fn connected() -> (Arc<Correlator>, mpsc::UnboundedReceiver<String>) {
        let correlator = Arc::new(Correlator::new(CorrelatorSettings {
            connect_timeout: Duration::from_millis(200),
            call_timeout: Duration::from_secs(2),
            tagged_replies: false,
        }));
        let (tx, rx) = mpsc::unbounded_channel();
        correlator.attach(PeerHandle::new(Uuid::new_v4(), tx));
        (correlator, rx)
    }

    /// Plays the page: waits for one request and answers it with `reply`.
    fn answer_once(
        correlator: Arc<Correlator>,
        mut outbound: mpsc::UnboundedReceiver<String>,
        reply: ReplyPayload,
    ) -> tokio::task::JoinHandle<relay_core::RelayRequest> {
        tokio::spawn(async move {
            let frame = outbound.recv().await.unwrap();
            let request = match decode_inbound(&frame).unwrap() {
                Inbound::PeerRequest(r) => r,
                other => panic!("unexpected frame {other:?}"),
            };
            correlator.deliver(RawReply::untagged(reply));
            request
        })
    }

    #[test]
    fn test_build_request_uses_remote_attribute() {
        let definition = definition(Arc::new(AtomicUsize::new(0)));
        let descriptor = definition.sdk_method("discover_readers").unwrap();

        let req = build_request(descriptor, &CallArgs::new().kwarg("simulated", true));

        assert_eq!(req.attribute, "discoverReaders");
        assert!(req.args.is_empty());
        assert_eq!(req.kwargs["simulated"], json!(true));
    }

    #[tokio::test]
    async fn test_stub_sends_request_and_runs_handler() {
        // Arrange
        let calls = Arc::new(AtomicUsize::new(0));
        let (correlator, outbound) = connected();
        let bound = bind_interface(&definition(Arc::clone(&calls)), Arc::clone(&correlator));
        let page = answer_once(
            correlator,
            outbound,
            ReplyPayload::Value(json!({ "discoveredReaders": [{ "id": "r1" }] })),
        );

        // Act
        let out = bound
            .stub("discover_readers")
            .unwrap()
            .call(CallArgs::new().kwarg("simulated", true))
            .await
            .unwrap();

        // Assert
        let sent = page.await.unwrap();
        assert_eq!(sent.attribute, "discoverReaders");
        assert_eq!(sent.kwargs["simulated"], json!(true));
        assert_eq!(out, json!([{ "id": "r1" }]));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_undefined_reply_is_attribute_not_found() {
        // Arrange
        let calls = Arc::new(AtomicUsize::new(0));
        let (correlator, outbound) = connected();
        let bound = bind_interface(&definition(Arc::clone(&calls)), Arc::clone(&correlator));
        let _page = answer_once(correlator, outbound, ReplyPayload::Undefined);

        // Act
        let err = bound
            .stub("discover_readers")
            .unwrap()
            .call(CallArgs::new())
            .await
            .unwrap_err();

        // Assert
        match err {
            RelayError::AttributeNotFound { type_name, method } => {
                assert_eq!(type_name, "StripeTerminal");
                assert_eq!(method, "discover_readers");
            }
            other => panic!("expected AttributeNotFound, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0, "handler must not run");
    }

    #[tokio::test]
    async fn test_error_reply_becomes_sdk_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (correlator, outbound) = connected();
        let bound = bind_interface(&definition(Arc::clone(&calls)), Arc::clone(&correlator));
        let _page = answer_once(
            correlator,
            outbound,
            ReplyPayload::Error(SdkError::from_wire("network_timeout", "timed out")),
        );

        let err = bound
            .stub("discover_readers")
            .unwrap()
            .call(CallArgs::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NetworkTimeout);
        assert!(matches!(err, RelayError::Sdk(ref e) if e.message == "timed out"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unknown_method_is_reported() {
        let correlator = Arc::new(Correlator::new(CorrelatorSettings::default()));
        let bound = bind_interface(&definition(Arc::new(AtomicUsize::new(0))), correlator);

        let err = bound.stub("refund").unwrap_err();

        assert!(matches!(err, RelayError::UnknownMethod { ref method, .. } if method == "refund"));
        assert_eq!(bound.type_name(), "StripeTerminal");
        assert_eq!(bound.method_names().collect::<Vec<_>>(), vec!["discover_readers"]);
    }
}
