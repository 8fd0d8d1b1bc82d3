//! Inbound dispatch for the attached peer.
//!
//! Every text frame from the page goes through [`RelaySession::handle_frame`]:
//!
//! - **Peer request** (`{attribute, args, kwargs}`) – the named host attribute
//!   is invoked (method) or read (property) and the result is sent back as
//!   `{attribute, result}`.
//! - **Reply** – handed to the [`Correlator`], which wakes the waiting call.
//!   Replies arriving on a connection that has since been replaced are
//!   dropped.
//! - **Peer reply** (`{attribute, result}`) – the host never asks for one;
//!   logged and dropped.
//!
//! Frames are handled one at a time in arrival order.  A host method called
//! by the page must therefore not itself call the page and wait for it.
//!
//! The session also owns the disconnect handler: it runs whenever the current
//! peer detaches and whenever the page reports `unexpected_reader_disconnect`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use relay_core::{
    decode_inbound, encode_peer_reply, Inbound, PeerReply, PeerRequest, ProtocolError,
};

use crate::application::correlator::{Correlator, PeerHandle};
use crate::application::error::RelayError;
use crate::application::interface::{HostAttribute, InterfaceDefinition};
use crate::domain::CallArgs;

/// Host property the page reads to obtain an SDK connection token.
pub const CONNECTION_TOKEN: &str = "connection_token";

/// Host method the page calls when the SDK reports a lost reader.
pub const UNEXPECTED_READER_DISCONNECT: &str = "unexpected_reader_disconnect";

/// Why the disconnect handler is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The WebSocket to the page closed.
    ChannelClosed,
    /// The page reported that the SDK lost its reader.
    ReaderDisconnected,
}

/// Callback run on disconnect.  An `Err` ends the peer session.
pub type DisconnectHandler = Arc<dyn Fn(DisconnectReason) -> Result<(), RelayError> + Send + Sync>;

/// The handler installed until the host sets its own: every disconnect is
/// fatal.
pub fn default_disconnect_handler() -> DisconnectHandler {
    Arc::new(|_reason| Err(RelayError::TerminalDisconnected))
}

/// Per-relay state shared by every peer connection.
pub struct RelaySession {
    type_name: String,
    host_attributes: HashMap<String, HostAttribute>,
    correlator: Arc<Correlator>,
    disconnect_handler: RwLock<DisconnectHandler>,
}

impl RelaySession {
    /// Builds a session serving the host attributes of `definition`.
    pub fn new(definition: &InterfaceDefinition, correlator: Arc<Correlator>) -> Self {
        Self {
            type_name: definition.type_name().to_string(),
            host_attributes: definition.host_attributes().clone(),
            correlator,
            disconnect_handler: RwLock::new(default_disconnect_handler()),
        }
    }

    /// Correlator the session feeds replies into.
    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }

    /// Currently installed disconnect handler.
    pub fn disconnect_handler(&self) -> DisconnectHandler {
        Arc::clone(&self.disconnect_handler.read())
    }

    /// Replaces the disconnect handler.
    pub fn set_disconnect_handler(&self, handler: DisconnectHandler) {
        *self.disconnect_handler.write() = handler;
    }

    /// Runs the disconnect handler for `reason`.
    pub fn notify_disconnect(&self, reason: DisconnectReason) -> Result<(), RelayError> {
        info!(type_name = %self.type_name, ?reason, "terminal disconnect");
        let handler = self.disconnect_handler();
        handler(reason)
    }

    /// Makes `peer` the current peer.
    pub fn attach(&self, peer: PeerHandle) {
        let connection_id = peer.connection_id();
        if let Some(previous) = self.correlator.attach(peer) {
            info!(
                %connection_id,
                replaced = %previous.connection_id(),
                "new peer replaced the attached one"
            );
        } else {
            info!(%connection_id, "peer attached");
        }
    }

    /// Detaches connection `connection_id`, running the disconnect handler
    /// if it was the current peer.
    pub fn detach(&self, connection_id: Uuid) -> Result<(), RelayError> {
        if self.correlator.detach(connection_id) {
            info!(%connection_id, "peer detached");
            self.notify_disconnect(DisconnectReason::ChannelClosed)
        } else {
            debug!(%connection_id, "superseded peer closed");
            Ok(())
        }
    }

    /// Processes one inbound text frame received on connection
    /// `connection_id`.  Returns the frame to send back, if any.
    ///
    /// A reply that cannot be interpreted fails the call it answers with
    /// [`RelayError::Protocol`]; a malformed peer request is only logged.
    ///
    /// # Errors
    ///
    /// Only a failing disconnect handler is returned; every other problem is
    /// logged and the frame is dropped.
    pub async fn handle_frame(
        &self,
        connection_id: Uuid,
        text: &str,
    ) -> Result<Option<String>, RelayError> {
        let inbound = match decode_inbound(text) {
            Ok(inbound) => inbound,
            Err(ProtocolError::MalformedReply { id, reason }) => {
                warn!(%connection_id, id = ?id, %reason, "malformed reply from peer");
                if self.is_current(connection_id) {
                    let error = ProtocolError::MalformedReply { id, reason };
                    self.correlator.reject(id, RelayError::Protocol(error));
                }
                return Ok(None);
            }
            Err(e) => {
                warn!(%connection_id, error = %e, "discarding undecodable frame");
                return Ok(None);
            }
        };

        match inbound {
            Inbound::PeerRequest(request) => {
                let reply = self.dispatch(request).await?;
                match encode_peer_reply(&reply) {
                    Ok(frame) => Ok(Some(frame)),
                    Err(e) => {
                        error!(attribute = %reply.attribute, error = %e, "cannot encode peer reply");
                        Ok(None)
                    }
                }
            }
            Inbound::Reply(reply) => {
                if self.is_current(connection_id) {
                    self.correlator.deliver(reply);
                }
                Ok(None)
            }
            Inbound::PeerReply(reply) => {
                debug!(attribute = %reply.attribute, "ignoring peer reply frame");
                Ok(None)
            }
        }
    }

    fn is_current(&self, connection_id: Uuid) -> bool {
        let current = self.correlator.is_current(connection_id);
        if !current {
            debug!(%connection_id, "dropping reply from a replaced connection");
        }
        current
    }

    /// Resolves one peer request against the host attributes.
    ///
    /// Unknown attributes and failing host callbacks answer with a `null`
    /// result.
    ///
    /// # Errors
    ///
    /// Returns the disconnect handler's error for
    /// `unexpected_reader_disconnect`.
    pub async fn dispatch(&self, request: PeerRequest) -> Result<PeerReply, RelayError> {
        let PeerRequest {
            attribute,
            args,
            kwargs,
            ..
        } = request;
        debug!(%attribute, "peer request");

        let result = match self.host_attributes.get(&attribute) {
            Some(host) => match host.resolve(CallArgs::from_parts(args, kwargs)).await {
                Ok(value) => value,
                Err(e) => {
                    error!(%attribute, error = %e, "host attribute failed");
                    Value::Null
                }
            },
            None if attribute == UNEXPECTED_READER_DISCONNECT => {
                self.notify_disconnect(DisconnectReason::ReaderDisconnected)?;
                Value::Null
            }
            None => {
                warn!(
                    type_name = %self.type_name,
                    %attribute,
                    "peer requested an unknown host attribute"
                );
                Value::Null
            }
        };

        Ok(PeerReply { attribute, result })
    }
}

impl std::fmt::Debug for RelaySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelaySession")
            .field("type_name", &self.type_name)
            .field("host_attributes", &self.host_attributes.keys().collect::<Vec<_>>())
            .field("correlator", &self.correlator)
            .finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
