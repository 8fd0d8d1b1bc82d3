//! Call correlation: sends host requests to the attached peer and pairs each
//! reply with the call that is waiting for it.
//!
//! # How replies find their caller
//!
//! Every request gets an id from [`RequestIdCounter`] and a one-shot channel
//! in the pending map.  A reply tagged `{"id": n, "reply": ...}` resolves
//! entry `n`; an untagged reply resolves the oldest pending entry.  Because a
//! plain page does not echo ids, calls are serialised through a gate unless
//! [`CorrelatorSettings::tagged_replies`] is set, so at most one untagged call
//! is ever in flight.
//!
//! # Failure modes
//!
//! | Situation                             | Result                        |
//! |---------------------------------------|-------------------------------|
//! | no peer within `connect_timeout`      | [`RelayError::NotConnected`]  |
//! | no reply within `call_timeout`        | [`RelayError::Timeout`]       |
//! | peer detached or replaced mid-call    | [`RelayError::Disconnected`]  |
//! | caller's token cancelled              | [`RelayError::Cancelled`]     |
//!
//! A call that gives up after its request went out (timeout, cancellation,
//! dropped future) leaves its reply owed.  Untagged mode counts such calls as
//! orphans and discards that many untagged replies before resolving the next
//! waiter, so a late reply never resolves a different call.  The count resets
//! whenever a peer attaches or detaches.

use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use relay_core::protocol::RequestIdCounter;
use relay_core::{encode_request, RawReply, RelayRequest, ReplyPayload};

use crate::application::error::RelayError;
use crate::domain::RelayConfig;

/// Whether a browser peer is currently attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Outbound side of one attached peer connection.
#[derive(Debug, Clone)]
pub struct PeerHandle {
    connection_id: Uuid,
    outbound: mpsc::UnboundedSender<String>,
    superseded: CancellationToken,
}

impl PeerHandle {
    /// Wraps the writer queue of connection `connection_id`.
    pub fn new(connection_id: Uuid, outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            connection_id,
            outbound,
            superseded: CancellationToken::new(),
        }
    }

    /// Identifier used in logs and by [`Correlator::detach`].
    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// Cancelled when a newer connection replaces this one.
    pub fn superseded(&self) -> CancellationToken {
        self.superseded.clone()
    }

    /// Queues one text frame for the connection's writer task.
    pub fn send(&self, frame: String) -> Result<(), RelayError> {
        self.outbound
            .send(frame)
            .map_err(|_| RelayError::Disconnected)
    }
}

/// Timing and ordering knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrelatorSettings {
    pub connect_timeout: Duration,
    pub call_timeout: Duration,
    pub tagged_replies: bool,
}

impl From<&RelayConfig> for CorrelatorSettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            call_timeout: config.call_timeout(),
            tagged_replies: config.tagged_replies,
        }
    }
}

impl Default for CorrelatorSettings {
    fn default() -> Self {
        CorrelatorSettings::from(&RelayConfig::default())
    }
}

type Waiter = oneshot::Sender<Result<ReplyPayload, RelayError>>;

#[derive(Default)]
struct PendingCalls {
    waiters: BTreeMap<u64, Waiter>,
    /// Untagged requests whose caller gave up after the frame was sent.
    orphaned: usize,
}

impl PendingCalls {
    /// Forgets every waiter and orphan; returns the waiters.
    fn clear(&mut self) -> BTreeMap<u64, Waiter> {
        self.orphaned = 0;
        std::mem::take(&mut self.waiters)
    }
}

/// Removes a pending entry when the owning call finishes or is dropped.
///
/// An entry still present at that point was never answered; if its request
/// reached an untagged peer the reply is still owed and counts as orphaned.
struct PendingGuard<'a> {
    id: u64,
    pending: &'a Mutex<PendingCalls>,
    sent: bool,
    untagged: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut pending = self.pending.lock();
        if pending.waiters.remove(&self.id).is_some() && self.sent && self.untagged {
            pending.orphaned += 1;
            debug!(id = self.id, orphaned = pending.orphaned, "call abandoned with reply owed");
        }
    }
}

/// Routes host requests to the peer and replies back to their callers.
pub struct Correlator {
    ids: RequestIdCounter,
    pending: Mutex<PendingCalls>,
    peer: Mutex<Option<PeerHandle>>,
    state: watch::Sender<ConnectionState>,
    call_gate: tokio::sync::Mutex<()>,
    settings: CorrelatorSettings,
}

impl Correlator {
    /// Creates a correlator with no peer attached.
    pub fn new(settings: CorrelatorSettings) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            ids: RequestIdCounter::new(),
            pending: Mutex::new(PendingCalls::default()),
            peer: Mutex::new(None),
            state,
            call_gate: tokio::sync::Mutex::new(()),
            settings,
        }
    }

    /// Settings this correlator was built with.
    pub fn settings(&self) -> CorrelatorSettings {
        self.settings
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// `true` while a peer is attached.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Watches connection state changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Number of calls waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().waiters.len()
    }

    /// Number of untagged replies still owed to calls that gave up.
    pub fn orphaned_count(&self) -> usize {
        self.pending.lock().orphaned
    }

    /// `true` if `connection_id` is the attached peer.
    pub fn is_current(&self, connection_id: Uuid) -> bool {
        self.peer.lock().as_ref().map(PeerHandle::connection_id) == Some(connection_id)
    }

    /// Makes `peer` the current peer and returns the one it replaces.
    ///
    /// Calls in flight on the replaced peer fail with
    /// [`RelayError::Disconnected`]; their replies can no longer arrive.  The
    /// replaced peer's [`superseded`](PeerHandle::superseded) token is
    /// cancelled.
    pub fn attach(&self, peer: PeerHandle) -> Option<PeerHandle> {
        let previous = self.peer.lock().replace(peer);
        if let Some(previous) = &previous {
            previous.superseded.cancel();
            self.fail_pending();
        }
        self.state.send_replace(ConnectionState::Connected);
        previous
    }

    /// Clears the current peer if it is `connection_id`.
    ///
    /// Returns `false` (and changes nothing) when a newer connection has
    /// already replaced it.
    pub fn detach(&self, connection_id: Uuid) -> bool {
        {
            let mut peer = self.peer.lock();
            if peer.as_ref().map(PeerHandle::connection_id) != Some(connection_id) {
                return false;
            }
            *peer = None;
        }
        self.state.send_replace(ConnectionState::Disconnected);
        self.fail_pending();
        true
    }

    /// Drops every pending sender; each waiter observes a closed channel.
    fn fail_pending(&self) {
        let failed = self.pending.lock().clear();
        if !failed.is_empty() {
            debug!(count = failed.len(), "failing calls pending on a lost peer");
        }
    }

    /// Waits until a peer is attached, up to the connect timeout.
    ///
    /// # Errors
    ///
    /// [`RelayError::NotConnected`] if no peer attaches in time.
    pub async fn wait_connected(&self) -> Result<(), RelayError> {
        let mut state = self.state.subscribe();
        let attached = tokio::time::timeout(
            self.settings.connect_timeout,
            state.wait_for(|s| *s == ConnectionState::Connected),
        )
        .await;
        match attached {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) | Err(_) => Err(RelayError::NotConnected),
        }
    }

    /// Sends `request` and waits for its reply.
    ///
    /// The request id is assigned here; any id already on `request` is
    /// replaced.
    ///
    /// # Errors
    ///
    /// See the module-level failure table.
    pub async fn send_and_await(
        &self,
        request: RelayRequest,
        cancel: &CancellationToken,
    ) -> Result<ReplyPayload, RelayError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RelayError::Cancelled),
            reply = self.exchange(request) => reply,
        }
    }

    async fn exchange(&self, request: RelayRequest) -> Result<ReplyPayload, RelayError> {
        let _gate = if self.settings.tagged_replies {
            None
        } else {
            Some(self.call_gate.lock().await)
        };

        self.wait_connected().await?;

        let id = self.ids.next_id();
        let request = request.with_id(id);
        let frame = encode_request(&request)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().waiters.insert(id, tx);
        let mut guard = PendingGuard {
            id,
            pending: &self.pending,
            sent: false,
            untagged: !self.settings.tagged_replies,
        };

        let peer = self.peer.lock().clone().ok_or(RelayError::NotConnected)?;
        debug!(
            id,
            attribute = %request.attribute,
            connection_id = %peer.connection_id(),
            "sending relay request"
        );
        peer.send(frame)?;
        guard.sent = true;

        match tokio::time::timeout(self.settings.call_timeout, rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(RelayError::Disconnected),
            Err(_) => {
                warn!(id, attribute = %request.attribute, "relay call timed out");
                Err(RelayError::Timeout(self.settings.call_timeout))
            }
        }
    }

    /// Hands `reply` to the call it answers.
    ///
    /// Returns `false` when no call was waiting for it; the reply is dropped.
    pub fn deliver(&self, reply: RawReply) -> bool {
        self.resolve(reply.id, Ok(reply.payload))
    }

    /// Fails the call a reply was meant for with `error`, for replies that
    /// arrived but could not be decoded.
    pub fn reject(&self, id: Option<u64>, error: RelayError) -> bool {
        self.resolve(id, Err(error))
    }

    fn resolve(&self, id: Option<u64>, outcome: Result<ReplyPayload, RelayError>) -> bool {
        let waiter = {
            let mut pending = self.pending.lock();
            match id {
                Some(id) => pending.waiters.remove(&id),
                None if pending.orphaned > 0 => {
                    pending.orphaned -= 1;
                    debug!(
                        orphaned = pending.orphaned,
                        "discarding late reply to an abandoned call"
                    );
                    return false;
                }
                None => pending.waiters.pop_first().map(|(_, tx)| tx),
            }
        };

        match waiter {
            Some(tx) => tx.send(outcome).is_ok(),
            None => {
                warn!(id = ?id, "dropping reply with no waiting call");
                false
            }
        }
    }
}

impl std::fmt::Debug for Correlator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Correlator")
            .field("state", &self.state())
            .field("pending", &self.pending_count())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
