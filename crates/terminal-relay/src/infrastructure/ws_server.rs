//! WebSocket server: the accept loop and the per-connection message handler.
//!
//! This module is responsible for:
//!
//! 1. Accepting TCP connections on the relay's listener.
//! 2. Upgrading each connection to a WebSocket.
//! 3. Attaching it as the current peer.  A newer connection replaces an
//!    older one, whose socket is then closed.
//! 4. Running a writer task that drains the peer's outbound queue into the
//!    socket, so requests and replies never interleave mid-frame.
//! 5. Reading frames in arrival order and handing each to the
//!    [`RelaySession`].
//! 6. Detaching the peer when the socket closes, which runs the disconnect
//!    handler.
//!
//! Shutdown is triggered by clearing a shared `AtomicBool`; the accept loop
//! checks it every 200 ms.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    WebSocketStream,
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::{PeerHandle, RelayError, RelaySession};

/// How long the writer may keep flushing after the reader side has closed.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Accept loop ───────────────────────────────────────────────────────────────

/// Accepts connections on `listener` until `running` is cleared.
///
/// Each accepted connection runs in its own Tokio task so a slow handshake
/// never delays the next accept.
pub async fn run_server(
    listener: TcpListener,
    handler: MessageHandler,
    running: Arc<AtomicBool>,
) {
    match listener.local_addr() {
        Ok(addr) => info!("relay listening on ws://{addr}"),
        Err(e) => warn!("relay listening on an unknown address: {e}"),
    }

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // Short timeout so the loop notices the shutdown flag while idle.
        match timeout(Duration::from_millis(200), listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                info!("new browser connection from {peer_addr}");
                let handler = handler.clone();
                tokio::spawn(async move {
                    handler.handle_tcp(stream, peer_addr).await;
                });
            }
            Ok(Err(e)) => {
                // Transient (e.g. out of file descriptors); keep serving.
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }
}

// ── Per-connection handler ────────────────────────────────────────────────────

/// Serves one peer connection against the relay's session.
///
/// Cheap to clone; every clone feeds the same session.
#[derive(Debug, Clone)]
pub struct MessageHandler {
    session: Arc<RelaySession>,
}

impl MessageHandler {
    pub fn new(session: Arc<RelaySession>) -> Self {
        Self { session }
    }

    /// Completes the WebSocket handshake on `stream` and serves it until it
    /// closes, logging the outcome.
    pub async fn handle_tcp(&self, stream: TcpStream, peer_addr: SocketAddr) {
        match self.run_tcp(stream, peer_addr).await {
            Ok(()) => info!("session {peer_addr} closed normally"),
            Err(e) => warn!("session {peer_addr} closed with error: {e:#}"),
        }
    }

    async fn run_tcp(&self, stream: TcpStream, peer_addr: SocketAddr) -> anyhow::Result<()> {
        let ws_stream = accept_async(stream)
            .await
            .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;
        debug!("WebSocket session established: {peer_addr}");
        self.serve(ws_stream).await?;
        Ok(())
    }

    /// Serves an already-upgraded WebSocket until it closes.
    ///
    /// # Errors
    ///
    /// Returns the disconnect handler's error, if it failed.
    pub async fn serve<S>(&self, ws_stream: WebSocketStream<S>) -> Result<(), RelayError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let connection_id = Uuid::new_v4();
        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();

        let peer = PeerHandle::new(connection_id, out_tx.clone());
        let superseded = peer.superseded();
        self.session.attach(peer);

        let writer = tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if let Err(e) = ws_tx.send(WsMessage::Text(frame)).await {
                    debug!(%connection_id, "WebSocket send failed: {e}");
                    break;
                }
            }
            let _ = ws_tx.close().await;
        });

        let outcome = self
            .receive(connection_id, &mut ws_rx, &out_tx, &superseded)
            .await;

        // Dropping every sender lets the writer flush what is queued and stop.
        drop(out_tx);
        let detached = self.session.detach(connection_id);
        if timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
            debug!(%connection_id, "writer still draining; leaving it behind");
        }

        outcome.and(detached)
    }

    /// Reads frames in order until the peer goes away or a newer connection
    /// replaces it.
    async fn receive<R>(
        &self,
        connection_id: Uuid,
        ws_rx: &mut R,
        out_tx: &mpsc::UnboundedSender<String>,
        superseded: &CancellationToken,
    ) -> Result<(), RelayError>
    where
        R: Stream<Item = Result<WsMessage, WsError>> + Unpin,
    {
        loop {
            let frame = tokio::select! {
                biased;
                _ = superseded.cancelled() => {
                    info!(%connection_id, "connection replaced by a newer peer; closing");
                    break;
                }
                frame = ws_rx.next() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };

            let text = match frame {
                Ok(WsMessage::Text(text)) => text,
                Ok(WsMessage::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(_) => {
                        warn!(%connection_id, "non-UTF-8 binary frame (ignored)");
                        continue;
                    }
                },
                Ok(WsMessage::Close(_)) => {
                    debug!(%connection_id, "WebSocket Close frame received");
                    break;
                }
                Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_)) => continue,
                Err(WsError::ConnectionClosed | WsError::Protocol(_)) => {
                    debug!(%connection_id, "browser WebSocket closed");
                    break;
                }
                Err(e) => {
                    warn!(%connection_id, "browser WebSocket error: {e}");
                    break;
                }
            };

            if let Some(reply) = self.session.handle_frame(connection_id, &text).await? {
                if out_tx.send(reply).is_err() {
                    break;
                }
            }
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
