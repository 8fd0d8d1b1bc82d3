//! Relay lifecycle: startup, the public call surface and the process-wide
//! singleton.
//!
//! # Startup
//!
//! [`Relay::start`]:
//!
//! 1. Adds the built-in `connection_token` property (unless the host defined
//!    its own).
//! 2. Binds every SDK method of the definition to a fresh correlator.
//! 3. Binds the WebSocket listener.
//! 4. Starts the browser client through the [`ClientLauncher`].
//! 5. Spawns the accept loop and returns; it does not wait for the page.
//!
//! Calls made before the page connects simply wait (up to the connect
//! timeout) for it to attach.
//!
//! # One relay per process
//!
//! A second relay on the same port would fail to bind, and two relays driving
//! one terminal would interleave calls.  [`relay_instance`] hands out the one
//! relay of this process, starting it on first use.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::info;

use relay_core::ProtocolError;

use crate::application::{
    bind_interface, BoundInterface, BoundStub, ConnectionState, Correlator, CorrelatorSettings,
    DisconnectHandler, HostAttribute, InterfaceDefinition, RelayError, RelaySession,
    CONNECTION_TOKEN,
};
use crate::domain::{CallArgs, RelayConfig};
use crate::infrastructure::launcher::ClientLauncher;
use crate::infrastructure::token::TokenIssuer;
use crate::infrastructure::ws_server::{run_server, MessageHandler};

/// A running relay bound to one interface definition.
#[derive(Debug)]
pub struct Relay {
    interface: BoundInterface,
    session: Arc<RelaySession>,
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
}

impl Relay {
    /// Starts a relay serving `definition`.
    ///
    /// # Errors
    ///
    /// - [`RelayError::Bind`] if the listener address is unavailable.
    /// - [`RelayError::Launch`] if the browser client cannot be started.
    pub async fn start(
        mut definition: InterfaceDefinition,
        config: &RelayConfig,
        launcher: &dyn ClientLauncher,
        tokens: Arc<dyn TokenIssuer>,
    ) -> Result<Arc<Relay>, RelayError> {
        definition.provide_default(
            CONNECTION_TOKEN,
            HostAttribute::property(move || {
                let tokens = Arc::clone(&tokens);
                async move {
                    let token = tokens.issue().await?;
                    serde_json::to_value(token)
                        .map_err(|e| RelayError::Protocol(ProtocolError::Serialize(e.to_string())))
                }
            }),
        );

        let correlator = Arc::new(Correlator::new(CorrelatorSettings::from(config)));
        let interface = bind_interface(&definition, Arc::clone(&correlator));
        let session = Arc::new(RelaySession::new(&definition, correlator));

        let listener = TcpListener::bind(config.ws_bind_addr)
            .await
            .map_err(|source| RelayError::Bind {
                addr: config.ws_bind_addr,
                source,
            })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| RelayError::Bind {
                addr: config.ws_bind_addr,
                source,
            })?;

        launcher.launch(&config.client_host, config.http_port)?;

        let running = Arc::new(AtomicBool::new(true));
        tokio::spawn(run_server(
            listener,
            MessageHandler::new(Arc::clone(&session)),
            Arc::clone(&running),
        ));

        info!(
            type_name = interface.type_name(),
            %local_addr,
            methods = definition.sdk_methods().count(),
            "relay started"
        );

        Ok(Arc::new(Relay {
            interface,
            session,
            local_addr,
            running,
        }))
    }

    /// Address the listener actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Host type name of the bound interface.
    pub fn type_name(&self) -> &str {
        self.interface.type_name()
    }

    /// The stub for SDK method `method`.
    ///
    /// # Errors
    ///
    /// [`RelayError::UnknownMethod`] if the interface has no such method.
    pub fn stub(&self, method: &str) -> Result<&BoundStub, RelayError> {
        self.interface.stub(method)
    }

    /// Calls SDK method `method` and returns its handler's result.
    pub async fn call(&self, method: &str, args: CallArgs) -> Result<Value, RelayError> {
        self.stub(method)?.call(args).await
    }

    /// Like [`call`](Self::call) with a cancellation token.
    pub async fn call_with_cancel(
        &self,
        method: &str,
        args: CallArgs,
        cancel: &CancellationToken,
    ) -> Result<Value, RelayError> {
        self.stub(method)?.call_with_cancel(args, cancel).await
    }

    /// Calls `method` and deserializes the handler's result into `T`.
    pub async fn call_as<T: DeserializeOwned>(
        &self,
        method: &str,
        args: CallArgs,
    ) -> Result<T, RelayError> {
        let value = self.call(method, args).await?;
        serde_json::from_value(value).map_err(|e| {
            RelayError::Protocol(ProtocolError::MalformedReply {
                id: None,
                reason: e.to_string(),
            })
        })
    }

    /// The correlator every stub sends through.
    pub fn remote_call_executor(&self) -> &Arc<Correlator> {
        self.session.correlator()
    }

    /// A handler that serves WebSocket connections against this relay.
    pub fn message_handler(&self) -> MessageHandler {
        MessageHandler::new(Arc::clone(&self.session))
    }

    /// Currently installed disconnect handler.
    pub fn disconnect_handler(&self) -> DisconnectHandler {
        self.session.disconnect_handler()
    }

    /// Replaces the disconnect handler.
    pub fn set_disconnect_handler(&self, handler: DisconnectHandler) {
        self.session.set_disconnect_handler(handler);
    }

    /// Current connection state of the peer.
    pub fn connection_state(&self) -> ConnectionState {
        self.remote_call_executor().state()
    }

    /// Waits for a peer to attach, up to the connect timeout.
    pub async fn wait_connected(&self) -> Result<(), RelayError> {
        self.remote_call_executor().wait_connected().await
    }

    /// Stops accepting new connections.  Attached peers keep being served
    /// until they close.
    pub fn shutdown(&self) {
        info!(local_addr = %self.local_addr, "relay shutting down");
        self.running.store(false, Ordering::Relaxed);
    }
}

// ── Singleton ─────────────────────────────────────────────────────────────────

/// Holds at most one relay; the first successful start wins.
pub struct SessionGuard {
    cell: OnceCell<Arc<Relay>>,
}

impl SessionGuard {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::const_new(),
        }
    }

    /// Returns the held relay, running `start` first if there is none.
    ///
    /// Concurrent callers wait for the same start.  A failed start leaves
    /// the guard empty so a later call can retry.
    pub async fn get_or_start<F, Fut>(&self, start: F) -> Result<Arc<Relay>, RelayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Arc<Relay>, RelayError>>,
    {
        self.cell.get_or_try_init(start).await.map(Arc::clone)
    }

    /// The held relay, if started.
    pub fn get(&self) -> Option<Arc<Relay>> {
        self.cell.get().cloned()
    }
}

impl Default for SessionGuard {
    fn default() -> Self {
        Self::new()
    }
}

static PROCESS_RELAY: SessionGuard = SessionGuard::new();

/// The process-wide relay, started with these arguments on first use.
/// Later calls return the same relay and ignore their arguments.
pub async fn relay_instance(
    definition: InterfaceDefinition,
    config: &RelayConfig,
    launcher: &dyn ClientLauncher,
    tokens: Arc<dyn TokenIssuer>,
) -> Result<Arc<Relay>, RelayError> {
    PROCESS_RELAY
        .get_or_start(|| Relay::start(definition, config, launcher, tokens))
        .await
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::application::terminal_interface;
    use crate::infrastructure::launcher::{MockClientLauncher, NoopLauncher};
    use crate::infrastructure::token::{ConnectionToken, MockTokenIssuer, StaticTokenIssuer};

    fn loopback_config() -> RelayConfig {
        RelayConfig {
            ws_bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..RelayConfig::default()
        }
    }

    #[tokio::test]
    async fn test_start_launches_client_with_configured_host_and_port() {
        // Arrange
        let mut launcher = MockClientLauncher::new();
        launcher.expect_launch().times(1).returning(|host, port| {
            assert_eq!(host, "localhost");
            assert_eq!(port, 8000);
            Ok(())
        });

        // Act
        let relay = Relay::start(
            terminal_interface(),
            &loopback_config(),
            &launcher,
            Arc::new(StaticTokenIssuer::new("pst")),
        )
        .await
        .unwrap();

        // Assert
        assert_ne!(relay.local_addr().port(), 0);
        assert_eq!(relay.type_name(), "StripeTerminal");
        assert_eq!(relay.connection_state(), ConnectionState::Disconnected);
        relay.shutdown();
    }

    #[tokio::test]
    async fn test_launch_failure_aborts_start() {
        let mut launcher = MockClientLauncher::new();
        launcher
            .expect_launch()
            .returning(|_, _| Err(RelayError::Launch("no browser".to_string())));

        let result = Relay::start(
            terminal_interface(),
            &loopback_config(),
            &launcher,
            Arc::new(StaticTokenIssuer::new("pst")),
        )
        .await;

        assert!(matches!(result, Err(RelayError::Launch(_))));
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        // Arrange: occupy a port first
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let config = RelayConfig {
            ws_bind_addr: taken.local_addr().unwrap(),
            ..RelayConfig::default()
        };

        // Act
        let result = Relay::start(
            terminal_interface(),
            &config,
            &NoopLauncher,
            Arc::new(StaticTokenIssuer::new("pst")),
        )
        .await;

        // Assert
        assert!(matches!(result, Err(RelayError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_connection_token_property_uses_issuer() {
        // Arrange
        let mut tokens = MockTokenIssuer::new();
        tokens.expect_issue().times(1).returning(|| {
            Ok(ConnectionToken {
                secret: "pst_mock".to_string(),
            })
        });
        let relay = Relay::start(
            terminal_interface(),
            &loopback_config(),
            &NoopLauncher,
            Arc::new(tokens),
        )
        .await
        .unwrap();

        // Act
        let reply = relay
            .session
            .dispatch(relay_core::RelayRequest::new(
                CONNECTION_TOKEN,
                vec![],
                serde_json::Map::new(),
            ))
            .await
            .unwrap();

        // Assert
        assert_eq!(reply.result, json!({ "secret": "pst_mock" }));
        relay.shutdown();
    }

    #[tokio::test]
    async fn test_unknown_method_fails_without_io() {
        let relay = Relay::start(
            terminal_interface(),
            &loopback_config(),
            &NoopLauncher,
            Arc::new(StaticTokenIssuer::new("pst")),
        )
        .await
        .unwrap();

        let err = relay.call("refund_everything", CallArgs::new()).await.unwrap_err();

        assert!(matches!(err, RelayError::UnknownMethod { .. }));
        relay.shutdown();
    }

    #[tokio::test]
    async fn test_session_guard_starts_once() {
        // Arrange
        let guard = SessionGuard::new();
        let config = loopback_config();

        // Act
        let first = guard
            .get_or_start(|| {
                Relay::start(
                    terminal_interface(),
                    &config,
                    &NoopLauncher,
                    Arc::new(StaticTokenIssuer::new("pst")),
                )
            })
            .await
            .unwrap();
        let second = guard
            .get_or_start(|| async { Err(RelayError::Launch("second start".to_string())) })
            .await
            .unwrap();

        // Assert
        assert!(Arc::ptr_eq(&first, &second));
        assert!(guard.get().is_some());
        first.shutdown();
    }

    #[tokio::test]
    async fn test_session_guard_retries_after_failed_start() {
        let guard = SessionGuard::new();

        let failed = guard
            .get_or_start(|| async { Err(RelayError::Launch("nope".to_string())) })
            .await;
        assert!(failed.is_err());
        assert!(guard.get().is_none());

        let config = RelayConfig {
            ws_bind_addr: "127.0.0.1:0".parse().unwrap(),
            ..RelayConfig::default()
        };
        let relay = guard
            .get_or_start(|| {
                Relay::start(
                    terminal_interface(),
                    &config,
                    &NoopLauncher,
                    Arc::new(StaticTokenIssuer::new("pst")),
                )
            })
            .await
            .unwrap();
        relay.shutdown();
    }
}
