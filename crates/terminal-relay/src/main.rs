//! terminal-relay — entry point.
//!
//! Starts the relay, opens the browser client and either serves until Ctrl+C
//! or runs one reader discovery and prints the result.
//!
//! # Usage
//!
//! ```text
//! terminal-relay [OPTIONS] <COMMAND>
//!
//! Commands:
//!   serve        Relay until Ctrl+C
//!   discover     Discover readers once and print them as JSON
//!   save-config  Write the effective configuration to --config
//!
//! Options:
//!   --config <PATH>            TOML config file [default: terminal-relay.toml]
//!   --ws-bind <IP>             WebSocket bind address
//!   --ws-port <PORT>           WebSocket port
//!   --client-host <HOST>       Host the browser loads the page from
//!   --http-port <PORT>         Port the page is served on
//!   --call-timeout <SECS>      Reply timeout per call
//!   --connect-timeout <SECS>   Wait for the page to connect
//!   --browser <PROGRAM>        Browser command to launch
//!   --token-secret <SECRET>    Fixed connection token secret
//! ```
//!
//! # Configuration precedence
//!
//! Built-in defaults, then the config file, then `RELAY_*` environment
//! variables and CLI flags.
//!
//! | Variable               | Overrides              |
//! |------------------------|------------------------|
//! | `RELAY_CONFIG`         | config file path       |
//! | `RELAY_WS_BIND`        | `ws_bind_addr` IP      |
//! | `RELAY_WS_PORT`        | `ws_bind_addr` port    |
//! | `RELAY_CLIENT_HOST`    | `client_host`          |
//! | `RELAY_HTTP_PORT`      | `http_port`            |
//! | `RELAY_CALL_TIMEOUT`   | `call_timeout_secs`    |
//! | `RELAY_CONNECT_TIMEOUT`| `connect_timeout_secs` |
//! | `RELAY_BROWSER`        | `launcher.program`     |
//! | `RELAY_TOKEN_SECRET`   | `token.secret`         |

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use terminal_relay::application::DisconnectReason;
use terminal_relay::domain::{load_config, save_config, CallArgs, RelayConfig};
use terminal_relay::infrastructure::{
    issuer_from_config, launcher_from_config, relay_instance, TokenIssuer,
};
use terminal_relay::terminal_interface;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Relay between a host process and a browser-hosted payment terminal SDK.
#[derive(Debug, Parser)]
#[command(
    name = "terminal-relay",
    about = "Remote-call relay for a browser-hosted payment terminal SDK",
    version
)]
struct Cli {
    /// Path of the TOML config file.  A missing file means defaults.
    #[arg(long, default_value = "terminal-relay.toml", env = "RELAY_CONFIG")]
    config: PathBuf,

    /// IP address the WebSocket listener binds to.
    #[arg(long, env = "RELAY_WS_BIND")]
    ws_bind: Option<IpAddr>,

    /// Port the WebSocket listener binds to.
    #[arg(long, env = "RELAY_WS_PORT")]
    ws_port: Option<u16>,

    /// Host name the browser loads the client page from.
    #[arg(long, env = "RELAY_CLIENT_HOST")]
    client_host: Option<String>,

    /// Port the client page is served on.
    #[arg(long, env = "RELAY_HTTP_PORT")]
    http_port: Option<u16>,

    /// Seconds to wait for a reply to one call.
    #[arg(long, env = "RELAY_CALL_TIMEOUT")]
    call_timeout: Option<u64>,

    /// Seconds to wait for the page to connect.
    #[arg(long, env = "RELAY_CONNECT_TIMEOUT")]
    connect_timeout: Option<u64>,

    /// Browser program to launch; `{url}` in `--browser-arg` is replaced by
    /// the page URL.
    #[arg(long, env = "RELAY_BROWSER")]
    browser: Option<String>,

    /// Argument passed to `--browser` (repeatable).
    #[arg(long = "browser-arg", allow_hyphen_values = true)]
    browser_args: Vec<String>,

    /// Fixed connection token secret.
    #[arg(long, env = "RELAY_TOKEN_SECRET")]
    token_secret: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Relay until Ctrl+C.
    Serve,
    /// Discover readers once and print them as JSON.
    Discover {
        /// Discover the SDK's simulated reader.
        #[arg(long)]
        simulated: bool,

        /// Restrict discovery to one location id.
        #[arg(long)]
        location: Option<String>,
    },
    /// Write the effective configuration (file, env and flags merged) to
    /// the `--config` path and exit.
    SaveConfig,
}

impl Cli {
    /// Merges the CLI flags over `base` (usually the loaded config file).
    fn into_relay_config(self, base: RelayConfig) -> (RelayConfig, Command) {
        let mut config = base;

        let ip = self.ws_bind.unwrap_or(config.ws_bind_addr.ip());
        let port = self.ws_port.unwrap_or(config.ws_bind_addr.port());
        config.ws_bind_addr = SocketAddr::new(ip, port);

        if let Some(host) = self.client_host {
            config.client_host = host;
        }
        if let Some(port) = self.http_port {
            config.http_port = port;
        }
        if let Some(secs) = self.call_timeout {
            config.call_timeout_secs = secs;
        }
        if let Some(secs) = self.connect_timeout {
            config.connect_timeout_secs = secs;
        }
        if let Some(program) = self.browser {
            config.launcher.program = Some(program);
            config.launcher.args = self.browser_args;
        }
        if let Some(secret) = self.token_secret {
            config.token.secret = Some(secret);
        }

        (config, self.command)
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone();
    let file_config = load_config(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let (config, command) = cli.into_relay_config(file_config);

    // ── Logging setup ─────────────────────────────────────────────────────────
    //
    // `RUST_LOG` wins; otherwise the config's `log_level` applies.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    if let Command::SaveConfig = command {
        save_config(&config_path, &config)
            .with_context(|| format!("failed to save config to {}", config_path.display()))?;
        info!("configuration written to {}", config_path.display());
        return Ok(());
    }

    info!(
        "terminal relay starting, ws={}, client={}",
        config.ws_bind_addr,
        config.client_url()
    );

    let launcher = launcher_from_config(&config.launcher);
    let tokens: Arc<dyn TokenIssuer> = Arc::from(issuer_from_config(&config.token));
    let relay = relay_instance(terminal_interface(), &config, launcher.as_ref(), tokens)
        .await
        .context("failed to start relay")?;

    match command {
        Command::Serve => {
            // Keep serving across reader and page disconnects.
            relay.set_disconnect_handler(Arc::new(|reason| {
                match reason {
                    DisconnectReason::ChannelClosed => info!("browser page disconnected"),
                    DisconnectReason::ReaderDisconnected => info!("reader disconnected"),
                }
                Ok(())
            }));

            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl+C")?;
            info!("received Ctrl+C, shutting down");
        }
        Command::Discover {
            simulated,
            location,
        } => {
            let mut args = CallArgs::new().kwarg("simulated", simulated);
            if let Some(location) = location {
                args = args.kwarg("location", location);
            }
            let readers = relay
                .call("discover_readers", args)
                .await
                .context("reader discovery failed")?;
            println!("{}", serde_json::to_string_pretty(&readers)?);
        }
        // Handled before the relay starts.
        Command::SaveConfig => {}
    }

    relay.shutdown();
    info!("terminal relay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_serve_with_defaults_keeps_file_config() {
        // Arrange
        let cli = Cli::parse_from(["terminal-relay", "serve"]);

        // Act
        let (config, command) = cli.into_relay_config(RelayConfig::default());

        // Assert
        assert!(matches!(command, Command::Serve));
        assert_eq!(config, RelayConfig::default());
    }

    #[test]
    fn test_cli_ws_port_override_keeps_bind_ip() {
        let cli = Cli::parse_from(["terminal-relay", "--ws-port", "5050", "serve"]);
        let (config, _) = cli.into_relay_config(RelayConfig::default());
        assert_eq!(config.ws_bind_addr.port(), 5050);
        assert!(config.ws_bind_addr.ip().is_loopback());
    }

    #[test]
    fn test_cli_ws_bind_override() {
        let cli = Cli::parse_from(["terminal-relay", "--ws-bind", "0.0.0.0", "serve"]);
        let (config, _) = cli.into_relay_config(RelayConfig::default());
        assert_eq!(config.ws_bind_addr.ip().to_string(), "0.0.0.0");
        assert_eq!(config.ws_bind_addr.port(), 5000);
    }

    #[test]
    fn test_cli_invalid_ws_bind_is_rejected() {
        let result = Cli::try_parse_from(["terminal-relay", "--ws-bind", "not-an-ip", "serve"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_timeouts_override() {
        let cli = Cli::parse_from([
            "terminal-relay",
            "--call-timeout",
            "5",
            "--connect-timeout",
            "7",
            "serve",
        ]);
        let (config, _) = cli.into_relay_config(RelayConfig::default());
        assert_eq!(config.call_timeout_secs, 5);
        assert_eq!(config.connect_timeout_secs, 7);
    }

    #[test]
    fn test_cli_browser_and_args() {
        let cli = Cli::parse_from([
            "terminal-relay",
            "--browser",
            "chromium",
            "--browser-arg",
            "--headless=new",
            "--browser-arg",
            "{url}",
            "serve",
        ]);
        let (config, _) = cli.into_relay_config(RelayConfig::default());
        assert_eq!(config.launcher.program.as_deref(), Some("chromium"));
        assert_eq!(config.launcher.args, vec!["--headless=new", "{url}"]);
    }

    #[test]
    fn test_cli_discover_flags() {
        let cli = Cli::parse_from([
            "terminal-relay",
            "discover",
            "--simulated",
            "--location",
            "tml_1",
        ]);
        let (_, command) = cli.into_relay_config(RelayConfig::default());
        match command {
            Command::Discover {
                simulated,
                location,
            } => {
                assert!(simulated);
                assert_eq!(location.as_deref(), Some("tml_1"));
            }
            other => panic!("expected discover, got {other:?}"),
        }
    }

    #[test]
    fn test_cli_token_secret_override() {
        let cli = Cli::parse_from(["terminal-relay", "--token-secret", "pst_x", "serve"]);
        let (config, _) = cli.into_relay_config(RelayConfig::default());
        assert_eq!(config.token.secret.as_deref(), Some("pst_x"));
    }

    #[test]
    fn test_cli_save_config_subcommand() {
        let cli = Cli::parse_from(["terminal-relay", "--http-port", "8080", "save-config"]);
        let (config, command) = cli.into_relay_config(RelayConfig::default());
        assert!(matches!(command, Command::SaveConfig));
        assert_eq!(config.http_port, 8080);
    }

    #[test]
    fn test_cli_requires_a_subcommand() {
        assert!(Cli::try_parse_from(["terminal-relay"]).is_err());
    }
}
