//! Relay configuration.
//!
//! [`RelayConfig`] is the single source of truth for runtime settings.  It can
//! be read from a TOML file, built from defaults, and then overridden by CLI
//! flags in `main.rs`.
//!
//! ```toml
//! ws_bind_addr = "127.0.0.1:5000"
//! client_host = "localhost"
//! http_port = 8000
//! call_timeout_secs = 30
//!
//! [launcher]
//! program = "chromium"
//! args = ["--headless=new", "{url}"]
//!
//! [token]
//! secret = "pst_test_..."
//! ```
//!
//! Every field has a serde default, so a missing file, an empty file and a
//! file written by an older version all load cleanly.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// All runtime configuration for the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Address the WebSocket listener binds to.  The browser page connects
    /// here; keep it on loopback unless the browser runs on another machine.
    #[serde(default = "default_ws_bind_addr")]
    pub ws_bind_addr: SocketAddr,

    /// Host name the browser is pointed at to load the client page.
    #[serde(default = "default_client_host")]
    pub client_host: String,

    /// Port the static client page is served on.
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// How long a call waits for a browser peer to attach.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// How long a call waits for the peer's reply once the request is sent.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Set when the page echoes request ids as `{"id": n, "reply": ...}`.
    /// Calls may then overlap; otherwise they are serialised.
    #[serde(default)]
    pub tagged_replies: bool,

    /// Fallback `tracing` filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// How to start the browser client.
    #[serde(default)]
    pub launcher: LauncherConfig,

    /// Where connection tokens for the SDK come from.
    #[serde(default)]
    pub token: TokenConfig,
}

/// Browser launcher settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LauncherConfig {
    /// Executable to start.  `None` means the browser is started by someone
    /// else and the relay only waits for it to connect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,

    /// Arguments; `{url}`, `{host}` and `{port}` are substituted.
    #[serde(default)]
    pub args: Vec<String>,
}

/// Connection token settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Fixed token secret, handy for simulated readers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Command printing a fresh secret (or `{"secret": ...}`) on stdout.
    /// Takes precedence over `secret`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_ws_bind_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 5000))
}
fn default_client_host() -> String {
    "localhost".to_string()
}
fn default_http_port() -> u16 {
    8000
}
fn default_connect_timeout_secs() -> u64 {
    60
}
fn default_call_timeout_secs() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            ws_bind_addr: default_ws_bind_addr(),
            client_host: default_client_host(),
            http_port: default_http_port(),
            connect_timeout_secs: default_connect_timeout_secs(),
            call_timeout_secs: default_call_timeout_secs(),
            tagged_replies: false,
            log_level: default_log_level(),
            launcher: LauncherConfig::default(),
            token: TokenConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Maximum wait for a peer to attach before a call fails.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Maximum wait for one reply.
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    /// URL of the static client page the launcher opens.
    pub fn client_url(&self) -> String {
        format!("http://{}:{}", self.client_host, self.http_port)
    }
}

// ── Config file ───────────────────────────────────────────────────────────────

/// Loads a [`RelayConfig`] from `path`, returning defaults if the file does
/// not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<RelayConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RelayConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(path: &Path, config: &RelayConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ws_bind_addr_is_loopback_5000() {
        // Arrange / Act
        let cfg = RelayConfig::default();
        // Assert
        assert_eq!(cfg.ws_bind_addr.port(), 5000);
        assert!(cfg.ws_bind_addr.ip().is_loopback());
    }

    #[test]
    fn test_default_client_url_points_at_localhost_8000() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.client_url(), "http://localhost:8000");
    }

    #[test]
    fn test_default_timeouts() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.connect_timeout(), Duration::from_secs(60));
        assert_eq!(cfg.call_timeout(), Duration::from_secs(30));
        assert!(!cfg.tagged_replies);
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let cfg: RelayConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, RelayConfig::default());
    }

    #[test]
    fn test_partial_toml_keeps_other_defaults() {
        // Arrange
        let text = r#"
            http_port = 8080
            tagged_replies = true

            [launcher]
            program = "chromium"
            args = ["--headless=new", "{url}"]
        "#;

        // Act
        let cfg: RelayConfig = toml::from_str(text).unwrap();

        // Assert
        assert_eq!(cfg.http_port, 8080);
        assert!(cfg.tagged_replies);
        assert_eq!(cfg.launcher.program.as_deref(), Some("chromium"));
        assert_eq!(cfg.launcher.args, vec!["--headless=new", "{url}"]);
        assert_eq!(cfg.ws_bind_addr, default_ws_bind_addr());
        assert_eq!(cfg.token, TokenConfig::default());
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, RelayConfig::default());
    }

    #[test]
    fn test_save_then_load_preserves_values() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("relay.toml");
        let mut cfg = RelayConfig::default();
        cfg.call_timeout_secs = 5;
        cfg.token.secret = Some("pst_test_abc".to_string());

        // Act
        save_config(&path, &cfg).unwrap();
        let loaded = load_config(&path).unwrap();

        // Assert
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn test_malformed_toml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "http_port = \"not a number\"").unwrap();
        assert!(matches!(load_config(&path), Err(ConfigError::Parse(_))));
    }
}
