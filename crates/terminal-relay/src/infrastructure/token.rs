//! Connection tokens for the browser SDK.
//!
//! The SDK asks for a token whenever it (re)connects to a reader; the page
//! forwards that as a read of the host's `connection_token` property and
//! reads `.secret` from the result.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

use relay_core::{ErrorKind, SdkError};

use crate::application::RelayError;
use crate::domain::TokenConfig;

/// A connection token as the page expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionToken {
    pub secret: String,
}

/// Source of connection tokens.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenIssuer: Send + Sync {
    /// Produces a token for one SDK connection attempt.
    async fn issue(&self) -> Result<ConnectionToken, RelayError>;
}

fn token_error(message: impl Into<String>) -> RelayError {
    RelayError::Sdk(SdkError {
        kind: ErrorKind::FailedFetchConnectionToken,
        message: message.into(),
    })
}

/// Always returns the same secret.
#[derive(Debug, Clone)]
pub struct StaticTokenIssuer {
    secret: String,
}

impl StaticTokenIssuer {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

#[async_trait]
impl TokenIssuer for StaticTokenIssuer {
    async fn issue(&self) -> Result<ConnectionToken, RelayError> {
        Ok(ConnectionToken {
            secret: self.secret.clone(),
        })
    }
}

/// Runs a command and takes its stdout as the token.  Stdout may be the bare
/// secret or a JSON object with a `secret` field.
#[derive(Debug, Clone)]
pub struct CommandTokenIssuer {
    command: Vec<String>,
}

impl CommandTokenIssuer {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

/// Parses what a token command printed.
pub fn parse_token_output(stdout: &str) -> Result<ConnectionToken, RelayError> {
    let trimmed = stdout.trim();
    if trimmed.is_empty() {
        return Err(token_error("token command printed nothing"));
    }
    if trimmed.starts_with('{') {
        return serde_json::from_str(trimmed)
            .map_err(|e| token_error(format!("token command printed invalid JSON: {e}")));
    }
    Ok(ConnectionToken {
        secret: trimmed.to_string(),
    })
}

#[async_trait]
impl TokenIssuer for CommandTokenIssuer {
    async fn issue(&self) -> Result<ConnectionToken, RelayError> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| token_error("empty token command"))?;

        debug!(%program, "requesting connection token");
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| token_error(format!("{program}: {e}")))?;

        if !output.status.success() {
            return Err(token_error(format!(
                "{program} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        parse_token_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Issuer used when none is configured; every request fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredTokenIssuer;

#[async_trait]
impl TokenIssuer for UnconfiguredTokenIssuer {
    async fn issue(&self) -> Result<ConnectionToken, RelayError> {
        Err(token_error("no connection token source configured"))
    }
}

/// Picks the issuer described by `config`; a command wins over a secret.
pub fn issuer_from_config(config: &TokenConfig) -> Box<dyn TokenIssuer> {
    if !config.command.is_empty() {
        return Box::new(CommandTokenIssuer::new(config.command.clone()));
    }
    match &config.secret {
        Some(secret) => Box::new(StaticTokenIssuer::new(secret.clone())),
        None => Box::new(UnconfiguredTokenIssuer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_issuer_returns_secret() {
        let token = tokio_test::block_on(StaticTokenIssuer::new("pst_test_1").issue()).unwrap();
        assert_eq!(token.secret, "pst_test_1");
    }

    #[test]
    fn test_token_serializes_with_secret_field() {
        let token = ConnectionToken {
            secret: "s".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&token).unwrap(),
            serde_json::json!({ "secret": "s" })
        );
    }

    #[test]
    fn test_parse_token_output_accepts_bare_and_json() {
        assert_eq!(parse_token_output("pst_1\n").unwrap().secret, "pst_1");
        assert_eq!(
            parse_token_output(r#"{"object": "terminal.connection_token", "secret": "pst_2"}"#)
                .unwrap()
                .secret,
            "pst_2"
        );
    }

    #[test]
    fn test_parse_token_output_rejects_empty() {
        let err = tokio_test::assert_err!(parse_token_output("  \n"));
        assert_eq!(err.kind(), ErrorKind::FailedFetchConnectionToken);
    }

    #[tokio::test]
    async fn test_unconfigured_issuer_fails_with_token_error() {
        let err = UnconfiguredTokenIssuer.issue().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FailedFetchConnectionToken);
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn test_issuer_from_config_prefers_secret_over_nothing() {
        let config = TokenConfig {
            secret: Some("pst_cfg".to_string()),
            command: vec![],
        };
        let token = issuer_from_config(&config).issue().await.unwrap();
        assert_eq!(token.secret, "pst_cfg");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_issuer_reads_stdout() {
        let issuer = CommandTokenIssuer::new(vec!["echo".to_string(), "pst_cmd".to_string()]);
        assert_eq!(issuer.issue().await.unwrap().secret, "pst_cmd");
    }
}
