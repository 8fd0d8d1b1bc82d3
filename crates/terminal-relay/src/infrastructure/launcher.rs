//! Starting the browser client that hosts the terminal SDK.
//!
//! The relay only listens; something has to open the client page so the SDK
//! can connect back.  [`CommandLauncher`] spawns a configured program (a
//! browser, usually) pointed at the page URL.  [`NoopLauncher`] does nothing,
//! for setups where the page is opened by hand or by a test.

use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::application::RelayError;
use crate::domain::LauncherConfig;

/// Starts the browser client.
///
/// `launch` returns once the client has been started; it does not wait for
/// the page to connect.
#[cfg_attr(test, mockall::automock)]
pub trait ClientLauncher: Send + Sync {
    /// Opens the client page served at `http://{host}:{http_port}`.
    ///
    /// # Errors
    ///
    /// [`RelayError::Launch`] if the client cannot be started.
    fn launch(&self, host: &str, http_port: u16) -> Result<(), RelayError>;
}

/// Launcher that starts nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLauncher;

impl ClientLauncher for NoopLauncher {
    fn launch(&self, host: &str, http_port: u16) -> Result<(), RelayError> {
        info!("waiting for a browser to open http://{host}:{http_port}");
        Ok(())
    }
}

/// Spawns `program args...` with `{url}`, `{host}` and `{port}` substituted
/// in each argument.
#[derive(Debug, Clone)]
pub struct CommandLauncher {
    program: String,
    args: Vec<String>,
}

impl CommandLauncher {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Arguments after placeholder substitution.
    pub fn render_args(&self, host: &str, http_port: u16) -> Vec<String> {
        let url = format!("http://{host}:{http_port}");
        let port = http_port.to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{url}", &url)
                    .replace("{host}", host)
                    .replace("{port}", &port)
            })
            .collect()
    }
}

impl ClientLauncher for CommandLauncher {
    fn launch(&self, host: &str, http_port: u16) -> Result<(), RelayError> {
        let args = self.render_args(host, http_port);
        debug!(program = %self.program, ?args, "launching browser client");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| RelayError::Launch(format!("{}: {e}", self.program)))?;

        info!(program = %self.program, pid = ?child.id(), "browser client started");

        // Reap the child so it does not linger as a zombie.
        let program = self.program.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => debug!(%program, "browser client exited"),
                Ok(status) => warn!(%program, %status, "browser client exited with failure"),
                Err(e) => warn!(%program, error = %e, "failed to wait on browser client"),
            }
        });
        Ok(())
    }
}

/// Picks the launcher described by `config`.
pub fn launcher_from_config(config: &LauncherConfig) -> Box<dyn ClientLauncher> {
    match &config.program {
        Some(program) => Box::new(CommandLauncher::new(program.clone(), config.args.clone())),
        None => Box::new(NoopLauncher),
    }
}
