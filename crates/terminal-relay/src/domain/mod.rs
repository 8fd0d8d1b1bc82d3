//! Domain layer: plain types with no I/O.
//!
//! - [`RelayConfig`] – runtime settings and the TOML config file.
//! - [`CallArgs`] – positional/keyword arguments of one relay call.

pub mod call;
pub mod config;

pub use call::CallArgs;
pub use config::{load_config, save_config, ConfigError, LauncherConfig, RelayConfig, TokenConfig};
