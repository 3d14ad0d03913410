//! # Runtime Configuration Module
//!
//! Environment variable based configuration for the request handler.
//!
//! ## Environment Variables
//!
//! ### `REMIX_SERVER_MODE`
//!
//! One of `development`, `production` or `test`. When unset, `NODE_ENV` is
//! consulted so deployments that already export it keep working. Any other
//! value (or no value at all) selects production mode, which strips error
//! messages and stacks from everything sent to clients.
//!
//! ## Usage
//!
//! ```rust
//! use remix_server_runtime::runtime_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env();
//! println!("Server mode: {}", config.server_mode());
//! ```

use crate::mode::ServerMode;
use std::env;

/// Primary mode variable.
pub const SERVER_MODE_ENV: &str = "REMIX_SERVER_MODE";
/// Fallback mode variable.
pub const NODE_ENV: &str = "NODE_ENV";

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Raw mode string as found in the environment.
    pub mode: Option<String>,
}

impl RuntimeConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mode = env::var(SERVER_MODE_ENV)
            .ok()
            .or_else(|| env::var(NODE_ENV).ok())
            .filter(|m| !m.trim().is_empty());
        RuntimeConfig { mode }
    }

    /// Resolved server mode (production when unset or unrecognised).
    #[must_use]
    pub fn server_mode(&self) -> ServerMode {
        ServerMode::from_option(self.mode.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_mode_resolution() {
        let config = RuntimeConfig {
            mode: Some("development".to_string()),
        };
        assert_eq!(config.server_mode(), ServerMode::Development);
        assert_eq!(RuntimeConfig::default().server_mode(), ServerMode::Production);
    }
}
