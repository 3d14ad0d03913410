//! Server mode handling.
//!
//! The mode gates how much error detail leaves the process: full messages
//! and stacks only in development, a generic message everywhere else.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Runtime mode the handler was created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ServerMode {
    Development,
    #[default]
    Production,
    Test,
}

impl ServerMode {
    /// Parse an optional mode string, falling back to production for
    /// missing or unrecognised values.
    #[must_use]
    pub fn from_option(mode: Option<&str>) -> Self {
        mode.and_then(|m| m.parse().ok()).unwrap_or_default()
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerMode::Development => "development",
            ServerMode::Production => "production",
            ServerMode::Test => "test",
        }
    }

    #[inline]
    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, ServerMode::Development)
    }

    #[inline]
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, ServerMode::Production)
    }
}

impl Display for ServerMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a known [`ServerMode`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown server mode: {0}")]
pub struct UnknownServerMode(pub String);

impl FromStr for ServerMode {
    type Err = UnknownServerMode;

    // Exact match only, the same strings the build tooling emits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "development" => Ok(ServerMode::Development),
            "production" => Ok(ServerMode::Production),
            "test" => Ok(ServerMode::Test),
            other => Err(UnknownServerMode(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_modes() {
        assert_eq!("development".parse(), Ok(ServerMode::Development));
        assert_eq!("production".parse(), Ok(ServerMode::Production));
        assert_eq!("test".parse(), Ok(ServerMode::Test));
    }

    #[test]
    fn test_unknown_mode_defaults_to_production() {
        assert_eq!(ServerMode::from_option(Some("staging")), ServerMode::Production);
        assert_eq!(ServerMode::from_option(Some("Development")), ServerMode::Production);
        assert_eq!(ServerMode::from_option(None), ServerMode::Production);
    }
}
