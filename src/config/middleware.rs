//! Middleware configuration.

use std::time::Duration;

use super::parse::{env_bool, env_duration, env_parse};
use super::ConfigError;

/// Which built-in middleware the binary installs.
#[derive(Clone, Debug)]
pub struct MiddlewareConfig {
    /// Access logging enabled.
    pub access_log: bool,
    /// Gzip level 1-9, 0 disables compression.
    pub gzip_level: u32,
    /// Deadline per request; None disables the timeout middleware.
    pub request_timeout: Option<Duration>,
}

impl Default for MiddlewareConfig {
    fn default() -> Self {
        Self {
            access_log: true,
            gzip_level: 6,
            request_timeout: None,
        }
    }
}

impl MiddlewareConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let gzip_level: u32 = env_parse("GZIP_LEVEL", 6)?;
        if gzip_level > 9 {
            return Err(ConfigError::Invalid {
                key: "GZIP_LEVEL".into(),
                message: format!("expected 0-9, got {}", gzip_level),
            });
        }

        Ok(Self {
            access_log: env_bool("ACCESS_LOG", true),
            gzip_level,
            request_timeout: env_duration("REQUEST_TIMEOUT", "off")?,
        })
    }

    pub fn is_gzip_enabled(&self) -> bool {
        self.gzip_level > 0
    }
}
