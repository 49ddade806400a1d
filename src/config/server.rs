//! Server configuration.

use std::net::SocketAddr;
use std::time::Duration;

use super::parse::{env_duration, env_list, env_or, env_parse};
use super::ConfigError;
use crate::engine::DEFAULT_MAX_BODY_BYTES;

/// Default bound on the graceful drain.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Listener and lifecycle settings.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Primary listen address.
    pub listen_addr: SocketAddr,
    /// Further listeners served by the same engine.
    pub extra_listen_addrs: Vec<SocketAddr>,
    /// How long in-flight requests may run after an interrupt.
    pub drain_timeout: Duration,
    /// Largest request body read from the wire.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            extra_listen_addrs: Vec::new(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_addr = parse_addr("LISTEN_ADDR", &env_or("LISTEN_ADDR", "0.0.0.0:8080"))?;
        let extra_listen_addrs = env_list("EXTRA_LISTEN_ADDRS")
            .iter()
            .map(|addr| parse_addr("EXTRA_LISTEN_ADDRS", addr))
            .collect::<Result<Vec<_>, _>>()?;

        let drain_timeout = env_duration("DRAIN_TIMEOUT", "30s")?.unwrap_or(Duration::ZERO);
        let max_body_bytes = env_parse("MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES)?;
        if max_body_bytes == 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_BODY_BYTES".into(),
                message: "must be greater than zero".into(),
            });
        }

        Ok(Self {
            listen_addr,
            extra_listen_addrs,
            drain_timeout,
            max_body_bytes,
        })
    }

    /// Every address to bind, primary first.
    pub fn listen_addrs(&self) -> Vec<SocketAddr> {
        let mut addrs = vec![self.listen_addr];
        addrs.extend(self.extra_listen_addrs.iter().copied());
        addrs
    }
}

fn parse_addr(key: &str, value: &str) -> Result<SocketAddr, ConfigError> {
    value.trim().parse().map_err(|e: std::net::AddrParseError| ConfigError::Parse {
        key: key.into(),
        value: value.to_string(),
        error: e.to_string(),
    })
}
