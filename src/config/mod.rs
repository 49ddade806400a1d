//! Configuration module for kumi.
//!
//! This module provides centralized configuration loading from environment variables.
//!
//! # Example
//!
//! ```rust,ignore
//! use kumi::config::Config;
//!
//! let config = Config::from_env()?;
//! println!("Listen address: {}", config.server.listen_addr);
//! let engine = kumi::engine::Engine::new(config.engine_config());
//! ```

mod cors;
mod error;
mod logging;
mod middleware;
mod parse;
mod server;

pub use cors::CorsConfig;
pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use middleware::MiddlewareConfig;
pub use parse::{env_bool, env_duration, env_list, env_opt, env_or, env_parse, parse_duration};
pub use server::{ServerConfig, DEFAULT_DRAIN_TIMEOUT};

use crate::engine::EngineConfig;

/// Complete application configuration.
#[derive(Clone, Debug, Default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Middleware configuration.
    pub middleware: MiddlewareConfig,
    /// Global CORS configuration.
    pub cors: CorsConfig,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig::from_env()?,
            middleware: MiddlewareConfig::from_env()?,
            cors: CorsConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
        })
    }

    /// Engine settings derived from this configuration.
    pub fn engine_config(&self) -> EngineConfig {
        let config = EngineConfig::default().with_max_body_bytes(self.server.max_body_bytes);
        match self.cors.to_options() {
            Some(cors) => config.with_cors(cors),
            None => config,
        }
    }

    /// Print configuration summary to log.
    pub fn log_summary(&self) {
        use tracing::info;

        info!("Configuration loaded:");
        info!("  Listen: {}", self.server.listen_addr);
        for addr in &self.server.extra_listen_addrs {
            info!("  Listen (extra): {}", addr);
        }
        info!("  Drain timeout: {:?}", self.server.drain_timeout);
        info!("  Max body: {} bytes", self.server.max_body_bytes);

        match self.middleware.request_timeout {
            Some(timeout) => info!("  Request timeout: {:?}", timeout),
            None => info!("  Request timeout: disabled"),
        }

        if self.middleware.is_gzip_enabled() {
            info!("  Gzip: level {}", self.middleware.gzip_level);
        } else {
            info!("  Gzip: disabled");
        }

        if self.middleware.access_log {
            info!("  Access log: enabled");
        }

        if self.cors.is_enabled() {
            info!("  CORS origins: {}", self.cors.allowed_origins.join(", "));
        }
    }
}
