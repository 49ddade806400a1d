//! CORS configuration.

use super::parse::{env_bool, env_list, env_opt};
use super::ConfigError;
use crate::cors::CorsOptions;

/// Global CORS settings; disabled while no origin is configured.
#[derive(Clone, Debug, Default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
    pub expose_headers: Vec<String>,
    pub allow_headers: Vec<String>,
    pub max_age: Option<u64>,
}

impl CorsConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let max_age = match env_opt("CORS_MAX_AGE") {
            Some(v) => Some(v.parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::Parse {
                    key: "CORS_MAX_AGE".into(),
                    value: v.clone(),
                    error: e.to_string(),
                }
            })?),
            None => None,
        };

        Ok(Self {
            allowed_origins: env_list("CORS_ALLOWED_ORIGINS"),
            allow_credentials: env_bool("CORS_ALLOW_CREDENTIALS", false),
            expose_headers: env_list("CORS_EXPOSE_HEADERS"),
            allow_headers: env_list("CORS_ALLOW_HEADERS"),
            max_age,
        })
    }

    pub fn is_enabled(&self) -> bool {
        !self.allowed_origins.is_empty()
    }

    /// Negotiator options, or None when CORS is off.
    pub fn to_options(&self) -> Option<CorsOptions> {
        if !self.is_enabled() {
            return None;
        }
        Some(CorsOptions {
            allowed_origins: self.allowed_origins.clone(),
            allow_credentials: self.allow_credentials,
            expose_headers: self.expose_headers.clone(),
            allow_headers: self.allow_headers.clone(),
            max_age: self.max_age,
        })
    }
}
