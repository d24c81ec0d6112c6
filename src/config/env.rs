//! Environment-derived configuration defaults.
//!
//! # Responsibilities
//! - Read each documented variable exactly once, at assembly time
//! - Fall back to the schema defaults for anything unset or unparseable
//!
//! # Variables
//! - `SERVER_HOST` — listen host (default `0.0.0.0`)
//! - `SERVER_PORT` — listen port (default `8080`)
//! - `APP_ENV` — `production` enables production mode
//! - `DEBUG_IP` — caller IP granted full error diagnostics
//! - `JSON_BODY_LIMIT`, `FORM_BODY_LIMIT`, `RAW_BODY_LIMIT` — byte limits

use crate::config::schema::{LimitsConfig, ServerConfig};

fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    var(name).and_then(|v| v.parse().ok())
}

impl LimitsConfig {
    /// Limits with environment overrides applied on top of the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            json_body_bytes: parsed("JSON_BODY_LIMIT").unwrap_or(defaults.json_body_bytes),
            form_body_bytes: parsed("FORM_BODY_LIMIT").unwrap_or(defaults.form_body_bytes),
            raw_body_bytes: parsed("RAW_BODY_LIMIT").unwrap_or(defaults.raw_body_bytes),
            form_parameter_limit: defaults.form_parameter_limit,
        }
    }
}

impl ServerConfig {
    /// Configuration seeded from the environment.
    ///
    /// Structured logging follows the production flag unless overridden by
    /// the caller afterwards.
    pub fn from_env() -> Self {
        let production = var("APP_ENV").map(|v| v == "production").unwrap_or(false);
        Self {
            host: var("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed("SERVER_PORT").unwrap_or(8080),
            limits: LimitsConfig::from_env(),
            debug_ip: var("DEBUG_IP"),
            production,
            json_log: production,
            ..Self::default()
        }
    }
}
