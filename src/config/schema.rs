//! Configuration schema definitions.
//!
//! The scalar sections derive Serde traits so they can be loaded from files
//! or merged from the environment; the full [`ServerConfig`] additionally
//! carries endpoints, hooks and the log sink, which are plain values built
//! by the caller. All toggles are read once at pipeline assembly time and
//! fixed for the server's lifetime.

use crate::endpoints::{EndpointSpec, HandlerFactory};
use crate::hooks::{NoopHooks, PipelineHooks};
use crate::middleware::access_log::AccessLogSink;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Root configuration for the pipeline server.
pub struct ServerConfig {
    /// Listen host (e.g. "0.0.0.0").
    pub host: String,

    /// Listen port. Port 0 binds an ephemeral port.
    pub port: u16,

    /// CORS settings; an empty whitelist disables the CORS stage entirely.
    pub cors: CorsConfig,

    /// Body-size and parsing limits.
    pub limits: LimitsConfig,

    /// Endpoints to mount, most-specific-first. Mount order determines match
    /// priority for overlapping prefixes.
    pub endpoints: Vec<EndpointSpec>,

    /// Path prefixes whose bodies are captured verbatim and never parsed.
    pub raw_body_paths: Vec<String>,

    /// Parse `application/json` bodies.
    pub enable_json_body: bool,

    /// Parse `application/x-www-form-urlencoded` bodies.
    pub enable_form_body: bool,

    /// Parse the `Cookie` header into a request extension.
    pub enable_cookies: bool,

    /// Serve `GET /~health` -> `ok`.
    pub enable_health: bool,

    /// 301-redirect non-root paths that end in a slash.
    pub remove_trailing_slashes: bool,

    /// Gzip response compression.
    pub enable_compression: bool,

    /// Render HTML error pages when the caller accepts HTML.
    pub is_html: bool,

    /// Structured (machine-parseable) access logs instead of one formatted
    /// line per request. Defaults to the production flag.
    pub json_log: bool,

    /// Production mode: generic server-fault messages, no diagnostic bodies.
    pub production: bool,

    /// Callers from this IP get full error diagnostics even in production.
    pub debug_ip: Option<String>,

    /// Extension hooks, one per insertion point.
    pub hooks: Arc<dyn PipelineHooks>,

    /// Access-log backend; `None` selects the tracing-based default.
    pub log_sink: Option<Arc<dyn AccessLogSink>>,

    /// Overrides the built-in not-found responder.
    pub not_found_handler: Option<HandlerFactory>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors: CorsConfig::default(),
            limits: LimitsConfig::default(),
            endpoints: Vec::new(),
            raw_body_paths: Vec::new(),
            enable_json_body: true,
            enable_form_body: true,
            enable_cookies: false,
            enable_health: true,
            remove_trailing_slashes: true,
            enable_compression: true,
            is_html: false,
            json_log: false,
            production: false,
            debug_ip: None,
            hooks: Arc::new(NoopHooks),
            log_sink: None,
            not_found_handler: None,
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("cors", &self.cors)
            .field("limits", &self.limits)
            .field("endpoints", &self.endpoints.len())
            .field("raw_body_paths", &self.raw_body_paths)
            .field("enable_json_body", &self.enable_json_body)
            .field("enable_form_body", &self.enable_form_body)
            .field("enable_cookies", &self.enable_cookies)
            .field("enable_health", &self.enable_health)
            .field("remove_trailing_slashes", &self.remove_trailing_slashes)
            .field("enable_compression", &self.enable_compression)
            .field("is_html", &self.is_html)
            .field("json_log", &self.json_log)
            .field("production", &self.production)
            .field("debug_ip", &self.debug_ip)
            .finish_non_exhaustive()
    }
}

/// Cross-origin settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Exact origin strings permitted to make cross-origin calls.
    /// Empty means the CORS stage is not installed at all.
    pub whitelist: Vec<String>,

    /// Value of `Access-Control-Allow-Headers`.
    pub allow_headers: String,

    /// Value of `Access-Control-Allow-Methods`.
    pub allow_methods: String,

    /// Value of `Access-Control-Allow-Credentials`.
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            whitelist: Vec::new(),
            allow_headers: "Content-Type, Authorization".to_string(),
            allow_methods: "GET,POST,PUT,PATCH,DELETE,OPTIONS".to_string(),
            allow_credentials: true,
        }
    }
}

/// Body-size and parsing limits.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum `application/json` body size in bytes.
    pub json_body_bytes: usize,

    /// Maximum form body size in bytes.
    pub form_body_bytes: usize,

    /// Maximum raw-body capture size in bytes.
    pub raw_body_bytes: usize,

    /// Maximum number of form key/value pairs.
    pub form_parameter_limit: usize,
}

impl LimitsConfig {
    /// The largest configured body limit; used as the global request cap.
    pub fn max_body_bytes(&self) -> usize {
        self.json_body_bytes
            .max(self.form_body_bytes)
            .max(self.raw_body_bytes)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            json_body_bytes: 10 * 1024 * 1024,
            form_body_bytes: 10 * 1024 * 1024,
            raw_body_bytes: 10 * 1024 * 1024,
            form_parameter_limit: 10_000,
        }
    }
}
