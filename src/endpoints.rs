//! Endpoint mounting contract.
//!
//! # Responsibilities
//! - Describe externally supplied route handlers and their mount prefixes
//! - Hand each handler factory a shared context (sub-router constructor,
//!   fail helpers, relevant config)
//! - Let callers interpose per-mount middleware between prefix and handler
//!
//! # Design Decisions
//! - Mount order equals configured order; the first matching prefix wins,
//!   so callers list overlapping prefixes most-specific-first
//! - Handlers return `Result<_, ApiError>`; the `?` operator replaces any
//!   async error-wrapping helper

use crate::config::LimitsConfig;
use crate::error::ApiError;
use axum::http::StatusCode;
use axum::Router;
use std::sync::Arc;

/// Builds a sub-router from the shared context.
pub type HandlerFactory = Arc<dyn Fn(EndpointContext) -> Router + Send + Sync>;

/// Wraps a mounted sub-router, typically with `Router::layer`.
pub type EndpointMiddleware = Arc<dyn Fn(Router) -> Router + Send + Sync>;

/// One endpoint to mount onto the pipeline.
#[derive(Clone)]
pub struct EndpointSpec {
    /// Mount prefix; handlers see the path-relative remainder.
    pub path: String,

    /// Factory invoked once at assembly time.
    pub handler: HandlerFactory,

    /// Optional middleware applied to this mount only.
    pub middleware: Option<EndpointMiddleware>,
}

impl EndpointSpec {
    pub fn new<F>(path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(EndpointContext) -> Router + Send + Sync + 'static,
    {
        Self {
            path: path.into(),
            handler: Arc::new(handler),
            middleware: None,
        }
    }

    /// Interpose middleware between the mount point and the handler.
    pub fn with_middleware<F>(mut self, middleware: F) -> Self
    where
        F: Fn(Router) -> Router + Send + Sync + 'static,
    {
        self.middleware = Some(Arc::new(middleware));
        self
    }
}

impl std::fmt::Debug for EndpointSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointSpec")
            .field("path", &self.path)
            .field("middleware", &self.middleware.is_some())
            .finish_non_exhaustive()
    }
}

/// Context handed to every handler factory at assembly time.
#[derive(Debug, Clone)]
pub struct EndpointContext {
    /// Body limits endpoints may want to consult.
    pub limits: LimitsConfig,

    /// Production mode flag.
    pub production: bool,

    /// Whether the pipeline renders HTML error pages.
    pub is_html: bool,
}

impl EndpointContext {
    /// Fresh sub-router to register routes on.
    pub fn router(&self) -> Router {
        Router::new()
    }

    /// Raise a fault with an explicit status.
    pub fn fail(&self, status: StatusCode, message: impl Into<String>) -> ApiError {
        ApiError::client(status, message)
    }

    /// Raise a server fault (status 500).
    pub fn fail_internal(&self, message: impl Into<String>) -> ApiError {
        ApiError::server(message)
    }
}
