//! Caller-supplied extension hooks.
//!
//! Each hook receives the pipeline builder at a named insertion point and
//! returns it, typically after adding routes or layers. Implementations that
//! skip a method get a no-op default.

use axum::Router;

/// Extension points of the pipeline, one method per insertion slot.
///
/// Keep in mind that layers added to an Axum router wrap everything added
/// before them, so a layer attached in `before_all` runs ahead of every
/// built-in stage on the request path.
pub trait PipelineHooks: Send + Sync {
    /// Runs before any built-in stage sees the request.
    fn before_all(&self, router: Router) -> Router {
        router
    }

    /// Runs after body parsing and CORS, before route dispatch.
    fn before_routes(&self, router: Router) -> Router {
        router
    }

    /// Invoked after endpoint mounting, before the not-found fallback.
    fn after_routes(&self, router: Router) -> Router {
        router
    }

    /// Invoked after the not-found fallback is installed.
    fn after_not_found(&self, router: Router) -> Router {
        router
    }

    /// Invoked after the error chain; the last word on the response.
    fn after_error(&self, router: Router) -> Router {
        router
    }
}

/// Default hook set; implements nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHooks;

impl PipelineHooks for NoopHooks {}
