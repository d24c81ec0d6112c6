//! Two-stage error chain: report, then render.
//!
//! # Data Flow
//! ```text
//! fault raised anywhere in the pipeline
//!     → ApiError::into_response (status set, record stashed)
//!     → report stage (log server faults, forward unchanged)
//!     → render stage (terminal: build the response body)
//! ```
//!
//! # Design Decisions
//! - The render stage never raises further; every fault ends in a response
//! - Outside production, or for the configured debug IP, the full diagnostic
//!   body is returned without redaction
//! - Server-fault messages are replaced by a generic string in production;
//!   client-fault messages are safe to surface
//! - The render stage reads `Accept` and the caller address from the inbound
//!   request before any inner layer runs, so hooks nested inside the chain
//!   cannot rewrite the inputs of the debug-bypass and HTML branches

use crate::error::ApiError;
use crate::net::client_ip;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Json, Response};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;

/// Fixed inputs of the render stage.
pub struct RenderPolicy {
    pub production: bool,
    pub is_html: bool,
    pub debug_ip: Option<String>,
}

/// Report stage: log every server fault, forward the response unchanged.
pub async fn report_errors(req: Request, next: Next) -> Response {
    let response = next.run(req).await;
    if let Some(record) = response.extensions().get::<ApiError>() {
        if record.status.as_u16() >= 500 {
            let stack = record.stack.replace('\n', ", ");
            tracing::error!(
                status = record.status.as_u16(),
                "{} ({})",
                record.message,
                stack
            );
        }
    }
    response
}

/// Whether the request declares it accepts HTML. A missing `Accept` header
/// accepts everything.
pub(crate) fn accepts_html(req: &Request) -> bool {
    match req.headers().get(header::ACCEPT).and_then(|v| v.to_str().ok()) {
        Some(accept) => accept.contains("text/html") || accept.contains("*/*"),
        None => true,
    }
}

/// Render stage (terminal): turn a fault record into the response body.
/// Responses without a record pass through untouched.
pub async fn render_errors(
    State(policy): State<Arc<RenderPolicy>>,
    req: Request,
    next: Next,
) -> Response {
    let wants_html = accepts_html(&req);
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)));
    let remote_ip = client_ip(req.headers(), peer);

    let response = next.run(req).await;
    let Some(record) = response.extensions().get::<ApiError>().cloned() else {
        return response;
    };
    let status = record.status;

    let debug_caller = policy.debug_ip.as_deref() == Some(remote_ip.as_str());
    let rendered = if !policy.production || debug_caller {
        (
            status,
            Json(json!({
                "error": record.message,
                "status": status.as_u16(),
                "trace": record.trace(),
                "stack": record.stack,
            })),
        )
            .into_response()
    } else if policy.is_html && wants_html {
        (status, Html(error_page(status))).into_response()
    } else {
        let message = if status.as_u16() >= 500 {
            "Internal server error".to_string()
        } else {
            record.message
        };
        (status, Json(json!({ "error": message }))).into_response()
    };
    with_carried_headers(response, rendered)
}

/// Carry non-entity headers set by earlier stages (e.g. CORS) onto the
/// rendered error response; entity headers describe the discarded body.
fn with_carried_headers(original: Response, mut rendered: Response) -> Response {
    let (parts, _) = original.into_parts();
    for (name, value) in parts.headers.iter() {
        if name == header::CONTENT_TYPE
            || name == header::CONTENT_LENGTH
            || name == header::CONTENT_ENCODING
            || rendered.headers().contains_key(name)
        {
            continue;
        }
        rendered.headers_mut().insert(name.clone(), value.clone());
    }
    rendered
}

/// Minimal built-in HTML error page. Real template rendering lives outside
/// the pipeline.
pub fn error_page(status: StatusCode) -> String {
    let reason = status.canonical_reason().unwrap_or("Error");
    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>{code} {reason}</title></head>\n\
         <body><h1>{code} {reason}</h1></body>\n</html>\n",
        code = status.as_u16(),
        reason = reason,
    )
}
