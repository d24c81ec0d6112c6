//! Cross-origin request validation.
//!
//! # Responsibilities
//! - Resolve the caller's declared origin (`Origin`, else `Referer`)
//! - Check exact membership in the configured whitelist
//! - Emit the four `Access-Control-Allow-*` headers on allowed requests
//! - Short-circuit allowed `OPTIONS` preflights with a bare 200
//!
//! # Design Decisions
//! - Exact string membership only; no wildcard or suffix matching
//! - Denied requests continue normally with no headers emitted; this stage
//!   is not an enforcement point
//! - An empty whitelist means the stage is never installed (CORS disabled,
//!   not allow-all); the composer owns that decision

use crate::config::CorsConfig;
use axum::extract::{Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::collections::HashSet;
use std::sync::Arc;
use url::Url;

/// Precomputed whitelist and header values for the CORS stage.
pub struct CorsPolicy {
    whitelist: HashSet<String>,
    allow_headers: HeaderValue,
    allow_methods: HeaderValue,
    allow_credentials: HeaderValue,
}

impl CorsPolicy {
    pub fn new(config: &CorsConfig) -> Self {
        Self {
            whitelist: config.whitelist.iter().cloned().collect(),
            allow_headers: HeaderValue::from_str(&config.allow_headers)
                .unwrap_or(HeaderValue::from_static("")),
            allow_methods: HeaderValue::from_str(&config.allow_methods)
                .unwrap_or(HeaderValue::from_static("")),
            allow_credentials: HeaderValue::from_static(if config.allow_credentials {
                "true"
            } else {
                "false"
            }),
        }
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        self.whitelist.contains(origin)
    }
}

/// The caller's declared origin: the `Origin` header, or scheme+host+port
/// parsed out of `Referer` when `Origin` is absent.
pub fn declared_origin(headers: &header::HeaderMap) -> Option<String> {
    if let Some(origin) = headers.get(header::ORIGIN).and_then(|v| v.to_str().ok()) {
        return Some(origin.to_string());
    }
    let referer = headers.get(header::REFERER)?.to_str().ok()?;
    let origin = Url::parse(referer).ok()?.origin().ascii_serialization();
    // Opaque origins serialize as "null"; treat them as undeclared.
    (origin != "null").then_some(origin)
}

/// CORS validation stage.
pub async fn validate_origin(
    State(policy): State<Arc<CorsPolicy>>,
    req: Request,
    next: Next,
) -> Response {
    let origin = match declared_origin(req.headers()) {
        Some(origin) if policy.is_allowed(&origin) => origin,
        _ => return next.run(req).await,
    };

    // Allowed preflights answer immediately; no later stage runs.
    let preflight = req.method() == Method::OPTIONS;
    let mut response = if preflight {
        StatusCode::OK.into_response()
    } else {
        next.run(req).await
    };

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&origin) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        policy.allow_methods.clone(),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        policy.allow_credentials.clone(),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        policy.allow_headers.clone(),
    );
    response
}
