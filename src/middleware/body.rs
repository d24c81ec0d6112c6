//! Body capture and parsing stages.
//!
//! # Responsibilities
//! - Capture verbatim bodies for configured raw-body path prefixes
//! - Parse JSON and form bodies into request extensions, within limits
//! - Parse the `Cookie` header into a request extension
//!
//! # Design Decisions
//! - Raw capture runs before any parser; a raw-exempt request never receives
//!   parsed-body treatment regardless of its content type
//! - Oversize bodies fail with a client fault (413) instead of queueing;
//!   malformed bodies fail with 400
//! - The buffered bytes are put back on the request, so handlers can still
//!   read the body themselves

use crate::config::LimitsConfig;
use crate::error::ApiError;
use axum::body::{to_bytes, Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use std::sync::Arc;

/// Verbatim request body, captured for raw-body paths.
#[derive(Debug, Clone)]
pub struct RawBody(pub Bytes);

/// Parsed `application/json` body.
#[derive(Debug, Clone)]
pub struct ParsedJson(pub serde_json::Value);

/// Parsed `application/x-www-form-urlencoded` body.
#[derive(Debug, Clone)]
pub struct ParsedForm(pub HashMap<String, String>);

/// Parsed `Cookie` header.
#[derive(Debug, Clone)]
pub struct Cookies(pub HashMap<String, String>);

/// Shared limits and raw-path set for the body stages.
pub struct BodyPolicy {
    raw_prefixes: Vec<String>,
    limits: LimitsConfig,
}

impl BodyPolicy {
    pub fn new(raw_prefixes: Vec<String>, limits: LimitsConfig) -> Self {
        Self {
            raw_prefixes,
            limits,
        }
    }

    pub fn is_raw_path(&self, path: &str) -> bool {
        self.raw_prefixes.iter().any(|p| path.starts_with(p.as_str()))
    }
}

fn content_type_is(req: &Request, expected: &str) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.trim_start().starts_with(expected))
        .unwrap_or(false)
}

fn over_declared_limit(req: &Request, limit: usize) -> bool {
    req.headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        .map(|len| len > limit)
        .unwrap_or(false)
}

/// Buffer the body up to `limit`, mapping failures to client faults.
async fn buffer_body(body: Body, limit: usize, what: &str) -> Result<Bytes, ApiError> {
    to_bytes(body, limit).await.map_err(|_| {
        ApiError::client(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("{what} body exceeds the configured limit"),
        )
    })
}

/// Raw-body capture stage.
///
/// Requests under a configured prefix get their exact bytes preserved in a
/// [`RawBody`] extension; the later parsing stages skip them entirely.
pub async fn capture_raw_body(
    State(policy): State<Arc<BodyPolicy>>,
    req: Request,
    next: Next,
) -> Response {
    if !policy.is_raw_path(req.uri().path()) {
        return next.run(req).await;
    }
    if over_declared_limit(&req, policy.limits.raw_body_bytes) {
        return ApiError::client(
            StatusCode::PAYLOAD_TOO_LARGE,
            "raw body exceeds the configured limit",
        )
        .into_response();
    }

    let (parts, body) = req.into_parts();
    let bytes = match buffer_body(body, policy.limits.raw_body_bytes, "raw").await {
        Ok(bytes) => bytes,
        Err(err) => return err.into_response(),
    };
    let mut req = Request::from_parts(parts, Body::from(bytes.clone()));
    req.extensions_mut().insert(RawBody(bytes));
    next.run(req).await
}

/// JSON body parsing stage.
pub async fn parse_json_body(
    State(policy): State<Arc<BodyPolicy>>,
    req: Request,
    next: Next,
) -> Response {
    if req.extensions().get::<RawBody>().is_some()
        || !content_type_is(&req, "application/json")
    {
        return next.run(req).await;
    }
    if over_declared_limit(&req, policy.limits.json_body_bytes) {
        return ApiError::client(
            StatusCode::PAYLOAD_TOO_LARGE,
            "JSON body exceeds the configured limit",
        )
        .into_response();
    }

    let (parts, body) = req.into_parts();
    let bytes = match buffer_body(body, policy.limits.json_body_bytes, "JSON").await {
        Ok(bytes) => bytes,
        Err(err) => return err.into_response(),
    };
    // An empty body with a JSON content type is tolerated, not an error.
    let parsed = if bytes.is_empty() {
        None
    } else {
        match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(value) => Some(ParsedJson(value)),
            Err(err) => {
                return ApiError::bad_request(format!("malformed JSON body: {err}"))
                    .into_response()
            }
        }
    };

    let mut req = Request::from_parts(parts, Body::from(bytes));
    if let Some(parsed) = parsed {
        req.extensions_mut().insert(parsed);
    }
    next.run(req).await
}

/// Form body parsing stage.
pub async fn parse_form_body(
    State(policy): State<Arc<BodyPolicy>>,
    req: Request,
    next: Next,
) -> Response {
    if req.extensions().get::<RawBody>().is_some()
        || !content_type_is(&req, "application/x-www-form-urlencoded")
    {
        return next.run(req).await;
    }
    if over_declared_limit(&req, policy.limits.form_body_bytes) {
        return ApiError::client(
            StatusCode::PAYLOAD_TOO_LARGE,
            "form body exceeds the configured limit",
        )
        .into_response();
    }

    let (parts, body) = req.into_parts();
    let bytes = match buffer_body(body, policy.limits.form_body_bytes, "form").await {
        Ok(bytes) => bytes,
        Err(err) => return err.into_response(),
    };

    let mut fields = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(&bytes) {
        if fields.len() >= policy.limits.form_parameter_limit {
            return ApiError::bad_request("form body has too many parameters").into_response();
        }
        fields.insert(key.into_owned(), value.into_owned());
    }

    let mut req = Request::from_parts(parts, Body::from(bytes));
    req.extensions_mut().insert(ParsedForm(fields));
    next.run(req).await
}

/// Cookie parsing stage.
pub async fn parse_cookies(mut req: Request, next: Next) -> Response {
    let mut cookies = HashMap::new();
    if let Some(raw) = req.headers().get(header::COOKIE).and_then(|v| v.to_str().ok()) {
        for pair in raw.split(';') {
            if let Some((name, value)) = pair.split_once('=') {
                cookies.insert(name.trim().to_string(), value.trim().to_string());
            }
        }
    }
    req.extensions_mut().insert(Cookies(cookies));
    next.run(req).await
}
