//! Structured access logging.
//!
//! # Responsibilities
//! - Produce one log record per completed request
//! - Skip static assets and health probes
//! - Support a human-readable line and a structured record, never both
//!
//! # Design Decisions
//! - Records go through an injected [`AccessLogSink`]; the tracing-based
//!   default emits a JSON payload or a formatted line depending on mode
//! - Logging happens after response completion and never alters the response
//! - Response size comes from the body's size hint, so streaming responses
//!   simply omit it

use crate::net::{client_ip, request_scheme};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, Version};
use axum::middleware::Next;
use axum::response::Response;
use http_body::Body as _;
use regex::Regex;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

/// Paths excluded from access logging: static-asset extensions, anything
/// under /assets, and the health probe with any number of leading tildes.
static SKIP_PATTERN: OnceLock<Regex> = OnceLock::new();

fn skip_pattern() -> &'static Regex {
    SKIP_PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(^/assets)|(\.(ico|png|jpg|jpeg|webp|woff|woff2|ttf|svg|css|js))|~*health")
            .expect("static skip pattern")
    })
}

/// Whether a request path is excluded from logging.
/// The path is truncated to 500 characters before matching.
pub fn should_skip(path: &str) -> bool {
    let truncated: String = path.chars().take(500).collect();
    skip_pattern().is_match(&truncated)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
}

/// One record per completed request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    pub request_method: String,
    pub request_url: String,
    pub protocol: String,
    /// IPv4-normalized client address.
    pub remote_ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    pub status: u16,
    pub latency_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_size: Option<u64>,
    pub severity: Severity,
}

impl LogRecord {
    /// The human-readable form: `METHOD url status latencyms ip`.
    pub fn formatted(&self) -> String {
        format!(
            "{} {} {} {:.0}ms {}",
            self.request_method,
            self.request_url,
            self.status,
            self.latency_seconds * 1000.0,
            self.remote_ip,
        )
    }
}

/// Injected logging backend; called exactly once per non-skipped request.
pub trait AccessLogSink: Send + Sync {
    fn emit(&self, record: &LogRecord);
}

/// Default sink forwarding to `tracing`.
pub struct TracingSink {
    /// Structured JSON payloads instead of formatted lines.
    pub json: bool,
}

impl AccessLogSink for TracingSink {
    fn emit(&self, record: &LogRecord) {
        if self.json {
            let payload = serde_json::to_string(record).unwrap_or_default();
            match record.severity {
                Severity::Warn => tracing::warn!(target: "access", http_request = %payload),
                Severity::Info => tracing::info!(target: "access", http_request = %payload),
            }
        } else {
            match record.severity {
                Severity::Warn => tracing::warn!(target: "access", "{}", record.formatted()),
                Severity::Info => tracing::info!(target: "access", "{}", record.formatted()),
            }
        }
    }
}

/// State for the access-log stage.
pub struct LogStage {
    pub sink: Arc<dyn AccessLogSink>,
}

fn protocol_of(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "HTTP/0.9",
        Version::HTTP_10 => "HTTP/1.0",
        Version::HTTP_11 => "HTTP/1.1",
        Version::HTTP_2 => "HTTP/2",
        Version::HTTP_3 => "HTTP/3",
        _ => "HTTP",
    }
}

fn header_string(req: &Request, name: header::HeaderName) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

/// Access-log stage: wraps handler execution to capture timing and the
/// final status, then emits one record.
pub async fn access_log(State(stage): State<Arc<LogStage>>, req: Request, next: Next) -> Response {
    let skip = should_skip(req.uri().path());
    if skip {
        return next.run(req).await;
    }

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
        .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 0)));

    let host = header_string(&req, header::HOST).unwrap_or_default();
    let scheme = request_scheme(req.headers(), peer);
    let request_url = format!("{}://{}{}", scheme, host, req.uri());
    let request_method = req.method().to_string();
    let protocol = protocol_of(req.version()).to_string();
    let remote_ip = client_ip(req.headers(), peer);
    let request_size = header_string(&req, header::CONTENT_LENGTH).and_then(|v| v.parse().ok());
    let user_agent = header_string(&req, header::USER_AGENT);
    let referrer = header_string(&req, header::REFERER);

    let start = Instant::now();
    let response = next.run(req).await;
    let latency_seconds = start.elapsed().as_millis() as f64 / 1000.0;

    let status = response.status().as_u16();
    let record = LogRecord {
        request_method,
        request_url,
        protocol,
        remote_ip,
        request_size,
        user_agent,
        referrer,
        status,
        latency_seconds,
        response_size: response.body().size_hint().exact(),
        severity: if status >= 500 {
            Severity::Warn
        } else {
            Severity::Info
        },
    };
    stage.sink.emit(&record);
    response
}
