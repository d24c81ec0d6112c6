//! Per-request pipeline stages.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → headers.rs (fingerprint hygiene)
//!     → body.rs (raw capture, JSON/form/cookie parsing)
//!     → cors.rs (origin validation, preflight short-circuit)
//!     → trailing_slash.rs (canonical paths)
//!     → access_log.rs (timing + one record per request)
//!     → mounted endpoints
//!     → error_chain.rs (report, then render)
//! ```
//!
//! The composer in `pipeline.rs` owns the exact ordering; each stage here is
//! an `axum::middleware::from_fn` function with its state in an `Arc`.

pub mod access_log;
pub mod body;
pub mod cors;
pub mod error_chain;
pub mod headers;
pub mod trailing_slash;
