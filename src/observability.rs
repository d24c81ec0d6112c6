//! Logging subsystem initialization.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once per process
//! - JSON output for production, pretty output for development
//! - Log level configurable via `RUST_LOG`
//!
//! The per-request log record contract lives in
//! [`crate::middleware::access_log`]; this module only wires the backend.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "gantry=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    // Already initialized elsewhere (e.g. by a test harness).
    let _ = result;
}
