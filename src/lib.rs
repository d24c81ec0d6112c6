//! Configurable HTTP request-handling pipeline.
//!
//! Wires body parsing, CORS validation, structured access logging, dynamic
//! endpoint mounting, not-found handling and a two-stage error chain into
//! one strictly ordered pipeline, then manages the server's listen/close
//! lifecycle.
//!
//! ```no_run
//! use gantry::{EndpointSpec, Server, ServerConfig};
//! use axum::routing::get;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = ServerConfig::from_env();
//!     config.endpoints.push(EndpointSpec::new("/api", |ctx| {
//!         ctx.router().route("/hello", get(|| async { "hello" }))
//!     }));
//!
//!     let handle = Server::start(config).await?;
//!     tokio::signal::ctrl_c().await?;
//!     handle.close().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod endpoints;
pub mod error;
pub mod hooks;
pub mod lifecycle;
pub mod middleware;
pub mod net;
pub mod observability;
pub mod pipeline;

pub use config::{CorsConfig, LimitsConfig, ServerConfig};
pub use endpoints::{EndpointContext, EndpointSpec};
pub use error::{ApiError, FaultKind};
pub use hooks::{NoopHooks, PipelineHooks};
pub use lifecycle::{CloseError, Server, ServerHandle, Shutdown, StartError};
pub use middleware::access_log::{AccessLogSink, LogRecord, Severity, TracingSink};
pub use pipeline::build_pipeline;
