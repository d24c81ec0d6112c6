//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! environment variables
//!     → env.rs (read once, apply defaults)
//!     → ServerConfig (explicit value, owned by the caller)
//!     → pipeline assembly (toggles evaluated once)
//! ```
//!
//! # Design Decisions
//! - No ambient lookups inside core logic; everything the pipeline needs is
//!   on the config value passed into the assembly function
//! - All scalar fields have defaults so a minimal config is valid

pub mod env;
pub mod schema;

pub use schema::{CorsConfig, LimitsConfig, ServerConfig};
