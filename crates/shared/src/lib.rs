//! Shared library for the hianime workspace.
//!
//! This crate provides common functionality used across the resolver and
//! the binary:
//! - Configuration management
//! - Logging infrastructure
//! - Episode, server and stream models

pub mod config;
pub mod logging;
pub mod models;

// Re-export commonly used types
pub use config::Config;
pub use logging::LogConfig;
pub use models::*;

/// Common result type using anyhow::Error
pub type Result<T> = anyhow::Result<T>;
