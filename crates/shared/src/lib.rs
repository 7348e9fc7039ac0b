//! Shared library for the anime aggregator.
//!
//! This crate provides common functionality used by the aggregator crate
//! and its binary:
//! - Configuration management
//! - Logging infrastructure
//! - Value types exchanged between components

pub mod config;
pub mod logging;
pub mod models;

// Re-export commonly used types
pub use config::Config;
pub use logging::LogConfig;
pub use models::*;

/// Common result type using anyhow::Error
pub type Result<T> = anyhow::Result<T>;
