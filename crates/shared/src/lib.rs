//! Shared library for the video annotation workbench.
//!
//! This crate provides common functionality used across the workspace:
//! - Configuration management
//! - Database connection and schema
//! - Video models and persistence
//! - Workspace path layout
//! - Logging infrastructure

pub mod config;
pub mod db;
pub mod logging;
pub mod models;
pub mod paths;
pub mod store;

// Re-export commonly used types
pub use config::{Config, SamplingConfig, SpfRule};
pub use db::Database;
pub use logging::LogConfig;
pub use models::*;
pub use paths::WorkspacePaths;
pub use store::{SharedStore, VideoStore};

/// Common result type using anyhow::Error
pub type Result<T> = anyhow::Result<T>;
