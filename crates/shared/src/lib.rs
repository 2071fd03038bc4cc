//! Shared library for the anime tracker.
//!
//! This crate provides common functionality used by the catalog crate and
//! the command-line front-end:
//! - Configuration management
//! - Data models for catalog entities and user records
//! - SQLite database and the user/favorites/ratings repository
//! - Logging infrastructure

pub mod config;
pub mod db;
pub mod logging;
pub mod models;
pub mod repository;

// Re-export commonly used types
pub use config::Config;
pub use db::Database;
pub use logging::{LogConfig, LogGuard};
pub use models::*;
pub use repository::Repository;

/// Common result type using anyhow::Error
pub type Result<T> = anyhow::Result<T>;
