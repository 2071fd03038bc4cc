//! Shikimori API client implementation.
//!
//! This module provides a rate-limited client for the Shikimori anime
//! catalog API and the trait the service layer consumes it through.

pub mod client;
pub mod rate_limiter;

pub use client::{AnimeCatalog, ClientOptions, ShikimoriClient};
pub use rate_limiter::RateLimiter;
