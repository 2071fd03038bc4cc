//! Rate-limited, cache-aside access to the Shikimori anime catalog.
//!
//! Reads go through [`AnimeService`], which checks the cache, falls back to
//! the [`ShikimoriClient`] behind a token-bucket [`RateLimiter`], and
//! populates the cache on success.

pub mod api;
pub mod cache;
pub mod error;
pub mod format;
pub mod service;

pub use api::{AnimeCatalog, ClientOptions, RateLimiter, ShikimoriClient};
pub use cache::{AnimeCache, CacheBackend, CacheStats, MemoryBackend, RedisBackend};
pub use error::{CacheError, CatalogError, Operation, ServiceError, WaitCanceled};
pub use service::{AnimeService, ServiceSettings};
