//! Cache-aside store for catalog responses.
//!
//! Values are stored as JSON under `anime:search:<query>` for search
//! results and `anime:details:<id>` for single records. A missing key is a
//! normal miss; a value that no longer parses is reported as corruption so
//! format drift never hides behind a miss.

pub mod backend;
pub mod redis;

pub use backend::{CacheBackend, MemoryBackend};
pub use self::redis::RedisBackend;

use crate::error::CacheError;
use serde::{de::DeserializeOwned, Serialize};
use shared::Anime;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const SEARCH_PREFIX: &str = "anime:search:";
const DETAILS_PREFIX: &str = "anime:details:";

/// Cache key for a search result list
pub fn search_key(query: &str) -> String {
    format!("{}{}", SEARCH_PREFIX, query)
}

/// Cache key for a single anime record
pub fn details_key(id: i64) -> String {
    format!("{}{}", DETAILS_PREFIX, id)
}

/// Typed catalog cache over a [`CacheBackend`]
#[derive(Clone)]
pub struct AnimeCache {
    backend: Arc<dyn CacheBackend>,
    stats: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time cache access counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Transport failures and corrupted entries
    pub errors: u64,
}

impl AnimeCache {
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            stats: Arc::new(Counters::default()),
        }
    }

    /// Cached results for a search query
    pub async fn get_search(&self, query: &str) -> Result<Option<Vec<Anime>>, CacheError> {
        self.get_json(&search_key(query)).await
    }

    /// Store search results, replacing any previous entry
    pub async fn set_search(
        &self,
        query: &str,
        results: &[Anime],
        ttl: Duration,
    ) -> Result<(), CacheError> {
        self.set_json(&search_key(query), &results, ttl).await
    }

    /// Cached record for an anime ID
    pub async fn get_details(&self, id: i64) -> Result<Option<Anime>, CacheError> {
        self.get_json(&details_key(id)).await
    }

    /// Store a single record, replacing any previous entry
    pub async fn set_details(&self, id: i64, anime: &Anime, ttl: Duration) -> Result<(), CacheError> {
        self.set_json(&details_key(id), anime, ttl).await
    }

    /// Close the underlying backend
    pub async fn close(&self) -> Result<(), CacheError> {
        self.backend.close().await
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            errors: self.stats.errors.load(Ordering::Relaxed),
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, CacheError> {
        let bytes = match self.backend.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = key, "Cache miss");
                return Ok(None);
            }
            Err(e) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = key, error = %e, "Cache read failed");
                return Err(e);
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = key, "Cache hit");
                Ok(Some(value))
            }
            Err(source) => {
                self.stats.errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = key, error = %source, "Corrupted cache entry");
                Err(CacheError::Corrupted {
                    key: key.to_string(),
                    source,
                })
            }
        }
    }

    async fn set_json<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let bytes = serde_json::to_vec(value).map_err(CacheError::Serialize)?;
        self.backend.set(key, bytes, ttl).await?;
        debug!(key = key, ttl_secs = ttl.as_secs(), "Cache stored");
        Ok(())
    }
}
