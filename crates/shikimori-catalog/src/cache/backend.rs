//! Backing stores for the catalog cache.
//!
//! A backing store maps string keys to byte values with an optional expiry.
//! Expired keys must read as absent; a TTL of zero stores without expiry.

use crate::error::CacheError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Key-value store with per-entry TTL
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Read a value; `Ok(None)` when the key is absent or expired
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store a value, replacing any previous one (`ttl` zero = no expiry)
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Remove a key; returns whether it existed
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Release the connection; every later call fails with
    /// [`CacheError::Transport`]
    async fn close(&self) -> Result<(), CacheError>;
}

#[derive(Debug)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Default interval between expiry sweeps triggered by writes
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Store {
    entries: HashMap<String, Entry>,
    next_sweep: Instant,
}

impl Store {
    fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before - self.entries.len()
    }
}

/// In-process backing store
///
/// Expired entries are dropped when read, and writes sweep the whole map
/// at most once per sweep interval so keys that are never read again do
/// not accumulate.
#[derive(Debug)]
pub struct MemoryBackend {
    store: RwLock<Store>,
    sweep_interval: Duration,
    closed: AtomicBool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::with_sweep_interval(DEFAULT_SWEEP_INTERVAL)
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sweep_interval(sweep_interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            store: RwLock::new(Store {
                entries: HashMap::new(),
                next_sweep: now.checked_add(sweep_interval).unwrap_or(now),
            }),
            sweep_interval,
            closed: AtomicBool::new(false),
        }
    }

    /// Drop every expired entry, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let removed = self.store.write().await.purge_expired(Instant::now());
        if removed > 0 {
            debug!(removed = removed, "Purged expired cache entries");
        }
        removed
    }

    /// Number of stored entries, including expired ones not yet purged
    pub async fn len(&self) -> usize {
        self.store.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn ensure_open(&self) -> Result<(), CacheError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Transport("memory cache is closed".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.ensure_open()?;
        let now = Instant::now();

        {
            let store = self.store.read().await;
            match store.entries.get(key) {
                None => return Ok(None),
                Some(entry) if !entry.is_expired(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        // Expired: evict unless a writer replaced it meanwhile
        let mut store = self.store.write().await;
        if store.entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            store.entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        self.ensure_open()?;

        let now = Instant::now();
        let expires_at = if ttl.is_zero() {
            None
        } else {
            now.checked_add(ttl)
        };

        let mut store = self.store.write().await;
        if now >= store.next_sweep {
            let removed = store.purge_expired(now);
            store.next_sweep = now.checked_add(self.sweep_interval).unwrap_or(now);
            if removed > 0 {
                debug!(removed = removed, "Swept expired cache entries");
            }
        }
        store.entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.ensure_open()?;
        Ok(self.store.write().await.entries.remove(key).is_some())
    }

    async fn close(&self) -> Result<(), CacheError> {
        self.closed.store(true, Ordering::Release);
        self.store.write().await.entries.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let backend = MemoryBackend::new();
        backend.set("k", b"v".to_vec(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(backend.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_entry_expires() {
        let backend = MemoryBackend::new();
        backend.set("k", b"v".to_vec(), Duration::from_millis(30)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(backend.get("k").await.unwrap(), None);
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_zero_ttl_never_expires() {
        let backend = MemoryBackend::new();
        backend.set("k", b"v".to_vec(), Duration::ZERO).await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(backend.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(backend.purge_expired().await, 0);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let backend = MemoryBackend::new();
        backend.set("short", b"1".to_vec(), Duration::from_millis(10)).await.unwrap();
        backend.set("long", b"2".to_vec(), Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(backend.purge_expired().await, 1);
        assert_eq!(backend.len().await, 1);
    }

    #[tokio::test]
    async fn test_writes_sweep_unread_expired_entries() {
        let backend = MemoryBackend::with_sweep_interval(Duration::from_millis(10));
        for i in 0..1000 {
            backend
                .set(&format!("k{i}"), b"v".to_vec(), Duration::from_millis(1))
                .await
                .unwrap();
        }

        tokio::time::sleep(Duration::from_millis(20)).await;
        backend.set("fresh", b"v".to_vec(), Duration::ZERO).await.unwrap();

        assert_eq!(backend.len().await, 1);
        assert_eq!(backend.get("fresh").await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn test_sweep_waits_for_interval() {
        let backend = MemoryBackend::with_sweep_interval(Duration::from_secs(60));
        backend.set("short", b"1".to_vec(), Duration::from_millis(1)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(10)).await;
        backend.set("other", b"2".to_vec(), Duration::ZERO).await.unwrap();

        // Not yet swept, but still reads as absent
        assert_eq!(backend.len().await, 2);
        assert_eq!(backend.get("short").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_overwrite_resets_ttl() {
        let backend = MemoryBackend::new();
        backend.set("k", b"old".to_vec(), Duration::from_millis(20)).await.unwrap();
        backend.set("k", b"new".to_vec(), Duration::ZERO).await.unwrap();

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(backend.get("k").await.unwrap(), Some(b"new".to_vec()));
    }

    #[tokio::test]
    async fn test_delete() {
        let backend = MemoryBackend::new();
        backend.set("k", b"v".to_vec(), Duration::ZERO).await.unwrap();
        assert!(backend.delete("k").await.unwrap());
        assert!(!backend.delete("k").await.unwrap());
    }

    #[tokio::test]
    async fn test_closed_backend_reports_transport_error() {
        let backend = MemoryBackend::new();
        backend.close().await.unwrap();

        assert!(matches!(backend.get("k").await, Err(CacheError::Transport(_))));
        assert!(matches!(
            backend.set("k", Vec::new(), Duration::ZERO).await,
            Err(CacheError::Transport(_))
        ));
    }
}
