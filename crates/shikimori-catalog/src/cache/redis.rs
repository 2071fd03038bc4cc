//! Redis backing store.

use super::backend::CacheBackend;
use crate::error::CacheError;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

/// Redis-backed cache store; expiry is enforced by Redis itself
#[derive(Clone)]
pub struct RedisBackend {
    connection_manager: ConnectionManager,
    /// Shared by clones so closing one closes all
    closed: Arc<AtomicBool>,
}

impl RedisBackend {
    /// Connect to Redis and verify the connection with a PING
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = Client::open(url).map_err(|e| {
            error!(error = %e, "Failed to parse redis URL");
            CacheError::Transport(format!("failed to parse redis URL: {}", e))
        })?;

        let mut connection_manager = ConnectionManager::new(client).await.map_err(|e| {
            error!(error = %e, "Failed to connect to redis");
            CacheError::Transport(format!("failed to connect to redis: {}", e))
        })?;

        redis::cmd("PING")
            .query_async::<String>(&mut connection_manager)
            .await?;

        info!("Redis cache connected");

        Ok(Self {
            connection_manager,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// A connection handle, or a transport error once closed
    fn connection(&self) -> Result<ConnectionManager, CacheError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Transport("redis cache is closed".to_string()));
        }
        Ok(self.connection_manager.clone())
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut conn = self.connection()?;

        let value = redis::cmd("GET")
            .arg(key)
            .query_async::<Option<Vec<u8>>>(&mut conn)
            .await
            .map_err(|e| {
                error!(key = %key, error = %e, "Redis GET failed");
                CacheError::from(e)
            })?;

        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.connection()?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if !ttl.is_zero() {
            // PX needs at least one millisecond
            let ttl_ms = ttl.as_millis().clamp(1, u64::MAX as u128) as u64;
            cmd.arg("PX").arg(ttl_ms);
        }

        cmd.query_async::<()>(&mut conn).await.map_err(|e| {
            error!(key = %key, error = %e, "Redis SET failed");
            CacheError::from(e)
        })?;

        debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "Stored cache entry in redis");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection()?;

        let deleted = redis::cmd("DEL")
            .arg(key)
            .query_async::<i64>(&mut conn)
            .await?;

        Ok(deleted > 0)
    }

    async fn close(&self) -> Result<(), CacheError> {
        // The socket itself closes once the last manager clone drops
        self.closed.store(true, Ordering::Release);
        debug!("Redis cache closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests require a running Redis instance reachable at REDIS_URL

    fn redis_url() -> String {
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
    }

    #[tokio::test]
    #[ignore] // Requires a Redis instance
    async fn test_redis_set_get_delete() {
        let backend = RedisBackend::connect(&redis_url()).await.unwrap();

        backend
            .set("test:redis:roundtrip", b"value".to_vec(), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(
            backend.get("test:redis:roundtrip").await.unwrap(),
            Some(b"value".to_vec())
        );

        assert!(backend.delete("test:redis:roundtrip").await.unwrap());
        assert_eq!(backend.get("test:redis:roundtrip").await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore] // Requires a Redis instance
    async fn test_redis_ttl() {
        let backend = RedisBackend::connect(&redis_url()).await.unwrap();

        backend
            .set("test:redis:ttl", b"value".to_vec(), Duration::from_millis(100))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(backend.get("test:redis:ttl").await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore] // Requires a Redis instance
    async fn test_closed_backend_reports_transport_error() {
        let backend = RedisBackend::connect(&redis_url()).await.unwrap();
        let clone = backend.clone();
        backend.close().await.unwrap();

        assert!(matches!(backend.get("k").await, Err(CacheError::Transport(_))));
        assert!(matches!(
            clone.set("k", Vec::new(), Duration::ZERO).await,
            Err(CacheError::Transport(_))
        ));
        assert!(matches!(clone.delete("k").await, Err(CacheError::Transport(_))));
    }

    #[tokio::test]
    async fn test_invalid_url_is_transport_error() {
        let result = RedisBackend::connect("not a url").await;
        assert!(matches!(result, Err(CacheError::Transport(_))));
    }
}
