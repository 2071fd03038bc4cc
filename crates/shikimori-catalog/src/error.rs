//! Error types for catalog access.

use thiserror::Error;

/// The rate limiter gave up before a token became available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("rate limiter wait canceled before a token became available")]
pub struct WaitCanceled;

/// Failures of a single upstream catalog call
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Local admission control could not grant capacity in time
    #[error("rate limit wait error: {0}")]
    AdmissionTimeout(#[from] WaitCanceled),

    /// HTTP 404 or an empty search result
    #[error("{0} not found")]
    NotFound(String),

    /// HTTP 429 from upstream
    #[error("rate limit exceeded, try again later")]
    RateLimited,

    #[error("unexpected status code: {0}")]
    UnexpectedStatus(u16),

    /// Response body did not match the expected shape
    #[error("error decoding response from {endpoint}: {source}")]
    Decode {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl CatalogError {
    /// Whether retrying later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CatalogError::AdmissionTimeout(_)
                | CatalogError::RateLimited
                | CatalogError::Transport(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CatalogError::NotFound(_))
    }
}

/// Failures of the cache-aside store
#[derive(Debug, Error)]
pub enum CacheError {
    /// Backing store unreachable or closed
    #[error("cache transport error: {0}")]
    Transport(String),

    /// A stored value could not be deserialized
    #[error("corrupted cache entry at {key}: {source}")]
    Corrupted {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize cache value: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::Transport(e.to_string())
    }
}

/// Operation names used as error context by the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    SearchAnime,
    GetAnimeById,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::SearchAnime => write!(f, "search anime"),
            Operation::GetAnimeById => write!(f, "get anime by id"),
        }
    }
}

/// A catalog failure wrapped with the service operation that hit it
#[derive(Debug, Error)]
#[error("failed to {operation}: {source}")]
pub struct ServiceError {
    pub operation: Operation,
    #[source]
    pub source: CatalogError,
}

impl ServiceError {
    pub fn new(operation: Operation, source: CatalogError) -> Self {
        Self { operation, source }
    }

    /// The underlying catalog failure
    pub fn kind(&self) -> &CatalogError {
        &self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_error_message_keeps_context() {
        let err = ServiceError::new(
            Operation::GetAnimeById,
            CatalogError::NotFound("anime with id 999".to_string()),
        );
        assert_eq!(err.to_string(), "failed to get anime by id: anime with id 999 not found");
        assert!(err.kind().is_not_found());
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(CatalogError::RateLimited.is_retryable());
        assert!(CatalogError::AdmissionTimeout(WaitCanceled).is_retryable());
        assert!(!CatalogError::UnexpectedStatus(500).is_retryable());
        assert!(!CatalogError::NotFound("x".into()).is_retryable());
    }
}
