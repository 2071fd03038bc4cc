//! Shikimori API client gated by the rate limiter.
//!
//! Each logical operation issues exactly one HTTP request. Nothing is retried
//! here; retry policy belongs to the caller.

use super::rate_limiter::RateLimiter;
use crate::error::CatalogError;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use shared::Anime;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Read access to the upstream anime catalog
#[async_trait]
pub trait AnimeCatalog: Send + Sync {
    /// Search by free-text query; an empty result is [`CatalogError::NotFound`]
    async fn search_anime(&self, query: &str, limit: u32) -> Result<Vec<Anime>, CatalogError>;

    /// Fetch a single record by its upstream ID
    async fn get_anime_by_id(&self, id: i64) -> Result<Anime, CatalogError>;
}

/// HTTP settings for [`ShikimoriClient`]
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Sent with every request; Shikimori rejects anonymous clients
    pub user_agent: String,
    /// On-wire timeout of a single request
    pub request_timeout: Duration,
    /// How long to queue for rate limiter capacity
    pub admission_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            user_agent: "TelegramAnimeBot/1.0".to_string(),
            request_timeout: Duration::from_secs(10),
            admission_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&shared::config::ShikimoriConfig> for ClientOptions {
    fn from(config: &shared::config::ShikimoriConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            admission_timeout: Duration::from_secs(config.admission_timeout_secs),
        }
    }
}

/// Shikimori API client
pub struct ShikimoriClient {
    /// HTTP client
    client: Client,
    /// Base URL for the API, without trailing slash
    base_url: String,
    /// Shared admission control
    rate_limiter: Arc<RateLimiter>,
    admission_timeout: Duration,
}

impl ShikimoriClient {
    /// Create a new client
    pub fn new(
        base_url: impl Into<String>,
        rate_limiter: Arc<RateLimiter>,
        options: ClientOptions,
    ) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .timeout(options.request_timeout)
            .user_agent(options.user_agent)
            .build()?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(CatalogError::InvalidRequest("empty base URL".to_string()));
        }

        Ok(Self {
            client,
            base_url,
            rate_limiter,
            admission_timeout: options.admission_timeout,
        })
    }

    /// The limiter gating this client
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Wait for admission, send one GET, and return status plus body
    async fn get(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<(StatusCode, Vec<u8>), CatalogError> {
        self.rate_limiter.wait_timeout(self.admission_timeout).await?;

        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "Making API request");

        let response = self.client.get(&url).query(query).send().await?;
        let status = response.status();
        let body = response.bytes().await?.to_vec();

        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(url = %url, "Rate limited by server");
            return Err(CatalogError::RateLimited);
        }

        Ok((status, body))
    }
}

fn decode<T: DeserializeOwned>(endpoint: &str, body: &[u8]) -> Result<T, CatalogError> {
    serde_json::from_slice(body).map_err(|source| {
        warn!(endpoint = endpoint, error = %source, "Failed to parse response");
        CatalogError::Decode {
            endpoint: endpoint.to_string(),
            source,
        }
    })
}

#[async_trait]
impl AnimeCatalog for ShikimoriClient {
    async fn search_anime(&self, query: &str, limit: u32) -> Result<Vec<Anime>, CatalogError> {
        debug!(query = %query, limit = limit, "Searching anime");

        let (status, body) = self
            .get(
                "/animes",
                &[("search", query.to_string()), ("limit", limit.to_string())],
            )
            .await?;

        match status {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                return Err(CatalogError::NotFound(format!("animes for query {:?}", query)))
            }
            other => {
                warn!(status = %other, query = %query, "Search request failed");
                return Err(CatalogError::UnexpectedStatus(other.as_u16()));
            }
        }

        let animes: Vec<Anime> = decode("/animes", &body)?;
        if animes.is_empty() {
            return Err(CatalogError::NotFound(format!("animes for query {:?}", query)));
        }

        debug!(query = %query, count = animes.len(), "Search successful");
        Ok(animes)
    }

    async fn get_anime_by_id(&self, id: i64) -> Result<Anime, CatalogError> {
        debug!(anime_id = id, "Fetching anime details");

        let path = format!("/animes/{}", id);
        let (status, body) = self.get(&path, &[]).await?;

        match status {
            StatusCode::OK => decode(&path, &body),
            StatusCode::NOT_FOUND => Err(CatalogError::NotFound(format!("anime with id {}", id))),
            other => {
                warn!(status = %other, anime_id = id, "Details request failed");
                Err(CatalogError::UnexpectedStatus(other.as_u16()))
            }
        }
    }
}
