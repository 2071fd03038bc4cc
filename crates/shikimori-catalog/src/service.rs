//! Catalog service: cache-aside reads in front of the catalog client.
//!
//! The service is the single entry point for catalog lookups and for the
//! per-user favorites and ratings kept in the local repository.

use crate::api::AnimeCatalog;
use crate::cache::{details_key, search_key, AnimeCache};
use crate::error::{Operation, ServiceError};
use anyhow::{bail, Result};
use shared::{Anime, Favorite, NewFavorite, Rating, Repository};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

/// Tunables for catalog lookups
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Maximum search results requested upstream
    pub search_limit: u32,
    pub search_ttl: Duration,
    pub details_ttl: Duration,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            search_limit: 10,
            search_ttl: Duration::from_secs(60 * 60),
            details_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl From<&shared::Config> for ServiceSettings {
    fn from(config: &shared::Config) -> Self {
        Self {
            search_limit: config.shikimori.search_limit,
            search_ttl: Duration::from_secs(config.cache.search_ttl_secs),
            details_ttl: Duration::from_secs(config.cache.details_ttl_secs),
        }
    }
}

/// Per-key async locks collapsing concurrent misses into one upstream call
#[derive(Default)]
struct KeyLocks {
    slots: StdMutex<HashMap<String, KeySlot>>,
}

struct KeySlot {
    lock: Arc<Mutex<()>>,
    /// Callers holding or queued on `lock`
    users: usize,
}

/// Unlocks its key on drop and forgets it once the last user is gone,
/// including when the owning future is cancelled mid-lookup
struct KeyGuard<'a> {
    owner: &'a KeyLocks,
    key: String,
    held: Option<OwnedMutexGuard<()>>,
}

impl KeyLocks {
    fn slots(&self) -> MutexGuard<'_, HashMap<String, KeySlot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn acquire(&self, key: &str) -> KeyGuard<'_> {
        let lock = {
            let mut slots = self.slots();
            let slot = slots.entry(key.to_string()).or_insert_with(|| KeySlot {
                lock: Arc::new(Mutex::new(())),
                users: 0,
            });
            slot.users += 1;
            Arc::clone(&slot.lock)
        };

        // Registered before waiting so a cancelled waiter still unregisters
        let mut key_guard = KeyGuard {
            owner: self,
            key: key.to_string(),
            held: None,
        };
        key_guard.held = Some(lock.lock_owned().await);
        key_guard
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots().len()
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        drop(self.held.take());

        let mut slots = self.owner.slots();
        if let Some(slot) = slots.get_mut(&self.key) {
            slot.users = slot.users.saturating_sub(1);
            if slot.users == 0 {
                slots.remove(&self.key);
            }
        }
    }
}

/// Anime lookup and favorites service
pub struct AnimeService {
    catalog: Arc<dyn AnimeCatalog>,
    cache: Option<AnimeCache>,
    settings: ServiceSettings,
    in_flight: KeyLocks,
    repository: Option<Arc<Mutex<Repository>>>,
    image_host: String,
}

impl AnimeService {
    /// Create a service; without a cache every lookup goes upstream
    pub fn new(catalog: Arc<dyn AnimeCatalog>, cache: Option<AnimeCache>) -> Self {
        Self {
            catalog,
            cache,
            settings: ServiceSettings::default(),
            in_flight: KeyLocks::default(),
            repository: None,
            image_host: "https://shikimori.one".to_string(),
        }
    }

    pub fn with_settings(mut self, settings: ServiceSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Attach the user repository and the host used to build poster URLs
    pub fn with_repository(
        mut self,
        repository: Arc<Mutex<Repository>>,
        image_host: impl Into<String>,
    ) -> Self {
        self.repository = Some(repository);
        self.image_host = image_host.into();
        self
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn cache(&self) -> Option<&AnimeCache> {
        self.cache.as_ref()
    }

    /// Search the catalog, serving from cache when possible
    pub async fn search_anime(&self, query: &str) -> Result<Vec<Anime>, ServiceError> {
        let Some(cache) = &self.cache else {
            return self.fetch_search(query).await;
        };

        if let Some(results) = cached(cache.get_search(query).await) {
            return Ok(results);
        }

        let key_guard = self.in_flight.acquire(&search_key(query)).await;

        // A concurrent caller may have populated it while we queued
        if let Some(results) = cached(cache.get_search(query).await) {
            drop(key_guard);
            return Ok(results);
        }

        let result = self.fetch_search(query).await;
        if let Ok(results) = &result {
            if let Err(e) = cache.set_search(query, results, self.settings.search_ttl).await {
                warn!(query = %query, error = %e, "Failed to cache search results");
            }
        }

        drop(key_guard);
        result
    }

    /// Fetch one record by ID, serving from cache when possible
    pub async fn get_anime_by_id(&self, id: i64) -> Result<Anime, ServiceError> {
        let Some(cache) = &self.cache else {
            return self.fetch_details(id).await;
        };

        if let Some(anime) = cached(cache.get_details(id).await) {
            return Ok(anime);
        }

        let key_guard = self.in_flight.acquire(&details_key(id)).await;

        if let Some(anime) = cached(cache.get_details(id).await) {
            drop(key_guard);
            return Ok(anime);
        }

        let result = self.fetch_details(id).await;
        if let Ok(anime) = &result {
            if let Err(e) = cache.set_details(id, anime, self.settings.details_ttl).await {
                warn!(anime_id = id, error = %e, "Failed to cache anime details");
            }
        }

        drop(key_guard);
        result
    }

    async fn fetch_search(&self, query: &str) -> Result<Vec<Anime>, ServiceError> {
        debug!(query = %query, "Searching upstream");
        self.catalog
            .search_anime(query, self.settings.search_limit)
            .await
            .map_err(|e| ServiceError::new(Operation::SearchAnime, e))
    }

    async fn fetch_details(&self, id: i64) -> Result<Anime, ServiceError> {
        debug!(anime_id = id, "Fetching details upstream");
        self.catalog
            .get_anime_by_id(id)
            .await
            .map_err(|e| ServiceError::new(Operation::GetAnimeById, e))
    }

    fn repository(&self) -> Result<&Arc<Mutex<Repository>>> {
        match &self.repository {
            Some(repository) => Ok(repository),
            None => bail!("No repository configured"),
        }
    }

    /// Register a user on first contact
    pub async fn ensure_user(&self, user_id: i64, username: &str) -> Result<()> {
        let mut repo = self.repository()?.lock().await;
        repo.create_user_if_absent(user_id, username)?;
        Ok(())
    }

    /// Save an anime to the user's favorites
    ///
    /// Returns `false` when it was already a favorite.
    pub async fn add_to_favorites(&self, user_id: i64, anime: &Anime) -> Result<bool> {
        let favorite = NewFavorite {
            user_id,
            anime_id: anime.id,
            title: anime.display_title().to_string(),
            poster_url: anime.poster_url(&self.image_host),
        };

        let mut repo = self.repository()?.lock().await;
        let added = repo.add_favorite(&favorite)?;
        if added {
            info!(user_id = user_id, anime_id = anime.id, "Added to favorites");
        }
        Ok(added)
    }

    pub async fn remove_from_favorites(&self, user_id: i64, anime_id: i64) -> Result<bool> {
        let mut repo = self.repository()?.lock().await;
        repo.remove_favorite(user_id, anime_id)
    }

    /// Favorites, most recently added first
    pub async fn user_favorites(&self, user_id: i64) -> Result<Vec<Favorite>> {
        let repo = self.repository()?.lock().await;
        repo.list_favorites(user_id)
    }

    pub async fn is_favorite(&self, user_id: i64, anime_id: i64) -> Result<bool> {
        let repo = self.repository()?.lock().await;
        repo.is_favorite(user_id, anime_id)
    }

    pub async fn count_favorites(&self, user_id: i64) -> Result<usize> {
        let repo = self.repository()?.lock().await;
        repo.count_favorites(user_id)
    }

    /// Set or replace the user's score for an anime
    pub async fn rate_anime(&self, user_id: i64, anime_id: i64, score: u8) -> Result<()> {
        if !Rating::is_valid_score(score) {
            bail!(
                "Score must be between {} and {}, got {}",
                Rating::MIN_SCORE,
                Rating::MAX_SCORE,
                score
            );
        }

        let mut repo = self.repository()?.lock().await;
        repo.upsert_rating(user_id, anime_id, score)
    }

    pub async fn user_rating(&self, user_id: i64, anime_id: i64) -> Result<Option<Rating>> {
        let repo = self.repository()?.lock().await;
        repo.get_rating(user_id, anime_id)
    }

    pub async fn clear_rating(&self, user_id: i64, anime_id: i64) -> Result<bool> {
        let mut repo = self.repository()?.lock().await;
        repo.delete_rating(user_id, anime_id)
    }
}

/// Treat cache failures as misses; they were already logged by the cache
fn cached<T>(lookup: Result<Option<T>, crate::error::CacheError>) -> Option<T> {
    lookup.ok().flatten()
}
