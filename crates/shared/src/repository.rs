//! User, favorite, and rating persistence.
//!
//! Lookups that may legitimately find nothing return `Option`; errors are
//! reserved for database failures and rejected input.

use crate::models::*;
use crate::Database;
use anyhow::{bail, Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use tracing::{debug, info};

/// Repository over the users, favorites, and ratings tables
pub struct Repository {
    db: Database,
}

impl Repository {
    /// Create a new repository with the given database
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert the user unless a row with the same ID already exists
    ///
    /// Returns `true` when a new user was created.
    pub fn create_user_if_absent(&mut self, user_id: i64, username: &str) -> Result<bool> {
        let conn = self.db.conn_mut();

        let inserted = conn
            .execute(
                "INSERT INTO users (id, username, created_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (id) DO NOTHING",
                params![user_id, username, Utc::now()],
            )
            .context("Failed to create user")?;

        if inserted > 0 {
            info!(user_id = user_id, username = %username, "Created new user");
        }

        Ok(inserted > 0)
    }

    /// Look up a user by ID
    pub fn get_user(&self, user_id: i64) -> Result<Option<User>> {
        self.db
            .conn()
            .query_row(
                "SELECT id, username, created_at FROM users WHERE id = ?1",
                params![user_id],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()
            .context("Failed to get user")
    }

    /// Add an anime to a user's favorites (duplicates are ignored)
    ///
    /// Returns `true` when a new favorite was stored.
    pub fn add_favorite(&mut self, favorite: &NewFavorite) -> Result<bool> {
        let conn = self.db.conn_mut();

        let inserted = conn
            .execute(
                "INSERT INTO favorites (user_id, anime_id, title, poster_url, added_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (user_id, anime_id) DO NOTHING",
                params![
                    favorite.user_id,
                    favorite.anime_id,
                    favorite.title,
                    favorite.poster_url,
                    Utc::now(),
                ],
            )
            .context("Failed to add favorite")?;

        debug!(
            user_id = favorite.user_id,
            anime_id = favorite.anime_id,
            inserted = inserted > 0,
            "Added favorite"
        );

        Ok(inserted > 0)
    }

    /// Remove an anime from a user's favorites
    ///
    /// Returns `true` when a favorite was deleted.
    pub fn remove_favorite(&mut self, user_id: i64, anime_id: i64) -> Result<bool> {
        let deleted = self
            .db
            .conn_mut()
            .execute(
                "DELETE FROM favorites WHERE user_id = ?1 AND anime_id = ?2",
                params![user_id, anime_id],
            )
            .context("Failed to remove favorite")?;

        debug!(user_id = user_id, anime_id = anime_id, deleted = deleted > 0, "Removed favorite");

        Ok(deleted > 0)
    }

    /// List a user's favorites, most recently added first
    pub fn list_favorites(&self, user_id: i64) -> Result<Vec<Favorite>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, user_id, anime_id, title, poster_url, added_at
             FROM favorites
             WHERE user_id = ?1
             ORDER BY added_at DESC, id DESC",
        )?;

        let favorites = stmt
            .query_map(params![user_id], row_to_favorite)?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to get favorites")?;

        Ok(favorites)
    }

    /// Check whether an anime is in a user's favorites
    pub fn is_favorite(&self, user_id: i64, anime_id: i64) -> Result<bool> {
        let exists: bool = self
            .db
            .conn()
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM favorites WHERE user_id = ?1 AND anime_id = ?2)",
                params![user_id, anime_id],
                |row| row.get(0),
            )
            .context("Failed to check favorite")?;
        Ok(exists)
    }

    /// Count a user's favorites
    pub fn count_favorites(&self, user_id: i64) -> Result<usize> {
        let count: i64 = self
            .db
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM favorites WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .context("Failed to count favorites")?;
        Ok(count as usize)
    }

    /// Insert or replace a user's score for an anime
    pub fn upsert_rating(&mut self, user_id: i64, anime_id: i64, score: u8) -> Result<()> {
        if !Rating::is_valid_score(score) {
            bail!(
                "Rating score must be between {} and {}, got {}",
                Rating::MIN_SCORE,
                Rating::MAX_SCORE,
                score
            );
        }

        self.db
            .conn_mut()
            .execute(
                "INSERT INTO ratings (user_id, anime_id, score, rated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (user_id, anime_id)
                 DO UPDATE SET score = excluded.score, rated_at = excluded.rated_at",
                params![user_id, anime_id, score, Utc::now()],
            )
            .context("Failed to upsert rating")?;

        debug!(user_id = user_id, anime_id = anime_id, score = score, "Stored rating");

        Ok(())
    }

    /// Look up a user's score for an anime
    pub fn get_rating(&self, user_id: i64, anime_id: i64) -> Result<Option<Rating>> {
        self.db
            .conn()
            .query_row(
                "SELECT id, user_id, anime_id, score, rated_at
                 FROM ratings WHERE user_id = ?1 AND anime_id = ?2",
                params![user_id, anime_id],
                |row| {
                    Ok(Rating {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        anime_id: row.get(2)?,
                        score: row.get(3)?,
                        rated_at: row.get(4)?,
                    })
                },
            )
            .optional()
            .context("Failed to get rating")
    }

    /// Delete a user's score for an anime
    ///
    /// Returns `true` when a rating was deleted.
    pub fn delete_rating(&mut self, user_id: i64, anime_id: i64) -> Result<bool> {
        let deleted = self
            .db
            .conn_mut()
            .execute(
                "DELETE FROM ratings WHERE user_id = ?1 AND anime_id = ?2",
                params![user_id, anime_id],
            )
            .context("Failed to delete rating")?;
        Ok(deleted > 0)
    }
}

fn row_to_favorite(row: &rusqlite::Row) -> rusqlite::Result<Favorite> {
    Ok(Favorite {
        id: row.get(0)?,
        user_id: row.get(1)?,
        anime_id: row.get(2)?,
        title: row.get(3)?,
        poster_url: row.get(4)?,
        added_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repository() -> Result<Repository> {
        Ok(Repository::new(Database::open_in_memory()?))
    }

    fn favorite(user_id: i64, anime_id: i64, title: &str) -> NewFavorite {
        NewFavorite {
            user_id,
            anime_id,
            title: title.to_string(),
            poster_url: Some(format!("https://shikimori.one/{}.jpg", anime_id)),
        }
    }

    #[test]
    fn test_create_user_if_absent() -> Result<()> {
        let mut repo = repository()?;

        assert!(repo.create_user_if_absent(1, "alice")?);
        assert!(!repo.create_user_if_absent(1, "renamed")?);

        let user = repo.get_user(1)?.unwrap();
        assert_eq!(user.username, "alice");

        Ok(())
    }

    #[test]
    fn test_get_missing_user_is_none() -> Result<()> {
        let repo = repository()?;
        assert_eq!(repo.get_user(42)?, None);
        Ok(())
    }

    #[test]
    fn test_favorites_lifecycle() -> Result<()> {
        let mut repo = repository()?;
        repo.create_user_if_absent(1, "alice")?;

        assert!(repo.add_favorite(&favorite(1, 20, "Naruto"))?);
        assert!(!repo.add_favorite(&favorite(1, 20, "Naruto"))?);
        assert!(repo.add_favorite(&favorite(1, 1535, "Death Note"))?);

        assert!(repo.is_favorite(1, 20)?);
        assert!(!repo.is_favorite(1, 999)?);
        assert_eq!(repo.count_favorites(1)?, 2);

        assert!(repo.remove_favorite(1, 20)?);
        assert!(!repo.remove_favorite(1, 20)?);
        assert_eq!(repo.count_favorites(1)?, 1);

        Ok(())
    }

    #[test]
    fn test_list_favorites_newest_first() -> Result<()> {
        let mut repo = repository()?;
        repo.create_user_if_absent(1, "alice")?;
        repo.create_user_if_absent(2, "bob")?;

        repo.add_favorite(&favorite(1, 10, "First"))?;
        repo.add_favorite(&favorite(1, 11, "Second"))?;
        repo.add_favorite(&favorite(2, 12, "Other user"))?;

        let titles: Vec<_> = repo
            .list_favorites(1)?
            .into_iter()
            .map(|f| f.title)
            .collect();
        assert_eq!(titles, vec!["Second", "First"]);

        Ok(())
    }

    #[test]
    fn test_favorite_requires_user() -> Result<()> {
        let mut repo = repository()?;
        assert!(repo.add_favorite(&favorite(7, 1, "Orphan")).is_err());
        Ok(())
    }

    #[test]
    fn test_ratings() -> Result<()> {
        let mut repo = repository()?;
        repo.create_user_if_absent(1, "alice")?;

        assert_eq!(repo.get_rating(1, 20)?, None);

        repo.upsert_rating(1, 20, 7)?;
        assert_eq!(repo.get_rating(1, 20)?.unwrap().score, 7);

        repo.upsert_rating(1, 20, 9)?;
        assert_eq!(repo.get_rating(1, 20)?.unwrap().score, 9);

        assert!(repo.upsert_rating(1, 20, 0).is_err());
        assert!(repo.upsert_rating(1, 20, 11).is_err());

        assert!(repo.delete_rating(1, 20)?);
        assert!(!repo.delete_rating(1, 20)?);
        assert_eq!(repo.get_rating(1, 20)?, None);

        Ok(())
    }
}
