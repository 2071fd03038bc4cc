//! Data models for the project.
//!
//! This module defines the catalog entities fetched from Shikimori and the
//! per-user records (users, favorites, ratings) kept in the local database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Anime record as returned by the Shikimori API
///
/// Records are replaced wholesale on every re-fetch, never patched in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Anime {
    pub id: i64,                  // Shikimori ID

    // Titles
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub russian: String,

    #[serde(default, deserialize_with = "null_as_default")]
    pub image: AnimeImage,

    // Type and status
    #[serde(default, deserialize_with = "null_as_default")]
    pub kind: String,             // tv, movie, ova, ...
    #[serde(default, deserialize_with = "null_as_default")]
    pub score: String,            // numeric score carried as a string upstream
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,           // anons, ongoing, released
    #[serde(default, deserialize_with = "null_as_default")]
    pub episodes: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub episodes_aired: u32,

    // Dates
    #[serde(default)]
    pub aired_on: Option<String>,
    #[serde(default)]
    pub released_on: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub genres: Vec<Genre>,
}

impl Anime {
    /// Localized title when present, otherwise the romanized name
    pub fn display_title(&self) -> &str {
        if self.russian.trim().is_empty() {
            &self.name
        } else {
            &self.russian
        }
    }

    /// Absolute poster URL built from the preview image path
    pub fn poster_url(&self, host: &str) -> Option<String> {
        let preview = self.image.preview.trim();
        if preview.is_empty() {
            return None;
        }
        if preview.starts_with("http://") || preview.starts_with("https://") {
            return Some(preview.to_string());
        }
        Some(format!("{}{}", host.trim_end_matches('/'), preview))
    }
}

/// Image paths, relative to the Shikimori host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimeImage {
    #[serde(default)]
    pub original: String,
    #[serde(default)]
    pub preview: String,
}

/// Genre attached to an anime
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Genre {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub russian: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub entry_type: String,
}

/// Bot user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,                  // Telegram user ID
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// Favorite entry stored for a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorite {
    pub id: i64,
    pub user_id: i64,
    pub anime_id: i64,
    pub title: String,
    pub poster_url: Option<String>,
    pub added_at: DateTime<Utc>,
}

/// New favorite to be inserted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFavorite {
    pub user_id: i64,
    pub anime_id: i64,
    pub title: String,
    pub poster_url: Option<String>,
}

/// User's personal score for an anime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rating {
    pub id: i64,
    pub user_id: i64,
    pub anime_id: i64,
    pub score: u8,                // 1..=10
    pub rated_at: DateTime<Utc>,
}

impl Rating {
    pub const MIN_SCORE: u8 = 1;
    pub const MAX_SCORE: u8 = 10;

    /// Check whether a score is within the accepted range
    pub fn is_valid_score(score: u8) -> bool {
        (Self::MIN_SCORE..=Self::MAX_SCORE).contains(&score)
    }
}

// Shikimori sends explicit nulls for fields it has no value for.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_upstream_payload() {
        let json = r#"{
            "id": 20,
            "name": "Naruto",
            "russian": "Наруто",
            "image": {"original": "/system/animes/original/20.jpg", "preview": "/system/animes/preview/20.jpg"},
            "kind": "tv",
            "score": "8.0",
            "status": "released",
            "episodes": 220,
            "episodes_aired": 0,
            "aired_on": "2002-10-03",
            "released_on": null,
            "description": null,
            "genres": [{"id": 1, "name": "Action", "russian": "Экшен", "kind": "genre", "entry_type": "Genre"}]
        }"#;

        let anime: Anime = serde_json::from_str(json).unwrap();
        assert_eq!(anime.id, 20);
        assert_eq!(anime.episodes, 220);
        assert_eq!(anime.released_on, None);
        assert_eq!(anime.description, None);
        assert_eq!(anime.genres.len(), 1);
        assert_eq!(anime.genres[0].name, "Action");
    }

    #[test]
    fn test_nulls_become_defaults() {
        let json = r#"{"id": 5, "name": "X", "russian": null, "kind": null, "episodes": null, "genres": null}"#;
        let anime: Anime = serde_json::from_str(json).unwrap();
        assert_eq!(anime.russian, "");
        assert_eq!(anime.episodes, 0);
        assert!(anime.genres.is_empty());
    }

    #[test]
    fn test_display_title() {
        let mut anime = Anime {
            id: 1,
            name: "Death Note".to_string(),
            russian: "Тетрадь смерти".to_string(),
            ..Default::default()
        };
        assert_eq!(anime.display_title(), "Тетрадь смерти");

        anime.russian = "  ".to_string();
        assert_eq!(anime.display_title(), "Death Note");
    }

    #[test]
    fn test_poster_url() {
        let mut anime = Anime::default();
        assert_eq!(anime.poster_url("https://shikimori.one"), None);

        anime.image.preview = "/123.jpg".to_string();
        assert_eq!(
            anime.poster_url("https://shikimori.one/").as_deref(),
            Some("https://shikimori.one/123.jpg")
        );

        anime.image.preview = "https://cdn.example/1.jpg".to_string();
        assert_eq!(
            anime.poster_url("https://shikimori.one").as_deref(),
            Some("https://cdn.example/1.jpg")
        );
    }

    #[test]
    fn test_rating_score_range() {
        assert!(!Rating::is_valid_score(0));
        assert!(Rating::is_valid_score(1));
        assert!(Rating::is_valid_score(10));
        assert!(!Rating::is_valid_score(11));
    }
}
