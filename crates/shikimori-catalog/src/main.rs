//! Anime tracker CLI application.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use shared::config::CacheBackendKind;
use shared::{Config, Database, Repository};
use shikimori_catalog::{
    format, AnimeCache, AnimeService, CacheBackend, ClientOptions, MemoryBackend, RateLimiter,
    RedisBackend, ServiceSettings, ShikimoriClient,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search the catalog by title
    Search {
        query: String,
    },

    /// Show a single anime
    Show {
        id: i64,

        /// Mark the card if this user has it in favorites
        #[arg(long)]
        user: Option<i64>,
    },

    /// Manage a user's favorites
    Favorites {
        #[command(subcommand)]
        action: FavoritesAction,
    },

    /// Rate an anime from 1 to 10
    Rate {
        #[arg(long)]
        user: i64,

        anime_id: i64,

        score: u8,
    },
}

#[derive(Subcommand, Debug)]
enum FavoritesAction {
    /// List favorites, most recent first
    List {
        #[arg(long)]
        user: i64,
    },

    /// Add an anime to favorites
    Add {
        #[arg(long)]
        user: i64,

        /// Username stored on first use
        #[arg(long)]
        username: Option<String>,

        anime_id: i64,
    },

    /// Remove an anime from favorites
    Remove {
        #[arg(long)]
        user: i64,

        anime_id: i64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    // Load configuration
    let config = Config::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Initialize logging
    let mut log_config =
        shared::logging::from_config(&config.logging, &config.log_dir(), "anime-tracker");
    if args.verbose {
        log_config.default_level = tracing::Level::DEBUG;
    }
    let _log_guard = shared::logging::init(log_config)?;

    info!(config_file = %args.config.display(), "Loaded configuration");

    // Initialize database
    let db_path = config.database_path();
    debug!(db_path = %db_path.display(), "Opening database");
    let database = Database::open(&db_path).context("Failed to open database")?;
    let repository = Arc::new(Mutex::new(Repository::new(database)));

    // Initialize API client
    let rate_limiter = Arc::new(RateLimiter::new(config.shikimori.requests_per_minute));
    let client = ShikimoriClient::new(
        config.shikimori.base_url.clone(),
        Arc::clone(&rate_limiter),
        ClientOptions::from(&config.shikimori),
    )
    .context("Failed to create Shikimori client")?;

    // Initialize cache
    let cache = open_cache(&config).await?;

    let service = AnimeService::new(Arc::new(client), cache.clone())
        .with_settings(ServiceSettings::from(&config))
        .with_repository(repository, config.shikimori.image_host.clone());

    let result = execute(&service, args.command).await;

    if let Some(cache) = &cache {
        let stats = cache.stats();
        debug!(
            hits = stats.hits,
            misses = stats.misses,
            errors = stats.errors,
            "Cache statistics"
        );
        if let Err(e) = cache.close().await {
            warn!(error = %e, "Failed to close cache");
        }
    }
    rate_limiter.close().await;

    result
}

async fn open_cache(config: &Config) -> Result<Option<AnimeCache>> {
    if !config.cache.enabled {
        info!("Catalog cache disabled");
        return Ok(None);
    }

    let backend: Arc<dyn CacheBackend> = match config.cache.backend {
        CacheBackendKind::Memory => Arc::new(MemoryBackend::new()),
        CacheBackendKind::Redis => Arc::new(
            RedisBackend::connect(&config.cache.redis_url)
                .await
                .context("Failed to connect to redis")?,
        ),
    };

    info!(backend = ?config.cache.backend, "Catalog cache initialized");
    Ok(Some(AnimeCache::new(backend)))
}

async fn execute(service: &AnimeService, command: Command) -> Result<()> {
    match command {
        Command::Search { query } => {
            let query = query.trim();
            if query.is_empty() {
                bail!("Search query must not be empty");
            }
            let results = service.search_anime(query).await?;
            println!("{}", format::search_listing(&results));
        }

        Command::Show { id, user } => {
            let anime = service.get_anime_by_id(id).await?;
            let is_favorite = match user {
                Some(user_id) => service.is_favorite(user_id, id).await?,
                None => false,
            };
            println!("{}", format::anime_card(&anime, is_favorite));
        }

        Command::Favorites { action } => match action {
            FavoritesAction::List { user } => {
                let favorites = service.user_favorites(user).await?;
                if favorites.is_empty() {
                    println!("No favorites yet");
                }
                for favorite in favorites {
                    println!(
                        "[{}] {} (added {})",
                        favorite.anime_id,
                        favorite.title,
                        favorite.added_at.format("%Y-%m-%d")
                    );
                }
            }
            FavoritesAction::Add {
                user,
                username,
                anime_id,
            } => {
                let username = username.unwrap_or_else(|| format!("user{}", user));
                service.ensure_user(user, &username).await?;

                let anime = service.get_anime_by_id(anime_id).await?;
                if service.add_to_favorites(user, &anime).await? {
                    println!("Added \"{}\" to favorites", anime.display_title());
                } else {
                    println!("\"{}\" is already in favorites", anime.display_title());
                }
            }
            FavoritesAction::Remove { user, anime_id } => {
                if service.remove_from_favorites(user, anime_id).await? {
                    println!("Removed {} from favorites", anime_id);
                } else {
                    println!("{} was not in favorites", anime_id);
                }
            }
        },

        Command::Rate {
            user,
            anime_id,
            score,
        } => {
            service.ensure_user(user, &format!("user{}", user)).await?;
            service.rate_anime(user, anime_id, score).await?;
            println!("Rated {} with {}/10", anime_id, score);
        }
    }

    Ok(())
}
