//! Logging infrastructure for the anime tracker.
//!
//! Console and rotated file output via `tracing-subscriber`, filtered per
//! crate with a component-level default.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Rotated log files kept per component
const MAX_LOG_FILES: usize = 7;

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log directory path
    pub log_dir: String,
    /// Component name (used for log file naming)
    pub component: String,
    /// Default log level
    pub default_level: Level,
    /// Enable console output
    pub console: bool,
    /// Enable file output
    pub file: bool,
    /// Enable JSON formatting for file logs
    pub json_format: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: "data/logs".to_string(),
            component: "anime-tracker".to_string(),
            default_level: Level::INFO,
            console: true,
            file: true,
            json_format: false,
        }
    }
}

/// Keeps the background file writer alive; logs are flushed when dropped
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file_writer: Option<WorkerGuard>,
}

/// Initialize logging with the given configuration
///
/// Console output goes to stderr so command output on stdout stays clean.
/// File output rotates daily and keeps the last week of files. `RUST_LOG`
/// overrides the configured directives.
pub fn init(config: LogConfig) -> Result<LogGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(default_directives(&config.component, config.default_level))
    });

    let mut layers = Vec::new();
    let mut file_writer = None;

    if config.console {
        layers.push(
            fmt::layer()
                .with_target(true)
                .with_span_events(FmtSpan::NONE)
                .with_writer(std::io::stderr)
                .boxed(),
        );
    }

    if config.file {
        let log_dir = Path::new(&config.log_dir);
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {}", config.log_dir))?;

        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix(&config.component)
            .filename_suffix("log")
            .max_log_files(MAX_LOG_FILES)
            .build(log_dir)
            .context("Failed to create log file appender")?;
        let (writer, guard) = tracing_appender::non_blocking(appender);
        file_writer = Some(guard);

        let layer = if config.json_format {
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .with_writer(writer)
                .boxed()
        } else {
            fmt::layer()
                .with_ansi(false)
                .with_span_events(FmtSpan::CLOSE)
                .with_writer(writer)
                .boxed()
        };
        layers.push(layer);
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    tracing::debug!(
        component = %config.component,
        log_dir = %config.log_dir,
        "Logging initialized"
    );

    Ok(LogGuard {
        _file_writer: file_writer,
    })
}

/// Build the default filter directives for a component
///
/// Binary names use dashes while tracing targets use the crate path, so
/// the component name is normalized before it becomes a directive.
fn default_directives(component: &str, level: Level) -> String {
    format!(
        "{}={level},shared={level},shikimori_catalog={level},hyper=warn,reqwest=warn,h2=warn,redis=warn",
        component.replace('-', "_"),
        level = level
    )
}

/// Build a [`LogConfig`] from the file configuration of a component
///
/// Unknown level names fall back to INFO.
pub fn from_config(
    logging: &crate::config::LoggingConfig,
    log_dir: &Path,
    component: &str,
) -> LogConfig {
    LogConfig {
        log_dir: log_dir.to_string_lossy().to_string(),
        component: component.to_string(),
        default_level: logging.default_level.parse().unwrap_or(Level::INFO),
        console: logging.console,
        file: logging.file,
        json_format: logging.json_format,
    }
}
