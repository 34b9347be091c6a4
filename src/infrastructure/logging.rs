//! Logging system configuration and initialization
//!
//! - Console output with UTC timestamps
//! - Optional daily-rolling file output (plain or JSON)
//! - `RUST_LOG` overrides the configured level and noise directives

#![allow(clippy::uninlined_format_args)]

use anyhow::{Result, anyhow};
use lazy_static::lazy_static;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Layer, Registry,
    fmt::{self, time::ChronoUtc},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;

pub const LOG_FILE_NAME: &str = "docket-harvest.log";

// Keeps the non-blocking file writers alive for the whole process
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> = Mutex::new(Vec::new());
}

/// Directives that quiet chatty dependencies unless TRACE is requested
const NOISE_DIRECTIVES: &[&str] = &[
    "sqlx::query=warn",
    "sqlx::sqlite=warn",
    "reqwest=info",
    "hyper=warn",
    "hyper_util=warn",
    "h2=warn",
    "html5ever=warn",
    "selectors=warn",
];

/// Resolve the log directory: configured path, else the platform data dir
pub fn get_log_directory(config: &LoggingConfig) -> PathBuf {
    config.log_dir.clone().unwrap_or_else(|| {
        dirs::data_local_dir()
            .map(|d| d.join("docket-harvest").join("logs"))
            .unwrap_or_else(|| PathBuf::from("logs"))
    })
}

/// Build the filter from `RUST_LOG` or the configured level plus directives
pub fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(&config.level)
        .map_err(|e| anyhow!("Invalid log level {:?}: {}", config.level, e))?;

    if !config.level.to_lowercase().contains("trace") {
        for directive in NOISE_DIRECTIVES {
            filter = filter.add_directive(
                directive
                    .parse()
                    .map_err(|e| anyhow!("Invalid built-in directive {}: {}", directive, e))?,
            );
        }
    }
    for directive in &config.directives {
        filter = filter.add_directive(
            directive
                .parse()
                .map_err(|e| anyhow!("Invalid log directive {:?}: {}", directive, e))?,
        );
    }
    Ok(filter)
}

/// Initialize logging with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(&LoggingConfig::default())
}

/// Initialize logging with custom configuration.
///
/// Fails if a global subscriber is already installed.
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    let env_filter = build_env_filter(config)?;

    let console_layer = config.console_enabled.then(|| {
        fmt::Layer::new()
            .with_writer(std::io::stderr)
            .with_timer(ChronoUtc::rfc_3339())
            .with_target(false)
            .boxed()
    });

    let mut log_path = None;
    let file_layer = if config.file_enabled {
        let log_dir = get_log_directory(config);
        std::fs::create_dir_all(&log_dir)
            .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", log_dir, e))?;

        let file_appender = rolling::daily(&log_dir, LOG_FILE_NAME);
        let (file_writer, file_guard) = non_blocking(file_appender);
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("Log guard registry poisoned"))?
            .push(file_guard);
        log_path = Some(log_dir.join(LOG_FILE_NAME));

        let layer = fmt::Layer::new()
            .with_writer(file_writer)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(false);
        Some(if config.json {
            layer.json().with_target(true).with_thread_ids(true).boxed()
        } else {
            layer.with_target(true).boxed()
        })
    } else {
        None
    };

    Registry::default()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?;

    info!(level = %config.level, json = config.json, "📝 Logging initialized");
    if let Some(path) = log_path {
        info!("📁 Log file: {}", path.display());
    }
    Ok(())
}
