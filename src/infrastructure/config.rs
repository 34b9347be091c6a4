//! Configuration infrastructure
//!
//! One immutable `HarvestConfig` is built at startup from layered sources
//! (built-in defaults, an optional file, `DOCKET__*` environment variables),
//! validated once, and then shared as `Arc<HarvestConfig>`.

#![allow(clippy::uninlined_format_args)]

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::domain::case::{CaseClass, CaseRequest};
use crate::infrastructure::persistence::SinkKind;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {source}")]
    Load {
        #[from]
        source: config::ConfigError,
    },

    #[error("Configuration validation failed: {message}")]
    Validation { message: String },
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Complete harvester configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub run: RunConfig,
    pub http: HttpConfig,
    pub pacing: PacingConfig,
    pub retry: RetryConfig,
    pub join: JoinConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

/// What to harvest and how to treat previous results
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub case_class: CaseClass,
    pub case_numbers: Vec<u64>,
    pub skip_existing: bool,
    /// Re-fetch cases whose latest recent attempt failed
    pub retry_failed: bool,
    pub max_age_hours: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_requests_per_second: u32,
}

/// Politeness settings. The delay floor, the target concurrency and the
/// ceiling feed the adaptive throttle; burst pauses add fixed rests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub concurrency_ceiling: usize,
    pub download_delay_ms: u64,
    pub target_concurrency: f64,
    pub max_delay_ms: u64,
    pub section_dispatch_delay_ms: u64,
    pub burst_pauses: Vec<BurstPauseRule>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurstPauseRule {
    /// Pause after every `every`-th request
    pub every: u64,
    pub pause_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_range_ms: u64,
    pub retry_http_codes: Vec<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinConfig {
    pub session_timeout_secs: u64,
    pub min_section_body_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub sinks: Vec<SinkKind>,
    pub custom_name: Option<String>,
    pub overwrite: bool,
    pub database_url: String,
    /// Directory of reference records for golden-output comparison
    pub reference_dir: Option<PathBuf>,
    pub store_html: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
    pub console_enabled: bool,
    pub file_enabled: bool,
    pub log_dir: Option<PathBuf>,
    /// Extra `EnvFilter` directives, e.g. `docket_harvest::crawling=debug`
    pub directives: Vec<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            case_class: CaseClass::Adi,
            case_numbers: Vec::new(),
            skip_existing: true,
            retry_failed: true,
            max_age_hours: defaults::MAX_AGE_HOURS,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::BASE_URL.to_string(),
            user_agent: defaults::USER_AGENT.to_string(),
            timeout_seconds: defaults::REQUEST_TIMEOUT_SECONDS,
            max_requests_per_second: 1,
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            concurrency_ceiling: 1,
            download_delay_ms: defaults::DOWNLOAD_DELAY_MS,
            target_concurrency: 2.0,
            max_delay_ms: 60_000,
            section_dispatch_delay_ms: defaults::DOWNLOAD_DELAY_MS,
            burst_pauses: vec![
                BurstPauseRule { every: 20, pause_ms: 5_000 },
                BurstPauseRule { every: 50, pause_ms: 20_000 },
            ],
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: defaults::RETRY_ATTEMPTS,
            base_delay_ms: 5_000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
            jitter_range_ms: 0,
            retry_http_codes: defaults::RETRY_HTTP_CODES.to_vec(),
        }
    }
}

impl Default for JoinConfig {
    fn default() -> Self {
        Self {
            session_timeout_secs: 300,
            min_section_body_bytes: 32,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            sinks: vec![SinkKind::Json],
            custom_name: None,
            overwrite: false,
            database_url: "sqlite:output/docket_harvest.db".to_string(),
            reference_dir: None,
            store_html: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            console_enabled: true,
            file_enabled: true,
            log_dir: None,
            directives: Vec::new(),
        }
    }
}

impl HarvestConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.run.case_numbers.is_empty() {
            return Err(ConfigError::invalid("run.case_numbers must list at least one case"));
        }
        if self.pacing.concurrency_ceiling == 0 {
            return Err(ConfigError::invalid("pacing.concurrency_ceiling must be greater than 0"));
        }
        if self.http.max_requests_per_second == 0 {
            return Err(ConfigError::invalid("http.max_requests_per_second must be greater than 0"));
        }
        if self.pacing.target_concurrency <= 0.0 {
            return Err(ConfigError::invalid("pacing.target_concurrency must be positive"));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::invalid("retry.backoff_multiplier must be at least 1.0"));
        }
        if self.retry.max_retries > 10 {
            return Err(ConfigError::invalid("retry.max_retries must not exceed 10"));
        }
        if self.pacing.burst_pauses.iter().any(|rule| rule.every == 0) {
            return Err(ConfigError::invalid("pacing.burst_pauses entries need every > 0"));
        }
        if let Err(e) = url::Url::parse(&self.http.base_url) {
            return Err(ConfigError::invalid(format!(
                "http.base_url {:?} is not a valid URL: {}",
                self.http.base_url, e
            )));
        }
        Ok(())
    }

    /// Requested cases, in input order with duplicates removed
    pub fn requests(&self) -> Vec<CaseRequest> {
        let mut seen = std::collections::HashSet::new();
        self.run
            .case_numbers
            .iter()
            .filter(|n| seen.insert(**n))
            .map(|&n| CaseRequest::new(self.run.case_class, n))
            .collect()
    }

    /// Sink selection; an empty list means JSON only
    pub fn effective_sinks(&self) -> Vec<SinkKind> {
        if self.output.sinks.is_empty() {
            vec![SinkKind::Json]
        } else {
            let mut sinks: Vec<SinkKind> = Vec::with_capacity(self.output.sinks.len());
            for sink in &self.output.sinks {
                if !sinks.contains(sink) {
                    sinks.push(*sink);
                }
            }
            sinks
        }
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.run.max_age_hours.saturating_mul(3600))
    }
}

impl PacingConfig {
    pub const fn download_delay(&self) -> Duration {
        Duration::from_millis(self.download_delay_ms)
    }

    pub const fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub const fn section_dispatch_delay(&self) -> Duration {
        Duration::from_millis(self.section_dispatch_delay_ms)
    }
}

impl JoinConfig {
    pub const fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }
}

/// Builds the configuration from its layered sources
pub struct ConfigManager;

impl ConfigManager {
    pub const ENV_PREFIX: &'static str = "DOCKET";

    /// Load defaults, then the optional file, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<HarvestConfig, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&HarvestConfig::default())?);

        if let Some(path) = path {
            info!("Loading configuration from {}", path.display());
            builder = builder.add_source(config::File::from(path));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(Self::ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("run.case_numbers")
                    .with_list_parse_key("output.sinks")
                    .try_parsing(true),
            )
            .build()?;

        let config: HarvestConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }
}

/// Default configuration values
pub mod defaults {
    pub const BASE_URL: &str = "https://portal.stf.jus.br";

    pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/137.0.0.0 Safari/537.36";

    pub const REQUEST_TIMEOUT_SECONDS: u64 = 30;

    /// Minimum delay between requests in milliseconds
    pub const DOWNLOAD_DELAY_MS: u64 = 2_000;

    pub const RETRY_ATTEMPTS: u32 = 3;

    pub const RETRY_HTTP_CODES: [u16; 7] = [403, 408, 429, 500, 502, 503, 504];

    pub const MAX_AGE_HOURS: u64 = 24;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn valid() -> HarvestConfig {
        let mut config = HarvestConfig::default();
        config.run.case_numbers = vec![4916, 4917];
        config
    }

    #[test]
    fn test_defaults_match_polite_profile() {
        let config = HarvestConfig::default();
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.retry_http_codes, vec![403, 408, 429, 500, 502, 503, 504]);
        assert_eq!(config.pacing.download_delay(), Duration::from_secs(2));
        assert_eq!(config.effective_sinks(), vec![SinkKind::Json]);
        assert!(config.run.skip_existing);
        assert!(config.run.retry_failed);
    }

    #[test]
    fn test_validation_rejects_empty_case_list() {
        let config = HarvestConfig::default();
        assert!(matches!(config.validate(), Err(ConfigError::Validation { .. })));
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = valid();
        config.pacing.concurrency_ceiling = 0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.retry.backoff_multiplier = 0.5;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.http.base_url = "not a url".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_requests_dedup_preserving_order() {
        let mut config = valid();
        config.run.case_numbers = vec![3, 1, 3, 2];
        let numbers: Vec<u64> = config.requests().iter().map(|r| r.number).collect();
        assert_eq!(numbers, vec![3, 1, 2]);
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harvest.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{"run": {{"case_class": "RE", "case_numbers": [1, 2]}}, "output": {{"sinks": ["csv", "sql"]}}}}"#
        )
        .unwrap();

        let config = ConfigManager::load(Some(&path)).unwrap();
        assert_eq!(config.run.case_class, CaseClass::Re);
        assert_eq!(config.run.case_numbers, vec![1, 2]);
        assert_eq!(config.effective_sinks(), vec![SinkKind::Csv, SinkKind::Sql]);
        assert_eq!(config.http.base_url, defaults::BASE_URL);
    }

    #[test]
    fn test_load_rejects_unknown_class_code() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harvest.json");
        std::fs::write(&path, r#"{"run": {"case_class": "NOPE", "case_numbers": [1]}}"#).unwrap();
        assert!(matches!(ConfigManager::load(Some(&path)), Err(ConfigError::Load { .. })));
    }
}
