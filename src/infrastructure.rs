//! Infrastructure layer: configuration, logging, HTTP, pacing and storage
//!
//! Everything here talks to the outside world (files, SQLite, the portal).
//! The crawl core in `crawling` only sees these through the types and
//! traits re-exported below.

pub mod config;
pub mod database_connection;
pub mod http_client;
pub mod logging;
pub mod output_naming;
pub mod pacing;
pub mod persistence;
pub mod retry_calculator;
pub mod scrape_state_store;

pub use config::{ConfigError, ConfigManager, HarvestConfig};
pub use database_connection::DatabaseConnection;
pub use http_client::{FetchError, HttpClient, HttpResponse, PageFetcher};
pub use logging::{get_log_directory, init_logging, init_logging_with_config};
pub use persistence::{PersistenceError, PersistenceGateway, SinkKind, SinkResult, SinkStatus};
pub use retry_calculator::RetryCalculator;
pub use scrape_state_store::{FetchPlan, PlanDecision, PlanOptions, ScrapeStateStore, StateStoreError};
