//! Docket Harvest - incremental case-record harvester
//!
//! Fetches a court portal's case pages, joins each case's section fragments
//! into one record, and writes the records to JSON, CSV, JSONL and SQLite
//! while keeping a crawl history that decides what the next run re-fetches.

pub mod crawling;
pub mod domain;
pub mod infrastructure;

use std::sync::Arc;
use tracing::info;

pub use crawling::{HarvestError, HarvestOrchestrator, RunSummary};
pub use infrastructure::config::{ConfigManager, HarvestConfig};

use infrastructure::database_connection::DatabaseConnection;
use infrastructure::http_client::HttpClient;
use infrastructure::scrape_state_store::ScrapeStateStore;

/// Run one harvest with a loaded configuration.
///
/// Only orchestration problems are errors: bad configuration, an
/// unreachable store, an HTTP client that cannot be built. Individual case
/// failures end up in the summary.
pub async fn run_harvest(config: HarvestConfig) -> Result<RunSummary, HarvestError> {
    config.validate()?;
    let requests = config.requests();

    let db = DatabaseConnection::new(&config.output.database_url)
        .await
        .map_err(|e| HarvestError::Store(format!("{e:#}")))?;
    db.migrate().await.map_err(|e| HarvestError::Store(format!("{e:#}")))?;
    info!(database = %config.output.database_url, "🗄️ Crawl state store ready");

    let client = HttpClient::new(&config.http, &config.pacing)?;
    let state_store = Arc::new(ScrapeStateStore::new(db.pool().clone()));
    let orchestrator = HarvestOrchestrator::new(Arc::new(config), state_store, Arc::new(client));

    let signals = orchestrator.listen_for_signals();
    let summary = orchestrator.run(&requests).await;
    signals.abort();
    summary
}
