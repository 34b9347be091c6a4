//! Multi-sink persistence gateway
//!
//! Each sink is independent: a failing sink is reported in its own
//! `SinkResult` and never stops the others. File sinks other than JSONL
//! buffer in memory and are written once by `finish` at shutdown.

pub mod file_sinks;
pub mod structured_sink;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::crawling::validator::flatten_for_storage;
use crate::domain::case::CaseRequest;
use crate::domain::record::CaseRecord;
use crate::infrastructure::config::OutputConfig;
use crate::infrastructure::output_naming::output_path;
use crate::infrastructure::scrape_state_store::{ScrapeStateStore, StateStoreError};

pub use file_sinks::{CsvSink, JsonArraySink, JsonlSink};
pub use structured_sink::StructuredSink;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Sink buffer lock poisoned: {0}")]
    Poisoned(String),

    #[error("Sink {0} was not configured for this run")]
    NotConfigured(SinkKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Json,
    Csv,
    Jsonl,
    Sql,
}

impl SinkKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Jsonl => "jsonl",
            Self::Sql => "sql",
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkStatus {
    /// Record is durable in the sink
    Written,
    /// Record is held in memory until shutdown
    Buffered,
    /// Shutdown write of this many records
    Flushed(usize),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkResult {
    pub sink: SinkKind,
    pub status: SinkStatus,
}

impl SinkResult {
    fn from_result(sink: SinkKind, result: Result<SinkStatus, PersistenceError>) -> Self {
        let status = match result {
            Ok(status) => status,
            Err(e) => {
                error!(sink = %sink, "Sink write failed: {}", e);
                SinkStatus::Failed(e.to_string())
            }
        };
        Self { sink, status }
    }

    pub const fn is_failure(&self) -> bool {
        matches!(self.status, SinkStatus::Failed(_))
    }
}

pub struct PersistenceGateway {
    structured: Option<StructuredSink>,
    json: Option<JsonArraySink>,
    csv: Option<CsvSink>,
    jsonl: Option<JsonlSink>,
    state_store: Arc<ScrapeStateStore>,
}

impl PersistenceGateway {
    /// Open the sinks selected for this run. Files are named `{stem}.{ext}`
    /// under the output directory.
    pub fn new(output: &OutputConfig, stem: &str, sinks: &[SinkKind], state_store: Arc<ScrapeStateStore>) -> Self {
        let file = |ext: &str| output_path(&output.dir, stem, ext);
        Self {
            structured: sinks
                .contains(&SinkKind::Sql)
                .then(|| StructuredSink::new(state_store.pool().clone())),
            json: sinks
                .contains(&SinkKind::Json)
                .then(|| JsonArraySink::new(file("json"), output.overwrite)),
            csv: sinks
                .contains(&SinkKind::Csv)
                .then(|| CsvSink::new(file("csv"), output.overwrite)),
            jsonl: sinks
                .contains(&SinkKind::Jsonl)
                .then(|| JsonlSink::new(file("jsonl"), output.overwrite)),
            state_store,
        }
    }

    pub fn state_store(&self) -> &ScrapeStateStore {
        &self.state_store
    }

    /// Hand one finalized record to each requested sink
    pub async fn persist(&self, record: &CaseRecord, sinks: &[SinkKind]) -> Vec<SinkResult> {
        let mut results = Vec::with_capacity(sinks.len());
        for &sink in sinks {
            let result = match sink {
                SinkKind::Sql => self.write_structured(record).await,
                SinkKind::Json => self.buffer_json(record),
                SinkKind::Csv => self.buffer_csv(record),
                SinkKind::Jsonl => self.append_jsonl(record),
            };
            results.push(SinkResult::from_result(sink, result));
        }
        debug!(case = %record.request(), sinks = results.len(), "Record persisted");
        results
    }

    /// Narrow failure write. Touches only the error marker and timestamp.
    pub async fn mark_failed(&self, case: CaseRequest, message: &str) -> Result<(), StateStoreError> {
        self.state_store.record_failure(case, message).await
    }

    /// Write buffered sinks. Called once at shutdown.
    pub fn finish(&self) -> Vec<SinkResult> {
        let mut results = Vec::new();
        if let Some(sink) = &self.json {
            results.push(SinkResult::from_result(
                SinkKind::Json,
                sink.finish().map(SinkStatus::Flushed),
            ));
        }
        if let Some(sink) = &self.csv {
            results.push(SinkResult::from_result(
                SinkKind::Csv,
                sink.finish().map(SinkStatus::Flushed),
            ));
        }
        if let Some(sink) = &self.jsonl {
            results.push(SinkResult::from_result(
                SinkKind::Jsonl,
                sink.finish().map(|()| SinkStatus::Written),
            ));
        }
        results
    }

    async fn write_structured(&self, record: &CaseRecord) -> Result<SinkStatus, PersistenceError> {
        let sink = self
            .structured
            .as_ref()
            .ok_or(PersistenceError::NotConfigured(SinkKind::Sql))?;
        let flat = flatten_for_storage(record);
        sink.upsert(record, &flat).await?;
        Ok(SinkStatus::Written)
    }

    fn buffer_json(&self, record: &CaseRecord) -> Result<SinkStatus, PersistenceError> {
        let sink = self.json.as_ref().ok_or(PersistenceError::NotConfigured(SinkKind::Json))?;
        sink.add(record.to_value())?;
        Ok(SinkStatus::Buffered)
    }

    fn buffer_csv(&self, record: &CaseRecord) -> Result<SinkStatus, PersistenceError> {
        let sink = self.csv.as_ref().ok_or(PersistenceError::NotConfigured(SinkKind::Csv))?;
        sink.add(flatten_for_storage(record))?;
        Ok(SinkStatus::Buffered)
    }

    fn append_jsonl(&self, record: &CaseRecord) -> Result<SinkStatus, PersistenceError> {
        let sink = self.jsonl.as_ref().ok_or(PersistenceError::NotConfigured(SinkKind::Jsonl))?;
        sink.append(&record.to_value())?;
        Ok(SinkStatus::Written)
    }
}

impl Drop for PersistenceGateway {
    fn drop(&mut self) {
        let pending = self
            .json
            .as_ref()
            .is_some_and(|s| s.has_pending())
            || self.csv.as_ref().is_some_and(|s| s.has_pending());
        if pending {
            warn!("Persistence gateway dropped with unflushed records");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::case::{CaseClass, CorrelationId};
    use crate::infrastructure::database_connection::DatabaseConnection;
    use serde_json::{Map, Value, json};
    use sqlx::Row;

    fn record(number: u64, relator: &str) -> CaseRecord {
        let mut fields = Map::new();
        fields.insert("incidente".into(), json!(900 + number));
        fields.insert("classe".into(), json!("ADI"));
        fields.insert("processo_id".into(), json!(number));
        fields.insert("relator".into(), json!(relator));
        fields.insert("liminar".into(), json!(0));
        fields.insert("partes".into(), json!([{"index": 1, "tipo": "REQTE.(S)", "nome": "X"}]));
        CaseRecord::from_fields(
            CaseRequest::new(CaseClass::Adi, number),
            CorrelationId::new(900 + number),
            fields,
        )
    }

    async fn gateway(dir: &std::path::Path, sinks: &[SinkKind]) -> PersistenceGateway {
        let url = format!("sqlite:{}", dir.join("out.db").display());
        let db = DatabaseConnection::new(&url).await.unwrap();
        db.migrate().await.unwrap();
        let store = Arc::new(ScrapeStateStore::new(db.pool().clone()));
        let output = OutputConfig {
            dir: dir.to_path_buf(),
            overwrite: true,
            ..OutputConfig::default()
        };
        PersistenceGateway::new(&output, "ADI_1", sinks, store)
    }

    #[tokio::test]
    async fn test_sql_upsert_leaves_one_row_with_latest_values() {
        let dir = tempfile::tempdir().unwrap();
        let gw = gateway(dir.path(), &[SinkKind::Sql]).await;

        let first = gw.persist(&record(1, "ALFA"), &[SinkKind::Sql]).await;
        assert_eq!(first[0].status, SinkStatus::Written);
        let before: i64 = sqlx::query("SELECT updated_at FROM processos WHERE processo_id = 1")
            .fetch_one(gw.state_store().pool())
            .await
            .unwrap()
            .get(0);

        gw.persist(&record(1, "BETA"), &[SinkKind::Sql]).await;
        let rows = sqlx::query("SELECT relator, updated_at, partes FROM processos")
            .fetch_all(gw.state_store().pool())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        let relator: String = rows[0].get(0);
        let after: i64 = rows[0].get(1);
        let partes: String = rows[0].get(2);
        assert_eq!(relator, "BETA");
        assert!(after > before);
        assert!(partes.starts_with('['));
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_block_others() {
        let dir = tempfile::tempdir().unwrap();
        let gw = gateway(dir.path(), &[SinkKind::Json]).await;

        let results = gw.persist(&record(1, "ALFA"), &[SinkKind::Csv, SinkKind::Json]).await;
        assert!(results[0].is_failure());
        assert_eq!(results[1].status, SinkStatus::Buffered);

        let flushed = gw.finish();
        assert_eq!(flushed[0].status, SinkStatus::Flushed(1));
        let text = std::fs::read_to_string(dir.path().join("ADI_1.json")).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value[0]["processo_id"], 1);
    }

    #[tokio::test]
    async fn test_mark_failed_keeps_persisted_fields() {
        let dir = tempfile::tempdir().unwrap();
        let gw = gateway(dir.path(), &[SinkKind::Sql]).await;
        gw.persist(&record(1, "ALFA"), &[SinkKind::Sql]).await;
        gw.mark_failed(CaseRequest::new(CaseClass::Adi, 1), "blocked").await.unwrap();

        let row = sqlx::query("SELECT relator, error_message FROM processos WHERE processo_id = 1")
            .fetch_one(gw.state_store().pool())
            .await
            .unwrap();
        let relator: String = row.get(0);
        let error: Option<String> = row.get(1);
        assert_eq!(relator, "ALFA");
        assert_eq!(error.as_deref(), Some("blocked"));
    }
}
