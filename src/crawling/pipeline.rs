//! What happens to a session once it ends
//!
//! Finalized records go validator → normalizer → every sink → success
//! marker. Aborted cases only get the narrow failure marker.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{error, info, warn};

use crate::crawling::errors::CaseError;
use crate::crawling::fetch_coordinator::SessionSink;
use crate::crawling::join_aggregator::JoinReport;
use crate::crawling::normalizer::OutputNormalizer;
use crate::crawling::validator::RecordValidator;
use crate::domain::case::CaseRequest;
use crate::infrastructure::persistence::{PersistenceGateway, SinkKind};

pub struct CasePipeline {
    validator: RecordValidator,
    normalizer: OutputNormalizer,
    gateway: Arc<PersistenceGateway>,
    sinks: Vec<SinkKind>,
    sink_failures: AtomicUsize,
    store_failures: AtomicUsize,
}

impl CasePipeline {
    pub fn new(normalizer: OutputNormalizer, gateway: Arc<PersistenceGateway>, sinks: Vec<SinkKind>) -> Self {
        Self {
            validator: RecordValidator::new(),
            normalizer,
            gateway,
            sinks,
            sink_failures: AtomicUsize::new(0),
            store_failures: AtomicUsize::new(0),
        }
    }

    pub fn gateway(&self) -> &PersistenceGateway {
        &self.gateway
    }

    /// Sink writes that failed so far
    pub fn sink_failures(&self) -> usize {
        self.sink_failures.load(Ordering::Relaxed)
    }

    /// State store writes that failed so far
    pub fn store_failures(&self) -> usize {
        self.store_failures.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SessionSink for CasePipeline {
    async fn on_finalized(&self, report: JoinReport) {
        let (record, diagnostics) = self.validator.validate(report.record);
        let record = self.normalizer.apply(record);
        let case = record.request();

        let results = self.gateway.persist(&record, &self.sinks).await;
        let failed = results.iter().filter(|r| r.is_failure()).count();
        self.sink_failures.fetch_add(failed, Ordering::Relaxed);

        let Some(correlation_id) = record.correlation_id() else {
            warn!(case = %case, "Finalized record has no correlation id; success marker skipped");
            return;
        };
        match self
            .gateway
            .state_store()
            .record_success(case, correlation_id, record.loaded_sections())
            .await
        {
            Ok(()) => info!(
                case = %case,
                correlation_id = %correlation_id,
                diagnostics = diagnostics.len(),
                sink_failures = failed,
                "💾 Case stored"
            ),
            Err(e) => {
                self.store_failures.fetch_add(1, Ordering::Relaxed);
                error!(case = %case, error_kind = "state_store", "Cannot record success: {}", e);
            }
        }
    }

    async fn on_aborted(&self, case: CaseRequest, error: &CaseError) {
        if let Err(e) = self.gateway.mark_failed(case, &error.failure_message()).await {
            self.store_failures.fetch_add(1, Ordering::Relaxed);
            error!(case = %case, error_kind = "state_store", "Cannot record failure: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawling::join_aggregator::JoinEnd;
    use crate::crawling::response_classifier::BlockSignature;
    use crate::domain::case::{CaseClass, CorrelationId};
    use crate::domain::record::PartialRecord;
    use crate::domain::section::SectionName;
    use crate::infrastructure::config::OutputConfig;
    use crate::infrastructure::database_connection::DatabaseConnection;
    use crate::infrastructure::scrape_state_store::ScrapeStateStore;
    use serde_json::{Map, json};

    async fn pipeline(dir: &tempfile::TempDir) -> CasePipeline {
        let url = format!("sqlite:{}", dir.path().join("p.db").display());
        let db = DatabaseConnection::new(&url).await.unwrap();
        db.migrate().await.unwrap();
        let store = Arc::new(ScrapeStateStore::new(db.pool().clone()));
        let output = OutputConfig {
            dir: dir.path().to_path_buf(),
            ..OutputConfig::default()
        };
        let sinks = vec![SinkKind::Sql, SinkKind::Json];
        let gateway = Arc::new(PersistenceGateway::new(&output, "t", &sinks, store));
        CasePipeline::new(OutputNormalizer::default(), gateway, sinks)
    }

    #[tokio::test]
    async fn test_finalized_record_is_stored_and_marked() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(&dir).await;
        let case = CaseRequest::new(CaseClass::Adi, 5);
        let mut primary = Map::new();
        primary.insert("processo_id".into(), json!(5));
        primary.insert("incidente".into(), json!(77));
        primary.insert("classe".into(), json!("ADI"));
        primary.insert("liminar".into(), json!(["Liminar"]));
        let mut partial = PartialRecord::new(case, CorrelationId::new(77).unwrap(), primary, [SectionName::Partes]);
        partial.apply(
            SectionName::Partes,
            crate::domain::record::SectionOutcome::Loaded(json!([{"_index": 1, "nome": "A"}])),
        );
        let report = JoinReport {
            record: partial.finalize(),
            end: JoinEnd::Complete,
            duplicates: 0,
        };

        pipeline.on_finalized(report).await;
        assert_eq!(pipeline.sink_failures(), 0);
        assert_eq!(pipeline.store_failures(), 0);

        let entry = pipeline.gateway().state_store().entry(5).await.unwrap().unwrap();
        assert!(entry.is_success());
        assert!(entry.loaded_sections.contains(&SectionName::Partes));

        let results = pipeline.gateway().finish();
        assert!(results.iter().all(|r| !r.is_failure()));
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("t.json")).unwrap()).unwrap();
        assert_eq!(written[0]["liminar"], json!(1));
        assert_eq!(written[0]["partes"], json!([{"index": 1, "nome": "A"}]));
    }

    #[tokio::test]
    async fn test_aborted_case_is_marked_failed() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(&dir).await;
        let case = CaseRequest::new(CaseClass::Adi, 6);
        pipeline
            .on_aborted(case, &CaseError::Blocked(BlockSignature::BotChallenge))
            .await;
        let entry = pipeline.gateway().state_store().entry(6).await.unwrap().unwrap();
        assert!(entry.error_message.unwrap().starts_with("blocked"));
    }
}
