//! # Harvest Orchestrator
//!
//! Plans the run, launches one session task per planned case under the
//! concurrency ceiling, and flushes the bulk sinks once everything is done.
//!
//! Shutdown is two-staged. The shutdown token stops new launches and lets
//! in-flight sessions drain. The abort token (parent of every session's
//! token) ends in-flight sessions too; those cases are left unmarked so the
//! next run plans them again.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::crawling::errors::HarvestError;
use crate::crawling::extractors::ExtractorRegistry;
use crate::crawling::fetch_coordinator::{CoordinatorSettings, FetchCoordinator, SessionEnd, SessionReport};
use crate::crawling::normalizer::OutputNormalizer;
use crate::crawling::pipeline::CasePipeline;
use crate::domain::case::CaseRequest;
use crate::domain::template::OutputTemplate;
use crate::infrastructure::config::HarvestConfig;
use crate::infrastructure::http_client::PageFetcher;
use crate::infrastructure::output_naming::output_stem;
use crate::infrastructure::persistence::PersistenceGateway;
use crate::infrastructure::retry_calculator::RetryCalculator;
use crate::infrastructure::scrape_state_store::{PlanOptions, ScrapeStateStore};

/// End-of-run counts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub requested: usize,
    pub planned: usize,
    pub skipped: usize,
    pub retrying: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Planned cases never finished because of shutdown
    pub cancelled: usize,
    pub sections_failed: usize,
    pub failures_by_kind: BTreeMap<String, usize>,
    pub sink_failures: usize,
    pub store_failures: usize,
}

impl RunSummary {
    fn record(&mut self, report: &SessionReport) {
        match &report.end {
            SessionEnd::Finalized { sections_failed, .. } => {
                self.succeeded += 1;
                self.sections_failed += sections_failed;
            }
            SessionEnd::Aborted(error) => self.record_failure(error.kind()),
        }
    }

    fn record_failure(&mut self, kind: &str) {
        self.failed += 1;
        *self.failures_by_kind.entry(kind.to_string()).or_default() += 1;
    }
}

pub struct HarvestOrchestrator {
    config: Arc<HarvestConfig>,
    state_store: Arc<ScrapeStateStore>,
    coordinator: Arc<FetchCoordinator>,
    pipeline: Arc<CasePipeline>,
    shutdown: CancellationToken,
    abort: CancellationToken,
}

impl HarvestOrchestrator {
    pub fn new(config: Arc<HarvestConfig>, state_store: Arc<ScrapeStateStore>, fetcher: Arc<dyn PageFetcher>) -> Self {
        let registry = Arc::new(ExtractorRegistry::portal(&config.http.base_url));
        let coordinator = Arc::new(FetchCoordinator::new(
            fetcher,
            registry,
            RetryCalculator::from_config(&config.retry),
            CoordinatorSettings::from_config(&config),
        ));

        let sinks = config.effective_sinks();
        let stem = output_stem(
            config.run.case_class,
            &config.run.case_numbers,
            config.output.custom_name.as_deref(),
        );
        let gateway = Arc::new(PersistenceGateway::new(
            &config.output,
            &stem,
            &sinks,
            Arc::clone(&state_store),
        ));
        let normalizer =
            OutputNormalizer::new(OutputTemplate::case_record()).with_reference_dir(config.output.reference_dir.clone());
        let pipeline = Arc::new(CasePipeline::new(normalizer, gateway, sinks));

        Self {
            config,
            state_store,
            coordinator,
            pipeline,
            shutdown: CancellationToken::new(),
            abort: CancellationToken::new(),
        }
    }

    /// Cancel to stop launching new sessions
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancel to end in-flight sessions as well
    pub fn abort_token(&self) -> CancellationToken {
        self.abort.clone()
    }

    /// First Ctrl-C drains, second aborts
    pub fn listen_for_signals(&self) -> tokio::task::JoinHandle<()> {
        let shutdown = self.shutdown_token();
        let abort = self.abort_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            warn!("🛑 Shutdown requested; finishing in-flight cases (Ctrl-C again to abort)");
            shutdown.cancel();
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("🛑 Aborting in-flight cases");
                abort.cancel();
            }
        })
    }

    pub async fn run(&self, requests: &[CaseRequest]) -> Result<RunSummary, HarvestError> {
        let run_id = Uuid::new_v4();
        let options = PlanOptions::from_config(&self.config.run);
        let plan = self
            .state_store
            .plan(requests, &options)
            .await
            .map_err(HarvestError::PlanningStore)?;

        let mut summary = RunSummary {
            run_id,
            requested: requests.len(),
            planned: plan.planned(),
            skipped: plan.skipped.len(),
            retrying: plan.retrying,
            ..RunSummary::default()
        };
        info!(
            run_id = %run_id,
            requested = summary.requested,
            planned = summary.planned,
            skipped = summary.skipped,
            retrying = summary.retrying,
            "🚀 Harvest run starting"
        );

        let ceiling = self.config.pacing.concurrency_ceiling.max(1);
        let semaphore = Arc::new(Semaphore::new(ceiling));
        let mut sessions: JoinSet<Option<SessionReport>> = JoinSet::new();
        let mut launched = 0;

        for case in plan.to_fetch {
            let permit = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => break,
                () = self.abort.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let coordinator = Arc::clone(&self.coordinator);
            let pipeline = Arc::clone(&self.pipeline);
            let token = self.abort.child_token();
            sessions.spawn(async move {
                let _permit = permit;
                tokio::select! {
                    report = coordinator.run_case(case, pipeline.as_ref()) => Some(report),
                    () = token.cancelled() => {
                        warn!(case = %case, "Session cancelled; case left for the next run");
                        None
                    }
                }
            });
            launched += 1;
        }
        summary.cancelled = summary.planned - launched;

        while let Some(joined) = sessions.join_next().await {
            match joined {
                Ok(Some(report)) => summary.record(&report),
                Ok(None) => summary.cancelled += 1,
                Err(e) => {
                    error!(error_kind = "session_panic", "Session task failed: {}", e);
                    summary.record_failure("session_panic");
                }
            }
        }

        let flushed = self.pipeline.gateway().finish();
        summary.sink_failures = self.pipeline.sink_failures() + flushed.iter().filter(|r| r.is_failure()).count();
        summary.store_failures = self.pipeline.store_failures();

        info!(
            run_id = %run_id,
            planned = summary.planned,
            skipped = summary.skipped,
            succeeded = summary.succeeded,
            failed = summary.failed,
            cancelled = summary.cancelled,
            sections_failed = summary.sections_failed,
            failures_by_kind = ?summary.failures_by_kind,
            sink_failures = summary.sink_failures,
            "🏁 Harvest run finished"
        );
        Ok(summary)
    }
}
