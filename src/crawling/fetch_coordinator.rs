//! Per-case fetch session
//!
//! `Init → PrimaryFetched → CorrelationResolved → FanningOut → Joining →
//! Finalized | Aborted`. The primary document gates everything: a block page
//! or a missing correlation id aborts before any section is dispatched.
//! Section fetches run as independent tasks and report to the case's
//! `JoinAggregator` by message.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value, json};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::crawling::errors::CaseError;
use crate::crawling::extractors::ExtractorRegistry;
use crate::crawling::join_aggregator::{JoinAggregator, JoinEnd, JoinReport, SectionMessage};
use crate::crawling::response_classifier::{classify_section, detect_block};
use crate::domain::case::{CaseRequest, CorrelationId};
use crate::domain::record::{PartialRecord, SectionFailure, SectionOutcome};
use crate::domain::section::SectionName;
use crate::infrastructure::config::HarvestConfig;
use crate::infrastructure::http_client::{FetchError, HttpResponse, PageFetcher};
use crate::infrastructure::retry_calculator::RetryCalculator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Init,
    PrimaryFetched,
    CorrelationResolved,
    FanningOut,
    Joining,
    Finalized,
    Aborted,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Receives the end of every case session
#[async_trait]
pub trait SessionSink: Send + Sync {
    async fn on_finalized(&self, report: JoinReport);
    async fn on_aborted(&self, case: CaseRequest, error: &CaseError);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    Finalized { sections_failed: usize, join: JoinEnd },
    Aborted(CaseError),
}

/// What happened in one session, for the run summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub case: CaseRequest,
    pub correlation_id: Option<CorrelationId>,
    pub states: Vec<SessionState>,
    pub dispatched: usize,
    pub end: SessionEnd,
}

impl SessionReport {
    pub const fn is_success(&self) -> bool {
        matches!(self.end, SessionEnd::Finalized { .. })
    }
}

/// Session knobs taken from the configuration once
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub base_url: String,
    pub section_dispatch_delay: Duration,
    pub session_timeout: Duration,
    pub min_section_body_bytes: usize,
    pub store_html: bool,
}

impl CoordinatorSettings {
    pub fn from_config(config: &HarvestConfig) -> Self {
        Self {
            base_url: config.http.base_url.trim_end_matches('/').to_string(),
            section_dispatch_delay: config.pacing.section_dispatch_delay(),
            session_timeout: config.join.session_timeout(),
            min_section_body_bytes: config.join.min_section_body_bytes,
            store_html: config.output.store_html,
        }
    }
}

/// Fetch a URL, retrying transport errors and retryable statuses.
///
/// Once retries run out, a retryable status is still returned as a response
/// so the caller can classify it; a transport error becomes
/// `RetriesExhausted`. A block page is returned at once, whatever its status.
pub async fn fetch_with_retry(
    fetcher: &dyn PageFetcher,
    url: &str,
    retry: &RetryCalculator,
) -> Result<HttpResponse, FetchError> {
    let mut retries_done = 0;
    loop {
        match fetcher.fetch(url).await {
            Ok(response) if detect_block(&response.body).is_some() => return Ok(response),
            Ok(response) if retry.is_retryable_status(response.status) && retry.should_retry(retries_done) => {
                retries_done += 1;
                let delay = retry.delay_for(retries_done);
                warn!(status = response.status, retry = retries_done, "Retryable status for {}; backing off {:?}", url, delay);
                tokio::time::sleep(delay).await;
            }
            Ok(response) => return Ok(response),
            Err(e) if e.is_recoverable() && retry.should_retry(retries_done) => {
                retries_done += 1;
                let delay = retry.delay_for(retries_done);
                warn!(retry = retries_done, "Fetch failed for {}: {}; backing off {:?}", url, e, delay);
                tokio::time::sleep(delay).await;
            }
            Err(e) if e.is_recoverable() => {
                return Err(FetchError::RetriesExhausted {
                    attempts: retries_done + 1,
                    last: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }
}

pub struct FetchCoordinator {
    fetcher: Arc<dyn PageFetcher>,
    registry: Arc<ExtractorRegistry>,
    retry: RetryCalculator,
    settings: CoordinatorSettings,
}

impl FetchCoordinator {
    pub const fn new(
        fetcher: Arc<dyn PageFetcher>,
        registry: Arc<ExtractorRegistry>,
        retry: RetryCalculator,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            fetcher,
            registry,
            retry,
            settings,
        }
    }

    pub const fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    /// Drive one case from primary fetch to finalization or abort.
    /// The sink is told about the outcome before this returns.
    pub async fn run_case(&self, case: CaseRequest, sink: &dyn SessionSink) -> SessionReport {
        let mut states = vec![SessionState::Init];
        debug!(case = %case, "Session started");

        let (correlation_id, primary_fields) = match self.resolve_primary(case, &mut states).await {
            Ok(resolved) => resolved,
            Err(error) => {
                states.push(SessionState::Aborted);
                warn!(case = %case, error_kind = error.kind(), "❌ Case aborted: {}", error);
                sink.on_aborted(case, &error).await;
                return SessionReport {
                    case,
                    correlation_id: None,
                    states,
                    dispatched: 0,
                    end: SessionEnd::Aborted(error),
                };
            }
        };

        let expected = self.registry.expected_sections();
        let partial = PartialRecord::new(case, correlation_id, primary_fields, expected.iter().copied());
        let (sender, join) = JoinAggregator::channel(partial, self.settings.session_timeout);

        states.push(SessionState::FanningOut);
        let dispatch = self.dispatch_sections(case, correlation_id, &expected, sender);
        states.push(SessionState::Joining);
        let (dispatched, report) = tokio::join!(dispatch, join.run());

        states.push(SessionState::Finalized);
        let sections_failed = report.sections_failed();
        let join_end = report.end.clone();
        info!(
            case = %case,
            correlation_id = %correlation_id,
            sections_failed,
            "✅ Case finalized"
        );
        sink.on_finalized(report).await;

        SessionReport {
            case,
            correlation_id: Some(correlation_id),
            states,
            dispatched,
            end: SessionEnd::Finalized {
                sections_failed,
                join: join_end,
            },
        }
    }

    async fn resolve_primary(
        &self,
        case: CaseRequest,
        states: &mut Vec<SessionState>,
    ) -> Result<(CorrelationId, Map<String, Value>), CaseError> {
        let url = case.primary_url(&self.settings.base_url);
        let response = fetch_with_retry(self.fetcher.as_ref(), &url, &self.retry)
            .await
            .map_err(CaseError::PrimaryUnavailable)?;
        states.push(SessionState::PrimaryFetched);

        if let Some(signature) = detect_block(&response.body) {
            return Err(CaseError::Blocked(signature));
        }
        if !response.is_success() {
            return Err(CaseError::PrimaryStatus(response.status));
        }

        let extraction = self.registry.extract_primary(&response.body);
        let correlation_id = extraction.correlation_id.ok_or(CaseError::CorrelationIdMissing)?;
        states.push(SessionState::CorrelationResolved);
        debug!(case = %case, correlation_id = %correlation_id, "Correlation id resolved");

        let mut fields = extraction.fields;
        fields.insert("processo_id".into(), json!(case.number));
        if fields.get("classe").is_none_or(Value::is_null) {
            fields.insert("classe".into(), json!(case.class.code()));
        }
        fields.insert("incidente".into(), json!(correlation_id.get()));
        fields.insert("status".into(), json!(response.status));
        fields.insert(
            "extraido".into(),
            json!(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        if self.settings.store_html {
            fields.insert("html".into(), json!(response.body));
        }
        Ok((correlation_id, fields))
    }

    /// Spawn one fetch task per section, pacing between dispatches.
    /// Returns how many were dispatched.
    async fn dispatch_sections(
        &self,
        case: CaseRequest,
        correlation_id: CorrelationId,
        sections: &[SectionName],
        sender: tokio::sync::mpsc::Sender<SectionMessage>,
    ) -> usize {
        let mut dispatched = 0;
        for (i, &section) in sections.iter().enumerate() {
            if i > 0 && !self.settings.section_dispatch_delay.is_zero() {
                tokio::time::sleep(self.settings.section_dispatch_delay).await;
            }

            let task = SectionTask {
                case,
                section,
                url: section.url(&self.settings.base_url, correlation_id),
                fetcher: Arc::clone(&self.fetcher),
                registry: Arc::clone(&self.registry),
                retry: self.retry.clone(),
                min_body_bytes: self.settings.min_section_body_bytes,
            };
            let sender = sender.clone();
            tokio::spawn(async move {
                let message = task.run().await;
                if sender.send(message).await.is_err() {
                    debug!(case = %case, section = %section, "Join already finalized; result dropped");
                }
            });
            dispatched += 1;
        }
        dispatched
    }
}

/// Everything one section fetch needs, owned so it can run as its own task
struct SectionTask {
    case: CaseRequest,
    section: SectionName,
    url: String,
    fetcher: Arc<dyn PageFetcher>,
    registry: Arc<ExtractorRegistry>,
    retry: RetryCalculator,
    min_body_bytes: usize,
}

impl SectionTask {
    async fn run(self) -> SectionMessage {
        let outcome = match fetch_with_retry(self.fetcher.as_ref(), &self.url, &self.retry).await {
            Err(e) => SectionOutcome::Failed(SectionFailure::Transport(e.to_string())),
            Ok(response) => {
                let markers = self.registry.markers(self.section);
                match classify_section(&response, self.min_body_bytes, markers) {
                    Ok(()) => SectionOutcome::Loaded(self.registry.extract_section(self.section, &response.body)),
                    Err(failure) => SectionOutcome::Failed(failure),
                }
            }
        };
        if let SectionOutcome::Failed(failure) = &outcome {
            warn!(
                case = %self.case,
                section = %self.section,
                error_kind = failure.code(),
                "Section failed: {}",
                failure
            );
        }
        SectionMessage::new(self.case, self.section, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawling::response_classifier::BlockSignature;
    use crate::domain::case::CaseClass;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedFetcher {
        pages: HashMap<String, Vec<Result<HttpResponse, FetchError>>>,
        calls: AtomicUsize,
        seen: Mutex<Vec<String>>,
    }

    impl ScriptedFetcher {
        fn new() -> Self {
            Self {
                pages: HashMap::new(),
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn page(mut self, url: &str, responses: Vec<Result<HttpResponse, FetchError>>) -> Self {
            self.pages.insert(url.to_string(), responses.into_iter().rev().collect());
            self
        }
    }

    #[async_trait]
    impl PageFetcher for ScriptedFetcher {
        async fn fetch(&self, url: &str) -> Result<HttpResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(url.to_string());
            let scripted = self.pages.get(url).and_then(|r| r.last().cloned());
            scripted.unwrap_or_else(|| Ok(HttpResponse::new(url, 404, "")))
        }
    }

    fn fast_retry() -> RetryCalculator {
        RetryCalculator::new(2, 1, 1, 1.0, 0).with_retry_codes(&[503])
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        struct Flaky(AtomicUsize);
        #[async_trait]
        impl PageFetcher for Flaky {
            async fn fetch(&self, url: &str) -> Result<HttpResponse, FetchError> {
                if self.0.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(FetchError::Timeout(url.into()))
                } else {
                    Ok(HttpResponse::new(url, 200, "ok"))
                }
            }
        }
        let fetcher = Flaky(AtomicUsize::new(0));
        let response = fetch_with_retry(&fetcher, "u", &fast_retry()).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(fetcher.0.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let fetcher = ScriptedFetcher::new().page("u", vec![Err(FetchError::Timeout("u".into()))]);
        let result = fetch_with_retry(&fetcher, "u", &fast_retry()).await;
        assert!(matches!(result, Err(FetchError::RetriesExhausted { attempts: 3, .. })));
    }

    #[test]
    fn test_retryable_status_is_returned_after_exhaustion() {
        let fetcher = ScriptedFetcher::new().page("u", vec![Ok(HttpResponse::new("u", 503, "busy"))]);
        let response = tokio_test::block_on(fetch_with_retry(&fetcher, "u", &fast_retry())).unwrap();
        assert_eq!(response.status, 503);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_block_page_is_returned_without_retry() {
        let retry = RetryCalculator::new(3, 1, 1, 1.0, 0).with_retry_codes(&[502]);
        let fetcher = ScriptedFetcher::new().page("u", vec![Ok(HttpResponse::new("u", 502, "<title>502 Bad Gateway</title>"))]);
        let response = tokio_test::block_on(fetch_with_retry(&fetcher, "u", &retry)).unwrap();
        assert_eq!(response.status, 502);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[derive(Default)]
    struct RecordingSink {
        finalized: Mutex<Vec<JoinReport>>,
        aborted: Mutex<Vec<(CaseRequest, CaseError)>>,
    }

    #[async_trait]
    impl SessionSink for RecordingSink {
        async fn on_finalized(&self, report: JoinReport) {
            self.finalized.lock().unwrap().push(report);
        }
        async fn on_aborted(&self, case: CaseRequest, error: &CaseError) {
            self.aborted.lock().unwrap().push((case, error.clone()));
        }
    }

    fn settings() -> CoordinatorSettings {
        CoordinatorSettings {
            base_url: "https://portal.example".into(),
            section_dispatch_delay: Duration::ZERO,
            session_timeout: Duration::from_secs(5),
            min_section_body_bytes: 8,
            store_html: false,
        }
    }

    fn coordinator(fetcher: ScriptedFetcher) -> (Arc<ScriptedFetcher>, FetchCoordinator) {
        let fetcher = Arc::new(fetcher);
        let registry = ExtractorRegistry::portal("https://portal.example");
        let coordinator = FetchCoordinator::new(
            Arc::clone(&fetcher) as Arc<dyn PageFetcher>,
            Arc::new(registry),
            fast_retry(),
            settings(),
        );
        (fetcher, coordinator)
    }

    #[tokio::test]
    async fn test_missing_correlation_id_aborts_before_fan_out() {
        let case = CaseRequest::new(CaseClass::Adi, 1);
        let url = case.primary_url("https://portal.example");
        let fetcher = ScriptedFetcher::new().page(&url, vec![Ok(HttpResponse::new(&url, 200, "<html>nothing</html>"))]);
        let (fetcher, coordinator) = coordinator(fetcher);
        let sink = RecordingSink::default();

        let report = coordinator.run_case(case, &sink).await;
        assert_eq!(report.end, SessionEnd::Aborted(CaseError::CorrelationIdMissing));
        assert_eq!(report.dispatched, 0);
        assert_eq!(
            report.states,
            vec![SessionState::Init, SessionState::PrimaryFetched, SessionState::Aborted]
        );
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink.aborted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_full_session_reaches_finalized() {
        let case = CaseRequest::new(CaseClass::Adi, 2);
        let url = case.primary_url("https://portal.example");
        let fetcher = ScriptedFetcher::new().page(
            &url,
            vec![Ok(HttpResponse::new(&url, 200, r#"<input id="incidente" value="55">"#))],
        );
        let (fetcher, coordinator) = coordinator(fetcher);
        let sink = RecordingSink::default();

        let report = coordinator.run_case(case, &sink).await;
        assert!(report.is_success());
        assert_eq!(report.dispatched, SectionName::ALL.len());
        assert_eq!(report.states.last(), Some(&SessionState::Finalized));
        // every section page is unscripted and returns 404
        assert!(matches!(
            report.end,
            SessionEnd::Finalized { sections_failed, .. } if sections_failed == SectionName::ALL.len()
        ));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1 + SectionName::ALL.len());

        let finalized = sink.finalized.lock().unwrap();
        let record = &finalized[0].record;
        assert_eq!(record.get("processo_id"), Some(&json!(2)));
        assert_eq!(record.get("incidente"), Some(&json!(55)));
        assert_eq!(record.get("classe"), Some(&json!("ADI")));
    }

    #[tokio::test]
    async fn test_forbidden_primary_aborts_after_one_fetch() {
        let case = CaseRequest::new(CaseClass::Adi, 3);
        let url = case.primary_url("https://portal.example");
        let fetcher = Arc::new(
            ScriptedFetcher::new().page(&url, vec![Ok(HttpResponse::new(&url, 403, "<h1>403 Forbidden</h1>"))]),
        );
        let coordinator = FetchCoordinator::new(
            Arc::clone(&fetcher) as Arc<dyn PageFetcher>,
            Arc::new(ExtractorRegistry::portal("https://portal.example")),
            RetryCalculator::new(3, 1, 1, 1.0, 0).with_retry_codes(&[403]),
            settings(),
        );
        let sink = RecordingSink::default();

        let report = coordinator.run_case(case, &sink).await;
        assert_eq!(report.end, SessionEnd::Aborted(CaseError::Blocked(BlockSignature::AccessDenied)));
        assert_eq!(report.dispatched, 0);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(sink.aborted.lock().unwrap().len(), 1);
    }
}
