//! Crawl core: classification, extraction, per-case sessions, the join,
//! validation, normalization and the run orchestrator.
//!
//! Each module is its own file in the crawling/ directory.

pub mod errors;
pub mod extractors;
pub mod fetch_coordinator;
pub mod join_aggregator;
pub mod normalizer;
pub mod orchestrator;
pub mod pipeline;
pub mod response_classifier;
pub mod validator;

pub use errors::{CaseError, HarvestError};
pub use extractors::ExtractorRegistry;
pub use fetch_coordinator::{FetchCoordinator, SessionEnd, SessionReport, SessionSink, SessionState};
pub use join_aggregator::{JoinAggregator, JoinEnd, JoinReport, SectionMessage};
pub use normalizer::{OutputNormalizer, normalize};
pub use orchestrator::{HarvestOrchestrator, RunSummary};
pub use pipeline::CasePipeline;
pub use response_classifier::BlockSignature;
pub use validator::{RecordValidator, flatten_for_storage};
