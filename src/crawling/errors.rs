//! Error taxonomy of the crawl core
//!
//! Case-fatal errors end a session and become a failure marker in the state
//! store. Section failures (`SectionFailure`) only null out one field.
//! Run-level errors (`HarvestError`) are the only ones that change the exit
//! status.

use thiserror::Error;

use crate::crawling::response_classifier::BlockSignature;
use crate::infrastructure::config::ConfigError;
use crate::infrastructure::http_client::FetchError;
use crate::infrastructure::scrape_state_store::StateStoreError;

pub use crate::domain::record::SectionFailure;

/// Errors that abort one case session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaseError {
    #[error("Blocked by the portal: {0}")]
    Blocked(BlockSignature),

    #[error("Correlation id missing from the primary document")]
    CorrelationIdMissing,

    #[error("Primary document unavailable: {0}")]
    PrimaryUnavailable(FetchError),

    #[error("Primary document returned HTTP {0}")]
    PrimaryStatus(u16),
}

impl CaseError {
    /// Stable label used in logs and the run summary
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Blocked(_) => "blocked",
            Self::CorrelationIdMissing => "correlation_id_missing",
            Self::PrimaryUnavailable(_) => "primary_unavailable",
            Self::PrimaryStatus(_) => "primary_status",
        }
    }

    /// Whether a later run could reasonably succeed. Nothing is retried
    /// within the same run once a case is aborted.
    pub const fn is_retryable_later(&self) -> bool {
        match self {
            Self::Blocked(_) | Self::PrimaryUnavailable(_) => true,
            Self::PrimaryStatus(status) => *status >= 500 || *status == 429 || *status == 403,
            Self::CorrelationIdMissing => false,
        }
    }

    /// Text stored in the state store's error column
    pub fn failure_message(&self) -> String {
        format!("{}: {}", self.kind(), self)
    }
}

/// Errors that stop the whole run
#[derive(Error, Debug)]
pub enum HarvestError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Cannot plan the run: {0}")]
    PlanningStore(#[source] StateStoreError),

    #[error("Storage unavailable: {0}")]
    Store(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("HTTP client setup failed: {0}")]
    Http(#[from] FetchError),
}
