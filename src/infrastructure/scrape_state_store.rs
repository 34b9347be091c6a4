//! Persisted crawl history and fetch planning
//!
//! One row per external case number in `processos`. Planning reads the
//! latest attempt inside the recency window; session ends write either the
//! success markers or the narrow failure marker. Writes rely on the unique
//! `processo_id` constraint for atomicity, so concurrent sessions touching
//! different cases need no extra locking.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeSet;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::domain::case::{CaseClass, CaseRequest, CorrelationId};
use crate::domain::section::SectionName;
use crate::infrastructure::config::RunConfig;

#[derive(Error, Debug)]
pub enum StateStoreError {
    #[error("State store database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Corrupt state row for case {number}: {message}")]
    CorruptRow { number: u64, message: String },
}

/// Planning knobs taken from the run configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanOptions {
    pub skip_existing: bool,
    pub retry_failed: bool,
    pub max_age: Duration,
}

impl PlanOptions {
    pub fn from_config(run: &RunConfig) -> Self {
        Self {
            skip_existing: run.skip_existing,
            retry_failed: run.retry_failed,
            max_age: Duration::from_secs(run.max_age_hours.saturating_mul(3600)),
        }
    }
}

/// Persisted state of a case's last attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlStateEntry {
    pub number: u64,
    pub class: String,
    pub correlation_id: Option<CorrelationId>,
    pub error_message: Option<String>,
    pub loaded_sections: BTreeSet<SectionName>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CrawlStateEntry {
    pub const fn is_success(&self) -> bool {
        self.error_message.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanDecision {
    /// No recent attempt, or skipping is disabled
    Fetch,
    /// Recent attempt failed and failures are retried
    Retry,
    SkipRecentSuccess,
    SkipRecentFailure,
}

impl PlanDecision {
    pub const fn is_fetch(self) -> bool {
        matches!(self, Self::Fetch | Self::Retry)
    }
}

/// Decide one case from its most recent in-window entry
pub fn decide(recent: Option<&CrawlStateEntry>, options: &PlanOptions) -> PlanDecision {
    match recent {
        None => PlanDecision::Fetch,
        Some(_) if !options.skip_existing => PlanDecision::Fetch,
        Some(entry) if entry.is_success() => PlanDecision::SkipRecentSuccess,
        Some(_) if options.retry_failed => PlanDecision::Retry,
        Some(_) => PlanDecision::SkipRecentFailure,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchPlan {
    pub to_fetch: Vec<CaseRequest>,
    pub skipped: Vec<(CaseRequest, PlanDecision)>,
    pub retrying: usize,
}

impl FetchPlan {
    pub fn planned(&self) -> usize {
        self.to_fetch.len()
    }
}

pub struct ScrapeStateStore {
    pool: SqlitePool,
}

pub(crate) fn micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

pub(crate) fn db_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_micros(value: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_micros(value).unwrap_or_default()
}

impl ScrapeStateStore {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Current row for a case number, regardless of age
    pub async fn entry(&self, number: u64) -> Result<Option<CrawlStateEntry>, StateStoreError> {
        let select = format!(
            "SELECT processo_id, classe, incidente, error_message, created_at, updated_at, {} \
             FROM processos WHERE processo_id = ?",
            loaded_column_list()
        );
        let row = sqlx::query(&select)
            .bind(db_int(number))
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| entry_from_row(&r)).transpose()
    }

    /// Most recent entry for this exact case updated after `since`
    pub async fn recent_entry(
        &self,
        case: CaseRequest,
        since: DateTime<Utc>,
    ) -> Result<Option<CrawlStateEntry>, StateStoreError> {
        Ok(self.entry(case.number).await?.filter(|entry| {
            entry.class == case.class.code() && entry.updated_at > since
        }))
    }

    pub async fn plan(
        &self,
        requested: &[CaseRequest],
        options: &PlanOptions,
    ) -> Result<FetchPlan, StateStoreError> {
        self.plan_at(requested, options, Utc::now()).await
    }

    /// Build the fetch plan as of `now`. Any store error aborts planning.
    pub async fn plan_at(
        &self,
        requested: &[CaseRequest],
        options: &PlanOptions,
        now: DateTime<Utc>,
    ) -> Result<FetchPlan, StateStoreError> {
        let window = chrono::Duration::from_std(options.max_age).unwrap_or(chrono::Duration::MAX);
        let since = now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut plan = FetchPlan::default();
        for case in requested {
            let recent = self.recent_entry(*case, since).await?;
            let decision = decide(recent.as_ref(), options);
            debug!(case = %case, ?decision, "Planned case");
            match decision {
                PlanDecision::Fetch => plan.to_fetch.push(*case),
                PlanDecision::Retry => {
                    plan.retrying += 1;
                    plan.to_fetch.push(*case);
                }
                skip => plan.skipped.push((*case, skip)),
            }
        }

        info!(
            requested = requested.len(),
            planned = plan.to_fetch.len(),
            skipped = plan.skipped.len(),
            retrying = plan.retrying,
            "📋 Fetch plan ready"
        );
        Ok(plan)
    }

    pub async fn record_success(
        &self,
        case: CaseRequest,
        correlation_id: CorrelationId,
        loaded: &BTreeSet<SectionName>,
    ) -> Result<(), StateStoreError> {
        self.record_success_at(case, correlation_id, loaded, Utc::now()).await
    }

    /// Upsert the success markers and clear any previous error
    pub async fn record_success_at(
        &self,
        case: CaseRequest,
        correlation_id: CorrelationId,
        loaded: &BTreeSet<SectionName>,
        at: DateTime<Utc>,
    ) -> Result<(), StateStoreError> {
        let columns = loaded_column_list();
        let placeholders = vec!["?"; SectionName::ALL.len()].join(", ");
        let updates: String = SectionName::ALL
            .iter()
            .map(|s| format!("{0} = excluded.{0}, ", s.loaded_column()))
            .collect();
        let sql = format!(
            r#"
            INSERT INTO processos (processo_id, classe, incidente, {columns}, error_message, created_at, updated_at)
            VALUES (?, ?, ?, {placeholders}, NULL, ?, ?)
            ON CONFLICT(processo_id) DO UPDATE SET
                classe = excluded.classe,
                incidente = excluded.incidente,
                {updates}
                error_message = NULL,
                updated_at = MAX(excluded.updated_at, processos.updated_at + 1)
            "#
        );

        let mut query = sqlx::query(&sql)
            .bind(db_int(case.number))
            .bind(case.class.code())
            .bind(db_int(correlation_id.get()));
        for section in SectionName::ALL {
            query = query.bind(i64::from(loaded.contains(&section)));
        }
        query
            .bind(micros(at))
            .bind(micros(at))
            .execute(&self.pool)
            .await?;

        debug!(case = %case, correlation_id = %correlation_id, "✅ Recorded success");
        Ok(())
    }

    pub async fn record_failure(&self, case: CaseRequest, message: &str) -> Result<(), StateStoreError> {
        self.record_failure_at(case, message, Utc::now()).await
    }

    /// Narrow failure write: only `error_message` and `updated_at` change on
    /// an existing row, and a fresher success is left untouched.
    pub async fn record_failure_at(
        &self,
        case: CaseRequest,
        message: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StateStoreError> {
        sqlx::query(
            r#"
            INSERT INTO processos (processo_id, classe, error_message, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(processo_id) DO UPDATE SET
                error_message = excluded.error_message,
                updated_at = MAX(excluded.updated_at, processos.updated_at + 1)
            WHERE processos.error_message IS NOT NULL
               OR processos.updated_at <= excluded.updated_at
            "#,
        )
        .bind(db_int(case.number))
        .bind(case.class.code())
        .bind(message)
        .bind(micros(at))
        .bind(micros(at))
        .execute(&self.pool)
        .await?;

        debug!(case = %case, "❌ Recorded failure: {}", message);
        Ok(())
    }

    /// Case numbers of a class with a recent error-free attempt
    pub async fn existing_numbers(&self, class: CaseClass, max_age: Duration) -> Result<Vec<u64>, StateStoreError> {
        self.numbers_where(class, max_age, "error_message IS NULL").await
    }

    /// Case numbers of a class whose recent attempt failed
    pub async fn failed_numbers(&self, class: CaseClass, max_age: Duration) -> Result<Vec<u64>, StateStoreError> {
        self.numbers_where(class, max_age, "error_message IS NOT NULL").await
    }

    async fn numbers_where(
        &self,
        class: CaseClass,
        max_age: Duration,
        condition: &str,
    ) -> Result<Vec<u64>, StateStoreError> {
        let window = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let since = Utc::now().checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let sql = format!(
            "SELECT processo_id FROM processos WHERE classe = ? AND updated_at > ? AND {condition} ORDER BY processo_id"
        );
        let rows = sqlx::query(&sql)
            .bind(class.code())
            .bind(micros(since))
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                let raw: i64 = row.try_get("processo_id")?;
                Ok(u64::try_from(raw).unwrap_or_default())
            })
            .collect()
    }
}

fn loaded_column_list() -> String {
    SectionName::ALL
        .iter()
        .map(|s| s.loaded_column())
        .collect::<Vec<_>>()
        .join(", ")
}

fn entry_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<CrawlStateEntry, StateStoreError> {
    let raw_number: i64 = row.try_get("processo_id")?;
    let number = u64::try_from(raw_number).map_err(|e| StateStoreError::CorruptRow {
        number: 0,
        message: e.to_string(),
    })?;
    let incidente: Option<i64> = row.try_get("incidente")?;

    let mut loaded_sections = BTreeSet::new();
    for section in SectionName::ALL {
        let flag: i64 = row.try_get(section.loaded_column())?;
        if flag != 0 {
            loaded_sections.insert(section);
        }
    }

    Ok(CrawlStateEntry {
        number,
        class: row.try_get("classe")?,
        correlation_id: incidente
            .and_then(|v| u64::try_from(v).ok())
            .and_then(CorrelationId::new),
        error_message: row.try_get("error_message")?,
        loaded_sections,
        created_at: from_micros(row.try_get("created_at")?),
        updated_at: from_micros(row.try_get("updated_at")?),
    })
}
