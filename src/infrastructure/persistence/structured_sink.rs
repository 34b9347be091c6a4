//! SQLite upsert of finalized case records

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::SqlitePool;

use crate::domain::record::CaseRecord;
use crate::infrastructure::persistence::PersistenceError;
use crate::infrastructure::scrape_state_store::{db_int, micros};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Integer,
    Text,
}

/// Record columns written by the upsert, in table order
const RECORD_COLUMNS: &[(&str, ColumnKind)] = &[
    ("numero_unico", ColumnKind::Text),
    ("meio", ColumnKind::Text),
    ("publicidade", ColumnKind::Text),
    ("badges", ColumnKind::Text),
    ("liminar", ColumnKind::Integer),
    ("assuntos", ColumnKind::Text),
    ("data_protocolo", ColumnKind::Text),
    ("orgao_origem", ColumnKind::Text),
    ("origem", ColumnKind::Text),
    ("numero_origem", ColumnKind::Text),
    ("volumes", ColumnKind::Integer),
    ("folhas", ColumnKind::Integer),
    ("apensos", ColumnKind::Integer),
    ("relator", ColumnKind::Text),
    ("primeiro_autor", ColumnKind::Text),
    ("partes", ColumnKind::Text),
    ("andamentos", ColumnKind::Text),
    ("decisoes", ColumnKind::Text),
    ("sessao_virtual", ColumnKind::Text),
    ("deslocamentos", ColumnKind::Text),
    ("peticoes", ColumnKind::Text),
    ("recursos", ColumnKind::Text),
    ("pautas", ColumnKind::Text),
    ("status", ColumnKind::Integer),
    ("extraido", ColumnKind::Text),
    ("html", ColumnKind::Text),
];

pub struct StructuredSink {
    pool: SqlitePool,
}

impl StructuredSink {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, record: &CaseRecord, flat: &Map<String, Value>) -> Result<(), PersistenceError> {
        self.upsert_at(record, flat, Utc::now()).await
    }

    /// Insert or fully update the row keyed by `processo_id`.
    /// `updated_at` always moves forward, even for same-instant rewrites.
    pub async fn upsert_at(
        &self,
        record: &CaseRecord,
        flat: &Map<String, Value>,
        at: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        let names: Vec<&str> = RECORD_COLUMNS.iter().map(|(name, _)| *name).collect();
        let placeholders = vec!["?"; names.len()].join(", ");
        let updates: String = names
            .iter()
            .map(|name| format!("{name} = excluded.{name},\n                "))
            .collect();
        let sql = format!(
            r#"
            INSERT INTO processos (processo_id, classe, incidente, {columns}, error_message, created_at, updated_at)
            VALUES (?, ?, ?, {placeholders}, NULL, ?, ?)
            ON CONFLICT(processo_id) DO UPDATE SET
                classe = excluded.classe,
                incidente = excluded.incidente,
                {updates}error_message = NULL,
                updated_at = MAX(excluded.updated_at, processos.updated_at + 1)
            "#,
            columns = names.join(", "),
        );

        let request = record.request();
        let mut query = sqlx::query(&sql)
            .bind(db_int(request.number))
            .bind(request.class.code())
            .bind(record.correlation_id().map(|id| db_int(id.get())));

        for (name, kind) in RECORD_COLUMNS {
            let value = flat.get(*name).unwrap_or(&Value::Null);
            query = match kind {
                ColumnKind::Integer => query.bind(integer_value(value)),
                ColumnKind::Text => query.bind(text_value(value)),
            };
        }

        query
            .bind(micros(at))
            .bind(micros(at))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn integer_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::Bool(b) => Some(i64::from(*b)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
