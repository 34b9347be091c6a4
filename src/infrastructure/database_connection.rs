// Database connection and pool management
// This module handles SQLite database connections using sqlx

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::section::SectionName;

pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    pub async fn new(database_url: &str) -> Result<Self> {
        // Create database file directory if it doesn't exist
        let db_path = if database_url.starts_with("sqlite://") {
            database_url.trim_start_matches("sqlite://")
        } else if database_url.starts_with("sqlite:") {
            database_url.trim_start_matches("sqlite:")
        } else {
            database_url
        };

        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("Invalid database URL: {database_url}"))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {database_url}"))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create the case table and its indexes
    pub async fn migrate(&self) -> Result<()> {
        let loaded_columns: String = SectionName::ALL
            .iter()
            .map(|s| format!("                {} INTEGER NOT NULL DEFAULT 0,\n", s.loaded_column()))
            .collect();

        let classes: Vec<String> = crate::domain::case::CaseClass::ALL
            .iter()
            .map(|c| format!("'{}'", c.code()))
            .collect();

        let create_processos_sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS processos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                processo_id INTEGER NOT NULL UNIQUE,
                incidente INTEGER UNIQUE,
                classe TEXT NOT NULL CHECK (classe IN ({classes})),
                numero_unico TEXT,
                meio TEXT,
                publicidade TEXT,
                badges TEXT,
                liminar INTEGER,
                assuntos TEXT,
                data_protocolo TEXT,
                orgao_origem TEXT,
                origem TEXT,
                numero_origem TEXT,
                volumes INTEGER,
                folhas INTEGER,
                apensos INTEGER,
                relator TEXT,
                primeiro_autor TEXT,
                partes TEXT,
                andamentos TEXT,
                decisoes TEXT,
                sessao_virtual TEXT,
                deslocamentos TEXT,
                peticoes TEXT,
                recursos TEXT,
                pautas TEXT,
                status INTEGER,
                extraido TEXT,
                html TEXT,
{loaded_columns}                error_message TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
        "#,
            classes = classes.join(", "),
        );

        sqlx::query(&create_processos_sql).execute(&self.pool).await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_processos_classe ON processos (classe)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_processos_updated_at ON processos (updated_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_database_connection_creates_file() -> Result<()> {
        let temp_dir = tempdir()?;
        let db_path = temp_dir.path().join("nested").join("test.db");
        let database_url = format!("sqlite:{}", db_path.to_string_lossy());

        let db = DatabaseConnection::new(&database_url).await?;
        assert!(!db.pool().is_closed());
        assert!(db_path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_database_migration_is_repeatable() -> Result<()> {
        let temp_dir = tempdir()?;
        let database_url = format!("sqlite:{}", temp_dir.path().join("migrate.db").display());

        let db = DatabaseConnection::new(&database_url).await?;
        db.migrate().await?;
        db.migrate().await?;

        let result = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='processos'")
            .fetch_optional(db.pool())
            .await?;
        assert!(result.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_class_check_constraint() -> Result<()> {
        let temp_dir = tempdir()?;
        let database_url = format!("sqlite:{}", temp_dir.path().join("check.db").display());
        let db = DatabaseConnection::new(&database_url).await?;
        db.migrate().await?;

        let bad = sqlx::query(
            "INSERT INTO processos (processo_id, classe, created_at, updated_at) VALUES (1, 'NOPE', 0, 0)",
        )
        .execute(db.pool())
        .await;
        assert!(bad.is_err());
        Ok(())
    }
}
