//! SQLite database adapters for the trigger pipeline.

pub mod assessment_repository;
pub mod connection;
pub mod investigation_repository;
pub mod migrations;
pub mod position_repository;
pub mod report_repository;
pub mod trigger_repository;

pub use assessment_repository::SqliteAssessmentRepository;
pub use connection::{create_pool, create_test_pool, database_url, verify_connection, ConnectionError, PoolConfig};
pub use investigation_repository::SqliteInvestigationRepository;
pub use migrations::{all_embedded_migrations, Migration, MigrationError, Migrator};
pub use position_repository::SqlitePositionRepository;
pub use report_repository::SqliteReportRepository;
pub use trigger_repository::SqliteTriggerRepository;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::TokenUsage;

/// Fixed-width RFC3339 so text ordering matches time ordering.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parse a UUID string from a SQLite row field.
pub fn parse_uuid(s: &str) -> DomainResult<Uuid> {
    Uuid::parse_str(s).map_err(|e| DomainError::SerializationError(e.to_string()))
}

/// Parse an optional UUID string from a SQLite row field.
pub fn parse_optional_uuid(s: Option<String>) -> DomainResult<Option<Uuid>> {
    s.map(|s| Uuid::parse_str(&s))
        .transpose()
        .map_err(|e| DomainError::SerializationError(e.to_string()))
}

/// Parse an RFC3339 datetime string from a SQLite row field.
pub fn parse_datetime(s: &str) -> DomainResult<DateTime<Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map_err(|e| DomainError::SerializationError(e.to_string()))
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse an optional RFC3339 datetime string from a SQLite row field.
pub fn parse_optional_datetime(s: Option<String>) -> DomainResult<Option<DateTime<Utc>>> {
    s.map(|s| chrono::DateTime::parse_from_rfc3339(&s).map(|d| d.with_timezone(&Utc)))
        .transpose()
        .map_err(|e| DomainError::SerializationError(e.to_string()))
}

/// Parse a JSON string from a SQLite row field, falling back to the type's default.
pub fn parse_json_or_default<T: serde::de::DeserializeOwned + Default>(s: Option<String>) -> DomainResult<T> {
    s.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| DomainError::SerializationError(e.to_string()))
        .map(Option::unwrap_or_default)
}

/// Whether a sqlx error is a UNIQUE constraint violation.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error().is_some_and(|db| db.is_unique_violation())
}

#[derive(sqlx::FromRow)]
struct UsageRow {
    model_used: String,
    input_tokens: i64,
    output_tokens: i64,
}

/// Token totals per model for rows of `table` created in `[since, until]`.
pub(crate) async fn usage_by_model(
    pool: &SqlitePool,
    table: &'static str,
    since: &DateTime<Utc>,
    until: &DateTime<Utc>,
) -> DomainResult<Vec<(String, TokenUsage)>> {
    let query = format!(
        "SELECT model_used, SUM(input_tokens) AS input_tokens, SUM(output_tokens) AS output_tokens
         FROM {table}
         WHERE created_at >= ? AND created_at <= ?
         GROUP BY model_used
         ORDER BY model_used"
    );
    let rows: Vec<UsageRow> = sqlx::query_as(&query)
        .bind(format_datetime(since))
        .bind(format_datetime(until))
        .fetch_all(pool)
        .await?;

    Ok(rows
        .into_iter()
        .map(|r| {
            let usage = TokenUsage::new(
                u64::try_from(r.input_tokens).unwrap_or_default(),
                u64::try_from(r.output_tokens).unwrap_or_default(),
            );
            (r.model_used, usage)
        })
        .collect())
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
    #[error("Query error: {0}")]
    Query(#[from] sqlx::Error),
}

pub async fn initialize_database(database_url: &str, config: Option<PoolConfig>) -> Result<SqlitePool, DatabaseError> {
    let pool = create_pool(database_url, config).await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(all_embedded_migrations()).await?;
    Ok(pool)
}

/// Create an in-memory test pool with all migrations applied.
pub async fn create_migrated_test_pool() -> Result<SqlitePool, DatabaseError> {
    let pool = create_test_pool().await?;
    let migrator = Migrator::new(pool.clone());
    migrator.run_embedded_migrations(all_embedded_migrations()).await?;
    Ok(pool)
}
