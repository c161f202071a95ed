//! SQLite implementation of the PositionRepository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use super::{parse_datetime, parse_json_or_default, parse_optional_datetime, parse_optional_uuid};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Position, Recommendation, Timeframe};
use crate::domain::ports::PositionRepository;

#[derive(Clone)]
pub struct SqlitePositionRepository {
    pool: SqlitePool,
}

impl SqlitePositionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PositionRepository for SqlitePositionRepository {
    async fn get(&self, company_symbol: &str) -> DomainResult<Option<Position>> {
        let row: Option<PositionRow> = sqlx::query_as("SELECT * FROM positions WHERE company_symbol = ?")
            .bind(company_symbol.to_uppercase())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self) -> DomainResult<Vec<Position>> {
        let rows: Vec<PositionRow> = sqlx::query_as("SELECT * FROM positions ORDER BY company_symbol")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[derive(sqlx::FromRow)]
struct PositionRow {
    company_symbol: String,
    company_name: Option<String>,
    current_recommendation: String,
    recommendation_date: Option<String>,
    recommendation_basis: String,
    recommendation_assessment_id: Option<String>,
    recommendation_timeframe: Option<String>,
    recommendation_confidence: Option<f64>,
    history: Option<String>,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl TryFrom<PositionRow> for Position {
    type Error = DomainError;

    fn try_from(row: PositionRow) -> Result<Self, Self::Error> {
        let current_recommendation = Recommendation::from_str(&row.current_recommendation).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid recommendation: {}", row.current_recommendation))
        })?;
        let recommendation_timeframe = row
            .recommendation_timeframe
            .map(|t| {
                Timeframe::from_str(&t)
                    .ok_or_else(|| DomainError::SerializationError(format!("Invalid timeframe: {t}")))
            })
            .transpose()?;

        Ok(Position {
            company_symbol: row.company_symbol,
            company_name: row.company_name,
            current_recommendation,
            recommendation_date: parse_optional_datetime(row.recommendation_date)?,
            recommendation_basis: row.recommendation_basis,
            recommendation_assessment_id: parse_optional_uuid(row.recommendation_assessment_id)?,
            recommendation_timeframe,
            recommendation_confidence: row.recommendation_confidence,
            history: parse_json_or_default(row.history)?,
            version: u64::try_from(row.version)
                .map_err(|_| DomainError::SerializationError(format!("Invalid version: {}", row.version)))?,
            created_at: parse_datetime(&row.created_at)?,
            updated_at: parse_datetime(&row.updated_at)?,
        })
    }
}
