//! SQLite implementation of the ReportRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{
    format_datetime, parse_datetime, parse_json_or_default, parse_optional_datetime, parse_uuid, usage_by_model,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{DeliveryStatus, Report, ReportFeedback, TokenUsage};
use crate::domain::ports::{DeliveryRecord, ReportRepository};

#[derive(Clone)]
pub struct SqliteReportRepository {
    pool: SqlitePool,
}

impl SqliteReportRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReportRepository for SqliteReportRepository {
    async fn create(&self, r: &Report) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO reports (id, assessment_id, investigation_id, trigger_id, company_symbol,
               title, executive_summary, report_body, recommendation_summary, delivery_status,
               delivered_via, delivery_attempts, delivered_at, feedback, model_used, input_tokens,
               output_tokens, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(r.id.to_string())
        .bind(r.assessment_id.to_string())
        .bind(r.investigation_id.to_string())
        .bind(r.trigger_id.to_string())
        .bind(&r.company_symbol)
        .bind(&r.title)
        .bind(&r.executive_summary)
        .bind(&r.report_body)
        .bind(&r.recommendation_summary)
        .bind(r.delivery_status.as_str())
        .bind(serde_json::to_string(&r.delivered_via)?)
        .bind(serde_json::to_string(&r.delivery_attempts)?)
        .bind(r.delivered_at.as_ref().map(format_datetime))
        .bind(r.feedback.as_ref().map(serde_json::to_string).transpose()?)
        .bind(&r.model_used)
        .bind(r.usage.input_tokens as i64)
        .bind(r.usage.output_tokens as i64)
        .bind(format_datetime(&r.created_at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Report>> {
        let row: Option<ReportRow> = sqlx::query_as("SELECT * FROM reports WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn get_by_assessment(&self, assessment_id: Uuid) -> DomainResult<Option<Report>> {
        let row: Option<ReportRow> = sqlx::query_as("SELECT * FROM reports WHERE assessment_id = ?")
            .bind(assessment_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list(&self, company_symbol: Option<&str>, limit: usize) -> DomainResult<Vec<Report>> {
        let rows: Vec<ReportRow> = match company_symbol {
            Some(symbol) => {
                sqlx::query_as(
                    "SELECT * FROM reports WHERE company_symbol = ? ORDER BY created_at DESC, rowid DESC LIMIT ?",
                )
                .bind(symbol.to_uppercase())
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as("SELECT * FROM reports ORDER BY created_at DESC, rowid DESC LIMIT ?")
                    .bind(limit as i64)
                    .fetch_all(&self.pool)
                    .await?
            }
        };
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn record_delivery(&self, id: Uuid, record: &DeliveryRecord) -> DomainResult<()> {
        let result = sqlx::query(
            r#"UPDATE reports SET delivery_status = ?, delivered_via = ?, delivery_attempts = ?, delivered_at = ?
               WHERE id = ? AND delivery_status = 'generated'"#,
        )
        .bind(record.status.as_str())
        .bind(serde_json::to_string(&record.delivered_via)?)
        .bind(serde_json::to_string(&record.attempts)?)
        .bind(record.delivered_at.as_ref().map(format_datetime))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return match self.get(id).await? {
                None => Err(DomainError::ReportNotFound(id)),
                Some(existing) => Err(DomainError::InvalidStateTransition {
                    from: existing.delivery_status.as_str().to_string(),
                    to: record.status.as_str().to_string(),
                    reason: "delivery already recorded".to_string(),
                }),
            };
        }
        Ok(())
    }

    async fn record_feedback(&self, id: Uuid, feedback: &ReportFeedback) -> DomainResult<()> {
        let result = sqlx::query("UPDATE reports SET feedback = ? WHERE id = ?")
            .bind(serde_json::to_string(feedback)?)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::ReportNotFound(id));
        }
        Ok(())
    }

    async fn usage_by_model(
        &self,
        since: &DateTime<Utc>,
        until: &DateTime<Utc>,
    ) -> DomainResult<Vec<(String, TokenUsage)>> {
        usage_by_model(&self.pool, "reports", since, until).await
    }

    async fn count_completed(&self, since: &DateTime<Utc>, until: &DateTime<Utc>) -> DomainResult<u64> {
        let count: i64 = sqlx::query_scalar(
            r#"SELECT COUNT(*) FROM reports
               WHERE created_at >= ? AND created_at <= ?
                 AND delivery_status IN ('generated', 'delivered')"#,
        )
        .bind(format_datetime(since))
        .bind(format_datetime(until))
        .fetch_one(&self.pool)
        .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

#[derive(sqlx::FromRow)]
struct ReportRow {
    id: String,
    assessment_id: String,
    investigation_id: String,
    trigger_id: String,
    company_symbol: String,
    title: String,
    executive_summary: String,
    report_body: String,
    recommendation_summary: String,
    delivery_status: String,
    delivered_via: Option<String>,
    delivery_attempts: Option<String>,
    delivered_at: Option<String>,
    feedback: Option<String>,
    model_used: String,
    input_tokens: i64,
    output_tokens: i64,
    created_at: String,
}

impl TryFrom<ReportRow> for Report {
    type Error = DomainError;

    fn try_from(row: ReportRow) -> Result<Self, Self::Error> {
        let delivery_status = DeliveryStatus::from_str(&row.delivery_status).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid delivery status: {}", row.delivery_status))
        })?;

        Ok(Report {
            id: parse_uuid(&row.id)?,
            assessment_id: parse_uuid(&row.assessment_id)?,
            investigation_id: parse_uuid(&row.investigation_id)?,
            trigger_id: parse_uuid(&row.trigger_id)?,
            company_symbol: row.company_symbol,
            title: row.title,
            executive_summary: row.executive_summary,
            report_body: row.report_body,
            recommendation_summary: row.recommendation_summary,
            delivery_status,
            delivered_via: parse_json_or_default(row.delivered_via)?,
            delivery_attempts: parse_json_or_default(row.delivery_attempts)?,
            delivered_at: parse_optional_datetime(row.delivered_at)?,
            feedback: row.feedback.map(|s| serde_json::from_str(&s)).transpose()?,
            model_used: row.model_used,
            usage: TokenUsage::new(
                u64::try_from(row.input_tokens).unwrap_or_default(),
                u64::try_from(row.output_tokens).unwrap_or_default(),
            ),
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}
