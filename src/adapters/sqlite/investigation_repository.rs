//! SQLite implementation of the InvestigationRepository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{format_datetime, parse_datetime, parse_json_or_default, parse_uuid, usage_by_model};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Investigation, SignificanceLevel, TokenUsage};
use crate::domain::ports::InvestigationRepository;

#[derive(Clone)]
pub struct SqliteInvestigationRepository {
    pool: SqlitePool,
}

impl SqliteInvestigationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, query: &str, binds: &[String], limit: usize) -> DomainResult<Vec<Investigation>> {
        let mut q = sqlx::query_as::<_, InvestigationRow>(query);
        for b in binds {
            q = q.bind(b);
        }
        let rows: Vec<InvestigationRow> = q.bind(limit as i64).fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }
}

#[async_trait]
impl InvestigationRepository for SqliteInvestigationRepository {
    async fn create(&self, inv: &Investigation) -> DomainResult<()> {
        sqlx::query(
            r#"INSERT INTO investigations (id, trigger_id, company_symbol, company_name,
               extracted_metrics, forward_statements, management_highlights, key_findings, red_flags,
               positive_signals, synthesis, significance, significance_rank, significance_reasoning,
               is_significant, market_data, web_search_results, historical_context, enrichment_gaps,
               parse_issues, model_used, input_tokens, output_tokens, processing_ms, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(inv.id.to_string())
        .bind(inv.trigger_id.to_string())
        .bind(&inv.company_symbol)
        .bind(&inv.company_name)
        .bind(serde_json::to_string(&inv.extracted_metrics)?)
        .bind(serde_json::to_string(&inv.forward_statements)?)
        .bind(serde_json::to_string(&inv.management_highlights)?)
        .bind(serde_json::to_string(&inv.key_findings)?)
        .bind(serde_json::to_string(&inv.red_flags)?)
        .bind(serde_json::to_string(&inv.positive_signals)?)
        .bind(&inv.synthesis)
        .bind(inv.significance.as_str())
        .bind(inv.significance.rank())
        .bind(&inv.significance_reasoning)
        .bind(inv.is_significant)
        .bind(inv.market_data.as_ref().map(serde_json::to_string).transpose()?)
        .bind(serde_json::to_string(&inv.web_search_results)?)
        .bind(serde_json::to_string(&inv.historical_context)?)
        .bind(serde_json::to_string(&inv.enrichment_gaps)?)
        .bind(serde_json::to_string(&inv.parse_issues)?)
        .bind(&inv.model_used)
        .bind(inv.usage.input_tokens as i64)
        .bind(inv.usage.output_tokens as i64)
        .bind(inv.processing_ms as i64)
        .bind(format_datetime(&inv.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<Investigation>> {
        let row: Option<InvestigationRow> = sqlx::query_as("SELECT * FROM investigations WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn get_by_trigger(&self, trigger_id: Uuid) -> DomainResult<Option<Investigation>> {
        let row: Option<InvestigationRow> = sqlx::query_as("SELECT * FROM investigations WHERE trigger_id = ?")
            .bind(trigger_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_by_company(
        &self,
        company_symbol: &str,
        exclude: Option<Uuid>,
        limit: usize,
    ) -> DomainResult<Vec<Investigation>> {
        let exclude = exclude.map(|id| id.to_string()).unwrap_or_default();
        self.fetch(
            r#"SELECT * FROM investigations
               WHERE company_symbol = ? AND id != ?
               ORDER BY created_at DESC, rowid DESC
               LIMIT ?"#,
            &[company_symbol.to_uppercase(), exclude],
            limit,
        )
        .await
    }

    async fn list_inconclusive(
        &self,
        company_symbol: &str,
        exclude: Option<Uuid>,
        limit: usize,
    ) -> DomainResult<Vec<Investigation>> {
        let exclude = exclude.map(|id| id.to_string()).unwrap_or_default();
        self.fetch(
            r#"SELECT i.* FROM investigations i
               INNER JOIN assessments a ON a.investigation_id = i.id
               WHERE i.company_symbol = ? AND i.id != ?
                 AND i.is_significant = 1
                 AND i.significance_rank >= ?
                 AND a.recommendation_changed = 0
               ORDER BY i.created_at DESC, i.rowid DESC
               LIMIT ?"#,
            &[
                company_symbol.to_uppercase(),
                exclude,
                SignificanceLevel::Medium.rank().to_string(),
            ],
            limit,
        )
        .await
    }

    async fn list_recent(&self, limit: usize) -> DomainResult<Vec<Investigation>> {
        self.fetch("SELECT * FROM investigations ORDER BY created_at DESC, rowid DESC LIMIT ?", &[], limit)
            .await
    }

    async fn usage_by_model(
        &self,
        since: &DateTime<Utc>,
        until: &DateTime<Utc>,
    ) -> DomainResult<Vec<(String, TokenUsage)>> {
        usage_by_model(&self.pool, "investigations", since, until).await
    }
}

#[derive(sqlx::FromRow)]
struct InvestigationRow {
    id: String,
    trigger_id: String,
    company_symbol: Option<String>,
    company_name: Option<String>,
    extracted_metrics: Option<String>,
    forward_statements: Option<String>,
    management_highlights: Option<String>,
    key_findings: Option<String>,
    red_flags: Option<String>,
    positive_signals: Option<String>,
    synthesis: String,
    significance: String,
    significance_reasoning: String,
    is_significant: bool,
    market_data: Option<String>,
    web_search_results: Option<String>,
    historical_context: Option<String>,
    enrichment_gaps: Option<String>,
    parse_issues: Option<String>,
    model_used: String,
    input_tokens: i64,
    output_tokens: i64,
    processing_ms: i64,
    created_at: String,
}

impl TryFrom<InvestigationRow> for Investigation {
    type Error = DomainError;

    fn try_from(row: InvestigationRow) -> Result<Self, Self::Error> {
        let significance = SignificanceLevel::from_str(&row.significance).ok_or_else(|| {
            DomainError::SerializationError(format!("Invalid significance: {}", row.significance))
        })?;

        Ok(Investigation {
            id: parse_uuid(&row.id)?,
            trigger_id: parse_uuid(&row.trigger_id)?,
            company_symbol: row.company_symbol,
            company_name: row.company_name,
            extracted_metrics: parse_json_or_default(row.extracted_metrics)?,
            forward_statements: parse_json_or_default(row.forward_statements)?,
            management_highlights: parse_json_or_default(row.management_highlights)?,
            key_findings: parse_json_or_default(row.key_findings)?,
            red_flags: parse_json_or_default(row.red_flags)?,
            positive_signals: parse_json_or_default(row.positive_signals)?,
            synthesis: row.synthesis,
            significance,
            significance_reasoning: row.significance_reasoning,
            is_significant: row.is_significant,
            market_data: row.market_data.map(|s| serde_json::from_str(&s)).transpose()?,
            web_search_results: parse_json_or_default(row.web_search_results)?,
            historical_context: parse_json_or_default(row.historical_context)?,
            enrichment_gaps: parse_json_or_default(row.enrichment_gaps)?,
            parse_issues: parse_json_or_default(row.parse_issues)?,
            model_used: row.model_used,
            usage: TokenUsage::new(
                u64::try_from(row.input_tokens).unwrap_or_default(),
                u64::try_from(row.output_tokens).unwrap_or_default(),
            ),
            processing_ms: u64::try_from(row.processing_ms).unwrap_or_default(),
            created_at: parse_datetime(&row.created_at)?,
        })
    }
}
