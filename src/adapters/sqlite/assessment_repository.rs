//! SQLite implementation of the AssessmentRepository.
//!
//! An assessment and the position it produced are written in one
//! transaction; the position write is guarded by its `version`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use super::{
    format_datetime, is_unique_violation, parse_datetime, parse_json_or_default, parse_optional_datetime,
    parse_uuid, usage_by_model,
};
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{DecisionAssessment, Position, Recommendation, Timeframe, TokenUsage};
use crate::domain::ports::AssessmentRepository;

#[derive(Clone)]
pub struct SqliteAssessmentRepository {
    pool: SqlitePool,
}

impl SqliteAssessmentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssessmentRepository for SqliteAssessmentRepository {
    async fn commit(&self, a: &DecisionAssessment, position: Option<&Position>) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"INSERT INTO assessments (id, investigation_id, trigger_id, company_symbol,
               previous_recommendation, previous_recommendation_date, previous_basis,
               recommendation_changed, new_recommendation, timeframe, confidence, reasoning,
               key_factors_for, key_factors_against, past_investigations_used,
               past_inconclusive_resurrected, position_before, position_after, model_used,
               input_tokens, output_tokens, processing_ms, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(a.id.to_string())
        .bind(a.investigation_id.to_string())
        .bind(a.trigger_id.to_string())
        .bind(&a.company_symbol)
        .bind(a.previous_recommendation.as_str())
        .bind(a.previous_recommendation_date.as_ref().map(format_datetime))
        .bind(&a.previous_basis)
        .bind(a.recommendation_changed)
        .bind(a.new_recommendation.as_str())
        .bind(a.timeframe.as_str())
        .bind(a.confidence)
        .bind(&a.reasoning)
        .bind(serde_json::to_string(&a.key_factors_for)?)
        .bind(serde_json::to_string(&a.key_factors_against)?)
        .bind(serde_json::to_string(&a.past_investigations_used)?)
        .bind(serde_json::to_string(&a.past_inconclusive_resurrected)?)
        .bind(serde_json::to_string(&a.position_before)?)
        .bind(serde_json::to_string(&a.position_after)?)
        .bind(&a.model_used)
        .bind(a.usage.input_tokens as i64)
        .bind(a.usage.output_tokens as i64)
        .bind(a.processing_ms as i64)
        .bind(format_datetime(&a.created_at))
        .execute(&mut *tx)
        .await?;

        if let Some(position) = position {
            write_position(&mut tx, position).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> DomainResult<Option<DecisionAssessment>> {
        let row: Option<AssessmentRow> = sqlx::query_as("SELECT * FROM assessments WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn get_by_investigation(&self, investigation_id: Uuid) -> DomainResult<Option<DecisionAssessment>> {
        let row: Option<AssessmentRow> = sqlx::query_as("SELECT * FROM assessments WHERE investigation_id = ?")
            .bind(investigation_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_by_company(&self, company_symbol: &str) -> DomainResult<Vec<DecisionAssessment>> {
        let rows: Vec<AssessmentRow> = sqlx::query_as(
            "SELECT * FROM assessments WHERE company_symbol = ? ORDER BY created_at, rowid",
        )
        .bind(company_symbol.to_uppercase())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_recent(&self, limit: usize) -> DomainResult<Vec<DecisionAssessment>> {
        let rows: Vec<AssessmentRow> =
            sqlx::query_as("SELECT * FROM assessments ORDER BY created_at DESC, rowid DESC LIMIT ?")
                .bind(limit as i64)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn usage_by_model(
        &self,
        since: &DateTime<Utc>,
        until: &DateTime<Utc>,
    ) -> DomainResult<Vec<(String, TokenUsage)>> {
        usage_by_model(&self.pool, "assessments", since, until).await
    }
}

/// Insert a fresh position (read version 0) or update the one that was read.
async fn write_position(tx: &mut Transaction<'_, Sqlite>, p: &Position) -> DomainResult<()> {
    let conflict = || DomainError::ConcurrencyConflict {
        entity: "position".to_string(),
        id: p.company_symbol.clone(),
    };
    let history = serde_json::to_string(&p.history)?;

    if p.version == 0 {
        let inserted = sqlx::query(
            r#"INSERT INTO positions (company_symbol, company_name, current_recommendation,
               recommendation_date, recommendation_basis, recommendation_assessment_id,
               recommendation_timeframe, recommendation_confidence, history, version, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?)"#,
        )
        .bind(&p.company_symbol)
        .bind(&p.company_name)
        .bind(p.current_recommendation.as_str())
        .bind(p.recommendation_date.as_ref().map(format_datetime))
        .bind(&p.recommendation_basis)
        .bind(p.recommendation_assessment_id.map(|id| id.to_string()))
        .bind(p.recommendation_timeframe.map(|t| t.as_str()))
        .bind(p.recommendation_confidence)
        .bind(&history)
        .bind(format_datetime(&p.created_at))
        .bind(format_datetime(&p.updated_at))
        .execute(&mut **tx)
        .await;

        return match inserted {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(conflict()),
            Err(e) => Err(e.into()),
        };
    }

    let result = sqlx::query(
        r#"UPDATE positions SET company_name = COALESCE(?, company_name), current_recommendation = ?,
           recommendation_date = ?, recommendation_basis = ?, recommendation_assessment_id = ?,
           recommendation_timeframe = ?, recommendation_confidence = ?, history = ?,
           version = version + 1, updated_at = ?
           WHERE company_symbol = ? AND version = ?"#,
    )
    .bind(&p.company_name)
    .bind(p.current_recommendation.as_str())
    .bind(p.recommendation_date.as_ref().map(format_datetime))
    .bind(&p.recommendation_basis)
    .bind(p.recommendation_assessment_id.map(|id| id.to_string()))
    .bind(p.recommendation_timeframe.map(|t| t.as_str()))
    .bind(p.recommendation_confidence)
    .bind(&history)
    .bind(format_datetime(&p.updated_at))
    .bind(&p.company_symbol)
    .bind(p.version as i64)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Err(conflict());
    }
    Ok(())
}

#[derive(sqlx::FromRow)]
struct AssessmentRow {
    id: String,
    investigation_id: String,
    trigger_id: String,
    company_symbol: String,
    previous_recommendation: String,
    previous_recommendation_date: Option<String>,
    previous_basis: String,
    recommendation_changed: bool,
    new_recommendation: String,
    timeframe: String,
    confidence: f64,
    reasoning: String,
    key_factors_for: Option<String>,
    key_factors_against: Option<String>,
    past_investigations_used: Option<String>,
    past_inconclusive_resurrected: Option<String>,
    position_before: Option<String>,
    position_after: Option<String>,
    model_used: String,
    input_tokens: i64,
    output_tokens: i64,
    processing_ms: i64,
    created_at: String,
}

fn parse_recommendation(s: &str) -> DomainResult<Recommendation> {
    Recommendation::from_str(s)
        .ok_or_else(|| DomainError::SerializationError(format!("Invalid recommendation: {s}")))
}

impl TryFrom<AssessmentRow> for DecisionAssessment {
    type Error = DomainError;

    fn try_from(row: AssessmentRow) -> Result<Self, Self::Error> {
        let timeframe = Timeframe::from_str(&row.timeframe)
            .ok_or_else(|| DomainError::SerializationError(format!("Invalid timeframe: {}", row.timeframe)))?;

        Ok(DecisionAssessment {
            id: parse_uuid(&row.id)?,
            investigation_id: parse_uuid(&row.investigation_id)?,
            trigger_id: parse_uuid(&row.trigger_id)?,
            company_symbol: row.company_symbol,
            previous_recommendation: parse_recommendation(&row.previous_recommendation)?,
            previous_recommendation_date: parse_optional_datetime(row.previous_recommendation_date)?,
            previous_basis: row.previous_basis,
            recommendation_changed: row.recommendation_changed,
            new_recommendation: parse_recommendation(&row.new_recommendation)?,
            timeframe,
            confidence: row.confidence,
            reasoning: row.reasoning,
            key_factors_for: parse_json_or_default(row.key_factors_for)?,
            key_factors_against: parse_json_or_default(row.key_factors_against)?,
            past_investigations_used: parse_json_or_default(row.past_investigations_used)?,
            past_inconclusive_resurrected: parse_json_or_default(row.past_inconclusive_resurrected)?,
            position_before: parse_json_or_default(row.position_before)?,
            position_after: parse_json_or_default(row.position_after)?,
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

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::adapters::sqlite::{
        create_migrated_test_pool, SqliteInvestigationRepository, SqlitePositionRepository,
        SqliteTriggerRepository,
    };
    use crate::domain::models::{
        Investigation, PositionState, SignificanceLevel, Trigger, TriggerCandidate,
    };
    use crate::domain::ports::{InvestigationRepository, PositionRepository, TriggerRepository};
    use chrono::Utc;

    pub(crate) struct Fixture {
        pub assessments: SqliteAssessmentRepository,
        pub investigations: SqliteInvestigationRepository,
        pub positions: SqlitePositionRepository,
        pub triggers: SqliteTriggerRepository,
        pub pool: SqlitePool,
    }

    pub(crate) async fn fixture() -> Fixture {
        let pool = create_migrated_test_pool().await.unwrap();
        Fixture {
            assessments: SqliteAssessmentRepository::new(pool.clone()),
            investigations: SqliteInvestigationRepository::new(pool.clone()),
            positions: SqlitePositionRepository::new(pool.clone()),
            triggers: SqliteTriggerRepository::new(pool.clone()),
            pool,
        }
    }

    pub(crate) async fn investigation(f: &Fixture, significance: SignificanceLevel, significant: bool) -> Investigation {
        let t = Trigger::from_candidate(TriggerCandidate::human("x", "ana").with_company("ACME", "Acme"));
        f.triggers.create(&t).await.unwrap();
        let mut inv = Investigation::new(t.id, Some("ACME".into()), Some("Acme".into()));
        inv.significance = significance;
        inv.is_significant = significant;
        f.investigations.create(&inv).await.unwrap();
        inv
    }

    pub(crate) fn assessment(inv: &Investigation, changed: bool, rec: Recommendation) -> DecisionAssessment {
        DecisionAssessment {
            id: Uuid::new_v4(),
            investigation_id: inv.id,
            trigger_id: inv.trigger_id,
            company_symbol: "ACME".into(),
            previous_recommendation: Recommendation::None,
            previous_recommendation_date: None,
            previous_basis: String::new(),
            recommendation_changed: changed,
            new_recommendation: rec,
            timeframe: Timeframe::MediumTerm,
            confidence: 0.6,
            reasoning: "because".into(),
            key_factors_for: vec!["orders".into()],
            key_factors_against: vec![],
            past_investigations_used: vec![],
            past_inconclusive_resurrected: vec![],
            position_before: PositionState::default(),
            position_after: PositionState::default(),
            model_used: "m".into(),
            usage: TokenUsage::new(2_400, 610),
            processing_ms: 5,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_commit_writes_assessment_and_new_position() {
        let f = fixture().await;
        let inv = investigation(&f, SignificanceLevel::High, true).await;
        let a = assessment(&inv, true, Recommendation::Buy);
        let mut position = Position::new("ACME", Some("Acme".into()));
        position.apply_change(&a, "strong".into());

        f.assessments.commit(&a, Some(&position)).await.unwrap();

        let loaded = f.assessments.get_by_investigation(inv.id).await.unwrap().unwrap();
        assert_eq!(loaded, a);
        let stored = f.positions.get("ACME").await.unwrap().unwrap();
        assert_eq!(stored.current_recommendation, Recommendation::Buy);
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn test_stale_position_version_rolls_back_assessment() {
        let f = fixture().await;
        let inv1 = investigation(&f, SignificanceLevel::High, true).await;
        let a1 = assessment(&inv1, true, Recommendation::Buy);
        let mut p = Position::new("ACME", None);
        p.apply_change(&a1, "one".into());
        f.assessments.commit(&a1, Some(&p)).await.unwrap();

        // A second writer that also read "no position yet".
        let inv2 = investigation(&f, SignificanceLevel::High, true).await;
        let a2 = assessment(&inv2, true, Recommendation::Sell);
        let mut stale = Position::new("ACME", None);
        stale.apply_change(&a2, "two".into());
        let err = f.assessments.commit(&a2, Some(&stale)).await.unwrap_err();

        assert!(matches!(err, DomainError::ConcurrencyConflict { .. }));
        assert!(f.assessments.get(a2.id).await.unwrap().is_none());
        let stored = f.positions.get("ACME").await.unwrap().unwrap();
        assert_eq!(stored.current_recommendation, Recommendation::Buy);
    }

    #[tokio::test]
    async fn test_update_bumps_version() {
        let f = fixture().await;
        let inv1 = investigation(&f, SignificanceLevel::High, true).await;
        let a1 = assessment(&inv1, true, Recommendation::Buy);
        let mut p = Position::new("ACME", None);
        p.apply_change(&a1, "one".into());
        f.assessments.commit(&a1, Some(&p)).await.unwrap();

        let inv2 = investigation(&f, SignificanceLevel::High, true).await;
        let a2 = assessment(&inv2, true, Recommendation::Sell);
        let mut current = f.positions.get("ACME").await.unwrap().unwrap();
        current.apply_change(&a2, "two".into());
        f.assessments.commit(&a2, Some(&current)).await.unwrap();

        let stored = f.positions.get("ACME").await.unwrap().unwrap();
        assert_eq!(stored.version, 2);
        assert_eq!(stored.history.len(), 1);
        assert_eq!(stored.timeline(), vec![(a1.id, Recommendation::Buy), (a2.id, Recommendation::Sell)]);
        assert_eq!(f.assessments.list_by_company("acme").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_inconclusive_query_joins_on_unchanged_assessments() {
        let f = fixture().await;
        let unchanged_high = investigation(&f, SignificanceLevel::High, true).await;
        f.assessments.commit(&assessment(&unchanged_high, false, Recommendation::None), None).await.unwrap();
        let changed = investigation(&f, SignificanceLevel::High, true).await;
        f.assessments.commit(&assessment(&changed, true, Recommendation::Buy), None).await.unwrap();
        let unchanged_medium = investigation(&f, SignificanceLevel::Medium, true).await;
        f.assessments.commit(&assessment(&unchanged_medium, false, Recommendation::None), None).await.unwrap();
        let low = investigation(&f, SignificanceLevel::Low, true).await;
        f.assessments.commit(&assessment(&low, false, Recommendation::None), None).await.unwrap();
        let _unassessed = investigation(&f, SignificanceLevel::High, true).await;

        let found: Vec<_> = f
            .investigations
            .list_inconclusive("ACME", None, 10)
            .await
            .unwrap()
            .iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(found, vec![unchanged_medium.id, unchanged_high.id]);

        let excluded = f.investigations.list_inconclusive("ACME", Some(unchanged_medium.id), 10).await.unwrap();
        assert_eq!(excluded.len(), 1);
    }

    #[tokio::test]
    async fn test_usage_totals_cover_assessments_in_window() {
        let f = fixture().await;
        let start = Utc::now();
        for _ in 0..2 {
            let inv = investigation(&f, SignificanceLevel::Medium, true).await;
            f.assessments.commit(&assessment(&inv, false, Recommendation::None), None).await.unwrap();
        }

        let totals = f.assessments.usage_by_model(&start, &(Utc::now() + chrono::Duration::seconds(1))).await.unwrap();
        assert_eq!(totals, vec![("m".to_string(), TokenUsage::new(4_800, 1_220))]);
    }
}
