//! Decision assessor: should the standing recommendation change?
//!
//! Assessments for one company run one at a time under [`CompanyLocks`].
//! The assessment row and the position write commit together, and the
//! position write is additionally guarded by its version.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{DecisionAssessment, Investigation, Position, Recommendation, Timeframe};
use crate::domain::ports::{
    AssessmentRepository, DecisionRequest, PositionRepository, ReasoningCapability, Stage, StructuredOutput,
};
use crate::services::historical_context::HistoricalContextAggregator;
use crate::services::retry::RetryPolicy;

/// Longest recommendation basis kept on a position.
const BASIS_CHARS: usize = 1000;

/// One async mutex per company symbol.
#[derive(Default)]
pub struct CompanyLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl CompanyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `company_symbol`.
    pub async fn acquire(&self, company_symbol: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(company_symbol.to_uppercase()).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// The parsed verdict of a `decide` call.
#[derive(Debug, Clone, PartialEq)]
struct Verdict {
    should_change: bool,
    new_recommendation: Option<Recommendation>,
    timeframe: Timeframe,
    confidence: f64,
    reasoning: String,
    key_factors_for: Vec<String>,
    key_factors_against: Vec<String>,
}

pub struct DecisionAssessor {
    capability: Arc<dyn ReasoningCapability>,
    assessments: Arc<dyn AssessmentRepository>,
    positions: Arc<dyn PositionRepository>,
    history: Arc<HistoricalContextAggregator>,
    locks: Arc<CompanyLocks>,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl DecisionAssessor {
    pub fn new(
        capability: Arc<dyn ReasoningCapability>,
        assessments: Arc<dyn AssessmentRepository>,
        positions: Arc<dyn PositionRepository>,
        history: Arc<HistoricalContextAggregator>,
        retry: RetryPolicy,
        call_timeout: Duration,
    ) -> Self {
        Self {
            capability,
            assessments,
            positions,
            history,
            locks: Arc::new(CompanyLocks::new()),
            retry,
            call_timeout,
        }
    }

    /// Share a lock table with other assessors in the process.
    pub fn with_locks(mut self, locks: Arc<CompanyLocks>) -> Self {
        self.locks = locks;
        self
    }

    #[instrument(skip(self, investigation), fields(investigation_id = %investigation.id))]
    pub async fn assess(&self, investigation: &Investigation) -> DomainResult<DecisionAssessment> {
        let symbol = investigation
            .company_symbol
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_uppercase)
            .ok_or_else(|| {
                DomainError::ValidationFailed("cannot assess an investigation without a company symbol".to_string())
            })?;

        let _guard = self.locks.acquire(&symbol).await;
        let started = Instant::now();

        if let Some(existing) = self.assessments.get_by_investigation(investigation.id).await? {
            debug!(assessment_id = %existing.id, "investigation already assessed");
            return Ok(existing);
        }

        let position = self.positions.get(&symbol).await?;
        let before = position.as_ref().map(Position::state).unwrap_or_default();
        let history = self.history.gather(Some(&symbol), Some(investigation.id)).await?;

        let inconclusive_ids = history.inconclusive_ids();
        let ordinary = history
            .past_summaries()
            .into_iter()
            .filter(|s| !inconclusive_ids.contains(&s.investigation_id))
            .collect();

        let request = DecisionRequest {
            company_symbol: symbol.clone(),
            company_name: investigation.company_name.clone(),
            synthesis: investigation.synthesis.clone(),
            significance: investigation.significance,
            key_findings: investigation.key_findings.clone(),
            red_flags: investigation.red_flags.clone(),
            positive_signals: investigation.positive_signals.clone(),
            current_recommendation: before.recommendation,
            current_basis: before.basis.clone(),
            recommendation_date: before.date,
            past_investigations: ordinary,
            inconclusive_investigations: history.inconclusive_summaries(),
        };

        let output = self
            .retry
            .execute(self.call_timeout, || self.capability.decide(&request))
            .await?;
        let verdict = parse_verdict(&output)?;

        let proposed = verdict.new_recommendation.unwrap_or(before.recommendation);
        let changed = verdict.should_change && proposed != before.recommendation;

        let mut assessment = DecisionAssessment {
            id: Uuid::new_v4(),
            investigation_id: investigation.id,
            trigger_id: investigation.trigger_id,
            company_symbol: symbol.clone(),
            previous_recommendation: before.recommendation,
            previous_recommendation_date: before.date,
            previous_basis: before.basis.clone(),
            recommendation_changed: changed,
            new_recommendation: if changed { proposed } else { before.recommendation },
            timeframe: verdict.timeframe,
            confidence: verdict.confidence,
            reasoning: verdict.reasoning,
            key_factors_for: verdict.key_factors_for,
            key_factors_against: verdict.key_factors_against,
            past_investigations_used: history.past_ids(),
            past_inconclusive_resurrected: inconclusive_ids,
            position_before: before.clone(),
            position_after: before,
            model_used: self.capability.model(Stage::Decision),
            usage: output.usage,
            processing_ms: 0,
            created_at: Utc::now(),
        };

        let updated = match (position, changed) {
            (Some(mut p), true) => {
                p.apply_change(&assessment, truncate(&assessment.reasoning, BASIS_CHARS));
                Some(p)
            }
            (None, true) => {
                let mut p = Position::new(&symbol, investigation.company_name.clone());
                p.apply_change(&assessment, truncate(&assessment.reasoning, BASIS_CHARS));
                Some(p)
            }
            (None, false) => Some(Position::new(&symbol, investigation.company_name.clone())),
            (Some(_), false) => None,
        };
        if let Some(p) = updated.as_ref().filter(|_| changed) {
            assessment.position_after = p.state();
        }
        assessment.processing_ms = started.elapsed().as_millis() as u64;

        self.assessments.commit(&assessment, updated.as_ref()).await?;

        info!(
            assessment_id = %assessment.id,
            company_symbol = %symbol,
            previous = assessment.previous_recommendation.as_str(),
            recommendation = assessment.new_recommendation.as_str(),
            changed,
            confidence = assessment.confidence,
            resurrected = assessment.past_inconclusive_resurrected.len(),
            model = %assessment.model_used,
            input_tokens = assessment.usage.input_tokens,
            output_tokens = assessment.usage.output_tokens,
            latency_ms = assessment.processing_ms,
            "decision assessed"
        );
        Ok(assessment)
    }
}

fn malformed(detail: impl Into<String>) -> DomainError {
    DomainError::MalformedOutput { stage: Stage::Decision.as_str().to_string(), detail: detail.into() }
}

fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => Some(true),
            "false" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn parse_string_list(value: Option<&Value>) -> Vec<String> {
    let items = match value {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) => items,
            _ if !s.trim().is_empty() => vec![Value::String(s.clone())],
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        })
        .collect()
}

fn parse_verdict(output: &StructuredOutput) -> DomainResult<Verdict> {
    let should_change = match output.get("should_change") {
        Some(v) => parse_bool(v).ok_or_else(|| malformed(format!("should_change is not a boolean: {v}")))?,
        None => return Err(malformed("missing should_change")),
    };

    let new_recommendation = match output.get("new_recommendation") {
        Some(Value::String(s)) => Recommendation::from_str(s),
        _ => None,
    };
    if should_change && new_recommendation.is_none() {
        return Err(malformed("should_change is true but new_recommendation is missing or invalid"));
    }

    let timeframe = output
        .get("timeframe")
        .and_then(Value::as_str)
        .and_then(Timeframe::from_str)
        .unwrap_or_default();

    let confidence = match output.get("confidence") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    }
    .filter(|c| c.is_finite())
    .map(|c| if c > 1.0 && c <= 100.0 { c / 100.0 } else { c })
    .unwrap_or(0.0)
    .clamp(0.0, 1.0);

    let reasoning = output.get("reasoning").and_then(Value::as_str).unwrap_or_default().trim().to_string();

    Ok(Verdict {
        should_change,
        new_recommendation,
        timeframe,
        confidence,
        reasoning,
        key_factors_for: parse_string_list(output.get("key_factors_for")),
        key_factors_against: parse_string_list(output.get("key_factors_against")),
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::capabilities::ScriptedCapability;
    use crate::adapters::sqlite::assessment_repository::tests::{fixture, investigation, Fixture};
    use crate::adapters::sqlite::{SqliteAssessmentRepository, SqliteInvestigationRepository, SqlitePositionRepository};
    use crate::domain::models::SignificanceLevel;
    use serde_json::json;

    fn assessor(f: &Fixture, cap: Arc<ScriptedCapability>) -> DecisionAssessor {
        let investigations = Arc::new(SqliteInvestigationRepository::new(f.pool.clone()));
        DecisionAssessor::new(
            cap,
            Arc::new(SqliteAssessmentRepository::new(f.pool.clone())),
            Arc::new(SqlitePositionRepository::new(f.pool.clone())),
            Arc::new(HistoricalContextAggregator::new(investigations, 10)),
            RetryPolicy::none(),
            Duration::from_secs(5),
        )
    }

    fn decision(should_change: bool, rec: Recommendation) -> Result<StructuredOutput, crate::domain::ports::CapabilityError> {
        Ok(ScriptedCapability::decision_output(should_change, rec, 0.7))
    }

    #[tokio::test]
    async fn test_first_assessment_creates_position() {
        let f = fixture().await;
        let inv = investigation(&f, SignificanceLevel::High, true).await;
        let a = assessor(&f, Arc::new(ScriptedCapability::new())).assess(&inv).await.unwrap();

        assert!(a.recommendation_changed);
        assert_eq!(a.previous_recommendation, Recommendation::None);
        assert_eq!(a.new_recommendation, Recommendation::Buy);
        assert_eq!(a.position_after.recommendation, Recommendation::Buy);
        assert_eq!(a.position_after.assessment_id, Some(a.id));

        let p = f.positions.get("ACME").await.unwrap().unwrap();
        assert_eq!(p.current_recommendation, Recommendation::Buy);
        assert!(p.history.is_empty());
        assert_eq!(p.version, 1);
    }

    #[tokio::test]
    async fn test_token_usage_is_stored_with_assessment() {
        let f = fixture().await;
        let inv = investigation(&f, SignificanceLevel::High, true).await;
        let usage = crate::domain::models::TokenUsage::new(3_100, 420);
        let a = assessor(&f, Arc::new(ScriptedCapability::new().with_usage(usage))).assess(&inv).await.unwrap();

        assert_eq!(a.usage, usage);
        assert_eq!(a.model_used, "scripted-decision");
        assert_eq!(f.assessments.get(a.id).await.unwrap().unwrap().usage, usage);
    }

    #[tokio::test]
    async fn test_unchanged_first_assessment_creates_none_position() {
        let f = fixture().await;
        let inv = investigation(&f, SignificanceLevel::Medium, true).await;
        let cap = Arc::new(ScriptedCapability::new().with_response(Stage::Decision, decision(false, Recommendation::Hold)));
        let a = assessor(&f, cap).assess(&inv).await.unwrap();

        assert!(!a.recommendation_changed);
        assert_eq!(a.new_recommendation, Recommendation::None);
        let p = f.positions.get("ACME").await.unwrap().unwrap();
        assert_eq!(p.current_recommendation, Recommendation::None);
        assert_eq!(p.recommendation_assessment_id, None);
    }

    #[tokio::test]
    async fn test_same_recommendation_is_not_a_change() {
        let f = fixture().await;
        let cap = Arc::new(
            ScriptedCapability::new()
                .with_response(Stage::Decision, decision(true, Recommendation::Buy))
                .with_response(Stage::Decision, decision(true, Recommendation::Buy)),
        );
        let assessor = assessor(&f, cap);

        let i1 = investigation(&f, SignificanceLevel::High, true).await;
        assessor.assess(&i1).await.unwrap();
        let i2 = investigation(&f, SignificanceLevel::High, true).await;
        let a2 = assessor.assess(&i2).await.unwrap();

        assert!(!a2.recommendation_changed);
        assert_eq!(a2.new_recommendation, Recommendation::Buy);
        let p = f.positions.get("ACME").await.unwrap().unwrap();
        assert_eq!(p.version, 1);
        assert!(p.history.is_empty());
    }

    #[tokio::test]
    async fn test_history_lists_every_change_in_order() {
        let f = fixture().await;
        let cap = Arc::new(
            ScriptedCapability::new()
                .with_response(Stage::Decision, decision(true, Recommendation::Buy))
                .with_response(Stage::Decision, decision(false, Recommendation::Buy))
                .with_response(Stage::Decision, decision(true, Recommendation::Hold))
                .with_response(Stage::Decision, decision(true, Recommendation::Sell)),
        );
        let assessor = assessor(&f, cap);

        let mut changed = Vec::new();
        for _ in 0..4 {
            let inv = investigation(&f, SignificanceLevel::High, true).await;
            let a = assessor.assess(&inv).await.unwrap();
            if a.recommendation_changed {
                changed.push((a.id, a.new_recommendation));
            }
        }

        let p = f.positions.get("ACME").await.unwrap().unwrap();
        assert_eq!(p.timeline(), changed);
        assert_eq!(p.history.len(), 2);
        assert_eq!(p.current_recommendation, Recommendation::Sell);
    }

    #[tokio::test]
    async fn test_inconclusive_findings_resurrected() {
        let f = fixture().await;
        let cap = Arc::new(
            ScriptedCapability::new()
                .with_response(Stage::Decision, decision(false, Recommendation::None))
                .with_response(Stage::Decision, decision(false, Recommendation::None)),
        );
        let assessor = assessor(&f, cap.clone());

        let i1 = investigation(&f, SignificanceLevel::High, true).await;
        assessor.assess(&i1).await.unwrap();
        let i2 = investigation(&f, SignificanceLevel::Medium, true).await;
        assessor.assess(&i2).await.unwrap();
        let i3 = investigation(&f, SignificanceLevel::High, true).await;
        let a3 = assessor.assess(&i3).await.unwrap();

        assert_eq!(a3.past_inconclusive_resurrected, vec![i2.id, i1.id]);
        assert!(a3.recommendation_changed);
        let request = cap.decision_requests().await.pop().unwrap();
        assert_eq!(request.inconclusive_investigations.len(), 2);
        assert!(request.past_investigations.is_empty());
    }

    #[tokio::test]
    async fn test_missing_core_field_is_hard_error() {
        let f = fixture().await;
        let inv = investigation(&f, SignificanceLevel::High, true).await;
        let cap = Arc::new(
            ScriptedCapability::new().with_response(Stage::Decision, Ok(json!({"should_change": true}).into())),
        );
        let err = assessor(&f, cap).assess(&inv).await.unwrap_err();
        assert!(matches!(err, DomainError::MalformedOutput { .. }));
        assert!(f.assessments.get_by_investigation(inv.id).await.unwrap().is_none());
        assert!(f.positions.get("ACME").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reassessing_returns_existing() {
        let f = fixture().await;
        let inv = investigation(&f, SignificanceLevel::High, true).await;
        let cap = Arc::new(ScriptedCapability::new());
        let assessor = assessor(&f, cap.clone());
        let first = assessor.assess(&inv).await.unwrap();
        let second = assessor.assess(&inv).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(cap.calls(Stage::Decision).await, 1);
    }

    #[test]
    fn test_parse_verdict_defaults_and_clamping() {
        let v = parse_verdict(&json!({"should_change": "false", "confidence": 3.5}).into()).unwrap();
        assert!(!v.should_change);
        assert_eq!(v.timeframe, Timeframe::MediumTerm);
        assert_eq!(v.confidence, 1.0);
        assert!(v.key_factors_for.is_empty());

        let v = parse_verdict(&json!({
            "should_change": true,
            "new_recommendation": "SELL",
            "timeframe": "short-term",
            "confidence": "80%",
            "key_factors_against": "[\"debt\"]"
        })
        .into())
        .unwrap();
        assert_eq!(v.new_recommendation, Some(Recommendation::Sell));
        assert_eq!(v.timeframe, Timeframe::ShortTerm);
        assert!((v.confidence - 0.8).abs() < f64::EPSILON);
        assert_eq!(v.key_factors_against, vec!["debt".to_string()]);

        assert!(parse_verdict(&json!({"new_recommendation": "buy"}).into()).is_err());
        assert!(parse_verdict(&json!({"should_change": 1}).into()).is_err());
        let v = parse_verdict(&json!({"should_change": true, "new_recommendation": "buy", "confidence": -2}).into())
            .unwrap();
        assert_eq!(v.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_company_locks_serialize_same_symbol() {
        let locks = Arc::new(CompanyLocks::new());
        let guard = locks.acquire("acme").await;

        let other = tokio::time::timeout(Duration::from_millis(50), locks.acquire("OTHER")).await;
        assert!(other.is_ok());

        let same = tokio::time::timeout(Duration::from_millis(50), locks.acquire("ACME")).await;
        assert!(same.is_err());

        drop(guard);
        assert!(tokio::time::timeout(Duration::from_millis(50), locks.acquire("ACME")).await.is_ok());
    }
}
