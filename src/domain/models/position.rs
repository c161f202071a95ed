//! Position domain model: the standing recommendation for one company.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::decision::{DecisionAssessment, PositionState, Recommendation, Timeframe};

/// A superseded recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRecord {
    pub recommendation: Recommendation,
    pub date: DateTime<Utc>,
    pub assessment_id: Uuid,
    pub basis: String,
}

/// The standing recommendation for one company.
///
/// `history` followed by the current recommendation lists every
/// recommendation the company has had, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub company_symbol: String,
    pub company_name: Option<String>,
    pub current_recommendation: Recommendation,
    pub recommendation_date: Option<DateTime<Utc>>,
    pub recommendation_basis: String,
    pub recommendation_assessment_id: Option<Uuid>,
    pub recommendation_timeframe: Option<Timeframe>,
    pub recommendation_confidence: Option<f64>,
    pub history: Vec<RecommendationRecord>,
    /// Optimistic lock counter; bumped on every write
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    pub fn new(company_symbol: impl Into<String>, company_name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            company_symbol: company_symbol.into(),
            company_name,
            current_recommendation: Recommendation::None,
            recommendation_date: None,
            recommendation_basis: String::new(),
            recommendation_assessment_id: None,
            recommendation_timeframe: None,
            recommendation_confidence: None,
            history: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn state(&self) -> PositionState {
        PositionState {
            recommendation: self.current_recommendation,
            date: self.recommendation_date,
            basis: self.recommendation_basis.clone(),
            assessment_id: self.recommendation_assessment_id,
        }
    }

    /// Replace the current recommendation with the assessment's, moving the
    /// old one into history first.
    ///
    /// The placeholder `none` of a fresh position was never set by an
    /// assessment and is not recorded.
    pub fn apply_change(&mut self, assessment: &DecisionAssessment, basis: String) {
        if let (Some(assessment_id), Some(date)) =
            (self.recommendation_assessment_id, self.recommendation_date)
        {
            self.history.push(RecommendationRecord {
                recommendation: self.current_recommendation,
                date,
                assessment_id,
                basis: std::mem::take(&mut self.recommendation_basis),
            });
        }

        self.current_recommendation = assessment.new_recommendation;
        self.recommendation_date = Some(assessment.created_at);
        self.recommendation_basis = basis;
        self.recommendation_assessment_id = Some(assessment.id);
        self.recommendation_timeframe = Some(assessment.timeframe);
        self.recommendation_confidence = Some(assessment.confidence);
        self.updated_at = Utc::now();
    }

    /// Every assessment that set a recommendation, oldest first.
    pub fn timeline(&self) -> Vec<(Uuid, Recommendation)> {
        let mut timeline: Vec<_> =
            self.history.iter().map(|r| (r.assessment_id, r.recommendation)).collect();
        if let Some(id) = self.recommendation_assessment_id {
            timeline.push((id, self.current_recommendation));
        }
        timeline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assessment(rec: Recommendation) -> DecisionAssessment {
        DecisionAssessment {
            id: Uuid::new_v4(),
            investigation_id: Uuid::new_v4(),
            trigger_id: Uuid::new_v4(),
            company_symbol: "ACME".into(),
            previous_recommendation: Recommendation::None,
            previous_recommendation_date: None,
            previous_basis: String::new(),
            recommendation_changed: true,
            new_recommendation: rec,
            timeframe: Timeframe::LongTerm,
            confidence: 0.7,
            reasoning: "r".into(),
            key_factors_for: vec![],
            key_factors_against: vec![],
            past_investigations_used: vec![],
            past_inconclusive_resurrected: vec![],
            position_before: PositionState::default(),
            position_after: PositionState::default(),
            model_used: "m".into(),
            usage: Default::default(),
            processing_ms: 0,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_first_change_does_not_snapshot_placeholder() {
        let mut p = Position::new("ACME", None);
        let a = assessment(Recommendation::Buy);
        p.apply_change(&a, "strong quarter".into());

        assert!(p.history.is_empty());
        assert_eq!(p.current_recommendation, Recommendation::Buy);
        assert_eq!(p.recommendation_assessment_id, Some(a.id));
        assert_eq!(p.recommendation_timeframe, Some(Timeframe::LongTerm));
        assert_eq!(p.timeline(), vec![(a.id, Recommendation::Buy)]);
    }

    #[test]
    fn test_second_change_snapshots_previous() {
        let mut p = Position::new("ACME", None);
        let a1 = assessment(Recommendation::Buy);
        let a2 = assessment(Recommendation::Sell);
        p.apply_change(&a1, "first".into());
        p.apply_change(&a2, "second".into());

        assert_eq!(p.history.len(), 1);
        assert_eq!(p.history[0].recommendation, Recommendation::Buy);
        assert_eq!(p.history[0].assessment_id, a1.id);
        assert_eq!(p.history[0].basis, "first");
        assert_eq!(p.recommendation_basis, "second");
        assert_eq!(
            p.timeline(),
            vec![(a1.id, Recommendation::Buy), (a2.id, Recommendation::Sell)]
        );
    }

    #[test]
    fn test_fresh_position_state() {
        let p = Position::new("ACME", Some("Acme Corp".into()));
        let s = p.state();
        assert_eq!(s.recommendation, Recommendation::None);
        assert!(s.date.is_none());
        assert!(p.timeline().is_empty());
    }
}
