//! Decision assessment domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::usage::TokenUsage;

/// A standing recommendation for a company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Buy,
    Sell,
    Hold,
    None,
}

impl Default for Recommendation {
    fn default() -> Self {
        Self::None
    }
}

impl Recommendation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::Hold => "hold",
            Self::None => "none",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "buy" => Some(Self::Buy),
            "sell" => Some(Self::Sell),
            "hold" => Some(Self::Hold),
            "none" => Some(Self::None),
            _ => None,
        }
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Horizon the recommendation is meant for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timeframe {
    ShortTerm,
    MediumTerm,
    LongTerm,
}

impl Default for Timeframe {
    fn default() -> Self {
        Self::MediumTerm
    }
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ShortTerm => "short_term",
            Self::MediumTerm => "medium_term",
            Self::LongTerm => "long_term",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "short_term" | "short" => Some(Self::ShortTerm),
            "medium_term" | "medium" => Some(Self::MediumTerm),
            "long_term" | "long" => Some(Self::LongTerm),
            _ => None,
        }
    }
}

/// Recommendation fields of a position at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionState {
    pub recommendation: Recommendation,
    pub date: Option<DateTime<Utc>>,
    pub basis: String,
    pub assessment_id: Option<Uuid>,
}

/// A persisted decision assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionAssessment {
    pub id: Uuid,
    pub investigation_id: Uuid,
    pub trigger_id: Uuid,
    pub company_symbol: String,

    pub previous_recommendation: Recommendation,
    pub previous_recommendation_date: Option<DateTime<Utc>>,
    pub previous_basis: String,

    pub recommendation_changed: bool,
    pub new_recommendation: Recommendation,
    pub timeframe: Timeframe,
    pub confidence: f64,
    pub reasoning: String,
    pub key_factors_for: Vec<String>,
    pub key_factors_against: Vec<String>,

    pub past_investigations_used: Vec<Uuid>,
    pub past_inconclusive_resurrected: Vec<Uuid>,

    pub position_before: PositionState,
    pub position_after: PositionState,

    pub model_used: String,
    #[serde(default)]
    pub usage: TokenUsage,
    pub processing_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl DecisionAssessment {
    /// "BUY (Confidence: 80%, Timeframe: medium_term)".
    pub fn recommendation_summary(&self) -> String {
        format!(
            "{} (Confidence: {:.0}%, Timeframe: {})",
            self.new_recommendation.as_str().to_uppercase(),
            self.confidence * 100.0,
            self.timeframe.as_str()
        )
    }
}
