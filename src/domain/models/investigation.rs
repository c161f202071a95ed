//! Investigation domain model.
//!
//! An investigation is the structured deep analysis of one trigger. It is
//! written once and read back by later triggers for the same company.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::usage::TokenUsage;

/// How much an announcement matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignificanceLevel {
    Noise = 0,
    Low = 1,
    Medium = 2,
    High = 3,
}

impl Default for SignificanceLevel {
    fn default() -> Self {
        Self::Noise
    }
}

impl SignificanceLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Noise => "noise",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            "noise" => Some(Self::Noise),
            _ => None,
        }
    }

    /// Numeric rank stored alongside the label so range queries stay indexed.
    pub fn rank(&self) -> i64 {
        *self as i64
    }

    /// `high` or `medium`.
    pub fn is_material(&self) -> bool {
        *self >= Self::Medium
    }
}

/// A financial figure pulled out of the document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMetric {
    pub name: String,
    pub value: Option<f64>,
    #[serde(default)]
    pub raw_value: String,
    pub unit: Option<String>,
    pub period: Option<String>,
    pub yoy_change: Option<f64>,
    pub qoq_change: Option<f64>,
    pub confidence: Option<f64>,
}

/// Guidance or another forward-looking claim made by the company.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForwardStatement {
    pub statement: String,
    pub target_metric: Option<String>,
    pub target_value: Option<String>,
    pub target_date: Option<String>,
    pub category: Option<String>,
}

/// One web search result kept as enrichment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebSearchHit {
    pub query: String,
    pub source: String,
    pub title: String,
    pub summary: String,
    pub relevance: Option<String>,
    pub sentiment: Option<String>,
}

/// Point-in-time market data for the company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDataSnapshot {
    pub symbol: String,
    pub price: Option<f64>,
    pub market_cap: Option<f64>,
    pub pe_ratio: Option<f64>,
    pub week_52_high: Option<f64>,
    pub week_52_low: Option<f64>,
    pub price_change_1m: Option<f64>,
    pub as_of: DateTime<Utc>,
}

/// A chunk of prior material returned by semantic search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarMaterial {
    pub source_id: String,
    pub text: String,
    pub score: f64,
}

/// What the historical context looked like when the investigation was built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoricalSnapshot {
    pub past_investigation_ids: Vec<Uuid>,
    pub inconclusive_ids: Vec<Uuid>,
    pub similar_material: Vec<SimilarMaterial>,
}

/// A field of capability output that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseIssue {
    pub field: String,
    pub detail: String,
}

impl ParseIssue {
    pub fn new(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self { field: field.into(), detail: detail.into() }
    }
}

/// Compact view of a past investigation used as history in prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationSummary {
    pub investigation_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub significance: SignificanceLevel,
    pub is_significant: bool,
    pub synthesis: String,
    pub key_findings: Vec<String>,
}

/// A persisted investigation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Investigation {
    pub id: Uuid,
    pub trigger_id: Uuid,
    pub company_symbol: Option<String>,
    pub company_name: Option<String>,

    pub extracted_metrics: Vec<ExtractedMetric>,
    pub forward_statements: Vec<ForwardStatement>,
    pub management_highlights: Vec<String>,
    pub key_findings: Vec<String>,
    pub red_flags: Vec<String>,
    pub positive_signals: Vec<String>,

    pub synthesis: String,
    pub significance: SignificanceLevel,
    pub significance_reasoning: String,
    pub is_significant: bool,

    pub market_data: Option<MarketDataSnapshot>,
    pub web_search_results: Vec<WebSearchHit>,
    pub historical_context: HistoricalSnapshot,

    pub enrichment_gaps: Vec<String>,
    pub parse_issues: Vec<ParseIssue>,

    pub model_used: String,
    #[serde(default)]
    pub usage: TokenUsage,
    pub processing_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl Investigation {
    /// Empty investigation for a trigger; the builder fills it in.
    pub fn new(trigger_id: Uuid, company_symbol: Option<String>, company_name: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            trigger_id,
            company_symbol,
            company_name,
            extracted_metrics: Vec::new(),
            forward_statements: Vec::new(),
            management_highlights: Vec::new(),
            key_findings: Vec::new(),
            red_flags: Vec::new(),
            positive_signals: Vec::new(),
            synthesis: String::new(),
            significance: SignificanceLevel::Noise,
            significance_reasoning: String::new(),
            is_significant: false,
            market_data: None,
            web_search_results: Vec::new(),
            historical_context: HistoricalSnapshot::default(),
            enrichment_gaps: Vec::new(),
            parse_issues: Vec::new(),
            model_used: String::new(),
            usage: TokenUsage::default(),
            processing_ms: 0,
            created_at: Utc::now(),
        }
    }

    /// Summary with the synthesis cut to `max_chars` characters.
    pub fn summary(&self, max_chars: usize) -> InvestigationSummary {
        InvestigationSummary {
            investigation_id: self.id,
            created_at: self.created_at,
            significance: self.significance,
            is_significant: self.is_significant,
            synthesis: self.synthesis.chars().take(max_chars).collect(),
            key_findings: self.key_findings.clone(),
        }
    }

    /// Whether a field was lost to a parse failure.
    pub fn has_parse_issue(&self, field: &str) -> bool {
        self.parse_issues.iter().any(|i| i.field == field)
    }
}
