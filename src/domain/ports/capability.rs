//! Reasoning capability port - the interface to the LLM backend.
//!
//! Each pipeline stage issues one typed request and gets back the provider's
//! JSON object untouched. Parsing lives with the stage so that a single bad
//! field never costs the whole response.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::models::{
    InvestigationSummary, MarketDataSnapshot, Recommendation, SignificanceLevel, SimilarMaterial,
    Timeframe, TokenUsage, WebSearchHit,
};

/// Pipeline stage a capability call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Gate,
    Analysis,
    Decision,
    Report,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gate => "gate",
            Self::Analysis => "analysis",
            Self::Decision => "decision",
            Self::Report => "report",
        }
    }
}

/// Errors raised by capability adapters.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CapabilityError {
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Capability not configured: {0}")]
    NotConfigured(String),

    #[error("Gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<CapabilityError> },
}

impl CapabilityError {
    /// Whether a retry has a chance of succeeding.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::RateLimited(_) | Self::Server { .. } | Self::Network(_)
        )
    }

    /// Map an HTTP status code and body to an error.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => Self::RateLimited(message),
            500..=599 => Self::Server { status, message },
            _ => Self::Rejected { status, message },
        }
    }
}

/// A JSON object returned by the provider, plus the tokens it cost.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructuredOutput {
    pub fields: Map<String, Value>,
    #[serde(skip)]
    pub usage: TokenUsage,
}

impl StructuredOutput {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields, usage: TokenUsage::default() }
    }

    #[must_use]
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }

    /// Extract the first JSON object from free text (models sometimes wrap
    /// their answer in prose or a fenced block).
    pub fn from_text(text: &str) -> Result<Self, CapabilityError> {
        let start = text.find('{');
        let end = text.rfind('}');
        let (Some(start), Some(end)) = (start, end) else {
            return Err(CapabilityError::Malformed("no JSON object in response".to_string()));
        };
        if end < start {
            return Err(CapabilityError::Malformed("no JSON object in response".to_string()));
        }
        match serde_json::from_str::<Value>(&text[start..=end]) {
            Ok(Value::Object(fields)) => Ok(Self::new(fields)),
            Ok(_) => Err(CapabilityError::Malformed("response is not a JSON object".to_string())),
            Err(e) => Err(CapabilityError::Malformed(e.to_string())),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|v| !v.is_null())
    }
}

impl From<Value> for StructuredOutput {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self::new(fields),
            _ => Self::default(),
        }
    }
}

/// Cheap "is this worth investigating?" request.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifyRequest {
    pub company_symbol: Option<String>,
    pub company_name: Option<String>,
    pub title: String,
    pub content: String,
}

/// Deep analysis request for one trigger.
#[derive(Debug, Clone, Serialize)]
pub struct SynthesisRequest {
    pub company_symbol: Option<String>,
    pub company_name: Option<String>,
    pub sector: Option<String>,
    pub title: String,
    pub document_text: String,
    pub human_notes: Option<String>,
    pub market_data: Option<MarketDataSnapshot>,
    pub web_results: Vec<WebSearchHit>,
    pub past_investigations: Vec<InvestigationSummary>,
    pub similar_material: Vec<SimilarMaterial>,
}

/// Should the standing recommendation change?
#[derive(Debug, Clone, Serialize)]
pub struct DecisionRequest {
    pub company_symbol: String,
    pub company_name: Option<String>,
    pub synthesis: String,
    pub significance: SignificanceLevel,
    pub key_findings: Vec<String>,
    pub red_flags: Vec<String>,
    pub positive_signals: Vec<String>,
    pub current_recommendation: Recommendation,
    pub current_basis: String,
    pub recommendation_date: Option<DateTime<Utc>>,
    pub past_investigations: Vec<InvestigationSummary>,
    /// Significant findings that never moved the recommendation
    pub inconclusive_investigations: Vec<InvestigationSummary>,
}

/// Human-readable report request.
#[derive(Debug, Clone, Serialize)]
pub struct ReportRequest {
    pub company_symbol: String,
    pub company_name: Option<String>,
    pub title: String,
    pub synthesis: String,
    pub key_findings: Vec<String>,
    pub red_flags: Vec<String>,
    pub positive_signals: Vec<String>,
    pub previous_recommendation: Recommendation,
    pub new_recommendation: Recommendation,
    pub recommendation_changed: bool,
    pub timeframe: Timeframe,
    pub confidence: f64,
    pub reasoning: String,
}

/// Trait for reasoning backends.
#[async_trait]
pub trait ReasoningCapability: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Model used for a stage, recorded on the stage's output.
    fn model(&self, stage: Stage) -> String;

    /// Expected fields: `is_worth_investigating` (bool), `reason`.
    async fn classify(&self, request: &ClassifyRequest) -> Result<StructuredOutput, CapabilityError>;

    /// Expected fields: see `InvestigationBuilder`.
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<StructuredOutput, CapabilityError>;

    /// Expected fields: `should_change`, `new_recommendation`, `timeframe`,
    /// `confidence`, `reasoning`, `key_factors_for`, `key_factors_against`.
    async fn decide(&self, request: &DecisionRequest) -> Result<StructuredOutput, CapabilityError>;

    /// Expected fields: `title`, `executive_summary`, `report_body`,
    /// `recommendation_summary`.
    async fn write_report(&self, request: &ReportRequest) -> Result<StructuredOutput, CapabilityError>;
}
