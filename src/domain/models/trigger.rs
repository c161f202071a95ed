//! Trigger domain model.
//!
//! A trigger is one external announcement event (an exchange filing pulled
//! from a feed, or a human-submitted note) moving through the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Status of a trigger in the processing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStatus {
    /// Ingested, waiting for the watchlist filter and gate classifier
    Pending,
    /// Rejected by the watchlist filter or the gate classifier
    FilteredOut,
    /// Cleared both gates (or bypassed them), waiting for analysis
    GatePassed,
    /// Investigation is being built
    Analyzing,
    /// Investigation persisted
    Analyzed,
    /// Decision assessment in progress
    Assessing,
    /// Decision assessment persisted
    Assessed,
    /// Report generated and delivery attempted
    Reported,
    /// A stage failed; the reason is in the status history
    Error,
}

impl Default for TriggerStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TriggerStatus {
    pub const ALL: [Self; 9] = [
        Self::Pending,
        Self::FilteredOut,
        Self::GatePassed,
        Self::Analyzing,
        Self::Analyzed,
        Self::Assessing,
        Self::Assessed,
        Self::Reported,
        Self::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::FilteredOut => "filtered_out",
            Self::GatePassed => "gate_passed",
            Self::Analyzing => "analyzing",
            Self::Analyzed => "analyzed",
            Self::Assessing => "assessing",
            Self::Assessed => "assessed",
            Self::Reported => "reported",
            Self::Error => "error",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "filtered_out" => Some(Self::FilteredOut),
            "gate_passed" => Some(Self::GatePassed),
            "analyzing" => Some(Self::Analyzing),
            "analyzed" => Some(Self::Analyzed),
            "assessing" => Some(Self::Assessing),
            "assessed" => Some(Self::Assessed),
            "reported" => Some(Self::Reported),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Check if this is a terminal state.
    ///
    /// `Analyzed` is terminal only for non-significant investigations, so it
    /// is not listed here.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FilteredOut | Self::Reported | Self::Error)
    }

    /// Valid transitions from this status.
    ///
    /// `Error` has no outgoing edge: errored triggers stay put until an
    /// operator acts on them.
    pub fn valid_transitions(&self) -> Vec<TriggerStatus> {
        match self {
            Self::Pending => vec![Self::FilteredOut, Self::GatePassed, Self::Error],
            Self::GatePassed => vec![Self::Analyzing, Self::Error],
            Self::Analyzing => vec![Self::Analyzed, Self::Error],
            Self::Analyzed => vec![Self::Assessing, Self::Error],
            Self::Assessing => vec![Self::Assessed, Self::Error],
            Self::Assessed => vec![Self::Reported, Self::Error],
            Self::FilteredOut | Self::Reported | Self::Error => vec![],
        }
    }

    pub fn can_transition_to(&self, new_status: Self) -> bool {
        self.valid_transitions().contains(&new_status)
    }

    /// Whether the orchestrator has work to do for a trigger in this state.
    pub fn is_actionable(&self) -> bool {
        matches!(self, Self::Pending | Self::GatePassed)
    }
}

impl std::fmt::Display for TriggerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a trigger came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOrigin {
    /// Pulled from an exchange or news feed
    AutomatedFeed,
    /// Submitted by an analyst; bypasses dedup and both gates
    Human,
}

impl TriggerOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AutomatedFeed => "automated_feed",
            Self::Human => "human",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "automated_feed" | "automated" | "feed" => Some(Self::AutomatedFeed),
            "human" => Some(Self::Human),
            _ => None,
        }
    }
}

/// Scheduling priority; human triggers jump the backlog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPriority {
    Normal = 1,
    High = 2,
}

impl Default for TriggerPriority {
    fn default() -> Self {
        Self::Normal
    }
}

impl TriggerPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::High => "high",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

/// One entry of the append-only status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub status: TriggerStatus,
    pub at: DateTime<Utc>,
    pub reason: String,
}

/// How a gate decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateMethod {
    /// The classifier answered
    LlmClassification,
    /// The classifier failed and the trigger was let through
    ErrorFallthrough,
    /// The classifier failed and fail-closed mode rejected the trigger
    ErrorFailClosed,
    /// Human triggers skip classification
    HumanBypass,
}

impl GateMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LlmClassification => "llm_classification",
            Self::ErrorFallthrough => "error_fallthrough",
            Self::ErrorFailClosed => "error_fail_closed",
            Self::HumanBypass => "human_bypass",
        }
    }
}

/// Outcome of the worth-investigating gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateDecision {
    pub passed: bool,
    pub reason: String,
    pub method: GateMethod,
    pub model: Option<String>,
}

impl GateDecision {
    pub fn human_bypass() -> Self {
        Self {
            passed: true,
            reason: "Human trigger bypasses gate".to_string(),
            method: GateMethod::HumanBypass,
            model: None,
        }
    }
}

/// Raw input to the ingest gate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerCandidate {
    pub origin: Option<TriggerOrigin>,
    pub source_url: Option<String>,
    pub source_feed_title: Option<String>,
    pub raw_content: String,
    pub company_symbol: Option<String>,
    pub company_name: Option<String>,
    pub sector: Option<String>,
    pub triggered_by: Option<String>,
    pub human_notes: Option<String>,
}

impl TriggerCandidate {
    /// A feed candidate with the given content.
    pub fn automated(raw_content: impl Into<String>) -> Self {
        Self {
            origin: Some(TriggerOrigin::AutomatedFeed),
            raw_content: raw_content.into(),
            ..Default::default()
        }
    }

    /// A human-submitted candidate.
    pub fn human(raw_content: impl Into<String>, triggered_by: impl Into<String>) -> Self {
        Self {
            origin: Some(TriggerOrigin::Human),
            raw_content: raw_content.into(),
            triggered_by: Some(triggered_by.into()),
            ..Default::default()
        }
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn with_feed_title(mut self, title: impl Into<String>) -> Self {
        self.source_feed_title = Some(title.into());
        self
    }

    pub fn with_company(mut self, symbol: impl Into<String>, name: impl Into<String>) -> Self {
        self.company_symbol = Some(symbol.into());
        self.company_name = Some(name.into());
        self
    }

    pub fn with_sector(mut self, sector: impl Into<String>) -> Self {
        self.sector = Some(sector.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.human_notes = Some(notes.into());
        self
    }

    pub fn origin(&self) -> TriggerOrigin {
        self.origin.unwrap_or(TriggerOrigin::AutomatedFeed)
    }

    /// Dedup key for feed candidates: the source URL, else a content hash.
    /// Human candidates never carry one.
    pub fn dedup_key(&self) -> Option<String> {
        if self.origin() == TriggerOrigin::Human {
            return None;
        }
        if let Some(url) = self.source_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            return Some(url.to_string());
        }
        let digest = Sha256::digest(self.raw_content.trim().as_bytes());
        Some(format!("sha256:{}", hex::encode(digest)))
    }
}

/// A persisted trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    pub id: Uuid,
    pub dedup_key: Option<String>,
    pub origin: TriggerOrigin,
    pub source_url: Option<String>,
    pub source_feed_title: Option<String>,
    pub raw_content: String,
    pub company_symbol: Option<String>,
    pub company_name: Option<String>,
    pub sector: Option<String>,
    pub priority: TriggerPriority,
    pub triggered_by: Option<String>,
    pub human_notes: Option<String>,
    pub status: TriggerStatus,
    pub status_history: Vec<StatusTransition>,
    pub gate_result: Option<GateDecision>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trigger {
    /// Build the initial record for a candidate.
    ///
    /// Human triggers start at `GatePassed` with high priority; everything
    /// else starts at `Pending`.
    pub fn from_candidate(candidate: TriggerCandidate) -> Self {
        let now = Utc::now();
        let origin = candidate.origin();
        let dedup_key = candidate.dedup_key();
        let (status, reason, priority, gate_result) = match origin {
            TriggerOrigin::Human => (
                TriggerStatus::GatePassed,
                "Human trigger bypasses gate",
                TriggerPriority::High,
                Some(GateDecision::human_bypass()),
            ),
            TriggerOrigin::AutomatedFeed => {
                (TriggerStatus::Pending, "Trigger ingested", TriggerPriority::Normal, None)
            }
        };

        Self {
            id: Uuid::new_v4(),
            dedup_key,
            origin,
            source_url: candidate.source_url,
            source_feed_title: candidate.source_feed_title,
            raw_content: candidate.raw_content,
            company_symbol: non_blank(candidate.company_symbol).map(|s| s.to_uppercase()),
            company_name: non_blank(candidate.company_name),
            sector: non_blank(candidate.sector),
            priority,
            triggered_by: candidate.triggered_by,
            human_notes: candidate.human_notes,
            status,
            status_history: vec![StatusTransition { status, at: now, reason: reason.to_string() }],
            gate_result,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_human(&self) -> bool {
        self.origin == TriggerOrigin::Human
    }

    /// Content plus feed title, as scanned by keyword matching.
    pub fn searchable_text(&self) -> String {
        match &self.source_feed_title {
            Some(title) => format!("{} {}", self.raw_content, title),
            None => self.raw_content.clone(),
        }
    }

    /// Short label used in prompts and report titles.
    pub fn display_title(&self) -> String {
        if let Some(title) = self.source_feed_title.as_deref().filter(|t| !t.trim().is_empty()) {
            return title.trim().to_string();
        }
        let first_line = self.raw_content.lines().next().unwrap_or_default().trim();
        first_line.chars().take(120).collect()
    }

    /// Reason attached to the most recent status change.
    pub fn last_reason(&self) -> Option<&str> {
        self.status_history.last().map(|t| t.reason.as_str())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
