//! Report domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::usage::TokenUsage;

/// Where a report is in its delivery lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Generated,
    Delivered,
    DeliveryFailed,
}

impl Default for DeliveryStatus {
    fn default() -> Self {
        Self::Generated
    }
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::Delivered => "delivered",
            Self::DeliveryFailed => "delivery_failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "generated" => Some(Self::Generated),
            "delivered" => Some(Self::Delivered),
            "delivery_failed" => Some(Self::DeliveryFailed),
            _ => None,
        }
    }
}

/// Result of pushing a report through one channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub channel: String,
    pub succeeded: bool,
    pub error: Option<String>,
    pub at: DateTime<Utc>,
}

/// Thumbs up or down from a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackRating {
    Up,
    Down,
}

impl FeedbackRating {
    pub fn value(&self) -> i64 {
        match self {
            Self::Up => 1,
            Self::Down => -1,
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "up" | "+1" | "1" => Some(Self::Up),
            "down" | "-1" => Some(Self::Down),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFeedback {
    pub rating: FeedbackRating,
    pub comment: Option<String>,
    pub by: Option<String>,
    pub at: DateTime<Utc>,
}

/// A persisted report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub assessment_id: Uuid,
    pub investigation_id: Uuid,
    pub trigger_id: Uuid,
    pub company_symbol: String,
    pub title: String,
    pub executive_summary: String,
    pub report_body: String,
    pub recommendation_summary: String,
    pub delivery_status: DeliveryStatus,
    pub delivered_via: Vec<String>,
    pub delivery_attempts: Vec<DeliveryAttempt>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub feedback: Option<ReportFeedback>,
    #[serde(default)]
    pub model_used: String,
    #[serde(default)]
    pub usage: TokenUsage,
    pub created_at: DateTime<Utc>,
}

impl Report {
    /// Fold channel attempts into a delivery status.
    ///
    /// No attempts at all leaves the report `Generated`.
    pub fn delivery_outcome(attempts: &[DeliveryAttempt]) -> DeliveryStatus {
        if attempts.is_empty() {
            DeliveryStatus::Generated
        } else if attempts.iter().any(|a| a.succeeded) {
            DeliveryStatus::Delivered
        } else {
            DeliveryStatus::DeliveryFailed
        }
    }
}
