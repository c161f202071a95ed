//! Estimated LLM spend over a time window.
//!
//! Token counts come from the investigation, assessment and report rows
//! created in the window; pricing is by model family.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::CostSummary;
use crate::domain::ports::{AssessmentRepository, InvestigationRepository, ReportRepository};

pub struct CostTracker {
    investigations: Arc<dyn InvestigationRepository>,
    assessments: Arc<dyn AssessmentRepository>,
    reports: Arc<dyn ReportRepository>,
}

impl CostTracker {
    pub fn new(
        investigations: Arc<dyn InvestigationRepository>,
        assessments: Arc<dyn AssessmentRepository>,
        reports: Arc<dyn ReportRepository>,
    ) -> Self {
        Self { investigations, assessments, reports }
    }

    /// Summarize usage for records created in `[since, until]`.
    pub async fn summarize(&self, since: DateTime<Utc>, until: DateTime<Utc>) -> DomainResult<CostSummary> {
        if until < since {
            return Err(DomainError::ValidationFailed(
                "'until' must not be earlier than 'since'".to_string(),
            ));
        }

        let mut rows = self.investigations.usage_by_model(&since, &until).await?;
        rows.extend(self.assessments.usage_by_model(&since, &until).await?);
        rows.extend(self.reports.usage_by_model(&since, &until).await?);
        let completed = self.reports.count_completed(&since, &until).await?;

        let summary = CostSummary::from_rows(since, until, rows, completed);
        debug!(
            models = summary.by_model.len(),
            input_tokens = summary.usage.input_tokens,
            output_tokens = summary.usage.output_tokens,
            estimated_cost_usd = summary.estimated_cost_usd,
            "cost summary computed"
        );
        Ok(summary)
    }
}

/// Midnight UTC of the day containing `now`.
pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_hms_opt(0, 0, 0).map_or(now, |midnight| midnight.and_utc())
}
