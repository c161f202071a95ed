//! Report emitter: turns an assessment into a persisted report and pushes
//! it through the configured delivery channels.
//!
//! A report is written at most once per assessment and its delivery outcome
//! is recorded at most once.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{DecisionAssessment, DeliveryAttempt, DeliveryStatus, Investigation, Report};
use crate::domain::ports::{
    DeliveryChannel, DeliveryError, DeliveryRecord, ReasoningCapability, ReportRepository, ReportRequest, Stage,
    StructuredOutput,
};
use crate::services::retry::RetryPolicy;

const DISCLAIMER: &str = "_Decision support only - not an automated trade instruction._";
const RATIONALE_CHARS: usize = 220;

pub struct ReportEmitter {
    capability: Arc<dyn ReasoningCapability>,
    reports: Arc<dyn ReportRepository>,
    channels: Vec<Arc<dyn DeliveryChannel>>,
    retry: RetryPolicy,
    call_timeout: Duration,
    delivery_timeout: Duration,
}

impl ReportEmitter {
    pub fn new(
        capability: Arc<dyn ReasoningCapability>,
        reports: Arc<dyn ReportRepository>,
        channels: Vec<Arc<dyn DeliveryChannel>>,
        retry: RetryPolicy,
        call_timeout: Duration,
        delivery_timeout: Duration,
    ) -> Self {
        Self { capability, reports, channels, retry, call_timeout, delivery_timeout }
    }

    pub fn channel_names(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.name().to_string()).collect()
    }

    /// Generate and persist the report for `assessment`.
    ///
    /// Returns the existing report when one was already written. A missing
    /// text field in the capability output falls back to a rendering built
    /// from the assessment; a failed call is an error.
    #[instrument(skip_all, fields(assessment_id = %assessment.id))]
    pub async fn emit(&self, investigation: &Investigation, assessment: &DecisionAssessment) -> DomainResult<Report> {
        if let Some(existing) = self.reports.get_by_assessment(assessment.id).await? {
            debug!(report_id = %existing.id, "report already generated");
            return Ok(existing);
        }

        let request = ReportRequest {
            company_symbol: assessment.company_symbol.clone(),
            company_name: investigation.company_name.clone(),
            title: investigation.company_name.clone().unwrap_or_else(|| assessment.company_symbol.clone()),
            synthesis: investigation.synthesis.clone(),
            key_findings: investigation.key_findings.clone(),
            red_flags: investigation.red_flags.clone(),
            positive_signals: investigation.positive_signals.clone(),
            previous_recommendation: assessment.previous_recommendation,
            new_recommendation: assessment.new_recommendation,
            recommendation_changed: assessment.recommendation_changed,
            timeframe: assessment.timeframe,
            confidence: assessment.confidence,
            reasoning: assessment.reasoning.clone(),
        };

        let output = self
            .retry
            .execute(self.call_timeout, || self.capability.write_report(&request))
            .await?;

        let report = Report {
            id: Uuid::new_v4(),
            assessment_id: assessment.id,
            investigation_id: investigation.id,
            trigger_id: assessment.trigger_id,
            company_symbol: assessment.company_symbol.clone(),
            title: text_field(&output, "title").unwrap_or_else(|| fallback_title(investigation, assessment)),
            executive_summary: text_field(&output, "executive_summary")
                .unwrap_or_else(|| fallback_executive_summary(assessment)),
            report_body: text_field(&output, "report_body")
                .unwrap_or_else(|| fallback_body(investigation, assessment)),
            recommendation_summary: text_field(&output, "recommendation_summary")
                .unwrap_or_else(|| assessment.recommendation_summary()),
            delivery_status: DeliveryStatus::Generated,
            delivered_via: Vec::new(),
            delivery_attempts: Vec::new(),
            delivered_at: None,
            feedback: None,
            model_used: self.capability.model(Stage::Report),
            usage: output.usage,
            created_at: Utc::now(),
        };

        self.reports.create(&report).await?;
        info!(
            report_id = %report.id,
            company_symbol = %report.company_symbol,
            model = %report.model_used,
            input_tokens = report.usage.input_tokens,
            output_tokens = report.usage.output_tokens,
            "report generated"
        );
        Ok(report)
    }

    /// Push `report` through every channel and record the outcome once.
    /// Returns the names of the channels that accepted it.
    ///
    /// A report that already left `generated` is not sent again. With no
    /// channels configured nothing is recorded.
    #[instrument(skip_all, fields(report_id = %report.id))]
    pub async fn deliver(&self, report: &Report) -> DomainResult<Vec<String>> {
        if report.delivery_status != DeliveryStatus::Generated {
            return Ok(report.delivered_via.clone());
        }
        if self.channels.is_empty() {
            return Ok(Vec::new());
        }

        // Channels are independent; attempts keep configuration order.
        let attempts: Vec<DeliveryAttempt> = join_all(self.channels.iter().map(|channel| async move {
            let result = match tokio::time::timeout(self.delivery_timeout, channel.deliver(report)).await {
                Ok(result) => result,
                Err(_) => Err(DeliveryError::Timeout(self.delivery_timeout.as_secs())),
            };
            if let Err(err) = &result {
                warn!(channel = channel.name(), error = %err, "delivery failed");
            }
            DeliveryAttempt {
                channel: channel.name().to_string(),
                succeeded: result.is_ok(),
                error: result.err().map(|e| e.to_string()),
                at: Utc::now(),
            }
        }))
        .await;

        let status = Report::delivery_outcome(&attempts);
        let delivered_via: Vec<String> =
            attempts.iter().filter(|a| a.succeeded).map(|a| a.channel.clone()).collect();
        let record = DeliveryRecord {
            status,
            delivered_via: delivered_via.clone(),
            delivered_at: (status == DeliveryStatus::Delivered).then(Utc::now),
            attempts,
        };
        self.reports.record_delivery(report.id, &record).await?;

        info!(status = status.as_str(), delivered_via = ?delivered_via, "delivery recorded");
        Ok(delivered_via)
    }
}

fn text_field(output: &StructuredOutput, field: &str) -> Option<String> {
    output
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn company_label(investigation: &Investigation, assessment: &DecisionAssessment) -> String {
    match investigation.company_name.as_deref().filter(|n| !n.is_empty()) {
        Some(name) => format!("{name} ({})", assessment.company_symbol),
        None => assessment.company_symbol.clone(),
    }
}

fn fallback_title(investigation: &Investigation, assessment: &DecisionAssessment) -> String {
    format!("{} Analysis Report", company_label(investigation, assessment))
}

fn fallback_executive_summary(assessment: &DecisionAssessment) -> String {
    let reasoning = assessment.reasoning.trim();
    let rationale = if reasoning.is_empty() {
        "Evidence from the latest trigger and investigation context.".to_string()
    } else if reasoning.chars().count() > RATIONALE_CHARS {
        format!("{}...", reasoning.chars().take(RATIONALE_CHARS - 3).collect::<String>())
    } else {
        reasoning.to_string()
    };
    format!(
        "Current recommendation is {} with {:.0}% confidence for a {} horizon. Primary rationale: {}",
        assessment.new_recommendation.as_str().to_uppercase(),
        assessment.confidence * 100.0,
        assessment.timeframe.as_str().replace('_', " "),
        rationale
    )
}

fn push_bullets(body: &mut String, items: &[String]) {
    if items.is_empty() {
        body.push_str("- None noted.\n");
    }
    for item in items {
        let _ = writeln!(body, "- {item}");
    }
}

fn fallback_body(investigation: &Investigation, assessment: &DecisionAssessment) -> String {
    let mut body = String::new();
    let _ = writeln!(body, "# {}\n", company_label(investigation, assessment));

    let _ = writeln!(body, "## Executive Summary\n\n{}\n", fallback_executive_summary(assessment));

    let trigger = if investigation.synthesis.trim().is_empty() {
        "Trigger context unavailable."
    } else {
        investigation.synthesis.trim()
    };
    let _ = writeln!(body, "## Trigger\n\n{trigger}\n");

    body.push_str("## Findings\n\n");
    push_bullets(&mut body, &investigation.key_findings);

    body.push_str("\n## Positive Signals\n\n");
    push_bullets(&mut body, &investigation.positive_signals);

    let prior = assessment.past_investigations_used.len();
    let context = if prior == 0 {
        "First recorded investigation for this company.".to_string()
    } else {
        format!("{prior} prior investigations available.")
    };
    let _ = writeln!(body, "\n## Context\n\n{context}\n");

    let _ = writeln!(body, "## Recommendation\n\n{}\n", assessment.recommendation_summary());
    if !assessment.reasoning.trim().is_empty() {
        let _ = writeln!(body, "{}\n", assessment.reasoning.trim());
    }

    body.push_str("## Risks\n\n");
    if assessment.key_factors_against.is_empty() {
        push_bullets(&mut body, &investigation.red_flags);
    } else {
        push_bullets(&mut body, &assessment.key_factors_against);
    }

    body.push_str("\n## Red Flags\n\n");
    push_bullets(&mut body, &investigation.red_flags);

    body.push_str("\n## Sources\n\n");
    let mut seen = HashSet::new();
    let sources: Vec<_> = investigation
        .web_search_results
        .iter()
        .filter(|hit| !hit.source.is_empty() && seen.insert(hit.source.as_str()))
        .collect();
    if sources.is_empty() {
        body.push_str("- No external sources captured.\n");
    }
    for hit in sources {
        let title = if hit.title.is_empty() { &hit.source } else { &hit.title };
        let _ = writeln!(body, "- [{title}]({})", hit.source);
    }

    let _ = write!(body, "\n{DISCLAIMER}\n");
    body
}
