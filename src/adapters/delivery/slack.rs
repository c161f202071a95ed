//! Slack incoming-webhook delivery channel.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::domain::models::Report;
use crate::domain::ports::{DeliveryChannel, DeliveryError};

const DISCLAIMER: &str = "Decision support only - not an automated trade instruction.";

pub struct SlackWebhookChannel {
    http: reqwest::Client,
    webhook_url: String,
    timeout: Duration,
}

impl SlackWebhookChannel {
    pub fn new(webhook_url: impl Into<String>, timeout: Duration) -> Result<Self, DeliveryError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Transport(e.to_string()))?;
        Ok(Self { http, webhook_url: webhook_url.into(), timeout })
    }

    /// Block Kit message for a report.
    pub fn payload(report: &Report) -> Value {
        let emoji = recommendation_emoji(&report.recommendation_summary);
        json!({
            "text": format!("{} {}", emoji, report.title),
            "blocks": [
                {
                    "type": "header",
                    "text": {"type": "plain_text", "text": format!("{} {}", emoji, report.title)}
                },
                {
                    "type": "section",
                    "text": {"type": "mrkdwn", "text": format!("*{}*", report.recommendation_summary)}
                },
                {
                    "type": "section",
                    "text": {"type": "mrkdwn", "text": report.executive_summary}
                },
                {"type": "divider"},
                {
                    "type": "context",
                    "elements": [{"type": "mrkdwn", "text": format!("Report ID: `{}`", report.id)}]
                },
                {
                    "type": "context",
                    "elements": [{"type": "mrkdwn", "text": DISCLAIMER}]
                }
            ]
        })
    }
}

fn recommendation_emoji(summary: &str) -> &'static str {
    let first = summary.split_whitespace().next().unwrap_or_default().to_lowercase();
    match first.as_str() {
        "buy" => "🟢",
        "sell" => "🔴",
        "hold" => "🟡",
        _ => "⚪",
    }
}

#[async_trait]
impl DeliveryChannel for SlackWebhookChannel {
    fn name(&self) -> &str {
        "slack"
    }

    async fn deliver(&self, report: &Report) -> Result<(), DeliveryError> {
        let response = self
            .http
            .post(&self.webhook_url)
            .json(&Self::payload(report))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::Timeout(self.timeout.as_secs())
                } else {
                    DeliveryError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected { status: status.as_u16(), body });
        }

        debug!(report_id = %report.id, "report posted to slack");
        Ok(())
    }
}
