//! LLM token usage and cost estimates.

use std::ops::{Add, AddAssign};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tokens billed for one or more capability calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub const fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self { input_tokens, output_tokens }
    }

    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl Add for TokenUsage {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            input_tokens: self.input_tokens.saturating_add(other.input_tokens),
            output_tokens: self.output_tokens.saturating_add(other.output_tokens),
        }
    }
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

/// USD per million tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl ModelPricing {
    /// Estimate by model family; unknown models are priced like sonnet.
    pub fn for_model(model: &str) -> Self {
        let model = model.to_lowercase();
        let (input_per_million, output_per_million) = if model.contains("haiku") {
            (0.8, 4.0)
        } else if model.contains("opus") {
            (15.0, 75.0)
        } else {
            (3.0, 15.0)
        };
        Self { input_per_million, output_per_million }
    }

    pub fn estimate_usd(&self, usage: TokenUsage) -> f64 {
        (usage.input_tokens as f64 * self.input_per_million + usage.output_tokens as f64 * self.output_per_million)
            / 1_000_000.0
    }
}

const UNKNOWN_MODEL: &str = "unknown";

fn model_label(model: String) -> String {
    if model.trim().is_empty() {
        UNKNOWN_MODEL.to_string()
    } else {
        model
    }
}

/// Tokens one model used inside a window, across every stage table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelUsage {
    pub model: String,
    pub usage: TokenUsage,
    pub estimated_cost_usd: f64,
}

impl ModelUsage {
    pub fn new(model: impl Into<String>, usage: TokenUsage) -> Self {
        let model = model_label(model.into());
        let estimated_cost_usd = ModelPricing::for_model(&model).estimate_usd(usage);
        Self { model, usage, estimated_cost_usd }
    }
}

/// Estimated LLM spend over a time window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CostSummary {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub by_model: Vec<ModelUsage>,
    pub usage: TokenUsage,
    pub estimated_cost_usd: f64,
    /// Reports generated or delivered in the window
    pub completed_reports: u64,
    pub cost_per_report_usd: f64,
}

impl CostSummary {
    /// Merge per-table rows for the same model and total everything up.
    pub fn from_rows(
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        rows: Vec<(String, TokenUsage)>,
        completed_reports: u64,
    ) -> Self {
        let mut merged: Vec<(String, TokenUsage)> = Vec::new();
        for (model, usage) in rows {
            let model = model_label(model);
            match merged.iter_mut().find(|(m, _)| *m == model) {
                Some((_, total)) => *total += usage,
                None => merged.push((model, usage)),
            }
        }
        merged.sort_by(|a, b| a.0.cmp(&b.0));

        let by_model: Vec<ModelUsage> = merged.into_iter().map(|(m, u)| ModelUsage::new(m, u)).collect();
        let usage = by_model.iter().fold(TokenUsage::default(), |acc, m| acc + m.usage);
        let estimated_cost_usd: f64 = by_model.iter().map(|m| m.estimated_cost_usd).sum();
        let cost_per_report_usd =
            if completed_reports == 0 { 0.0 } else { estimated_cost_usd / completed_reports as f64 };

        Self {
            window_start,
            window_end,
            by_model,
            usage,
            estimated_cost_usd,
            completed_reports,
            cost_per_report_usd,
        }
    }
}
