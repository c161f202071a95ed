//! Estimated LLM spend for a time window.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use clap::Args;
use serde::Serialize;

use crate::cli::context::StoreContext;
use crate::cli::display::{list_table, output, timestamp, CommandOutput, DetailView};
use crate::domain::models::{Config, CostSummary};
use crate::services::cost_tracker::{start_of_day, CostTracker};

#[derive(Args, Debug)]
pub struct CostsArgs {
    /// Window start, RFC 3339 or YYYY-MM-DD (default: start of today, UTC)
    #[arg(long, value_parser = parse_time)]
    pub since: Option<DateTime<Utc>>,

    /// Window end, RFC 3339 or YYYY-MM-DD (default: now)
    #[arg(long, value_parser = parse_time)]
    pub until: Option<DateTime<Utc>>,
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|d| d.and_utc())
        .ok_or_else(|| format!("invalid time '{value}': expected RFC 3339 or YYYY-MM-DD"))
}

#[derive(Debug, Serialize)]
pub struct CostsOutput {
    #[serde(flatten)]
    pub summary: CostSummary,
}

impl CommandOutput for CostsOutput {
    fn to_human(&self) -> String {
        let s = &self.summary;
        let title = format!("Costs {} to {}", timestamp(&s.window_start), timestamp(&s.window_end));
        let totals = DetailView::new(&title)
            .field("Input tokens", s.usage.input_tokens)
            .field("Output tokens", s.usage.output_tokens)
            .field("Estimated cost", format!("${:.4}", s.estimated_cost_usd))
            .field("Completed reports", s.completed_reports)
            .field("Cost per report", format!("${:.4}", s.cost_per_report_usd))
            .render();

        if s.by_model.is_empty() {
            return totals;
        }
        let mut table = list_table(&["model", "input", "output", "cost usd"]);
        for m in &s.by_model {
            table.add_row(vec![
                m.model.clone(),
                m.usage.input_tokens.to_string(),
                m.usage.output_tokens.to_string(),
                format!("{:.4}", m.estimated_cost_usd),
            ]);
        }
        format!("{totals}\n\n{table}")
    }
}

pub async fn execute(args: CostsArgs, config: &Config, json_mode: bool) -> Result<()> {
    let now = Utc::now();
    let since = args.since.unwrap_or_else(|| start_of_day(now));
    let until = args.until.unwrap_or(now);

    let store = StoreContext::open(config).await?;
    let repos = &store.repositories;
    let tracker = CostTracker::new(repos.investigations.clone(), repos.assessments.clone(), repos.reports.clone());
    let summary = tracker.summarize(since, until).await?;

    output(&CostsOutput { summary }, json_mode);
    Ok(())
}
