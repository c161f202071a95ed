//! Report CLI commands, including reader feedback.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::cli::context::StoreContext;
use crate::cli::display::{
    action_success, colorize_status, list_table, output, render_list, short_id, timestamp, timestamp_opt, truncate,
    CommandOutput, DetailView,
};
use crate::cli::id_resolver::{resolve_id, Entity};
use crate::domain::models::{Config, FeedbackRating, Report, ReportFeedback};

#[derive(Args, Debug)]
pub struct ReportArgs {
    #[command(subcommand)]
    pub command: ReportCommands,
}

#[derive(Subcommand, Debug)]
pub enum ReportCommands {
    /// List reports, newest first
    List {
        /// Only this company
        #[arg(short, long)]
        company: Option<String>,

        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Show a report
    Show {
        /// Report ID or unique prefix
        id: String,
    },
    /// Record a thumbs up or down on a report
    Feedback {
        /// Report ID or unique prefix
        id: String,

        /// up or down
        #[arg(short, long)]
        rating: String,

        #[arg(short, long)]
        comment: Option<String>,

        /// Who is giving the feedback
        #[arg(long)]
        by: Option<String>,
    },
}

#[derive(Debug, Serialize)]
pub struct ReportRow {
    pub id: String,
    pub company: String,
    pub title: String,
    pub delivery_status: String,
    pub delivered_via: Vec<String>,
    pub created_at: String,
}

impl From<&Report> for ReportRow {
    fn from(r: &Report) -> Self {
        Self {
            id: r.id.to_string(),
            company: r.company_symbol.clone(),
            title: truncate(&r.title, 50),
            delivery_status: r.delivery_status.as_str().to_string(),
            delivered_via: r.delivered_via.clone(),
            created_at: timestamp(&r.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReportListOutput {
    pub reports: Vec<ReportRow>,
    pub total: usize,
}

impl CommandOutput for ReportListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "company", "title", "delivery", "via", "created"]);
        for row in &self.reports {
            table.add_row(vec![
                short_id(&row.id).to_string(),
                row.company.clone(),
                row.title.clone(),
                colorize_status(&row.delivery_status).to_string(),
                row.delivered_via.join(","),
                row.created_at.clone(),
            ]);
        }
        render_list("report", &table, self.total)
    }
}

#[derive(Debug, Serialize)]
pub struct ReportDetailOutput {
    #[serde(flatten)]
    pub report: Report,
}

impl CommandOutput for ReportDetailOutput {
    fn to_human(&self) -> String {
        let r = &self.report;
        let mut view = DetailView::new(&r.title)
            .field("Report", r.id)
            .field("Company", &r.company_symbol)
            .field("Recommendation", &r.recommendation_summary)
            .field("Delivery", colorize_status(r.delivery_status.as_str()))
            .field("Delivered at", timestamp_opt(r.delivered_at.as_ref()))
            .field_opt("Model", Some(&r.model_used).filter(|m| !m.is_empty()))
            .field("Tokens", format!("{} in, {} out", r.usage.input_tokens, r.usage.output_tokens))
            .field("Created", timestamp(&r.created_at))
            .section("Delivery Attempts")
            .items(r.delivery_attempts.iter().map(|a| match &a.error {
                Some(err) => format!("{} failed: {err}", a.channel),
                None => format!("{} ok", a.channel),
            }));

        if let Some(feedback) = &r.feedback {
            view = view
                .section("Feedback")
                .field("Rating", format!("{:?}", feedback.rating).to_lowercase())
                .field_opt("Comment", feedback.comment.as_deref())
                .field_opt("By", feedback.by.as_deref());
        }

        format!(
            "{}\n\n{}\n\n{}",
            view.section("Executive Summary").item(&r.executive_summary).render(),
            "-".repeat(60),
            r.report_body
        )
    }
}

#[derive(Debug, Serialize)]
pub struct FeedbackOutput {
    pub report_id: String,
    pub rating: i64,
}

impl CommandOutput for FeedbackOutput {
    fn to_human(&self) -> String {
        let word = if self.rating > 0 { "up" } else { "down" };
        action_success(&format!("Recorded thumbs {word} for report {}", short_id(&self.report_id)))
    }
}

pub async fn execute(args: ReportArgs, config: &Config, json_mode: bool) -> Result<()> {
    let store = StoreContext::open(config).await?;
    let repo = store.repositories.reports.clone();

    match args.command {
        ReportCommands::List { company, limit } => {
            let company = company.map(|c| c.to_uppercase());
            let reports = repo.list(company.as_deref(), limit).await?;
            let out = ReportListOutput { total: reports.len(), reports: reports.iter().map(ReportRow::from).collect() };
            output(&out, json_mode);
        }
        ReportCommands::Show { id } => {
            let id = resolve_id(&store.pool, Entity::Report, &id).await?;
            let report = repo.get(id).await?.with_context(|| format!("Report not found: {id}"))?;
            output(&ReportDetailOutput { report }, json_mode);
        }
        ReportCommands::Feedback { id, rating, comment, by } => {
            let rating = FeedbackRating::from_str(&rating)
                .with_context(|| format!("Unknown rating '{rating}'. Use up or down"))?;
            let id = resolve_id(&store.pool, Entity::Report, &id).await?;
            let feedback = ReportFeedback { rating, comment, by, at: Utc::now() };
            repo.record_feedback(id, &feedback).await?;
            output(&FeedbackOutput { report_id: id.to_string(), rating: rating.value() }, json_mode);
        }
    }
    Ok(())
}
