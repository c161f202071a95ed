//! Trigger CLI commands: submit, list, show, stats.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::cli::context::{PipelineContext, StoreContext};
use crate::cli::display::{
    action_success, colorize_status, list_table, output, render_list, short_id, timestamp, truncate, CommandOutput,
    DetailView,
};
use crate::cli::id_resolver::{resolve_id, Entity};
use crate::domain::models::{Config, Trigger, TriggerCandidate, TriggerOrigin, TriggerStatus};
use crate::domain::ports::TriggerFilter;
use crate::services::{IngestOutcome, IngestService, ProcessOutcome};

#[derive(Args, Debug)]
pub struct TriggerArgs {
    #[command(subcommand)]
    pub command: TriggerCommands,
}

#[derive(Subcommand, Debug)]
pub enum TriggerCommands {
    /// Submit an announcement or an analyst note
    Submit {
        /// Announcement text; use --file to read it from disk
        content: Option<String>,

        /// Read the announcement text from a file
        #[arg(long, conflicts_with = "content")]
        file: Option<PathBuf>,

        /// Source document URL (the dedup key for feed triggers)
        #[arg(long)]
        url: Option<String>,

        /// Feed headline
        #[arg(long)]
        title: Option<String>,

        /// Company symbol, when known
        #[arg(short, long)]
        symbol: Option<String>,

        /// Company name, when known
        #[arg(long)]
        company_name: Option<String>,

        #[arg(long)]
        sector: Option<String>,

        /// Submit as an analyst; skips dedup and both gates
        #[arg(long)]
        by: Option<String>,

        /// Analyst notes
        #[arg(long, requires = "by")]
        notes: Option<String>,

        /// Run the trigger through the pipeline right away
        #[arg(long)]
        process: bool,
    },

    /// List triggers, newest first
    List {
        /// Filter by status
        #[arg(short, long)]
        status: Option<String>,

        /// Filter by origin (automated_feed, human)
        #[arg(short, long)]
        origin: Option<String>,

        /// Filter by company symbol
        #[arg(short, long)]
        company: Option<String>,

        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// Show a trigger with its status history
    Show {
        /// Trigger ID or unique prefix
        id: String,
    },

    /// Trigger counts by status and origin
    Stats,
}

#[derive(Debug, Serialize)]
pub struct SubmitOutput {
    pub accepted: bool,
    pub trigger_id: Option<String>,
    pub duplicate_of_key: Option<String>,
    pub outcome: Option<String>,
    pub detail: Option<String>,
}

impl CommandOutput for SubmitOutput {
    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        match (&self.trigger_id, &self.duplicate_of_key) {
            (Some(id), _) => lines.push(action_success(&format!("Trigger accepted: {id}"))),
            (None, Some(key)) => lines.push(format!("Duplicate trigger dropped (key: {key})")),
            (None, None) => {}
        }
        if let Some(outcome) = &self.outcome {
            lines.push(format!("Outcome: {outcome}"));
        }
        if let Some(detail) = &self.detail {
            lines.push(detail.clone());
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct TriggerRow {
    pub id: String,
    pub status: String,
    pub origin: String,
    pub company: String,
    pub title: String,
    pub created_at: String,
}

impl From<&Trigger> for TriggerRow {
    fn from(trigger: &Trigger) -> Self {
        Self {
            id: trigger.id.to_string(),
            status: trigger.status.as_str().to_string(),
            origin: trigger.origin.as_str().to_string(),
            company: trigger.company_symbol.clone().unwrap_or_else(|| "-".to_string()),
            title: truncate(&trigger.display_title(), 50),
            created_at: timestamp(&trigger.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TriggerListOutput {
    pub triggers: Vec<TriggerRow>,
    pub total: usize,
}

impl CommandOutput for TriggerListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "status", "origin", "company", "title", "created"]);
        for row in &self.triggers {
            table.add_row(vec![
                short_id(&row.id).to_string(),
                colorize_status(&row.status).to_string(),
                row.origin.clone(),
                row.company.clone(),
                row.title.clone(),
                row.created_at.clone(),
            ]);
        }
        render_list("trigger", &table, self.total)
    }
}

#[derive(Debug, Serialize)]
pub struct TriggerDetailOutput {
    #[serde(flatten)]
    pub trigger: Trigger,
}

impl CommandOutput for TriggerDetailOutput {
    fn to_human(&self) -> String {
        let t = &self.trigger;
        let mut view = DetailView::new(&format!("Trigger {}", t.id))
            .field("Status", colorize_status(t.status.as_str()))
            .field("Origin", t.origin.as_str())
            .field("Priority", t.priority.as_str())
            .field_opt("Company", t.company_symbol.as_deref())
            .field_opt("Name", t.company_name.as_deref())
            .field_opt("Sector", t.sector.as_deref())
            .field_opt("Source", t.source_url.as_deref())
            .field_opt("Submitted by", t.triggered_by.as_deref())
            .field_opt("Notes", t.human_notes.as_deref())
            .field("Created", timestamp(&t.created_at));

        if let Some(gate) = &t.gate_result {
            view = view
                .section("Gate")
                .field("Passed", gate.passed)
                .field("Method", gate.method.as_str())
                .field("Reason", &gate.reason)
                .field_opt("Model", gate.model.as_deref());
        }

        view = view.section("History").items(
            t.status_history.iter().map(|h| format!("{}  {:<12}  {}", timestamp(&h.at), h.status.as_str(), h.reason)),
        );
        view.section("Content").item(truncate(&t.raw_content, 500)).render()
    }
}

#[derive(Debug, Serialize)]
pub struct TriggerStatsOutput {
    pub total: u64,
    pub by_status: Vec<(String, u64)>,
    pub by_origin: Vec<(String, u64)>,
}

impl CommandOutput for TriggerStatsOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["status", "count"]);
        for (status, count) in &self.by_status {
            table.add_row(vec![colorize_status(status).to_string(), count.to_string()]);
        }
        let origins: Vec<String> = self.by_origin.iter().map(|(o, c)| format!("{o}: {c}")).collect();
        format!("Total triggers: {}\n{}\nBy origin: {}", self.total, table, origins.join(", "))
    }
}

pub async fn execute(args: TriggerArgs, config: &Config, json_mode: bool) -> Result<()> {
    match args.command {
        TriggerCommands::Submit {
            content,
            file,
            url,
            title,
            symbol,
            company_name,
            sector,
            by,
            notes,
            process,
        } => {
            let raw_content = match (content, file) {
                (Some(text), _) => text,
                (None, Some(path)) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                (None, None) => bail!("Provide the announcement text or --file"),
            };

            let mut candidate = match by {
                Some(analyst) => TriggerCandidate::human(raw_content, analyst),
                None => TriggerCandidate::automated(raw_content),
            };
            candidate.source_url = url;
            candidate.source_feed_title = title;
            candidate.company_symbol = symbol;
            candidate.company_name = company_name;
            candidate.sector = sector;
            candidate.human_notes = notes;

            let out = if process {
                submit_and_process(candidate, config).await?
            } else {
                let store = StoreContext::open(config).await?;
                let outcome = IngestService::new(store.repositories.triggers.clone()).submit(candidate).await?;
                submit_output(&outcome, None)
            };
            output(&out, json_mode);
        }

        TriggerCommands::List { status, origin, company, limit } => {
            let status = status
                .map(|s| TriggerStatus::from_str(&s).with_context(|| format!("Unknown status: {s}")))
                .transpose()?;
            let origin = origin
                .map(|o| TriggerOrigin::from_str(&o).with_context(|| format!("Unknown origin: {o}")))
                .transpose()?;

            let store = StoreContext::open(config).await?;
            let filter = TriggerFilter {
                status,
                origin,
                company_symbol: company.map(|c| c.to_uppercase()),
                limit: Some(limit),
            };
            let triggers = store.repositories.triggers.list(filter).await?;
            let out = TriggerListOutput {
                total: triggers.len(),
                triggers: triggers.iter().map(TriggerRow::from).collect(),
            };
            output(&out, json_mode);
        }

        TriggerCommands::Show { id } => {
            let store = StoreContext::open(config).await?;
            let id = resolve_id(&store.pool, Entity::Trigger, &id).await?;
            let trigger =
                store.repositories.triggers.get(id).await?.with_context(|| format!("Trigger not found: {id}"))?;
            output(&TriggerDetailOutput { trigger }, json_mode);
        }

        TriggerCommands::Stats => {
            let store = StoreContext::open(config).await?;
            let by_status = store.repositories.triggers.count_by_status().await?;
            let by_origin = store.repositories.triggers.count_by_origin().await?;

            let out = TriggerStatsOutput {
                total: by_status.values().sum(),
                by_status: TriggerStatus::ALL
                    .iter()
                    .filter_map(|s| by_status.get(s).map(|c| (s.as_str().to_string(), *c)))
                    .collect(),
                by_origin: by_origin.iter().map(|(o, c)| (o.as_str().to_string(), *c)).collect(),
            };
            output(&out, json_mode);
        }
    }

    Ok(())
}

async fn submit_and_process(candidate: TriggerCandidate, config: &Config) -> Result<SubmitOutput> {
    let ctx = PipelineContext::open(config).await?;
    let outcome = ctx.pipeline.ingest.submit(candidate).await?;
    let Some(id) = outcome.trigger_id() else {
        return Ok(submit_output(&outcome, None));
    };
    let processed = ctx.pipeline.orchestrator.process(id).await?;
    Ok(submit_output(&outcome, Some(&processed)))
}

fn submit_output(outcome: &IngestOutcome, processed: Option<&ProcessOutcome>) -> SubmitOutput {
    let detail = processed.and_then(|p| match p {
        ProcessOutcome::FilteredOut { reason } | ProcessOutcome::Errored { reason } => Some(reason.clone()),
        ProcessOutcome::NotSignificant { investigation_id } => {
            Some(format!("Investigation {investigation_id} found nothing significant"))
        }
        ProcessOutcome::Reported { report_id, delivered_via } if delivered_via.is_empty() => {
            Some(format!("Report {report_id} generated"))
        }
        ProcessOutcome::Reported { report_id, delivered_via } => {
            Some(format!("Report {report_id} delivered via {}", delivered_via.join(", ")))
        }
        ProcessOutcome::Skipped => None,
    });
    SubmitOutput {
        accepted: matches!(outcome, IngestOutcome::Accepted(_)),
        trigger_id: outcome.trigger_id().map(|id| id.to_string()),
        duplicate_of_key: match outcome {
            IngestOutcome::Duplicate { dedup_key } => Some(dedup_key.clone()),
            IngestOutcome::Accepted(_) => None,
        },
        outcome: processed.map(|p| p.label().to_string()),
        detail,
    }
}
