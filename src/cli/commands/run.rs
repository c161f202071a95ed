//! `equiwatch run`: work the trigger backlog.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cli::context::PipelineContext;
use crate::cli::display::{list_table, output, short_id, CommandOutput};
use crate::domain::models::Config;
use crate::services::{BatchSummary, ProcessOutcome};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Process the current backlog once and exit
    #[arg(long)]
    pub once: bool,

    /// Triggers to take in one pass (defaults to pipeline.batch_size)
    #[arg(short, long)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct OutcomeRow {
    pub trigger_id: String,
    pub outcome: String,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub struct RunOutput {
    pub processed: usize,
    pub reported: usize,
    pub not_significant: usize,
    pub filtered_out: usize,
    pub errored: usize,
    pub failures: usize,
    pub outcomes: Vec<OutcomeRow>,
}

impl From<&BatchSummary> for RunOutput {
    fn from(summary: &BatchSummary) -> Self {
        Self {
            processed: summary.outcomes.len(),
            reported: summary.count("reported"),
            not_significant: summary.count("not_significant"),
            filtered_out: summary.count("filtered_out"),
            errored: summary.count("errored"),
            failures: summary.failures,
            outcomes: summary
                .outcomes
                .iter()
                .map(|(id, outcome)| OutcomeRow {
                    trigger_id: id.to_string(),
                    outcome: outcome.label().to_string(),
                    detail: detail(outcome),
                })
                .collect(),
        }
    }
}

fn detail(outcome: &ProcessOutcome) -> String {
    match outcome {
        ProcessOutcome::FilteredOut { reason } | ProcessOutcome::Errored { reason } => reason.clone(),
        ProcessOutcome::NotSignificant { investigation_id } => format!("investigation {investigation_id}"),
        ProcessOutcome::Reported { report_id, delivered_via } => {
            if delivered_via.is_empty() {
                format!("report {report_id}")
            } else {
                format!("report {report_id} via {}", delivered_via.join(", "))
            }
        }
        ProcessOutcome::Skipped => String::new(),
    }
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        if self.processed == 0 && self.failures == 0 {
            return "No actionable triggers.".to_string();
        }
        let mut table = list_table(&["trigger", "outcome", "detail"]);
        for row in &self.outcomes {
            table.add_row(vec![short_id(&row.trigger_id).to_string(), row.outcome.clone(), row.detail.clone()]);
        }
        format!(
            "Processed {}: {} reported, {} not significant, {} filtered out, {} errored, {} task failures\n{}",
            self.processed, self.reported, self.not_significant, self.filtered_out, self.errored, self.failures, table
        )
    }
}

pub async fn execute(args: RunArgs, config: &Config, json_mode: bool) -> Result<()> {
    let ctx = PipelineContext::open(config).await?;
    let orchestrator = ctx.pipeline.orchestrator.clone();

    let summary = if args.once {
        orchestrator.process_pending(args.limit.unwrap_or(config.pipeline.batch_size)).await?
    } else {
        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("interrupt received, draining in-flight triggers"),
                Err(err) => warn!(error = %err, "failed to listen for interrupt; stopping"),
            }
            signal.cancel();
        });
        info!(
            max_concurrent = config.pipeline.max_concurrent_triggers,
            poll_interval_secs = config.pipeline.poll_interval_secs,
            "orchestrator running; press Ctrl-C to stop"
        );
        orchestrator.run(shutdown).await
    };

    output(&RunOutput::from(&summary), json_mode);
    Ok(())
}
