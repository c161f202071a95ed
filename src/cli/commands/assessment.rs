//! Decision assessment CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::cli::context::StoreContext;
use crate::cli::display::{
    colorize_recommendation, list_table, output, render_list, short_id, timestamp, timestamp_opt, truncate,
    CommandOutput, DetailView,
};
use crate::cli::id_resolver::{resolve_id, Entity};
use crate::domain::models::{Config, DecisionAssessment};

#[derive(Args, Debug)]
pub struct AssessmentArgs {
    #[command(subcommand)]
    pub command: AssessmentCommands,
}

#[derive(Subcommand, Debug)]
pub enum AssessmentCommands {
    /// List assessments, newest first
    List {
        /// Only this company
        #[arg(short, long)]
        company: Option<String>,

        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Show an assessment's reasoning
    Show {
        /// Assessment ID or unique prefix
        id: String,
    },
}

#[derive(Debug, Serialize)]
pub struct AssessmentRow {
    pub id: String,
    pub company: String,
    pub previous: String,
    pub recommendation: String,
    pub changed: bool,
    pub confidence: f64,
    pub created_at: String,
}

impl From<&DecisionAssessment> for AssessmentRow {
    fn from(a: &DecisionAssessment) -> Self {
        Self {
            id: a.id.to_string(),
            company: a.company_symbol.clone(),
            previous: a.previous_recommendation.as_str().to_string(),
            recommendation: a.new_recommendation.as_str().to_string(),
            changed: a.recommendation_changed,
            confidence: a.confidence,
            created_at: timestamp(&a.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AssessmentListOutput {
    pub assessments: Vec<AssessmentRow>,
    pub total: usize,
}

impl CommandOutput for AssessmentListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "company", "previous", "recommendation", "changed", "confidence", "created"]);
        for row in &self.assessments {
            table.add_row(vec![
                short_id(&row.id).to_string(),
                row.company.clone(),
                row.previous.clone(),
                colorize_recommendation(&row.recommendation).to_string(),
                if row.changed { "yes" } else { "no" }.to_string(),
                format!("{:.0}%", row.confidence * 100.0),
                row.created_at.clone(),
            ]);
        }
        render_list("assessment", &table, self.total)
    }
}

#[derive(Debug, Serialize)]
pub struct AssessmentDetailOutput {
    #[serde(flatten)]
    pub assessment: DecisionAssessment,
}

impl CommandOutput for AssessmentDetailOutput {
    fn to_human(&self) -> String {
        let a = &self.assessment;
        DetailView::new(&format!("Assessment {}", a.id))
            .field("Company", &a.company_symbol)
            .field("Investigation", a.investigation_id)
            .field("Recommendation", a.recommendation_summary())
            .field("Changed", a.recommendation_changed)
            .field(
                "Previous",
                format!(
                    "{} since {}",
                    a.previous_recommendation.as_str(),
                    timestamp_opt(a.previous_recommendation_date.as_ref())
                ),
            )
            .field("Model", &a.model_used)
            .field("Tokens", format!("{} in, {} out", a.usage.input_tokens, a.usage.output_tokens))
            .field("Created", timestamp(&a.created_at))
            .section("Reasoning")
            .item(truncate(&a.reasoning, 800))
            .section("Factors For")
            .items(&a.key_factors_for)
            .section("Factors Against")
            .items(&a.key_factors_against)
            .section("History Used")
            .field("Past investigations", a.past_investigations_used.len())
            .field("Inconclusive resurrected", a.past_inconclusive_resurrected.len())
            .render()
    }
}

pub async fn execute(args: AssessmentArgs, config: &Config, json_mode: bool) -> Result<()> {
    let store = StoreContext::open(config).await?;
    let repo = store.repositories.assessments.clone();

    match args.command {
        AssessmentCommands::List { company, limit } => {
            let assessments = match company {
                Some(symbol) => {
                    let all = repo.list_by_company(&symbol.to_uppercase()).await?;
                    all.into_iter().rev().take(limit).collect()
                }
                None => repo.list_recent(limit).await?,
            };
            let out = AssessmentListOutput {
                total: assessments.len(),
                assessments: assessments.iter().map(AssessmentRow::from).collect(),
            };
            output(&out, json_mode);
        }
        AssessmentCommands::Show { id } => {
            let id = resolve_id(&store.pool, Entity::Assessment, &id).await?;
            let assessment = repo.get(id).await?.with_context(|| format!("Assessment not found: {id}"))?;
            output(&AssessmentDetailOutput { assessment }, json_mode);
        }
    }
    Ok(())
}
