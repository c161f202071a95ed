//! Investigation CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::cli::context::StoreContext;
use crate::cli::display::{list_table, output, render_list, short_id, timestamp, truncate, CommandOutput, DetailView};
use crate::cli::id_resolver::{resolve_id, Entity};
use crate::domain::models::{Config, Investigation};

#[derive(Args, Debug)]
pub struct InvestigationArgs {
    #[command(subcommand)]
    pub command: InvestigationCommands,
}

#[derive(Subcommand, Debug)]
pub enum InvestigationCommands {
    /// List investigations, newest first
    List {
        /// Only this company
        #[arg(short, long)]
        company: Option<String>,

        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Show an investigation's findings
    Show {
        /// Investigation ID or unique prefix
        id: String,
    },
}

#[derive(Debug, Serialize)]
pub struct InvestigationRow {
    pub id: String,
    pub company: String,
    pub significance: String,
    pub significant: bool,
    pub synthesis: String,
    pub created_at: String,
}

impl From<&Investigation> for InvestigationRow {
    fn from(i: &Investigation) -> Self {
        Self {
            id: i.id.to_string(),
            company: i.company_symbol.clone().unwrap_or_else(|| "-".to_string()),
            significance: i.significance.as_str().to_string(),
            significant: i.is_significant,
            synthesis: truncate(&i.synthesis, 60),
            created_at: timestamp(&i.created_at),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvestigationListOutput {
    pub investigations: Vec<InvestigationRow>,
    pub total: usize,
}

impl CommandOutput for InvestigationListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["id", "company", "significance", "significant", "synthesis", "created"]);
        for row in &self.investigations {
            table.add_row(vec![
                short_id(&row.id).to_string(),
                row.company.clone(),
                row.significance.clone(),
                if row.significant { "yes" } else { "no" }.to_string(),
                row.synthesis.clone(),
                row.created_at.clone(),
            ]);
        }
        render_list("investigation", &table, self.total)
    }
}

#[derive(Debug, Serialize)]
pub struct InvestigationDetailOutput {
    #[serde(flatten)]
    pub investigation: Investigation,
}

impl CommandOutput for InvestigationDetailOutput {
    fn to_human(&self) -> String {
        let i = &self.investigation;
        let mut view = DetailView::new(&format!("Investigation {}", i.id))
            .field("Trigger", i.trigger_id)
            .field_opt("Company", i.company_symbol.as_deref())
            .field("Significance", i.significance.as_str())
            .field("Significant", i.is_significant)
            .field("Model", &i.model_used)
            .field("Tokens", format!("{} in, {} out", i.usage.input_tokens, i.usage.output_tokens))
            .field("Processing", format!("{} ms", i.processing_ms))
            .field("Created", timestamp(&i.created_at))
            .section("Synthesis")
            .item(&i.synthesis)
            .item(&i.significance_reasoning)
            .section("Key Findings")
            .items(&i.key_findings)
            .section("Positive Signals")
            .items(&i.positive_signals)
            .section("Red Flags")
            .items(&i.red_flags)
            .section("Metrics")
            .items(i.extracted_metrics.iter().map(|m| {
                let period = m.period.as_deref().map(|p| format!(" ({p})")).unwrap_or_default();
                format!("{}: {}{}", m.name, m.raw_value, period)
            }))
            .section("Forward Statements")
            .items(i.forward_statements.iter().map(|f| f.statement.clone()));

        if let Some(market) = &i.market_data {
            view = view
                .section("Market Data")
                .field_opt("Price", market.price)
                .field_opt("Market cap", market.market_cap)
                .field_opt("P/E", market.pe_ratio);
        }

        view.section("History Used")
            .field("Past investigations", i.historical_context.past_investigation_ids.len())
            .field("Inconclusive", i.historical_context.inconclusive_ids.len())
            .field("Similar material", i.historical_context.similar_material.len())
            .section("Enrichment Gaps")
            .items(&i.enrichment_gaps)
            .section("Parse Issues")
            .items(i.parse_issues.iter().map(|p| format!("{}: {}", p.field, p.detail)))
            .render()
    }
}

pub async fn execute(args: InvestigationArgs, config: &Config, json_mode: bool) -> Result<()> {
    let store = StoreContext::open(config).await?;
    let repo = store.repositories.investigations.clone();

    match args.command {
        InvestigationCommands::List { company, limit } => {
            let investigations = match company {
                Some(symbol) => repo.list_by_company(&symbol.to_uppercase(), None, limit).await?,
                None => repo.list_recent(limit).await?,
            };
            let out = InvestigationListOutput {
                total: investigations.len(),
                investigations: investigations.iter().map(InvestigationRow::from).collect(),
            };
            output(&out, json_mode);
        }
        InvestigationCommands::Show { id } => {
            let id = resolve_id(&store.pool, Entity::Investigation, &id).await?;
            let investigation = repo.get(id).await?.with_context(|| format!("Investigation not found: {id}"))?;
            output(&InvestigationDetailOutput { investigation }, json_mode);
        }
    }
    Ok(())
}
