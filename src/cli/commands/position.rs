//! Position CLI commands.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::cli::context::StoreContext;
use crate::cli::display::{
    colorize_recommendation, list_table, output, render_list, timestamp, timestamp_opt, truncate, CommandOutput,
    DetailView,
};
use crate::domain::models::{Config, Position};

#[derive(Args, Debug)]
pub struct PositionArgs {
    #[command(subcommand)]
    pub command: PositionCommands,
}

#[derive(Subcommand, Debug)]
pub enum PositionCommands {
    /// Current recommendation for every assessed company
    List,
    /// A company's recommendation and its history
    Show {
        /// Company symbol
        symbol: String,
    },
}

#[derive(Debug, Serialize)]
pub struct PositionRow {
    pub company: String,
    pub recommendation: String,
    pub since: String,
    pub changes: usize,
    pub basis: String,
}

impl From<&Position> for PositionRow {
    fn from(p: &Position) -> Self {
        Self {
            company: p.company_symbol.clone(),
            recommendation: p.current_recommendation.as_str().to_string(),
            since: timestamp_opt(p.recommendation_date.as_ref()),
            changes: p.history.len(),
            basis: truncate(&p.recommendation_basis, 60),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PositionListOutput {
    pub positions: Vec<PositionRow>,
    pub total: usize,
}

impl CommandOutput for PositionListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["company", "recommendation", "since", "changes", "basis"]);
        for row in &self.positions {
            table.add_row(vec![
                row.company.clone(),
                colorize_recommendation(&row.recommendation).to_string(),
                row.since.clone(),
                row.changes.to_string(),
                row.basis.clone(),
            ]);
        }
        render_list("position", &table, self.total)
    }
}

#[derive(Debug, Serialize)]
pub struct PositionDetailOutput {
    #[serde(flatten)]
    pub position: Position,
}

impl CommandOutput for PositionDetailOutput {
    fn to_human(&self) -> String {
        let p = &self.position;
        let title = match &p.company_name {
            Some(name) => format!("{name} ({})", p.company_symbol),
            None => p.company_symbol.clone(),
        };
        DetailView::new(&title)
            .field("Recommendation", colorize_recommendation(p.current_recommendation.as_str()))
            .field("Since", timestamp_opt(p.recommendation_date.as_ref()))
            .field_opt("Timeframe", p.recommendation_timeframe.map(|t| t.as_str()))
            .field_opt("Confidence", p.recommendation_confidence.map(|c| format!("{:.0}%", c * 100.0)))
            .field_opt("Assessment", p.recommendation_assessment_id)
            .field("Basis", truncate(&p.recommendation_basis, 200))
            .section("History")
            .items(p.history.iter().rev().map(|r| {
                format!("{}  {:<5}  {}", timestamp(&r.date), r.recommendation.as_str(), truncate(&r.basis, 80))
            }))
            .render()
    }
}

pub async fn execute(args: PositionArgs, config: &Config, json_mode: bool) -> Result<()> {
    let store = StoreContext::open(config).await?;
    let repo = store.repositories.positions.clone();

    match args.command {
        PositionCommands::List => {
            let positions = repo.list().await?;
            let out = PositionListOutput {
                total: positions.len(),
                positions: positions.iter().map(PositionRow::from).collect(),
            };
            output(&out, json_mode);
        }
        PositionCommands::Show { symbol } => {
            let symbol = symbol.trim().to_uppercase();
            let position = repo.get(&symbol).await?.with_context(|| format!("No position for {symbol}"))?;
            output(&PositionDetailOutput { position }, json_mode);
        }
    }
    Ok(())
}
