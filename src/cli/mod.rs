//! Command-line interface.

pub mod commands;
pub mod context;
pub mod display;
pub mod id_resolver;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use console::style;

use commands::assessment::AssessmentArgs;
use commands::costs::CostsArgs;
use commands::init::InitArgs;
use commands::investigation::InvestigationArgs;
use commands::position::PositionArgs;
use commands::report::ReportArgs;
use commands::run::RunArgs;
use commands::trigger::TriggerArgs;

#[derive(Parser, Debug)]
#[command(name = "equiwatch")]
#[command(about = "Equiwatch - announcement triage, assessment and reporting for watched companies", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Config file to use instead of the .equiwatch/ hierarchy
    #[arg(long, global = true, env = "EQUIWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create .equiwatch/ with config, a sample watchlist and the database
    Init(InitArgs),

    /// Submit and inspect triggers
    Trigger(TriggerArgs),

    /// Process the trigger backlog
    Run(RunArgs),

    /// Inspect investigations
    Investigation(InvestigationArgs),

    /// Inspect decision assessments
    Assessment(AssessmentArgs),

    /// Standing recommendation per company
    Position(PositionArgs),

    /// Inspect reports and record feedback
    Report(ReportArgs),

    /// Token usage and estimated LLM cost for a time window
    Costs(CostsArgs),
}

impl Commands {
    /// Commands whose main output is a table or record on stdout.
    pub const fn is_query(&self) -> bool {
        !matches!(self, Self::Run(_))
    }
}

/// Print a command failure and exit non-zero.
pub fn handle_error(err: &anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let chain: Vec<String> = err.chain().skip(1).map(ToString::to_string).collect();
        let body = serde_json::json!({ "success": false, "error": err.to_string(), "caused_by": chain });
        println!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("{} {err}", style("Error:").red().bold());
        for cause in err.chain().skip(1) {
            eprintln!("  {} {cause}", style("caused by:").dim());
        }
    }
    std::process::exit(1)
}
