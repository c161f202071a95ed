//! Equiwatch CLI entry point.

use std::path::Path;

use anyhow::Result;
use clap::Parser;

use equiwatch::cli::{commands, handle_error, Cli, Commands};
use equiwatch::domain::models::Config;
use equiwatch::infrastructure::config::ConfigLoader;
use equiwatch::infrastructure::logging::{LogConfig, LoggerImpl};

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

fn init_logging(config: &Config, verbose: bool, quiet: bool) -> Result<LoggerImpl> {
    let mut log_config = LogConfig::from_settings(&config.logging)?;
    if verbose {
        log_config.level = "debug".to_string();
    } else if quiet {
        log_config = log_config.quiet();
    }
    LoggerImpl::init(&log_config)
}

async fn dispatch(cli: Cli) -> Result<()> {
    let Cli { command, json, config: config_path, verbose } = cli;
    let command = match command {
        Commands::Init(args) => return commands::init::execute(args, json).await,
        other => other,
    };

    let config = load_config(config_path.as_deref())?;
    let _logger = init_logging(&config, verbose, command.is_query())?;

    match command {
        Commands::Init(args) => commands::init::execute(args, json).await,
        Commands::Trigger(args) => commands::trigger::execute(args, &config, json).await,
        Commands::Run(args) => commands::run::execute(args, &config, json).await,
        Commands::Investigation(args) => commands::investigation::execute(args, &config, json).await,
        Commands::Assessment(args) => commands::assessment::execute(args, &config, json).await,
        Commands::Position(args) => commands::position::execute(args, &config, json).await,
        Commands::Report(args) => commands::report::execute(args, &config, json).await,
        Commands::Costs(args) => commands::costs::execute(args, &config, json).await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(err) = dispatch(cli).await {
        handle_error(&err, json);
    }
}
