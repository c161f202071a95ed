//! Builds what commands need from the loaded configuration.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::debug;

use crate::adapters::capabilities;
use crate::adapters::delivery::{LogChannel, SlackWebhookChannel};
use crate::adapters::sqlite::{database_url, initialize_database, PoolConfig};
use crate::domain::models::{Config, WatchlistConfig};
use crate::infrastructure::config::ConfigLoader;
use crate::services::{Collaborators, Pipeline, Repositories};

/// Open the configured database, applying pending migrations.
pub async fn open_database(config: &Config) -> Result<SqlitePool> {
    initialize_database(&database_url(&config.database.path), Some(PoolConfig::from(&config.database)))
        .await
        .with_context(|| {
            format!("Failed to open database at {}. Run 'equiwatch init' first.", config.database.path)
        })
}

/// Everything read-only commands need.
pub struct StoreContext {
    pub pool: SqlitePool,
    pub repositories: Repositories,
}

impl StoreContext {
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = open_database(config).await?;
        let repositories = Repositories::sqlite(&pool);
        Ok(Self { pool, repositories })
    }
}

/// The fully wired pipeline for commands that process triggers.
pub struct PipelineContext {
    pub pool: SqlitePool,
    pub watchlist: WatchlistConfig,
    pub pipeline: Pipeline,
}

impl PipelineContext {
    pub async fn open(config: &Config) -> Result<Self> {
        let watchlist = ConfigLoader::load_watchlist(&config.watchlist_path)
            .with_context(|| format!("Failed to load watchlist from {}", config.watchlist_path))?;
        let pool = open_database(config).await?;

        let capability = capabilities::from_config(&config.llm, &config.rate_limit)
            .context("Failed to configure reasoning provider")?;
        let mut collaborators = Collaborators::new(capability);

        if let Some(url) = &config.delivery.slack_webhook_url {
            let slack = SlackWebhookChannel::new(url.clone(), Duration::from_secs(config.delivery.timeout_secs))
                .context("Failed to configure Slack delivery")?;
            collaborators = collaborators.with_channel(Arc::new(slack));
        }
        if config.delivery.log_reports {
            collaborators = collaborators.with_channel(Arc::new(LogChannel::new()));
        }

        let pipeline = Pipeline::assemble(config, &watchlist, Repositories::sqlite(&pool), collaborators);
        debug!(
            companies = watchlist.companies.len(),
            sectors = watchlist.sectors.len(),
            channels = ?pipeline.orchestrator.channel_names(),
            "pipeline assembled"
        );
        Ok(Self { pool, watchlist, pipeline })
    }
}
