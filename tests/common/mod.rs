//! Shared fixtures for integration tests.
//!
//! Builds a fully wired pipeline over an in-memory database with a scripted
//! reasoning capability and a recording delivery channel.

#![allow(dead_code)]

use std::sync::Arc;

use sqlx::SqlitePool;
use uuid::Uuid;

use equiwatch::adapters::capabilities::ScriptedCapability;
use equiwatch::adapters::delivery::RecordingChannel;
use equiwatch::adapters::sqlite::create_migrated_test_pool;
use equiwatch::domain::models::{
    Config, RetryConfig, Trigger, TriggerCandidate, TriggerStatus, WatchedCompany, WatchedSector, WatchlistConfig,
};
use equiwatch::services::{Collaborators, IngestOutcome, Pipeline, Repositories};

pub struct TestPipeline {
    pub pipeline: Pipeline,
    pub capability: Arc<ScriptedCapability>,
    pub channel: Arc<RecordingChannel>,
}

/// Capital Goods with "revenue" and "order" keywords; INOXWIND is the only
/// watched company.
pub fn watchlist() -> WatchlistConfig {
    WatchlistConfig {
        sectors: vec![WatchedSector {
            name: "Capital Goods".to_string(),
            keywords: vec!["revenue".to_string(), "order".to_string()],
        }],
        companies: vec![WatchedCompany {
            symbol: "INOXWIND".to_string(),
            name: "Inox Wind Limited".to_string(),
            sector: Some("Capital Goods".to_string()),
            aliases: vec!["Inox Wind".to_string()],
            monitoring_active: true,
        }],
        global_keywords: vec![],
    }
}

/// No retries and tight timings so failure paths finish quickly.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.retry = RetryConfig { max_retries: 0, initial_backoff_ms: 1, max_backoff_ms: 1 };
    config.pipeline.max_concurrent_triggers = 4;
    config.pipeline.poll_interval_secs = 1;
    config.pipeline.shutdown_grace_secs = 5;
    config.llm.timeout_secs = 5;
    config.gate.timeout_secs = 5;
    config
}

pub async fn pipeline_with(capability: ScriptedCapability) -> TestPipeline {
    let pool = create_migrated_test_pool().await.expect("test pool");
    pipeline_on(&pool, Arc::new(capability))
}

/// A pipeline over an existing pool, standing in for one worker process.
pub fn pipeline_on(pool: &SqlitePool, capability: Arc<ScriptedCapability>) -> TestPipeline {
    let channel = Arc::new(RecordingChannel::new("recording"));
    let collaborators = Collaborators::new(capability.clone()).with_channel(channel.clone());
    let pipeline = Pipeline::assemble(&test_config(), &watchlist(), Repositories::sqlite(pool), collaborators);
    TestPipeline { pipeline, capability, channel }
}

pub async fn pipeline() -> TestPipeline {
    pipeline_with(ScriptedCapability::new()).await
}

impl TestPipeline {
    pub async fn submit(&self, candidate: TriggerCandidate) -> Uuid {
        match self.pipeline.ingest.submit(candidate).await.expect("submit") {
            IngestOutcome::Accepted(id) => id,
            other => panic!("expected acceptance, got {other:?}"),
        }
    }

    pub async fn trigger(&self, id: Uuid) -> Trigger {
        self.pipeline.repositories.triggers.get(id).await.expect("load").expect("trigger exists")
    }

    pub async fn statuses(&self, id: Uuid) -> Vec<TriggerStatus> {
        self.trigger(id).await.status_history.iter().map(|h| h.status).collect()
    }
}

/// An automated trigger about the watched company.
pub fn watched(content: &str) -> TriggerCandidate {
    TriggerCandidate::automated(content).with_company("INOXWIND", "Inox Wind Limited")
}
