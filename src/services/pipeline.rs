//! Wiring: builds every pipeline service from config and its collaborators.

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;

use crate::adapters::sqlite::{
    SqliteAssessmentRepository, SqliteInvestigationRepository, SqlitePositionRepository, SqliteReportRepository,
    SqliteTriggerRepository,
};
use crate::domain::models::{Config, WatchlistConfig};
use crate::domain::ports::{
    AssessmentRepository, DeliveryChannel, DocumentSource, InvestigationRepository, MarketData,
    PositionRepository, ReasoningCapability, ReportRepository, SemanticSearch, TriggerRepository, WebSearch,
};
use crate::services::decision_assessor::{CompanyLocks, DecisionAssessor};
use crate::services::gate_classifier::GateClassifier;
use crate::services::historical_context::HistoricalContextAggregator;
use crate::services::ingest::IngestService;
use crate::services::investigation_builder::InvestigationBuilder;
use crate::services::report_emitter::ReportEmitter;
use crate::services::retry::RetryPolicy;
use crate::services::trigger_orchestrator::{PipelineStages, TriggerOrchestrator};
use crate::services::watchlist_filter::WatchlistFilter;

/// Every store the pipeline reads or writes.
#[derive(Clone)]
pub struct Repositories {
    pub triggers: Arc<dyn TriggerRepository>,
    pub investigations: Arc<dyn InvestigationRepository>,
    pub assessments: Arc<dyn AssessmentRepository>,
    pub positions: Arc<dyn PositionRepository>,
    pub reports: Arc<dyn ReportRepository>,
}

impl Repositories {
    pub fn sqlite(pool: &SqlitePool) -> Self {
        Self {
            triggers: Arc::new(SqliteTriggerRepository::new(pool.clone())),
            investigations: Arc::new(SqliteInvestigationRepository::new(pool.clone())),
            assessments: Arc::new(SqliteAssessmentRepository::new(pool.clone())),
            positions: Arc::new(SqlitePositionRepository::new(pool.clone())),
            reports: Arc::new(SqliteReportRepository::new(pool.clone())),
        }
    }
}

/// External services; everything except the capability is optional.
pub struct Collaborators {
    pub capability: Arc<dyn ReasoningCapability>,
    pub channels: Vec<Arc<dyn DeliveryChannel>>,
    pub documents: Option<Arc<dyn DocumentSource>>,
    pub web_search: Option<Arc<dyn WebSearch>>,
    pub market_data: Option<Arc<dyn MarketData>>,
    pub semantic_search: Option<Arc<dyn SemanticSearch>>,
}

impl Collaborators {
    pub fn new(capability: Arc<dyn ReasoningCapability>) -> Self {
        Self {
            capability,
            channels: Vec::new(),
            documents: None,
            web_search: None,
            market_data: None,
            semantic_search: None,
        }
    }

    #[must_use]
    pub fn with_channel(mut self, channel: Arc<dyn DeliveryChannel>) -> Self {
        self.channels.push(channel);
        self
    }
}

/// The assembled pipeline: ingest plus the orchestrator.
pub struct Pipeline {
    pub ingest: IngestService,
    pub orchestrator: Arc<TriggerOrchestrator>,
    pub repositories: Repositories,
}

impl Pipeline {
    pub fn assemble(
        config: &Config,
        watchlist: &WatchlistConfig,
        repositories: Repositories,
        collaborators: Collaborators,
    ) -> Self {
        let retry = RetryPolicy::from(&config.retry);
        let call_timeout = Duration::from_secs(config.llm.timeout_secs);
        let capability = collaborators.capability;

        let mut history =
            HistoricalContextAggregator::new(repositories.investigations.clone(), config.pipeline.history_limit);
        if let Some(search) = collaborators.semantic_search {
            history = history.with_semantic_search(
                search,
                config.enrichment.similar_limit,
                Duration::from_secs(config.enrichment.timeout_secs),
            );
        }
        let history = Arc::new(history);

        let mut builder = InvestigationBuilder::new(
            capability.clone(),
            repositories.investigations.clone(),
            history.clone(),
            config.enrichment.clone(),
            retry.clone(),
            call_timeout,
        );
        if let Some(documents) = collaborators.documents {
            builder = builder.with_document_source(documents);
        }
        if let Some(web_search) = collaborators.web_search {
            builder = builder.with_web_search(web_search);
        }
        if let Some(market_data) = collaborators.market_data {
            builder = builder.with_market_data(market_data);
        }

        let assessor = DecisionAssessor::new(
            capability.clone(),
            repositories.assessments.clone(),
            repositories.positions.clone(),
            history,
            retry.clone(),
            call_timeout,
        )
        .with_locks(Arc::new(CompanyLocks::new()));

        let emitter = ReportEmitter::new(
            capability.clone(),
            repositories.reports.clone(),
            collaborators.channels,
            retry.clone(),
            call_timeout,
            Duration::from_secs(config.delivery.timeout_secs),
        );

        let stages = PipelineStages {
            filter: WatchlistFilter::new(watchlist),
            gate: GateClassifier::new(capability, config.gate.clone(), retry),
            builder,
            assessor,
            emitter,
        };

        Self {
            ingest: IngestService::new(repositories.triggers.clone()),
            orchestrator: Arc::new(TriggerOrchestrator::new(
                repositories.triggers.clone(),
                stages,
                config.pipeline.clone(),
            )),
            repositories,
        }
    }
}
