//! Pipeline services.

pub mod cost_tracker;
pub mod decision_assessor;
pub mod gate_classifier;
pub mod historical_context;
pub mod ingest;
pub mod investigation_builder;
pub mod pipeline;
pub mod report_emitter;
pub mod retry;
pub mod trigger_orchestrator;
pub mod watchlist_filter;

pub use cost_tracker::CostTracker;
pub use decision_assessor::{CompanyLocks, DecisionAssessor};
pub use gate_classifier::GateClassifier;
pub use historical_context::{HistoricalContext, HistoricalContextAggregator};
pub use ingest::{IngestOutcome, IngestService};
pub use investigation_builder::InvestigationBuilder;
pub use pipeline::{Collaborators, Pipeline, Repositories};
pub use report_emitter::ReportEmitter;
pub use retry::RetryPolicy;
pub use trigger_orchestrator::{BatchSummary, PipelineStages, PipelineStats, ProcessOutcome, TriggerOrchestrator};
pub use watchlist_filter::{FilterMethod, FilterResult, WatchlistFilter};
