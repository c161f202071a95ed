pub mod config;
pub mod decision;
pub mod investigation;
pub mod position;
pub mod report;
pub mod trigger;
pub mod usage;
pub mod watchlist;

pub use config::{
    Config, DatabaseConfig, DeliveryConfig, EnrichmentConfig, GateConfig, LlmConfig, LoggingConfig,
    PipelineConfig, RateLimitConfig, RetryConfig,
};
pub use decision::{DecisionAssessment, PositionState, Recommendation, Timeframe};
pub use investigation::{
    ExtractedMetric, ForwardStatement, HistoricalSnapshot, Investigation, InvestigationSummary,
    MarketDataSnapshot,
    ParseIssue, SignificanceLevel, SimilarMaterial, WebSearchHit,
};
pub use position::{Position, RecommendationRecord};
pub use report::{DeliveryAttempt, DeliveryStatus, FeedbackRating, Report, ReportFeedback};
pub use trigger::{
    GateDecision, GateMethod, StatusTransition, Trigger, TriggerCandidate, TriggerOrigin,
    TriggerPriority, TriggerStatus,
};
pub use usage::{CostSummary, ModelPricing, ModelUsage, TokenUsage};
pub use watchlist::{WatchedCompany, WatchedSector, WatchlistConfig};
