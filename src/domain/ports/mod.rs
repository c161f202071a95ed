//! Ports: traits implemented by adapters.

pub mod assessment_repository;
pub mod capability;
pub mod delivery;
pub mod enrichment;
pub mod investigation_repository;
pub mod position_repository;
pub mod report_repository;
pub mod trigger_repository;

pub use assessment_repository::AssessmentRepository;
pub use capability::{
    CapabilityError, ClassifyRequest, DecisionRequest, ReasoningCapability, ReportRequest, Stage,
    StructuredOutput, SynthesisRequest,
};
pub use delivery::{DeliveryChannel, DeliveryError};
pub use enrichment::{DocumentSource, MarketData, SemanticSearch, WebSearch};
pub use investigation_repository::InvestigationRepository;
pub use position_repository::PositionRepository;
pub use report_repository::{DeliveryRecord, ReportRepository};
pub use trigger_repository::{StatusChange, TriggerFilter, TriggerRepository};
