//! Decision assessment repository port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{DecisionAssessment, Position, TokenUsage};

#[async_trait]
pub trait AssessmentRepository: Send + Sync {
    /// Persist an assessment together with the position it produced.
    ///
    /// The position's `version` is the version that was read; a mismatch
    /// rolls back both writes with `ConcurrencyConflict`.
    async fn commit(&self, assessment: &DecisionAssessment, position: Option<&Position>) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<DecisionAssessment>>;

    async fn get_by_investigation(&self, investigation_id: Uuid) -> DomainResult<Option<DecisionAssessment>>;

    /// Oldest first.
    async fn list_by_company(&self, company_symbol: &str) -> DomainResult<Vec<DecisionAssessment>>;

    async fn list_recent(&self, limit: usize) -> DomainResult<Vec<DecisionAssessment>>;

    async fn usage_by_model(
        &self,
        since: &DateTime<Utc>,
        until: &DateTime<Utc>,
    ) -> DomainResult<Vec<(String, TokenUsage)>>;
}
