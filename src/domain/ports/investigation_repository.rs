//! Investigation repository port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Investigation, TokenUsage};

#[async_trait]
pub trait InvestigationRepository: Send + Sync {
    /// Investigations are immutable; a second one for the same trigger fails.
    async fn create(&self, investigation: &Investigation) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<Investigation>>;

    async fn get_by_trigger(&self, trigger_id: Uuid) -> DomainResult<Option<Investigation>>;

    /// Most recent investigations for a company, newest first.
    async fn list_by_company(
        &self,
        company_symbol: &str,
        exclude: Option<Uuid>,
        limit: usize,
    ) -> DomainResult<Vec<Investigation>>;

    /// Significant (high or medium) investigations whose assessment left the
    /// recommendation unchanged, newest first.
    async fn list_inconclusive(
        &self,
        company_symbol: &str,
        exclude: Option<Uuid>,
        limit: usize,
    ) -> DomainResult<Vec<Investigation>>;

    async fn list_recent(&self, limit: usize) -> DomainResult<Vec<Investigation>>;

    /// Token totals per model for investigations created in `[since, until]`.
    async fn usage_by_model(
        &self,
        since: &DateTime<Utc>,
        until: &DateTime<Utc>,
    ) -> DomainResult<Vec<(String, TokenUsage)>>;
}
