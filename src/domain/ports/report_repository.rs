//! Report repository port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{DeliveryAttempt, DeliveryStatus, Report, ReportFeedback, TokenUsage};

/// Delivery result written once per report.
#[derive(Debug, Clone)]
pub struct DeliveryRecord {
    pub status: DeliveryStatus,
    pub delivered_via: Vec<String>,
    pub attempts: Vec<DeliveryAttempt>,
    pub delivered_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait ReportRepository: Send + Sync {
    async fn create(&self, report: &Report) -> DomainResult<()>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<Report>>;

    async fn get_by_assessment(&self, assessment_id: Uuid) -> DomainResult<Option<Report>>;

    /// Newest first, optionally for one company.
    async fn list(&self, company_symbol: Option<&str>, limit: usize) -> DomainResult<Vec<Report>>;

    /// Only a `generated` report accepts a delivery record.
    async fn record_delivery(&self, id: Uuid, record: &DeliveryRecord) -> DomainResult<()>;

    async fn record_feedback(&self, id: Uuid, feedback: &ReportFeedback) -> DomainResult<()>;

    async fn usage_by_model(
        &self,
        since: &DateTime<Utc>,
        until: &DateTime<Utc>,
    ) -> DomainResult<Vec<(String, TokenUsage)>>;

    /// Reports created in the window that were generated or delivered.
    async fn count_completed(&self, since: &DateTime<Utc>, until: &DateTime<Utc>) -> DomainResult<u64>;
}
