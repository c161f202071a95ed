//! Position repository port. Writes go through `AssessmentRepository::commit`.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::Position;

#[async_trait]
pub trait PositionRepository: Send + Sync {
    async fn get(&self, company_symbol: &str) -> DomainResult<Option<Position>>;

    async fn list(&self) -> DomainResult<Vec<Position>>;
}
