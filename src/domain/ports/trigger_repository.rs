//! Trigger repository port.

use async_trait::async_trait;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{GateDecision, Trigger, TriggerOrigin, TriggerStatus};

/// Filters for listing triggers
#[derive(Default, Debug, Clone)]
pub struct TriggerFilter {
    pub status: Option<TriggerStatus>,
    pub origin: Option<TriggerOrigin>,
    pub company_symbol: Option<String>,
    pub limit: Option<usize>,
}

/// A requested status change.
#[derive(Debug, Clone)]
pub struct StatusChange<'a> {
    pub from: TriggerStatus,
    pub to: TriggerStatus,
    pub reason: &'a str,
    pub gate_result: Option<&'a GateDecision>,
}

#[async_trait]
pub trait TriggerRepository: Send + Sync {
    /// Insert a new trigger with its first history entry.
    ///
    /// Returns `false` without writing when the dedup key already exists.
    async fn create(&self, trigger: &Trigger) -> DomainResult<bool>;

    async fn get(&self, id: Uuid) -> DomainResult<Option<Trigger>>;

    /// Compare-and-swap the status and append the history entry, atomically.
    ///
    /// Fails with `StatusConflict` when the trigger is no longer in
    /// `change.from`, and with `InvalidStateTransition` when the edge itself
    /// is not allowed.
    async fn transition(&self, id: Uuid, change: StatusChange<'_>) -> DomainResult<()>;

    /// Fill in the company a trigger turned out to be about.
    async fn assign_company(&self, id: Uuid, symbol: &str, name: Option<&str>) -> DomainResult<()>;

    /// Newest first.
    async fn list(&self, filter: TriggerFilter) -> DomainResult<Vec<Trigger>>;

    /// Triggers the orchestrator can act on: high priority first, then oldest.
    async fn list_actionable(&self, limit: usize) -> DomainResult<Vec<Trigger>>;

    async fn count_by_status(&self) -> DomainResult<HashMap<TriggerStatus, u64>>;

    async fn count_by_origin(&self) -> DomainResult<HashMap<TriggerOrigin, u64>>;
}
