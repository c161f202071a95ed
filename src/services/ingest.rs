//! Deduplicating ingest gate.

use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Trigger, TriggerCandidate};
use crate::domain::ports::TriggerRepository;

/// What happened to a submitted candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Accepted(Uuid),
    /// A trigger with the same dedup key already exists; nothing was written.
    Duplicate { dedup_key: String },
}

impl IngestOutcome {
    pub fn trigger_id(&self) -> Option<Uuid> {
        match self {
            Self::Accepted(id) => Some(*id),
            Self::Duplicate { .. } => None,
        }
    }
}

pub struct IngestService {
    triggers: Arc<dyn TriggerRepository>,
}

impl IngestService {
    pub fn new(triggers: Arc<dyn TriggerRepository>) -> Self {
        Self { triggers }
    }

    /// Persist a candidate unless its dedup key has been seen before.
    ///
    /// Uniqueness is enforced by the store at insert time, so concurrent
    /// submissions of the same key persist exactly one trigger.
    pub async fn submit(&self, candidate: TriggerCandidate) -> DomainResult<IngestOutcome> {
        if candidate.raw_content.trim().is_empty() {
            return Err(DomainError::ValidationFailed("trigger content cannot be empty".to_string()));
        }

        let trigger = Trigger::from_candidate(candidate);
        if self.triggers.create(&trigger).await? {
            info!(
                trigger_id = %trigger.id,
                origin = trigger.origin.as_str(),
                status = %trigger.status,
                company_symbol = trigger.company_symbol.as_deref().unwrap_or(""),
                "trigger ingested"
            );
            return Ok(IngestOutcome::Accepted(trigger.id));
        }

        let dedup_key = trigger.dedup_key.unwrap_or_default();
        debug!(dedup_key = %dedup_key, "duplicate trigger dropped");
        Ok(IngestOutcome::Duplicate { dedup_key })
    }
}
