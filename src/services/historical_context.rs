//! Historical context aggregation for a company.
//!
//! Past investigations come from the store; the inconclusive subset is the
//! derived query (significant, high or medium, recommendation unchanged).
//! Semantic search is best-effort and only ever costs a recorded gap.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::errors::DomainResult;
use crate::domain::models::{HistoricalSnapshot, Investigation, InvestigationSummary, SimilarMaterial};
use crate::domain::ports::{InvestigationRepository, SemanticSearch};

/// Synthesis text kept per past investigation in prompts.
const SUMMARY_CHARS: usize = 400;

#[derive(Debug, Clone, Default)]
pub struct HistoricalContext {
    /// Newest first
    pub past_investigations: Vec<Investigation>,
    /// Significant findings whose assessment left the recommendation alone
    pub past_inconclusive: Vec<Investigation>,
    pub similar_material: Vec<SimilarMaterial>,
    pub gaps: Vec<String>,
}

impl HistoricalContext {
    pub fn is_empty(&self) -> bool {
        self.past_investigations.is_empty() && self.past_inconclusive.is_empty() && self.similar_material.is_empty()
    }

    pub fn past_summaries(&self) -> Vec<InvestigationSummary> {
        self.past_investigations.iter().map(|i| i.summary(SUMMARY_CHARS)).collect()
    }

    pub fn inconclusive_summaries(&self) -> Vec<InvestigationSummary> {
        self.past_inconclusive.iter().map(|i| i.summary(SUMMARY_CHARS)).collect()
    }

    pub fn past_ids(&self) -> Vec<Uuid> {
        self.past_investigations.iter().map(|i| i.id).collect()
    }

    pub fn inconclusive_ids(&self) -> Vec<Uuid> {
        self.past_inconclusive.iter().map(|i| i.id).collect()
    }

    /// What gets frozen into the investigation record.
    pub fn snapshot(&self) -> HistoricalSnapshot {
        HistoricalSnapshot {
            past_investigation_ids: self.past_ids(),
            inconclusive_ids: self.inconclusive_ids(),
            similar_material: self.similar_material.clone(),
        }
    }
}

pub struct HistoricalContextAggregator {
    investigations: Arc<dyn InvestigationRepository>,
    semantic_search: Option<Arc<dyn SemanticSearch>>,
    history_limit: usize,
    similar_limit: usize,
    search_timeout: Duration,
}

impl HistoricalContextAggregator {
    pub fn new(investigations: Arc<dyn InvestigationRepository>, history_limit: usize) -> Self {
        Self {
            investigations,
            semantic_search: None,
            history_limit,
            similar_limit: 5,
            search_timeout: Duration::from_secs(15),
        }
    }

    pub fn with_semantic_search(
        mut self,
        search: Arc<dyn SemanticSearch>,
        similar_limit: usize,
        timeout: Duration,
    ) -> Self {
        self.semantic_search = Some(search);
        self.similar_limit = similar_limit;
        self.search_timeout = timeout;
        self
    }

    /// Gather context for `company_symbol`, leaving out `exclude`.
    ///
    /// Store failures propagate; semantic search failures do not.
    pub async fn gather(&self, company_symbol: Option<&str>, exclude: Option<Uuid>) -> DomainResult<HistoricalContext> {
        let Some(symbol) = company_symbol.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(HistoricalContext::default());
        };
        let symbol = symbol.to_uppercase();

        let past_investigations = self.investigations.list_by_company(&symbol, exclude, self.history_limit).await?;
        let past_inconclusive = self.investigations.list_inconclusive(&symbol, exclude, self.history_limit).await?;

        let mut context = HistoricalContext { past_investigations, past_inconclusive, ..Default::default() };

        if let Some(search) = &self.semantic_search {
            match tokio::time::timeout(self.search_timeout, search.search(&symbol, Some(&symbol), self.similar_limit)).await
            {
                Ok(Ok(material)) => context.similar_material = material,
                Ok(Err(err)) => {
                    warn!(company_symbol = %symbol, error = %err, "semantic search failed");
                    context.gaps.push(format!("similar_material: {err}"));
                }
                Err(_) => {
                    warn!(company_symbol = %symbol, "semantic search timed out");
                    context
                        .gaps
                        .push(format!("similar_material: timed out after {}s", self.search_timeout.as_secs()));
                }
            }
        }

        debug!(
            company_symbol = %symbol,
            past = context.past_investigations.len(),
            inconclusive = context.past_inconclusive.len(),
            similar = context.similar_material.len(),
            "historical context gathered"
        );
        Ok(context)
    }
}
