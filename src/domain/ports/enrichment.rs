//! Enrichment ports: document text, web search, market data and semantic
//! search over prior material.
//!
//! Web search and market data never fail; an unavailable source simply
//! returns nothing and the investigation records the gap.

use async_trait::async_trait;

use crate::domain::models::{MarketDataSnapshot, SimilarMaterial, Trigger, WebSearchHit};
use crate::domain::ports::capability::CapabilityError;

/// Fetches and extracts the announcement's full text.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// `None` when no better text than the trigger content is available.
    async fn extract_text(&self, trigger: &Trigger) -> Option<String>;
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Vec<WebSearchHit>;
}

#[async_trait]
pub trait MarketData: Send + Sync {
    async fn snapshot(&self, symbol: &str) -> Option<MarketDataSnapshot>;
}

/// Vector search over previously ingested documents.
#[async_trait]
pub trait SemanticSearch: Send + Sync {
    async fn search(
        &self,
        query: &str,
        company_symbol: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SimilarMaterial>, CapabilityError>;
}
