//! Investigation builder: enrichment, one synthesis call, per-field parsing.
//!
//! Enrichment never fails the stage. The synthesis call does, once retries
//! are spent. After that every output field is parsed on its own so one
//! malformed field costs only that field.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::domain::errors::DomainResult;
use crate::domain::models::{
    EnrichmentConfig, ExtractedMetric, ForwardStatement, Investigation, MarketDataSnapshot, ParseIssue,
    SignificanceLevel, Trigger, WebSearchHit,
};
use crate::domain::ports::{
    DocumentSource, InvestigationRepository, MarketData, ReasoningCapability, Stage, StructuredOutput,
    SynthesisRequest, WebSearch,
};
use crate::services::historical_context::HistoricalContextAggregator;
use crate::services::retry::RetryPolicy;

pub struct InvestigationBuilder {
    capability: Arc<dyn ReasoningCapability>,
    investigations: Arc<dyn InvestigationRepository>,
    history: Arc<HistoricalContextAggregator>,
    documents: Option<Arc<dyn DocumentSource>>,
    web_search: Option<Arc<dyn WebSearch>>,
    market_data: Option<Arc<dyn MarketData>>,
    config: EnrichmentConfig,
    retry: RetryPolicy,
    call_timeout: Duration,
}

impl InvestigationBuilder {
    pub fn new(
        capability: Arc<dyn ReasoningCapability>,
        investigations: Arc<dyn InvestigationRepository>,
        history: Arc<HistoricalContextAggregator>,
        config: EnrichmentConfig,
        retry: RetryPolicy,
        call_timeout: Duration,
    ) -> Self {
        Self {
            capability,
            investigations,
            history,
            documents: None,
            web_search: None,
            market_data: None,
            config,
            retry,
            call_timeout,
        }
    }

    pub fn with_document_source(mut self, documents: Arc<dyn DocumentSource>) -> Self {
        self.documents = Some(documents);
        self
    }

    pub fn with_web_search(mut self, web_search: Arc<dyn WebSearch>) -> Self {
        self.web_search = Some(web_search);
        self
    }

    pub fn with_market_data(mut self, market_data: Arc<dyn MarketData>) -> Self {
        self.market_data = Some(market_data);
        self
    }

    /// Build and persist the investigation for a trigger.
    #[instrument(skip(self, trigger), fields(trigger_id = %trigger.id, company_symbol = ?trigger.company_symbol))]
    pub async fn build(&self, trigger: &Trigger) -> DomainResult<Investigation> {
        let started = Instant::now();
        let mut investigation =
            Investigation::new(trigger.id, trigger.company_symbol.clone(), trigger.company_name.clone());

        let document_text = self.document_text(trigger).await;
        let history = self.history.gather(trigger.company_symbol.as_deref(), None).await?;
        investigation.enrichment_gaps.extend(history.gaps.iter().cloned());
        investigation.historical_context = history.snapshot();

        let market_data = self.market_snapshot(trigger, &mut investigation.enrichment_gaps).await;
        let web_results = self.web_results(trigger, &mut investigation.enrichment_gaps).await;

        let request = SynthesisRequest {
            company_symbol: trigger.company_symbol.clone(),
            company_name: trigger.company_name.clone(),
            sector: trigger.sector.clone(),
            title: trigger.display_title(),
            document_text,
            human_notes: trigger.human_notes.clone(),
            market_data: market_data.clone(),
            web_results: web_results.clone(),
            past_investigations: history.past_summaries(),
            similar_material: history.similar_material.clone(),
        };

        let output = self
            .retry
            .execute(self.call_timeout, || self.capability.synthesize(&request))
            .await?;

        apply_output(&mut investigation, &output);
        investigation.market_data = market_data;
        investigation.web_search_results = web_results;
        investigation.model_used = self.capability.model(Stage::Analysis);
        investigation.usage = output.usage;
        investigation.processing_ms = started.elapsed().as_millis() as u64;

        for issue in &investigation.parse_issues {
            warn!(field = %issue.field, detail = %issue.detail, "synthesis field could not be parsed");
        }

        self.investigations.create(&investigation).await?;

        info!(
            investigation_id = %investigation.id,
            significance = investigation.significance.as_str(),
            is_significant = investigation.is_significant,
            gaps = investigation.enrichment_gaps.len(),
            parse_issues = investigation.parse_issues.len(),
            model = %investigation.model_used,
            input_tokens = investigation.usage.input_tokens,
            output_tokens = investigation.usage.output_tokens,
            latency_ms = investigation.processing_ms,
            "investigation built"
        );
        Ok(investigation)
    }

    async fn document_text(&self, trigger: &Trigger) -> String {
        if let Some(documents) = &self.documents {
            match self.bounded(documents.extract_text(trigger)).await {
                Some(Some(text)) if !text.trim().is_empty() => return text,
                Some(_) => {}
                None => warn!("document extraction timed out; using trigger content"),
            }
        }
        trigger.raw_content.clone()
    }

    async fn market_snapshot(&self, trigger: &Trigger, gaps: &mut Vec<String>) -> Option<MarketDataSnapshot> {
        let Some(market_data) = &self.market_data else {
            gaps.push("market_data: not configured".to_string());
            return None;
        };
        let Some(symbol) = trigger.company_symbol.as_deref() else {
            gaps.push("market_data: no company symbol".to_string());
            return None;
        };
        match self.bounded(market_data.snapshot(symbol)).await {
            Some(Some(snapshot)) => Some(snapshot),
            Some(None) => {
                gaps.push(format!("market_data: unavailable for {symbol}"));
                None
            }
            None => {
                gaps.push(format!("market_data: timed out after {}s", self.config.timeout_secs));
                None
            }
        }
    }

    async fn web_results(&self, trigger: &Trigger, gaps: &mut Vec<String>) -> Vec<WebSearchHit> {
        let Some(web_search) = &self.web_search else {
            gaps.push("web_search: not configured".to_string());
            return Vec::new();
        };

        let mut hits = Vec::new();
        for query in search_queries(trigger, self.config.web_search_max_queries) {
            match self.bounded(web_search.search(&query, self.config.web_search_max_results)).await {
                Some(found) => hits.extend(found.into_iter().map(|mut hit| {
                    if hit.query.is_empty() {
                        hit.query = query.clone();
                    }
                    hit
                })),
                None => gaps.push(format!("web_search: '{query}' timed out")),
            }
        }
        if hits.is_empty() {
            gaps.push("web_search: no results".to_string());
        }
        hits
    }

    /// `None` when the enrichment call outlived its timeout.
    async fn bounded<T>(&self, fut: impl Future<Output = T>) -> Option<T> {
        tokio::time::timeout(Duration::from_secs(self.config.timeout_secs), fut).await.ok()
    }
}

/// Queries derived from the company and the announcement title.
fn search_queries(trigger: &Trigger, max: usize) -> Vec<String> {
    let title = trigger.display_title();
    let company = trigger
        .company_name
        .as_deref()
        .or(trigger.company_symbol.as_deref())
        .map(str::trim)
        .filter(|c| !c.is_empty());

    let mut queries = Vec::new();
    match company {
        Some(company) => {
            queries.push(format!("{company} {title}"));
            queries.push(format!("{company} latest news"));
            if let Some(symbol) = trigger.company_symbol.as_deref() {
                queries.push(format!("{symbol} share price outlook"));
            }
        }
        None if !title.is_empty() => queries.push(title),
        None => {}
    }
    queries.iter_mut().for_each(|q| *q = q.trim().to_string());
    queries.dedup();
    queries.truncate(max);
    queries
}

fn apply_output(inv: &mut Investigation, output: &StructuredOutput) {
    let issues = &mut inv.parse_issues;

    inv.extracted_metrics = parse_records::<ExtractedMetric>(output, "extracted_metrics", issues);
    inv.forward_statements = parse_records::<ForwardStatement>(output, "forward_statements", issues);
    inv.management_highlights = parse_strings(output, "management_highlights", issues);
    inv.key_findings = parse_strings(output, "key_findings", issues);
    inv.red_flags = parse_strings(output, "red_flags", issues);
    inv.positive_signals = parse_strings(output, "positive_signals", issues);
    inv.synthesis = parse_text(output, "synthesis", true, issues);
    inv.significance_reasoning = parse_text(output, "significance_reasoning", false, issues);

    inv.significance = match output.get("significance") {
        Some(Value::String(s)) => SignificanceLevel::from_str(s).unwrap_or_else(|| {
            issues.push(ParseIssue::new("significance", format!("unknown level '{s}', using noise")));
            SignificanceLevel::Noise
        }),
        Some(other) => {
            issues.push(ParseIssue::new("significance", format!("expected a string, got {other}")));
            SignificanceLevel::Noise
        }
        None => {
            issues.push(ParseIssue::new("significance", "missing, using noise"));
            SignificanceLevel::Noise
        }
    };

    inv.is_significant = match output.get("is_significant") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) if s.trim().eq_ignore_ascii_case("true") => true,
        Some(Value::String(s)) if s.trim().eq_ignore_ascii_case("false") => false,
        Some(other) => {
            issues.push(ParseIssue::new("is_significant", format!("expected a boolean, got {other}")));
            false
        }
        None => {
            issues.push(ParseIssue::new("is_significant", "missing, treating as not significant"));
            false
        }
    };
}

/// Arrays may arrive as JSON or as a string holding JSON.
fn array_field(output: &StructuredOutput, field: &str, issues: &mut Vec<ParseIssue>) -> Vec<Value> {
    match output.get(field) {
        None => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(Value::String(s)) if s.trim().is_empty() => Vec::new(),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Array(items)) => items,
            Ok(_) => {
                issues.push(ParseIssue::new(field, "string does not hold a JSON array"));
                Vec::new()
            }
            Err(e) => {
                issues.push(ParseIssue::new(field, format!("invalid JSON: {e}")));
                Vec::new()
            }
        },
        Some(other) => {
            issues.push(ParseIssue::new(field, format!("expected an array, got {other}")));
            Vec::new()
        }
    }
}

fn parse_strings(output: &StructuredOutput, field: &str, issues: &mut Vec<ParseIssue>) -> Vec<String> {
    let mut values = Vec::new();
    for (idx, item) in array_field(output, field, issues).into_iter().enumerate() {
        match item {
            Value::String(s) if !s.trim().is_empty() => values.push(s.trim().to_string()),
            Value::String(_) | Value::Null => {}
            Value::Number(n) => values.push(n.to_string()),
            Value::Bool(b) => values.push(b.to_string()),
            other => issues.push(ParseIssue::new(format!("{field}[{idx}]"), format!("dropped non-text entry {other}"))),
        }
    }
    values
}

fn parse_records<T: DeserializeOwned>(output: &StructuredOutput, field: &str, issues: &mut Vec<ParseIssue>) -> Vec<T> {
    array_field(output, field, issues)
        .into_iter()
        .enumerate()
        .filter_map(|(idx, item)| match serde_json::from_value::<T>(item) {
            Ok(record) => Some(record),
            Err(e) => {
                issues.push(ParseIssue::new(format!("{field}[{idx}]"), format!("dropped: {e}")));
                None
            }
        })
        .collect()
}

fn parse_text(output: &StructuredOutput, field: &str, required: bool, issues: &mut Vec<ParseIssue>) -> String {
    match output.get(field) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => {
            issues.push(ParseIssue::new(field, format!("expected a string, got {other}")));
            String::new()
        }
        None if required => {
            issues.push(ParseIssue::new(field, "missing"));
            String::new()
        }
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::capabilities::ScriptedCapability;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteInvestigationRepository, SqliteTriggerRepository};
    use crate::domain::errors::DomainError;
    use crate::domain::models::TriggerCandidate;
    use crate::domain::ports::{CapabilityError, TriggerRepository};
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::json;

    struct FixedSearch;

    #[async_trait]
    impl WebSearch for FixedSearch {
        async fn search(&self, query: &str, _max: usize) -> Vec<WebSearchHit> {
            vec![WebSearchHit {
                query: String::new(),
                source: "https://news.test".into(),
                title: format!("hit for {query}"),
                summary: "summary".into(),
                relevance: None,
                sentiment: None,
            }]
        }
    }

    struct FixedMarket;

    #[async_trait]
    impl MarketData for FixedMarket {
        async fn snapshot(&self, symbol: &str) -> Option<MarketDataSnapshot> {
            Some(MarketDataSnapshot {
                symbol: symbol.to_string(),
                price: Some(101.5),
                market_cap: None,
                pe_ratio: Some(21.0),
                week_52_high: None,
                week_52_low: None,
                price_change_1m: None,
                as_of: Utc::now(),
            })
        }
    }

    struct FullText;

    #[async_trait]
    impl DocumentSource for FullText {
        async fn extract_text(&self, _trigger: &Trigger) -> Option<String> {
            Some("Full filing text".into())
        }
    }

    struct Setup {
        investigations: Arc<SqliteInvestigationRepository>,
        trigger: Trigger,
    }

    async fn setup() -> Setup {
        let pool = create_migrated_test_pool().await.unwrap();
        let triggers = SqliteTriggerRepository::new(pool.clone());
        let trigger = Trigger::from_candidate(
            TriggerCandidate::automated("Q3 results").with_company("ACME", "Acme Corp").with_feed_title("Q3 results"),
        );
        triggers.create(&trigger).await.unwrap();
        Setup { investigations: Arc::new(SqliteInvestigationRepository::new(pool)), trigger }
    }

    fn builder(s: &Setup, cap: Arc<ScriptedCapability>) -> InvestigationBuilder {
        let history = Arc::new(HistoricalContextAggregator::new(s.investigations.clone(), 10));
        InvestigationBuilder::new(
            cap,
            s.investigations.clone(),
            history,
            EnrichmentConfig::default(),
            RetryPolicy::none(),
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_build_persists_with_enrichment() {
        let s = setup().await;
        let usage = crate::domain::models::TokenUsage::new(5_200, 880);
        let cap = Arc::new(ScriptedCapability::new().with_usage(usage));
        let b = builder(&s, cap.clone())
            .with_web_search(Arc::new(FixedSearch))
            .with_market_data(Arc::new(FixedMarket))
            .with_document_source(Arc::new(FullText));

        let inv = b.build(&s.trigger).await.unwrap();
        assert_eq!(inv.significance, SignificanceLevel::High);
        assert!(inv.is_significant);
        assert_eq!(inv.extracted_metrics.len(), 1);
        assert_eq!(inv.web_search_results.len(), 3);
        assert_eq!(inv.web_search_results[0].query, "Acme Corp Q3 results");
        assert!(inv.market_data.is_some());
        assert!(inv.enrichment_gaps.is_empty());
        assert!(inv.parse_issues.is_empty());
        assert_eq!(inv.model_used, "scripted-analysis");
        assert_eq!(inv.usage, usage);

        let request = &cap.synthesis_requests().await[0];
        assert_eq!(request.document_text, "Full filing text");

        let stored = s.investigations.get_by_trigger(s.trigger.id).await.unwrap().unwrap();
        assert_eq!(stored, inv);
    }

    #[tokio::test]
    async fn test_missing_enrichment_recorded_as_gaps() {
        let s = setup().await;
        let inv = builder(&s, Arc::new(ScriptedCapability::new())).build(&s.trigger).await.unwrap();
        assert!(inv.enrichment_gaps.iter().any(|g| g.starts_with("market_data")));
        assert!(inv.enrichment_gaps.iter().any(|g| g.starts_with("web_search")));
        assert!(inv.is_significant);
    }

    #[tokio::test]
    async fn test_malformed_fields_degrade_individually() {
        let s = setup().await;
        let output = json!({
            "extracted_metrics": "[{\"name\": \"revenue\", \"value\": 10.0}, {\"value\": \"oops\"}]",
            "key_findings": "not json",
            "red_flags": ["late filing", {"nested": true}],
            "synthesis": "Mixed quarter",
            "significance": "critical",
            "is_significant": "maybe"
        });
        let cap = Arc::new(ScriptedCapability::new().with_response(Stage::Analysis, Ok(output.into())));
        let inv = builder(&s, cap).build(&s.trigger).await.unwrap();

        assert_eq!(inv.extracted_metrics.len(), 1);
        assert!(inv.has_parse_issue("extracted_metrics[1]"));
        assert!(inv.key_findings.is_empty());
        assert!(inv.has_parse_issue("key_findings"));
        assert_eq!(inv.red_flags, vec!["late filing".to_string()]);
        assert!(inv.has_parse_issue("red_flags[1]"));
        assert_eq!(inv.synthesis, "Mixed quarter");
        assert_eq!(inv.significance, SignificanceLevel::Noise);
        assert!(inv.has_parse_issue("significance"));
        assert!(!inv.is_significant);
        assert!(inv.has_parse_issue("is_significant"));
    }

    #[tokio::test]
    async fn test_synthesis_failure_is_hard_error() {
        let s = setup().await;
        let cap = Arc::new(
            ScriptedCapability::new().with_default(Stage::Analysis, Err(CapabilityError::Timeout(120))),
        );
        let err = builder(&s, cap).build(&s.trigger).await.unwrap_err();
        assert!(matches!(err, DomainError::Capability(_)));
        assert!(s.investigations.get_by_trigger(s.trigger.id).await.unwrap().is_none());
    }

    #[test]
    fn test_search_queries() {
        let t = Trigger::from_candidate(
            TriggerCandidate::automated("Order win").with_company("ACME", "Acme Corp"),
        );
        assert_eq!(
            search_queries(&t, 5),
            vec!["Acme Corp Order win", "Acme Corp latest news", "ACME share price outlook"]
        );
        assert_eq!(search_queries(&t, 1).len(), 1);

        let anonymous = Trigger::from_candidate(TriggerCandidate::automated("Order win"));
        assert_eq!(search_queries(&anonymous, 3), vec!["Order win"]);
    }
}
