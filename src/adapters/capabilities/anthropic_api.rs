//! Anthropic Messages API reasoning capability.
//!
//! One non-streaming request per stage call. Each stage has its own system
//! prompt asking for a single JSON object; the first object in the reply is
//! handed back untouched.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use reqwest::{header, Client};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::domain::models::{LlmConfig, RateLimitConfig, TokenUsage};
use crate::domain::ports::{
    CapabilityError, ClassifyRequest, DecisionRequest, ReasoningCapability, ReportRequest, Stage,
    StructuredOutput, SynthesisRequest,
};

const API_VERSION: &str = "2023-06-01";

const GATE_PROMPT: &str = "You screen corporate announcements for an equity research desk. \
Decide whether the announcement is worth a deeper investment analysis. Routine compliance \
filings, trading window notices and change-of-address letters are not. Results, orders, \
guidance, capacity, management changes and capital actions usually are. Reply with one JSON \
object: {\"is_worth_investigating\": bool, \"reason\": \"short reason\"}.";

const ANALYSIS_PROMPT: &str = "You are an equity analyst. Extract concrete metrics (with values and \
periods), forward-looking statements and management highlights from the document, use the \
web results, market data and past investigations as context, and judge how much the \
announcement matters. Be conservative: omit ambiguous metrics instead of guessing. Reply with \
one JSON object with keys: extracted_metrics (array of {name, value, raw_value, unit, period, \
yoy_change, qoq_change, confidence}), forward_statements (array of {statement, target_metric, \
target_value, target_date, category}), management_highlights, key_findings, red_flags, \
positive_signals (arrays of strings), synthesis (string), significance (one of high, medium, \
low, noise), significance_reasoning (string), is_significant (bool).";

const DECISION_PROMPT: &str = "You maintain a standing recommendation for a company. Given the \
current recommendation, the new investigation and the history (explicitly weigh the past \
inconclusive investigations), decide whether the recommendation should change. Keep \
confidence calibrated. If should_change is false, keep the recommendation aligned with the \
current stance. Reply with one JSON object: {\"should_change\": bool, \"new_recommendation\": \
\"buy|sell|hold|none\", \"timeframe\": \"short_term|medium_term|long_term\", \"confidence\": \
number between 0 and 1, \"reasoning\": string, \"key_factors_for\": [string], \
\"key_factors_against\": [string]}.";

const REPORT_PROMPT: &str = "Write a decision-support report for an investor. Keep the \
recommendation visible near the top, give a 2-3 sentence executive summary, and use short \
markdown sections (Trigger, Findings, Context, Recommendation, Risks, Sources) in the body. \
State that this is decision support, not a trade instruction. Reply with one JSON object: \
{\"title\": string, \"executive_summary\": string, \"report_body\": markdown string, \
\"recommendation_summary\": string}.";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: Option<u64>,
    #[serde(default)]
    cache_read_input_tokens: Option<u64>,
}

impl From<Usage> for TokenUsage {
    /// Cache writes and reads are billed as input.
    fn from(usage: Usage) -> Self {
        let input = usage.input_tokens
            + usage.cache_creation_input_tokens.unwrap_or_default()
            + usage.cache_read_input_tokens.unwrap_or_default();
        TokenUsage::new(input, usage.output_tokens)
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Usage,
}

pub struct AnthropicCapability {
    client: Client,
    config: LlmConfig,
    api_key: String,
    limiter: DefaultDirectRateLimiter,
}

impl AnthropicCapability {
    /// Build the client. The key comes from config, else `ANTHROPIC_API_KEY`.
    pub fn new(config: &LlmConfig, rate_limit: &RateLimitConfig) -> Result<Self, CapabilityError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .ok_or_else(|| CapabilityError::NotConfigured("no API key for the reasoning provider".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CapabilityError::NotConfigured(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client, config: config.clone(), api_key, limiter: rate_limiter(rate_limit) })
    }

    async fn call<R: Serialize + Sync>(
        &self,
        stage: Stage,
        system: &str,
        request: &R,
    ) -> Result<StructuredOutput, CapabilityError> {
        let model = self.model(stage);
        let input = serde_json::to_string_pretty(request).map_err(|e| CapabilityError::Malformed(e.to_string()))?;
        let body = MessagesRequest {
            model: &model,
            max_tokens: self.config.max_tokens,
            system,
            messages: vec![Message { role: "user", content: input }],
        };

        self.limiter.until_ready().await;

        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.base_url.trim_end_matches('/')))
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CapabilityError::Timeout(self.config.timeout_secs)
                } else {
                    CapabilityError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CapabilityError::from_status(status.as_u16(), body));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| CapabilityError::Malformed(format!("failed to parse response: {e}")))?;

        let text = parsed
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        let usage = TokenUsage::from(parsed.usage);
        debug!(
            stage = stage.as_str(),
            model = %model,
            stop_reason = ?parsed.stop_reason,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "capability call complete"
        );
        StructuredOutput::from_text(&text).map(|output| output.with_usage(usage))
    }
}

/// Slowest replenish rate the limiter will use.
const MAX_CALL_PERIOD: Duration = Duration::from_secs(3600);

fn rate_limiter(config: &RateLimitConfig) -> DefaultDirectRateLimiter {
    let burst = NonZeroU32::new(config.burst_size).unwrap_or(NonZeroU32::MIN);
    let rps = if config.requests_per_second.is_finite() && config.requests_per_second > 0.0 {
        config.requests_per_second
    } else {
        1.0
    };
    let period = Duration::try_from_secs_f64(1.0 / rps).map_or(MAX_CALL_PERIOD, |p| p.min(MAX_CALL_PERIOD));
    let quota = Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
        .allow_burst(burst);
    RateLimiter::direct(quota)
}

#[async_trait]
impl ReasoningCapability for AnthropicCapability {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn model(&self, stage: Stage) -> String {
        match stage {
            Stage::Gate => self.config.gate_model.clone(),
            Stage::Analysis => self.config.analysis_model.clone(),
            Stage::Decision => self.config.decision_model.clone(),
            Stage::Report => self.config.report_model.clone(),
        }
    }

    #[instrument(skip_all)]
    async fn classify(&self, request: &ClassifyRequest) -> Result<StructuredOutput, CapabilityError> {
        self.call(Stage::Gate, GATE_PROMPT, request).await
    }

    #[instrument(skip_all)]
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<StructuredOutput, CapabilityError> {
        self.call(Stage::Analysis, ANALYSIS_PROMPT, request).await
    }

    #[instrument(skip_all)]
    async fn decide(&self, request: &DecisionRequest) -> Result<StructuredOutput, CapabilityError> {
        self.call(Stage::Decision, DECISION_PROMPT, request).await
    }

    #[instrument(skip_all)]
    async fn write_report(&self, request: &ReportRequest) -> Result<StructuredOutput, CapabilityError> {
        self.call(Stage::Report, REPORT_PROMPT, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn config(base_url: String) -> LlmConfig {
        LlmConfig { api_key: Some("test-key".into()), base_url, timeout_secs: 5, ..Default::default() }
    }

    fn request() -> ClassifyRequest {
        ClassifyRequest {
            company_symbol: Some("ACME".into()),
            company_name: Some("Acme Corp".into()),
            title: "Q3 results".into(),
            content: "Revenue up 40%".into(),
        }
    }

    #[test]
    fn test_rate_limiter_tolerates_tiny_rates() {
        for rps in [1e-20, f64::MIN_POSITIVE, 0.0, f64::NAN] {
            let limiter = rate_limiter(&RateLimitConfig { requests_per_second: rps, burst_size: 1 });
            assert!(limiter.check().is_ok());
            assert!(limiter.check().is_err());
        }
    }

    #[tokio::test]
    async fn test_classify_parses_fenced_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "test-key")
            .match_header("anthropic-version", API_VERSION)
            .match_body(Matcher::PartialJson(json!({"model": "claude-3-5-haiku-latest"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "content": [{"type": "text", "text": "```json\n{\"is_worth_investigating\": true, \"reason\": \"results\"}\n```"}],
                    "stop_reason": "end_turn"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let cap = AnthropicCapability::new(&config(server.url()), &RateLimitConfig::default()).unwrap();
        let out = cap.classify(&request()).await.unwrap();

        assert_eq!(out.get("is_worth_investigating"), Some(&json!(true)));
        assert!(out.usage.is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_usage_block_is_carried_on_output() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/v1/messages")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "content": [{"type": "text", "text": "{\"is_worth_investigating\": false, \"reason\": \"routine\"}"}],
                    "stop_reason": "end_turn",
                    "usage": {
                        "input_tokens": 812,
                        "output_tokens": 41,
                        "cache_creation_input_tokens": 100,
                        "cache_read_input_tokens": null
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let cap = AnthropicCapability::new(&config(server.url()), &RateLimitConfig::default()).unwrap();
        let out = cap.classify(&request()).await.unwrap();

        assert_eq!(out.usage, TokenUsage::new(912, 41));
        assert_eq!(out.get("reason"), Some(&json!("routine")));
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let mut server = mockito::Server::new_async().await;
        let _overloaded = server
            .mock("POST", "/v1/messages")
            .with_status(529)
            .with_body("overloaded")
            .expect(1)
            .create_async()
            .await;

        let cap = AnthropicCapability::new(&config(server.url()), &RateLimitConfig::default()).unwrap();
        let err = cap.classify(&request()).await.unwrap_err();
        assert!(matches!(err, CapabilityError::Server { status: 529, .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_rate_limited_and_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _limited = server.mock("POST", "/v1/messages").with_status(429).with_body("slow down").create_async().await;
        let cap = AnthropicCapability::new(&config(server.url()), &RateLimitConfig::default()).unwrap();
        assert!(matches!(cap.classify(&request()).await.unwrap_err(), CapabilityError::RateLimited(_)));

        let mut server = mockito::Server::new_async().await;
        let _bad = server.mock("POST", "/v1/messages").with_status(400).with_body("bad").create_async().await;
        let cap = AnthropicCapability::new(&config(server.url()), &RateLimitConfig::default()).unwrap();
        let err = cap.classify(&request()).await.unwrap_err();
        assert!(matches!(err, CapabilityError::Rejected { status: 400, .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_prose_only_reply_is_malformed() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/messages")
            .with_status(200)
            .with_body(json!({"content": [{"type": "text", "text": "I cannot help with that."}]}).to_string())
            .create_async()
            .await;
        let cap = AnthropicCapability::new(&config(server.url()), &RateLimitConfig::default()).unwrap();
        assert!(matches!(cap.classify(&request()).await.unwrap_err(), CapabilityError::Malformed(_)));
    }

    #[test]
    fn test_missing_key_is_not_configured() {
        temp_env::with_var("ANTHROPIC_API_KEY", None::<&str>, || {
            let result = AnthropicCapability::new(&LlmConfig::default(), &RateLimitConfig::default());
            assert!(matches!(result, Err(CapabilityError::NotConfigured(_))));
        });
    }

    #[test]
    fn test_model_per_stage() {
        let cfg = LlmConfig {
            api_key: Some("k".into()),
            gate_model: "fast".into(),
            decision_model: "deep".into(),
            ..Default::default()
        };
        let cap = AnthropicCapability::new(&cfg, &RateLimitConfig::default()).unwrap();
        assert_eq!(cap.model(Stage::Gate), "fast");
        assert_eq!(cap.model(Stage::Decision), "deep");
    }
}
