//! Scripted reasoning capability for testing.
//!
//! Each stage answers from a queue of scripted responses first and falls
//! back to a per-stage default. Every request is recorded so tests can
//! inspect what the pipeline sent.

use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::domain::models::{Recommendation, SignificanceLevel, TokenUsage};
use crate::domain::ports::{
    CapabilityError, ClassifyRequest, DecisionRequest, ReasoningCapability, ReportRequest, Stage,
    StructuredOutput, SynthesisRequest,
};

type Scripted = Result<StructuredOutput, CapabilityError>;

#[derive(Default)]
struct State {
    queues: HashMap<Stage, VecDeque<Scripted>>,
    defaults: HashMap<Stage, Scripted>,
    calls: HashMap<Stage, usize>,
    classify_requests: Vec<ClassifyRequest>,
    synthesis_requests: Vec<SynthesisRequest>,
    decision_requests: Vec<DecisionRequest>,
    report_requests: Vec<ReportRequest>,
}

/// Reasoning capability answering from a script.
pub struct ScriptedCapability {
    state: Mutex<State>,
    delay: Option<Duration>,
    usage: TokenUsage,
}

impl ScriptedCapability {
    /// Every stage succeeds: the gate passes, the analysis is significant
    /// (high), the decision moves to buy and the report has every field.
    pub fn new() -> Self {
        let mut state = State::default();
        state.defaults.insert(Stage::Gate, Ok(Self::gate_output(true, "Material financial disclosure")));
        state
            .defaults
            .insert(Stage::Analysis, Ok(Self::analysis_output(SignificanceLevel::High, true)));
        state
            .defaults
            .insert(Stage::Decision, Ok(Self::decision_output(true, Recommendation::Buy, 0.8)));
        state.defaults.insert(Stage::Report, Ok(Self::report_output()));
        Self { state: Mutex::new(state), delay: None, usage: TokenUsage::default() }
    }

    /// Replace the fallback answer for a stage.
    pub fn with_default(mut self, stage: Stage, response: Scripted) -> Self {
        self.state.get_mut().defaults.insert(stage, response);
        self
    }

    /// Queue an answer consumed before the default.
    pub fn with_response(mut self, stage: Stage, response: Scripted) -> Self {
        self.state.get_mut().queues.entry(stage).or_default().push_back(response);
        self
    }

    /// Sleep before every answer.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Report `usage` on every successful answer that carries none of its own.
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }

    pub async fn push_response(&self, stage: Stage, response: Scripted) {
        self.state.lock().await.queues.entry(stage).or_default().push_back(response);
    }

    pub async fn calls(&self, stage: Stage) -> usize {
        self.state.lock().await.calls.get(&stage).copied().unwrap_or(0)
    }

    pub async fn classify_requests(&self) -> Vec<ClassifyRequest> {
        self.state.lock().await.classify_requests.clone()
    }

    pub async fn synthesis_requests(&self) -> Vec<SynthesisRequest> {
        self.state.lock().await.synthesis_requests.clone()
    }

    pub async fn decision_requests(&self) -> Vec<DecisionRequest> {
        self.state.lock().await.decision_requests.clone()
    }

    pub async fn report_requests(&self) -> Vec<ReportRequest> {
        self.state.lock().await.report_requests.clone()
    }

    pub fn gate_output(passed: bool, reason: &str) -> StructuredOutput {
        json!({ "is_worth_investigating": passed, "reason": reason }).into()
    }

    pub fn analysis_output(significance: SignificanceLevel, is_significant: bool) -> StructuredOutput {
        json!({
            "extracted_metrics": [
                {"name": "revenue", "value": 1200.0, "raw_value": "₹1,200 Cr", "unit": "INR_Cr",
                 "period": "Q3FY25", "yoy_change": 40.0, "confidence": 0.9}
            ],
            "forward_statements": [
                {"statement": "Order book to double by FY27", "target_metric": "order_book",
                 "target_date": "FY27", "category": "guidance"}
            ],
            "management_highlights": ["Capacity expansion on track"],
            "key_findings": ["Revenue up 40% year on year"],
            "red_flags": ["Receivables rising"],
            "positive_signals": ["Record order inflow"],
            "synthesis": "Strong quarter driven by order execution.",
            "significance": significance.as_str(),
            "significance_reasoning": "Growth well above sector trend",
            "is_significant": is_significant,
        })
        .into()
    }

    pub fn decision_output(should_change: bool, recommendation: Recommendation, confidence: f64) -> StructuredOutput {
        json!({
            "should_change": should_change,
            "new_recommendation": recommendation.as_str(),
            "timeframe": "medium_term",
            "confidence": confidence,
            "reasoning": "Earnings momentum supports the call.",
            "key_factors_for": ["Order inflow"],
            "key_factors_against": ["Working capital"],
        })
        .into()
    }

    pub fn report_output() -> StructuredOutput {
        json!({
            "title": "Strong quarter",
            "executive_summary": "Revenue grew 40% on order execution.",
            "report_body": "## Findings\n- Revenue up 40%",
            "recommendation_summary": "BUY (Confidence: 80%, Timeframe: medium_term)",
        })
        .into()
    }

    async fn answer(&self, stage: Stage) -> Scripted {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock().await;
        *state.calls.entry(stage).or_insert(0) += 1;
        let scripted = match state.queues.get_mut(&stage).and_then(VecDeque::pop_front) {
            Some(scripted) => scripted,
            None => state
                .defaults
                .get(&stage)
                .cloned()
                .unwrap_or_else(|| Err(CapabilityError::NotConfigured(format!("no script for {}", stage.as_str())))),
        };
        scripted.map(|output| if output.usage.is_empty() { output.with_usage(self.usage) } else { output })
    }
}

impl Default for ScriptedCapability {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReasoningCapability for ScriptedCapability {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn model(&self, stage: Stage) -> String {
        format!("scripted-{}", stage.as_str())
    }

    async fn classify(&self, request: &ClassifyRequest) -> Result<StructuredOutput, CapabilityError> {
        self.state.lock().await.classify_requests.push(request.clone());
        self.answer(Stage::Gate).await
    }

    async fn synthesize(&self, request: &SynthesisRequest) -> Result<StructuredOutput, CapabilityError> {
        self.state.lock().await.synthesis_requests.push(request.clone());
        self.answer(Stage::Analysis).await
    }

    async fn decide(&self, request: &DecisionRequest) -> Result<StructuredOutput, CapabilityError> {
        self.state.lock().await.decision_requests.push(request.clone());
        self.answer(Stage::Decision).await
    }

    async fn write_report(&self, request: &ReportRequest) -> Result<StructuredOutput, CapabilityError> {
        self.state.lock().await.report_requests.push(request.clone());
        self.answer(Stage::Report).await
    }
}
