//! Gate classifier: the cheap "is this worth investigating?" call.
//!
//! Fails open. A broken or slow classifier must never silently drop a
//! material announcement, so any failure lets the trigger through unless
//! fail-closed mode is configured.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::domain::models::{GateConfig, GateDecision, GateMethod, Trigger};
use crate::domain::ports::{CapabilityError, ClassifyRequest, ReasoningCapability, Stage, StructuredOutput};
use crate::services::retry::RetryPolicy;

pub struct GateClassifier {
    capability: Arc<dyn ReasoningCapability>,
    config: GateConfig,
    retry: RetryPolicy,
}

impl GateClassifier {
    pub fn new(capability: Arc<dyn ReasoningCapability>, config: GateConfig, retry: RetryPolicy) -> Self {
        Self { capability, config, retry }
    }

    /// Classify a trigger. Never fails; errors become a fallthrough decision.
    #[instrument(skip(self, trigger), fields(trigger_id = %trigger.id))]
    pub async fn classify(&self, trigger: &Trigger) -> GateDecision {
        let request = ClassifyRequest {
            company_symbol: trigger.company_symbol.clone(),
            company_name: trigger.company_name.clone(),
            title: trigger.display_title(),
            content: truncate_chars(&trigger.raw_content, self.config.max_input_chars).to_string(),
        };
        let model = self.capability.model(Stage::Gate);
        let started = Instant::now();

        let outcome = self
            .retry
            .execute(Duration::from_secs(self.config.timeout_secs), || self.capability.classify(&request))
            .await
            .and_then(|output| parse_verdict(&output).map(|(passed, reason)| (passed, reason, output.usage)));

        match outcome {
            Ok((passed, reason, usage)) => {
                info!(
                    passed,
                    model = %model,
                    input_tokens = usage.input_tokens,
                    output_tokens = usage.output_tokens,
                    latency_ms = started.elapsed().as_millis() as u64,
                    "gate {}: {}",
                    if passed { "PASSED" } else { "REJECTED" },
                    reason
                );
                GateDecision { passed, reason, method: GateMethod::LlmClassification, model: Some(model) }
            }
            Err(err) if self.config.fail_open => {
                warn!(error = %err, "gate classification failed; passing by fail-open policy");
                GateDecision {
                    passed: true,
                    reason: format!("Gate classifier failure, passed by fail-open policy: {err}"),
                    method: GateMethod::ErrorFallthrough,
                    model: Some(model),
                }
            }
            Err(err) => {
                warn!(error = %err, "gate classification failed; rejecting by fail-closed policy");
                GateDecision {
                    passed: false,
                    reason: format!("Gate classifier failure, rejected by fail-closed policy: {err}"),
                    method: GateMethod::ErrorFailClosed,
                    model: Some(model),
                }
            }
        }
    }
}

fn parse_verdict(output: &StructuredOutput) -> Result<(bool, String), CapabilityError> {
    let passed = match output.get("is_worth_investigating") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => match s.trim().to_lowercase().as_str() {
            "true" | "yes" => true,
            "false" | "no" => false,
            other => {
                return Err(CapabilityError::Malformed(format!("is_worth_investigating: {other}")));
            }
        },
        Some(other) => return Err(CapabilityError::Malformed(format!("is_worth_investigating: {other}"))),
        None => return Err(CapabilityError::Malformed("missing is_worth_investigating".to_string())),
    };
    let reason = output
        .get("reason")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or("No reason provided")
        .to_string();
    Ok((passed, reason))
}

/// Cut `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::capabilities::ScriptedCapability;
    use crate::domain::models::TriggerCandidate;
    use proptest::prelude::*;
    use serde_json::json;

    fn trigger(content: &str) -> Trigger {
        Trigger::from_candidate(TriggerCandidate::automated(content).with_company("ACME", "Acme Corp"))
    }

    fn classifier(cap: Arc<ScriptedCapability>, fail_open: bool) -> GateClassifier {
        let config = GateConfig { max_input_chars: 10, timeout_secs: 5, fail_open };
        GateClassifier::new(cap, config, RetryPolicy::new(1, 1, 1))
    }

    #[tokio::test]
    async fn test_pass_and_reject() {
        let cap = Arc::new(
            ScriptedCapability::new()
                .with_response(Stage::Gate, Ok(ScriptedCapability::gate_output(false, "routine filing"))),
        );
        let gate = classifier(cap.clone(), true);

        let rejected = gate.classify(&trigger("change of address")).await;
        assert!(!rejected.passed);
        assert_eq!(rejected.method, GateMethod::LlmClassification);
        assert_eq!(rejected.reason, "routine filing");
        assert_eq!(rejected.model.as_deref(), Some("scripted-gate"));

        let passed = gate.classify(&trigger("results")).await;
        assert!(passed.passed);
        assert_eq!(passed.method, GateMethod::LlmClassification);
    }

    #[tokio::test]
    async fn test_content_truncated_before_call() {
        let cap = Arc::new(ScriptedCapability::new());
        let gate = classifier(cap.clone(), true);
        gate.classify(&trigger("₹₹₹₹₹ 12345 overflow")).await;

        let requests = cap.classify_requests().await;
        assert_eq!(requests[0].content, "₹₹₹₹₹ 1234");
    }

    #[tokio::test]
    async fn test_fail_open_on_exhausted_retries() {
        let cap = Arc::new(
            ScriptedCapability::new()
                .with_default(Stage::Gate, Err(CapabilityError::Server { status: 503, message: "down".into() })),
        );
        let gate = classifier(cap.clone(), true);

        let decision = gate.classify(&trigger("x")).await;
        assert!(decision.passed);
        assert_eq!(decision.method, GateMethod::ErrorFallthrough);
        assert!(decision.reason.contains("fail-open"));
        assert_eq!(cap.calls(Stage::Gate).await, 2);
    }

    #[tokio::test]
    async fn test_fail_open_on_malformed_output() {
        let cap = Arc::new(
            ScriptedCapability::new().with_response(Stage::Gate, Ok(json!({"verdict": "maybe"}).into())),
        );
        let decision = classifier(cap, true).classify(&trigger("x")).await;
        assert!(decision.passed);
        assert_eq!(decision.method, GateMethod::ErrorFallthrough);
    }

    #[tokio::test]
    async fn test_fail_closed_when_configured() {
        let cap = Arc::new(
            ScriptedCapability::new().with_default(Stage::Gate, Err(CapabilityError::Network("reset".into()))),
        );
        let decision = classifier(cap, false).classify(&trigger("x")).await;
        assert!(!decision.passed);
        assert_eq!(decision.method, GateMethod::ErrorFailClosed);
    }

    #[test]
    fn test_parse_verdict_accepts_strings() {
        let (passed, reason) = parse_verdict(&json!({"is_worth_investigating": "Yes"}).into()).unwrap();
        assert!(passed);
        assert_eq!(reason, "No reason provided");
        assert!(parse_verdict(&json!({"is_worth_investigating": 1}).into()).is_err());
    }

    proptest! {
        #[test]
        fn prop_truncate_is_prefix_and_bounded(text in ".{0,300}", max in 0usize..100) {
            let cut = truncate_chars(&text, max);
            prop_assert!(text.starts_with(cut));
            prop_assert!(cut.chars().count() <= max);
            prop_assert_eq!(cut.chars().count(), text.chars().count().min(max));
        }
    }
}
