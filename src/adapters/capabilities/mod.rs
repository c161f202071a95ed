//! Reasoning capability adapters.

pub mod anthropic_api;
pub mod mock;

use std::sync::Arc;

pub use anthropic_api::AnthropicCapability;
pub use mock::ScriptedCapability;

use crate::domain::models::{LlmConfig, RateLimitConfig};
use crate::domain::ports::{CapabilityError, ReasoningCapability};

/// Build the capability named by `llm.provider`.
pub fn from_config(
    config: &LlmConfig,
    rate_limit: &RateLimitConfig,
) -> Result<Arc<dyn ReasoningCapability>, CapabilityError> {
    match config.provider.trim().to_lowercase().as_str() {
        "anthropic" => Ok(Arc::new(AnthropicCapability::new(config, rate_limit)?)),
        "mock" | "scripted" => Ok(Arc::new(ScriptedCapability::new())),
        other => Err(CapabilityError::NotConfigured(format!("unknown reasoning provider '{other}'"))),
    }
}
