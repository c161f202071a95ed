use serde::{Deserialize, Serialize};

/// Main configuration structure for equiwatch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Retry policy for external capability calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Client-side rate limit for the reasoning provider
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Orchestrator scheduling
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Gate classifier behaviour
    #[serde(default)]
    pub gate: GateConfig,

    /// Reasoning provider and per-stage models
    #[serde(default)]
    pub llm: LlmConfig,

    /// Best-effort enrichment limits
    #[serde(default)]
    pub enrichment: EnrichmentConfig,

    /// Report delivery channels
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Path to the watchlist YAML file
    #[serde(default = "default_watchlist_path")]
    pub watchlist_path: String,
}

fn default_watchlist_path() -> String {
    ".equiwatch/watchlist.yaml".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            pipeline: PipelineConfig::default(),
            gate: GateConfig::default(),
            llm: LlmConfig::default(),
            enrichment: EnrichmentConfig::default(),
            delivery: DeliveryConfig::default(),
            watchlist_path: default_watchlist_path(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".equiwatch/equiwatch.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation for file logs: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_retries() -> u32 {
    2
}

const fn default_initial_backoff_ms() -> u64 {
    200
}

const fn default_max_backoff_ms() -> u64 {
    10_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RateLimitConfig {
    /// Requests per second allowed
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,

    /// Burst size for token bucket
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
}

const fn default_requests_per_second() -> f64 {
    2.0
}

const fn default_burst_size() -> u32 {
    5
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            burst_size: default_burst_size(),
        }
    }
}

/// Orchestrator scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Triggers processed at the same time
    #[serde(default = "default_max_concurrent_triggers")]
    pub max_concurrent_triggers: usize,

    /// Seconds between backlog polls
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Triggers fetched per poll
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Seconds to wait for in-flight triggers on shutdown
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,

    /// Past investigations included as history
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

const fn default_max_concurrent_triggers() -> usize {
    4
}

const fn default_poll_interval_secs() -> u64 {
    30
}

const fn default_batch_size() -> usize {
    50
}

const fn default_shutdown_grace_secs() -> u64 {
    30
}

const fn default_history_limit() -> usize {
    10
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_triggers: default_max_concurrent_triggers(),
            poll_interval_secs: default_poll_interval_secs(),
            batch_size: default_batch_size(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            history_limit: default_history_limit(),
        }
    }
}

/// Gate classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GateConfig {
    /// Characters of content sent to the classifier
    #[serde(default = "default_gate_max_input_chars")]
    pub max_input_chars: usize,

    /// Per-attempt timeout in seconds
    #[serde(default = "default_gate_timeout_secs")]
    pub timeout_secs: u64,

    /// Let triggers through when the classifier fails
    #[serde(default = "default_fail_open")]
    pub fail_open: bool,
}

const fn default_gate_max_input_chars() -> usize {
    2000
}

const fn default_gate_timeout_secs() -> u64 {
    30
}

const fn default_fail_open() -> bool {
    true
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_input_chars: default_gate_max_input_chars(),
            timeout_secs: default_gate_timeout_secs(),
            fail_open: default_fail_open(),
        }
    }
}

/// Reasoning provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LlmConfig {
    /// Provider: anthropic or mock
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// API key; usually supplied as `EQUIWATCH_LLM__API_KEY`
    #[serde(default)]
    pub api_key: Option<String>,

    /// Messages API base URL
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_fast_model")]
    pub gate_model: String,

    #[serde(default = "default_deep_model")]
    pub analysis_model: String,

    #[serde(default = "default_deep_model")]
    pub decision_model: String,

    #[serde(default = "default_fast_model")]
    pub report_model: String,

    /// Per-attempt timeout in seconds for non-gate stages
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_llm_provider() -> String {
    "anthropic".to_string()
}

fn default_llm_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_fast_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}

fn default_deep_model() -> String {
    "claude-sonnet-4-5".to_string()
}

const fn default_llm_timeout_secs() -> u64 {
    120
}

const fn default_max_tokens() -> u32 {
    4096
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            api_key: None,
            base_url: default_llm_base_url(),
            gate_model: default_fast_model(),
            analysis_model: default_deep_model(),
            decision_model: default_deep_model(),
            report_model: default_fast_model(),
            timeout_secs: default_llm_timeout_secs(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Enrichment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EnrichmentConfig {
    /// Web search queries issued per investigation
    #[serde(default = "default_web_search_max_queries")]
    pub web_search_max_queries: usize,

    /// Results kept per web search query
    #[serde(default = "default_web_search_max_results")]
    pub web_search_max_results: usize,

    /// Similar chunks requested from semantic search
    #[serde(default = "default_similar_limit")]
    pub similar_limit: usize,

    /// Per-call timeout in seconds
    #[serde(default = "default_enrichment_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_web_search_max_queries() -> usize {
    3
}

const fn default_web_search_max_results() -> usize {
    5
}

const fn default_similar_limit() -> usize {
    5
}

const fn default_enrichment_timeout_secs() -> u64 {
    15
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            web_search_max_queries: default_web_search_max_queries(),
            web_search_max_results: default_web_search_max_results(),
            similar_limit: default_similar_limit(),
            timeout_secs: default_enrichment_timeout_secs(),
        }
    }
}

/// Delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DeliveryConfig {
    /// Slack incoming webhook; Slack delivery is off when unset
    #[serde(default)]
    pub slack_webhook_url: Option<String>,

    /// Also write every report to the log
    #[serde(default)]
    pub log_reports: bool,

    /// Per-channel timeout in seconds
    #[serde(default = "default_delivery_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_delivery_timeout_secs() -> u64 {
    10
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            slack_webhook_url: None,
            log_reports: false,
            timeout_secs: default_delivery_timeout_secs(),
        }
    }
}
