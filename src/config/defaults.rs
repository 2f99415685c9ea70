//! System-wide default constants.
//!
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Validator
// ============================================================================

/// Number of accepted observations kept for cross-frame agreement checks.
pub const HISTORY_CAPACITY: usize = 3;

/// Minimum aggregate confidence for an observation to drive a decision.
pub const CONFIDENCE_THRESHOLD: f64 = 0.70;

/// Identity marker checked as `stable` by default.
pub const IDENTITY_FIELD: &str = "hole_cards";

/// Monotone quantity checked as `non_decreasing` by default.
pub const MONOTONE_FIELD: &str = "pot";

/// Revealed list checked as `append_only` by default.
pub const REVEALED_FIELD: &str = "board";

// ============================================================================
// Cascade
// ============================================================================

/// Per-provider attempt timeout (ms).
pub const PROVIDER_TIMEOUT_MS: u64 = 5_000;

/// Smallest remaining budget (ms) for which a provider call is still started.
///
/// A call with less time than this left is skipped rather than started and
/// then cut off.
pub const MIN_ATTEMPT_BUDGET_MS: u64 = 250;

// ============================================================================
// Cycle
// ============================================================================

/// End-to-end cycle deadline, capture to emission (ms).
pub const CYCLE_DEADLINE_MS: u64 = 3_000;

/// Baseline lookup timeout (ms).
pub const BASELINE_TIMEOUT_MS: u64 = 500;

/// Prior reasoned decisions passed to providers as context.
pub const CONTEXT_DECISIONS: usize = 5;

/// Rolling window of cycle latencies used for mean/p95 reporting.
pub const LATENCY_WINDOW: usize = 20;

/// Consecutive cascade exhaustions before a session-health error is logged.
pub const EXHAUSTION_ALERT_STREAK: u32 = 3;

/// Buffered observations between the source task and the cycle driver.
pub const SOURCE_CHANNEL_CAPACITY: usize = 16;

/// Buffered records in a channel observability hook before records are dropped.
pub const HOOK_CHANNEL_CAPACITY: usize = 256;

// ============================================================================
// Providers
// ============================================================================

/// Default local reasoning command.
pub const COMMAND_PROGRAM: &str = "claude";

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OPENAI_MODEL: &str = "gpt-4";
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const GEMINI_MODEL: &str = "gemini-pro";
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Sampling temperature for remote providers.
pub const PROVIDER_TEMPERATURE: f64 = 0.7;

/// Token cap for remote provider completions.
pub const PROVIDER_MAX_TOKENS: u32 = 1_000;

/// Prior decisions rendered into the prompt.
pub const PROMPT_HISTORY_LIMIT: usize = 5;

// ============================================================================
// Storage
// ============================================================================

/// Default decision audit log location.
pub const DECISION_LOG_PATH: &str = "./data/decisions.db";

/// Config file searched in the working directory.
pub const CONFIG_FILE_NAME: &str = "pipeline.toml";

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "CASCADE_CONFIG";
