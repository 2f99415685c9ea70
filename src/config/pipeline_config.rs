//! Pipeline Configuration - TOML file model and the immutable orchestrator record
//!
//! Every section implements `Default` with the values in `defaults.rs`, so a
//! missing or empty file yields the documented behavior.

use super::defaults;
use crate::validator::FieldRule;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one pipeline instance.
///
/// Load with `PipelineConfig::load()` which searches:
/// 1. `$CASCADE_CONFIG` env var
/// 2. `./pipeline.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub session: SessionConfig,

    /// Temporal consistency validation
    #[serde(default)]
    pub validator: ValidatorConfig,

    /// Provider cascade timing and order
    #[serde(default)]
    pub cascade: CascadeConfig,

    /// End-to-end cycle budget
    #[serde(default)]
    pub cycle: CycleConfig,

    #[serde(default)]
    pub baseline: BaselineConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    /// Reasoning providers, in default cascade order
    #[serde(default = "default_providers")]
    pub providers: Vec<ProviderConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            validator: ValidatorConfig::default(),
            cascade: CascadeConfig::default(),
            cycle: CycleConfig::default(),
            baseline: BaselineConfig::default(),
            storage: StorageConfig::default(),
            providers: default_providers(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration using the standard search order:
    /// 1. `$CASCADE_CONFIG` environment variable
    /// 2. `./pipeline.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(defaults::CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), session = %config.session.name, "Loaded pipeline config from CASCADE_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from CASCADE_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "CASCADE_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(defaults::CONFIG_FILE_NAME);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(session = %config.session.name, "Loaded pipeline config from ./pipeline.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./pipeline.toml, using defaults");
                }
            }
        }

        info!("No pipeline.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    ///
    /// Unknown keys are logged as warnings; parse and validation failures are errors.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;

        for w in super::validation::validate_unknown_keys(&contents) {
            warn!("{}", w);
        }

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;

        for w in super::validation::validate_budget_ranges(&config) {
            warn!("{}", w);
        }
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate the file for internal consistency, collecting every problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if let Err(e) = self.orchestrator_config().validate() {
            errors.push(e.to_string());
        }

        let mut seen = HashSet::new();
        for p in &self.providers {
            if p.name.trim().is_empty() {
                errors.push("providers: every provider needs a non-empty name".to_string());
            } else if !seen.insert(p.name.as_str()) {
                errors.push(format!("providers: duplicate provider name '{}'", p.name));
            }
        }

        for name in &self.cascade.provider_order {
            if !seen.contains(name.as_str()) {
                errors.push(format!(
                    "cascade.provider_order: '{name}' is not a configured provider"
                ));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Provider names in cascade order.
    ///
    /// `cascade.provider_order` wins when set; otherwise the order the
    /// providers are listed in.
    pub fn provider_order(&self) -> Vec<String> {
        if self.cascade.provider_order.is_empty() {
            self.providers.iter().map(|p| p.name.clone()).collect()
        } else {
            self.cascade.provider_order.clone()
        }
    }

    /// Build the immutable record the orchestrator is constructed with.
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            history_capacity: self.validator.history_capacity,
            confidence_threshold: self.validator.confidence_threshold,
            field_rules: self.validator.fields.clone(),
            provider_timeout: Duration::from_millis(self.cascade.provider_timeout_ms),
            cascade_deadline: self.cascade.cascade_deadline_ms.map(Duration::from_millis),
            min_attempt_budget: Duration::from_millis(self.cascade.min_attempt_budget_ms),
            cycle_deadline: Duration::from_millis(self.cycle.deadline_ms),
            baseline_timeout: Duration::from_millis(self.cycle.baseline_timeout_ms),
            context_decisions: self.cycle.context_decisions,
            provider_order: self.provider_order(),
        }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Failure to read, parse, or validate a config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {1}", .0.display())]
    Io(PathBuf, std::io::Error),
    #[error("Config parse error ({}): {1}", .0.display())]
    Parse(PathBuf, toml::de::Error),
    #[error("Config serialization error: {0}")]
    Serialize(toml::ser::Error),
    #[error("Config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

/// Invalid construction parameters. The pipeline refuses to start.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    #[error("no reasoning providers configured")]
    NoProviders,
    #[error("{0} must be greater than zero")]
    NonPositiveDuration(&'static str),
    #[error("confidence threshold {0} is outside [0, 1]")]
    ThresholdOutOfRange(f64),
    #[error("history capacity must be at least 1")]
    ZeroHistoryCapacity,
    #[error("provider '{0}' is named in the provider order but not registered")]
    UnknownProvider(String),
    #[error("provider '{0}' appears more than once")]
    DuplicateProvider(String),
    #[error("provider '{name}' could not be set up: {reason}")]
    ProviderSetup { name: String, reason: String },
}

// ============================================================================
// Orchestrator Record
// ============================================================================

/// Immutable configuration for one orchestrator instance.
///
/// Reconfiguration means building a new orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub history_capacity: usize,
    pub confidence_threshold: f64,
    /// Agreement rule per observation field; unlisted fields are free.
    pub field_rules: BTreeMap<String, FieldRule>,
    pub provider_timeout: Duration,
    /// Optional cap on the whole cascade, on top of the cycle deadline.
    pub cascade_deadline: Option<Duration>,
    pub min_attempt_budget: Duration,
    pub cycle_deadline: Duration,
    pub baseline_timeout: Duration,
    pub context_decisions: usize,
    pub provider_order: Vec<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        PipelineConfig::default().orchestrator_config()
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.provider_order.is_empty() {
            return Err(ConfigurationError::NoProviders);
        }
        if self.history_capacity == 0 {
            return Err(ConfigurationError::ZeroHistoryCapacity);
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigurationError::ThresholdOutOfRange(self.confidence_threshold));
        }
        for (label, d) in [
            ("provider_timeout", self.provider_timeout),
            ("cycle_deadline", self.cycle_deadline),
            ("baseline_timeout", self.baseline_timeout),
        ] {
            if d.is_zero() {
                return Err(ConfigurationError::NonPositiveDuration(label));
            }
        }
        if self.cascade_deadline.is_some_and(|d| d.is_zero()) {
            return Err(ConfigurationError::NonPositiveDuration("cascade_deadline"));
        }
        let mut seen = HashSet::new();
        for name in &self.provider_order {
            if !seen.insert(name.as_str()) {
                return Err(ConfigurationError::DuplicateProvider(name.clone()));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Appears in logs only
    #[serde(default = "default_session_name")]
    pub name: String,
}

fn default_session_name() -> String {
    "default".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { name: default_session_name() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidatorConfig {
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    /// Field name → agreement rule
    #[serde(default = "default_field_rules")]
    pub fields: BTreeMap<String, FieldRule>,
}

fn default_history_capacity() -> usize {
    defaults::HISTORY_CAPACITY
}
fn default_confidence_threshold() -> f64 {
    defaults::CONFIDENCE_THRESHOLD
}
fn default_field_rules() -> BTreeMap<String, FieldRule> {
    [
        (defaults::IDENTITY_FIELD, FieldRule::Stable),
        (defaults::MONOTONE_FIELD, FieldRule::NonDecreasing),
        (defaults::REVEALED_FIELD, FieldRule::AppendOnly),
    ]
    .into_iter()
    .map(|(name, rule)| (name.to_string(), rule))
    .collect()
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            confidence_threshold: default_confidence_threshold(),
            fields: default_field_rules(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeConfig {
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cascade_deadline_ms: Option<u64>,
    #[serde(default = "default_min_attempt_budget_ms")]
    pub min_attempt_budget_ms: u64,
    /// Overrides the order of `[[providers]]` when non-empty
    #[serde(default)]
    pub provider_order: Vec<String>,
}

fn default_provider_timeout_ms() -> u64 {
    defaults::PROVIDER_TIMEOUT_MS
}
fn default_min_attempt_budget_ms() -> u64 {
    defaults::MIN_ATTEMPT_BUDGET_MS
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            provider_timeout_ms: default_provider_timeout_ms(),
            cascade_deadline_ms: None,
            min_attempt_budget_ms: default_min_attempt_budget_ms(),
            provider_order: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleConfig {
    #[serde(default = "default_cycle_deadline_ms")]
    pub deadline_ms: u64,
    #[serde(default = "default_baseline_timeout_ms")]
    pub baseline_timeout_ms: u64,
    #[serde(default = "default_context_decisions")]
    pub context_decisions: usize,
}

fn default_cycle_deadline_ms() -> u64 {
    defaults::CYCLE_DEADLINE_MS
}
fn default_baseline_timeout_ms() -> u64 {
    defaults::BASELINE_TIMEOUT_MS
}
fn default_context_decisions() -> usize {
    defaults::CONTEXT_DECISIONS
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            deadline_ms: default_cycle_deadline_ms(),
            baseline_timeout_ms: default_baseline_timeout_ms(),
            context_decisions: default_context_decisions(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BaselineConfig {
    /// Strategy table TOML; without one every lookup returns the table default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// sled decision log; disabled when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision_log: Option<PathBuf>,
}

// ============================================================================
// Providers
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(flatten)]
    pub kind: ProviderKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderKind {
    /// Local program; prompt as last argument (or on stdin)
    Command {
        #[serde(default = "default_command_program")]
        program: String,
        #[serde(default = "default_command_args")]
        args: Vec<String>,
        #[serde(default)]
        prompt_via_stdin: bool,
    },
    /// OpenAI-compatible chat completions endpoint
    Openai {
        #[serde(default = "default_openai_base_url")]
        base_url: String,
        #[serde(default = "default_openai_model")]
        model: String,
        #[serde(default = "default_openai_key_env")]
        api_key_env: String,
    },
    /// Gemini generateContent endpoint
    Gemini {
        #[serde(default = "default_gemini_base_url")]
        base_url: String,
        #[serde(default = "default_gemini_model")]
        model: String,
        #[serde(default = "default_gemini_key_env")]
        api_key_env: String,
    },
}

fn default_command_program() -> String {
    defaults::COMMAND_PROGRAM.to_string()
}
fn default_command_args() -> Vec<String> {
    vec!["-p".to_string()]
}
fn default_openai_base_url() -> String {
    defaults::OPENAI_BASE_URL.to_string()
}
fn default_openai_model() -> String {
    defaults::OPENAI_MODEL.to_string()
}
fn default_openai_key_env() -> String {
    defaults::OPENAI_API_KEY_ENV.to_string()
}
fn default_gemini_base_url() -> String {
    defaults::GEMINI_BASE_URL.to_string()
}
fn default_gemini_model() -> String {
    defaults::GEMINI_MODEL.to_string()
}
fn default_gemini_key_env() -> String {
    defaults::GEMINI_API_KEY_ENV.to_string()
}

/// Local command first, then the two remote APIs.
pub fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig {
            name: "claude_cli".to_string(),
            kind: ProviderKind::Command {
                program: default_command_program(),
                args: default_command_args(),
                prompt_via_stdin: false,
            },
        },
        ProviderConfig {
            name: "openai".to_string(),
            kind: ProviderKind::Openai {
                base_url: default_openai_base_url(),
                model: default_openai_model(),
                api_key_env: default_openai_key_env(),
            },
        },
        ProviderConfig {
            name: "gemini".to_string(),
            kind: ProviderKind::Gemini {
                base_url: default_gemini_base_url(),
                model: default_gemini_model(),
                api_key_env: default_gemini_key_env(),
            },
        },
    ]
}
