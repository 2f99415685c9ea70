//! Cascade Advisor: Real-Time Decision Pipeline
//!
//! Turns a stream of noisy sensed observations into one decision event per
//! observation, under a fixed latency budget.
//!
//! ## Architecture
//!
//! - **Consistency Validator**: Scores each observation against recent history
//! - **Baseline**: Deterministic strategy-table recommendation
//! - **Reasoning Cascade**: Ordered provider fallback with per-call timeouts
//! - **Decision Orchestrator**: Per-cycle state machine, deadlines, supersession

pub mod config;
pub mod types;
pub mod validator;
pub mod baseline;
pub mod cascade;
pub mod llm;
pub mod observability;
pub mod sink;
pub mod storage;
pub mod pipeline;

// Re-export configuration
pub use config::{ConfigError, ConfigurationError, OrchestratorConfig, PipelineConfig};

// Re-export commonly used types
pub use types::{
    BaselineRecommendation, CycleOutcome, DecisionEvent, DegradeReason, EmittedDecision,
    FieldValue, Observation, ReasoningRequest, ReasoningResult, ValidatedObservation,
};

// Re-export the pipeline
pub use cascade::{ReasoningCascade, ReasoningProvider, ProviderError};
pub use pipeline::{Collaborators, DecisionOrchestrator, PipelineStats, ProcessingLoop};
pub use validator::ConsistencyValidator;

// Re-export collaborators
pub use baseline::{BaselineError, BaselineProvider, StrategyTable};
pub use observability::ObservabilityHook;
pub use sink::{DecisionSink, SinkError};
pub use storage::{DecisionLog, StorageError};
