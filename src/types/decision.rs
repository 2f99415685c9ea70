//! Decision types: baseline, reasoning request/result, and the emitted event.

use super::observation::ValidatedObservation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Provenance tag carried by every baseline recommendation.
pub const BASELINE_PROVENANCE: &str = "baseline";

/// Provenance tag of the neutral hold used when no baseline is available.
pub const NEUTRAL_PROVENANCE: &str = "neutral-fallback";

/// Provenance tag of a result synthesized from the baseline alone.
pub const BASELINE_ONLY: &str = "baseline-only";

// ============================================================================
// Baseline Recommendation
// ============================================================================

/// Deterministic recommendation supplied by the baseline collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineRecommendation {
    pub action: String,
    #[serde(default)]
    pub amount: f64,
    pub confidence: f64,
    #[serde(default = "default_baseline_provenance")]
    pub provenance: String,
    /// Free-form context from the strategy source (e.g. "top 15%").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

fn default_baseline_provenance() -> String {
    BASELINE_PROVENANCE.to_string()
}

impl BaselineRecommendation {
    pub fn new(action: &str, amount: f64, confidence: f64) -> Self {
        Self {
            action: action.to_string(),
            amount,
            confidence,
            provenance: BASELINE_PROVENANCE.to_string(),
            note: None,
        }
    }

    /// Neutral hold/no-action recommendation used when the baseline lookup fails.
    pub fn neutral() -> Self {
        Self {
            action: "hold".to_string(),
            amount: 0.0,
            confidence: 0.0,
            provenance: NEUTRAL_PROVENANCE.to_string(),
            note: Some("baseline unavailable".to_string()),
        }
    }
}

// ============================================================================
// Reasoning
// ============================================================================

/// Which component produced a reasoning result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Named reasoning provider.
    Provider(String),
    /// No provider succeeded; the baseline was passed through.
    BaselineOnly,
}

impl Provenance {
    pub fn tag(&self) -> &str {
        match self {
            Provenance::Provider(name) => name,
            Provenance::BaselineOnly => BASELINE_ONLY,
        }
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// Alternative action suggested alongside the main recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub action: String,
    pub confidence: f64,
}

/// A reasoned recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningResult {
    pub action: String,
    pub amount: f64,
    pub confidence: f64,
    pub rationale: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<Alternative>,
    pub provenance: Provenance,
}

impl ReasoningResult {
    /// Pass-through of a baseline: same action/amount/confidence, nothing invented.
    pub fn baseline_only(baseline: &BaselineRecommendation) -> Self {
        Self {
            action: baseline.action.clone(),
            amount: baseline.amount,
            confidence: baseline.confidence,
            rationale: "Reasoning unavailable; baseline recommendation passed through.".to_string(),
            alternatives: Vec::new(),
            provenance: Provenance::BaselineOnly,
        }
    }

    pub fn is_baseline_only(&self) -> bool {
        self.provenance == Provenance::BaselineOnly
    }
}

/// Everything a reasoning provider gets for one attempt.
///
/// Built once per cycle and shared by reference across cascade attempts, so
/// every provider sees the identical request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningRequest {
    pub observation: ValidatedObservation,
    pub baseline: BaselineRecommendation,
    /// Most recent reasoned decisions, oldest first.
    #[serde(default)]
    pub prior_decisions: Vec<ReasoningResult>,
}

// ============================================================================
// Attempt / Cycle Records
// ============================================================================

/// Why the cascade did not call a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Provider reported itself unavailable (missing key, binary not found).
    Unavailable,
    /// Not enough budget left to let the call finish.
    DeadlineExhausted,
}

/// Result of one cascade attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    Timeout,
    Transport(String),
    InvalidResponse(String),
    Skipped(SkipReason),
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success)
    }

    pub fn label(&self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::Timeout => "timeout",
            AttemptOutcome::Transport(_) => "transport_error",
            AttemptOutcome::InvalidResponse(_) => "invalid_response",
            AttemptOutcome::Skipped(SkipReason::Unavailable) => "skipped_unavailable",
            AttemptOutcome::Skipped(SkipReason::DeadlineExhausted) => "skipped_deadline",
        }
    }
}

/// Structured record of one cascade attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Sequence of the observation whose cycle made the attempt.
    pub sequence: u64,
    pub provider: String,
    pub outcome: AttemptOutcome,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

/// Why a cycle ended in a degraded decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradeReason {
    BaselineUnavailable,
    CascadeExhausted,
    BudgetExhausted,
}

impl std::fmt::Display for DegradeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DegradeReason::BaselineUnavailable => write!(f, "baseline_unavailable"),
            DegradeReason::CascadeExhausted => write!(f, "cascade_exhausted"),
            DegradeReason::BudgetExhausted => write!(f, "budget_exhausted"),
        }
    }
}

/// Terminal state of a cycle, as reported to observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleOutcome {
    Decided,
    Uncertain,
    Degraded(DegradeReason),
    Superseded,
}

impl std::fmt::Display for CycleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CycleOutcome::Decided => write!(f, "decided"),
            CycleOutcome::Uncertain => write!(f, "uncertain"),
            CycleOutcome::Degraded(reason) => write!(f, "degraded({reason})"),
            CycleOutcome::Superseded => write!(f, "superseded"),
        }
    }
}

/// Per-cycle observability record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub sequence: u64,
    pub outcome: CycleOutcome,
    pub aggregate_confidence: f64,
    #[serde(with = "duration_ms")]
    pub total_latency: Duration,
}

// ============================================================================
// Decision Event
// ============================================================================

/// The externally visible outcome of one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum DecisionEvent {
    /// A provider produced a validated recommendation.
    Decision(ReasoningResult),
    /// Aggregate confidence was below threshold; no action.
    Uncertain(f64),
    /// Reasoning failed or was skipped; only the baseline is offered.
    Degraded(BaselineRecommendation),
}

impl DecisionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            DecisionEvent::Decision(_) => "decision",
            DecisionEvent::Uncertain(_) => "uncertain",
            DecisionEvent::Degraded(_) => "degraded",
        }
    }
}

/// Metadata attached to every emitted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleMetadata {
    pub session_id: String,
    pub sequence: u64,
    pub emitted_at: DateTime<Utc>,
    /// Capture timestamp to emission.
    #[serde(with = "duration_ms")]
    pub cycle_latency: Duration,
    /// Whether the cycle finished inside its configured deadline.
    pub within_budget: bool,
    pub aggregate_confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degrade_reason: Option<DegradeReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<AttemptRecord>,
}

/// What the sink receives: exactly one per non-superseded cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmittedDecision {
    pub event: DecisionEvent,
    pub metadata: CycleMetadata,
}

/// Serde helper: `Duration` as integer milliseconds.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_baseline_only_copies_baseline() {
        let baseline = BaselineRecommendation::new("hold", 0.0, 0.4);
        let result = ReasoningResult::baseline_only(&baseline);
        assert_eq!(result.action, "hold");
        assert_eq!(result.amount, 0.0);
        assert_eq!(result.confidence, 0.4);
        assert_eq!(result.provenance.tag(), "baseline-only");
        assert!(result.is_baseline_only());
    }

    #[test]
    fn test_neutral_baseline_is_hold() {
        let neutral = BaselineRecommendation::neutral();
        assert_eq!(neutral.action, "hold");
        assert_eq!(neutral.amount, 0.0);
        assert_eq!(neutral.provenance, NEUTRAL_PROVENANCE);
    }

    #[test]
    fn test_event_json_shape_distinguishes_degraded() {
        let degraded = DecisionEvent::Degraded(BaselineRecommendation::new("check", 0.0, 0.5));
        let json = serde_json::to_value(&degraded).unwrap();
        assert_eq!(json["kind"], "degraded");
        assert_eq!(json["payload"]["action"], "check");

        let uncertain = serde_json::to_value(DecisionEvent::Uncertain(0.42)).unwrap();
        assert_eq!(uncertain["kind"], "uncertain");
    }

    #[test]
    fn test_attempt_record_serializes_elapsed_ms() {
        let record = AttemptRecord {
            sequence: 3,
            provider: "a".into(),
            outcome: AttemptOutcome::Timeout,
            elapsed: Duration::from_millis(1500),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["elapsed"], 1500);
        assert_eq!(json["outcome"]["kind"], "timeout");
    }
}
