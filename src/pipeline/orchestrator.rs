//! Decision Orchestrator
//!
//! Drives one cycle per observation under a global deadline and emits exactly
//! one event per cycle that is not superseded.
//!
//! ```text
//! Validating ──(rejected)──────────────────────────────→ Emitting(Uncertain)
//!     │
//!     └→ BaselineLookup ──(failed)─────────────────────→ Emitting(Degraded, neutral)
//!              │
//!              └→ Reasoning ──(exhausted / no budget)──→ Emitting(Degraded, baseline)
//!                     │
//!                     └────────────────────────────────→ Emitting(Decision)
//! ```
//!
//! Validation runs synchronously in [`DecisionOrchestrator::begin`], so
//! history updates stay strictly ordered. Baseline lookup and reasoning run
//! in a boxed future the caller may drop to supersede the cycle.

use crate::baseline::BaselineProvider;
use crate::cascade::{CascadeSettings, ReasoningCascade, ReasoningProvider, Resolution};
use crate::config::{defaults, ConfigurationError, OrchestratorConfig};
use crate::observability::ObservabilityHook;
use crate::sink::DecisionSink;
use crate::types::{
    AttemptRecord, BaselineRecommendation, CycleMetadata, CycleOutcome, CycleRecord,
    DecisionEvent, DegradeReason, EmittedDecision, Observation, ReasoningRequest,
    ReasoningResult, ValidatedObservation,
};
use crate::validator::ConsistencyValidator;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::stats::PipelineStats;

// ============================================================================
// Cycle State
// ============================================================================

/// Stage a cycle is in. Reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Validating,
    BaselineLookup,
    Reasoning,
    Emitting,
    Done,
}

impl std::fmt::Display for CycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CycleState::Validating => "validating",
            CycleState::BaselineLookup => "baseline_lookup",
            CycleState::Reasoning => "reasoning",
            CycleState::Emitting => "emitting",
            CycleState::Done => "done",
        };
        write!(f, "{s}")
    }
}

/// What the post-validation stages produced.
#[derive(Debug)]
pub enum StageOutcome {
    /// The cascade ran; its result may still be baseline-only.
    Reasoned {
        baseline: BaselineRecommendation,
        resolution: Resolution,
    },
    /// Reasoning was not attempted.
    Degraded {
        baseline: BaselineRecommendation,
        reason: DegradeReason,
    },
}

/// Bookkeeping for a cycle whose stages are still running.
#[derive(Debug, Clone)]
pub struct CycleTicket {
    pub sequence: u64,
    pub aggregate_confidence: f64,
    started: Instant,
    deadline: Instant,
}

impl CycleTicket {
    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

/// A validated cycle waiting on baseline lookup and reasoning.
///
/// Dropping `work` cancels the in-flight calls.
pub struct PendingCycle {
    pub ticket: CycleTicket,
    pub work: BoxFuture<'static, StageOutcome>,
}

/// Result of starting a cycle.
pub enum CycleStart {
    /// Emitted during validation (low confidence).
    Finished(EmittedDecision),
    /// Accepted; drive `work` to completion, then call `complete`.
    Pending(PendingCycle),
}

// ============================================================================
// Collaborators
// ============================================================================

/// External collaborators an orchestrator is built with.
pub struct Collaborators {
    pub providers: Vec<Arc<dyn ReasoningProvider>>,
    pub baseline: Arc<dyn BaselineProvider>,
    pub sink: Arc<dyn DecisionSink>,
    pub hook: Arc<dyn ObservabilityHook>,
}

impl Collaborators {
    pub fn new(
        providers: Vec<Arc<dyn ReasoningProvider>>,
        baseline: Arc<dyn BaselineProvider>,
        sink: Arc<dyn DecisionSink>,
    ) -> Self {
        Self {
            providers,
            baseline,
            sink,
            hook: Arc::new(()),
        }
    }

    #[must_use]
    pub fn with_hook(mut self, hook: Arc<dyn ObservabilityHook>) -> Self {
        self.hook = hook;
        self
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct DecisionOrchestrator {
    config: OrchestratorConfig,
    session_id: String,
    validator: ConsistencyValidator,
    cascade: Arc<ReasoningCascade>,
    baseline: Arc<dyn BaselineProvider>,
    sink: Arc<dyn DecisionSink>,
    hook: Arc<dyn ObservabilityHook>,
    /// Recent reasoned decisions passed to providers as context.
    recent: VecDeque<ReasoningResult>,
    stats: PipelineStats,
}

impl DecisionOrchestrator {
    /// Validate `config` and wire the collaborators.
    ///
    /// Refuses to build with no providers, non-positive timeouts, or a
    /// provider order naming unregistered providers.
    pub fn new(
        config: OrchestratorConfig,
        collaborators: Collaborators,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let cascade = ReasoningCascade::ordered(
            collaborators.providers,
            &config.provider_order,
            CascadeSettings::from(&config),
        )?
        .with_hook(Arc::clone(&collaborators.hook));

        let validator = ConsistencyValidator::new(
            config.history_capacity,
            config.confidence_threshold,
            config.field_rules.clone(),
        );
        let session_id = uuid::Uuid::new_v4().to_string();
        let recent = VecDeque::with_capacity(config.context_decisions);

        info!(
            session_id = %session_id,
            providers = ?cascade.provider_names(),
            baseline = collaborators.baseline.name(),
            cycle_deadline_ms = config.cycle_deadline.as_millis() as u64,
            threshold = config.confidence_threshold,
            "Decision orchestrator ready"
        );

        Ok(Self {
            config,
            session_id,
            validator,
            cascade: Arc::new(cascade),
            baseline: collaborators.baseline,
            sink: collaborators.sink,
            hook: collaborators.hook,
            recent,
            stats: PipelineStats::default(),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn validator(&self) -> &ConsistencyValidator {
        &self.validator
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Run one full cycle to completion.
    pub async fn process(&mut self, obs: Observation) -> EmittedDecision {
        match self.begin(obs) {
            CycleStart::Finished(emitted) => emitted,
            CycleStart::Pending(pending) => {
                let outcome = pending.work.await;
                self.complete(pending.ticket, outcome)
            }
        }
    }

    /// Validate `obs` and start its cycle.
    ///
    /// The deadline clock starts at the observation's capture time.
    pub fn begin(&mut self, obs: Observation) -> CycleStart {
        self.stats.observations += 1;
        let started = cycle_start(&obs);
        let deadline = started + self.config.cycle_deadline;
        let sequence = obs.sequence;
        debug!(sequence, state = %CycleState::Validating, "Cycle started");

        let validated = self.validator.validate(obs);
        if validated.history_reset {
            self.stats.history_resets += 1;
            self.recent.clear();
            info!(sequence, "History reset, treating as new session");
        }

        let ticket = CycleTicket {
            sequence,
            aggregate_confidence: validated.aggregate_confidence,
            started,
            deadline,
        };

        if !validated.accepted {
            let event = DecisionEvent::Uncertain(validated.aggregate_confidence);
            return CycleStart::Finished(self.emit(&ticket, event, None, None, Vec::new()));
        }

        let prior: Vec<ReasoningResult> = self.recent.iter().cloned().collect();
        let work = run_stages(
            Arc::clone(&self.baseline),
            Arc::clone(&self.cascade),
            validated,
            prior,
            deadline,
            self.config.baseline_timeout,
        )
        .boxed();

        CycleStart::Pending(PendingCycle { ticket, work })
    }

    /// Emit the event for a cycle whose stages finished.
    pub fn complete(&mut self, ticket: CycleTicket, outcome: StageOutcome) -> EmittedDecision {
        match outcome {
            StageOutcome::Reasoned {
                baseline,
                resolution,
            } => match resolution.degrade_reason() {
                None => {
                    let result = resolution.result;
                    let provider = Some(result.provenance.tag().to_string());
                    if self.recent.len() >= self.config.context_decisions {
                        self.recent.pop_front();
                    }
                    if self.config.context_decisions > 0 {
                        self.recent.push_back(result.clone());
                    }
                    self.emit(
                        &ticket,
                        DecisionEvent::Decision(result),
                        None,
                        provider,
                        resolution.attempts,
                    )
                }
                Some(reason) => self.emit(
                    &ticket,
                    DecisionEvent::Degraded(baseline),
                    Some(reason),
                    None,
                    resolution.attempts,
                ),
            },
            StageOutcome::Degraded { baseline, reason } => self.emit(
                &ticket,
                DecisionEvent::Degraded(baseline),
                Some(reason),
                None,
                Vec::new(),
            ),
        }
    }

    /// Drop a cycle that a newer observation replaced. Nothing is emitted.
    pub fn supersede(&mut self, pending: PendingCycle) {
        let PendingCycle { ticket, work } = pending;
        drop(work);
        let latency = ticket.started.elapsed();
        debug!(sequence = ticket.sequence, "Cycle superseded");
        self.stats.record_cycle(CycleOutcome::Superseded, latency);
        self.hook.on_cycle(&CycleRecord {
            sequence: ticket.sequence,
            outcome: CycleOutcome::Superseded,
            aggregate_confidence: ticket.aggregate_confidence,
            total_latency: latency,
        });
    }

    fn emit(
        &mut self,
        ticket: &CycleTicket,
        event: DecisionEvent,
        degrade_reason: Option<DegradeReason>,
        provider: Option<String>,
        attempts: Vec<AttemptRecord>,
    ) -> EmittedDecision {
        debug!(sequence = ticket.sequence, state = %CycleState::Emitting, kind = event.kind(), "Emitting");
        let latency = ticket.started.elapsed();
        let within_budget = latency <= self.config.cycle_deadline;
        let outcome = match (&event, degrade_reason) {
            (DecisionEvent::Decision(_), _) => CycleOutcome::Decided,
            (DecisionEvent::Uncertain(_), _) => CycleOutcome::Uncertain,
            (DecisionEvent::Degraded(_), Some(reason)) => CycleOutcome::Degraded(reason),
            (DecisionEvent::Degraded(_), None) => {
                CycleOutcome::Degraded(DegradeReason::CascadeExhausted)
            }
        };

        let emitted = EmittedDecision {
            event,
            metadata: CycleMetadata {
                session_id: self.session_id.clone(),
                sequence: ticket.sequence,
                emitted_at: chrono::Utc::now(),
                cycle_latency: latency,
                within_budget,
                aggregate_confidence: ticket.aggregate_confidence,
                degrade_reason,
                provider,
                attempts,
            },
        };

        if let Err(e) = self.sink.deliver(&emitted) {
            self.stats.sink_failures += 1;
            warn!(sequence = ticket.sequence, error = %e, "Sink delivery failed");
        }

        if !within_budget {
            self.stats.over_budget += 1;
            warn!(
                sequence = ticket.sequence,
                latency_ms = latency.as_millis() as u64,
                deadline_ms = self.config.cycle_deadline.as_millis() as u64,
                "Cycle exceeded its deadline"
            );
        }

        let streak = self.stats.record_cycle(outcome, latency);
        if streak >= defaults::EXHAUSTION_ALERT_STREAK && matches!(outcome, CycleOutcome::Degraded(_)) {
            error!(
                consecutive = streak,
                "Reasoning cascade exhausted on consecutive cycles, providers may be down"
            );
        }

        self.hook.on_cycle(&CycleRecord {
            sequence: ticket.sequence,
            outcome,
            aggregate_confidence: ticket.aggregate_confidence,
            total_latency: latency,
        });
        debug!(sequence = ticket.sequence, state = %CycleState::Done, outcome = %outcome, "Cycle done");
        emitted
    }
}

/// Map the capture timestamp onto the monotonic clock.
fn cycle_start(obs: &Observation) -> Instant {
    let now = Instant::now();
    let age = (chrono::Utc::now() - obs.captured_at)
        .to_std()
        .unwrap_or(Duration::ZERO);
    now.checked_sub(age).unwrap_or(now)
}

/// Baseline lookup then reasoning, bounded by `deadline`.
async fn run_stages(
    baseline: Arc<dyn BaselineProvider>,
    cascade: Arc<ReasoningCascade>,
    validated: ValidatedObservation,
    prior_decisions: Vec<ReasoningResult>,
    deadline: Instant,
    baseline_timeout: Duration,
) -> StageOutcome {
    let sequence = validated.sequence();
    debug!(sequence, state = %CycleState::BaselineLookup, "Looking up baseline");

    let remaining = deadline.saturating_duration_since(Instant::now());
    let lookup_budget = baseline_timeout.min(remaining);
    if lookup_budget.is_zero() {
        warn!(sequence, "Cycle deadline passed before baseline lookup");
        return StageOutcome::Degraded {
            baseline: BaselineRecommendation::neutral(),
            reason: DegradeReason::BudgetExhausted,
        };
    }

    let recommendation =
        match tokio::time::timeout(lookup_budget, baseline.lookup(&validated)).await {
            Ok(Ok(rec)) => rec,
            Ok(Err(e)) => {
                warn!(sequence, error = %e, "Baseline lookup failed");
                return StageOutcome::Degraded {
                    baseline: BaselineRecommendation::neutral(),
                    reason: DegradeReason::BaselineUnavailable,
                };
            }
            Err(_) => {
                warn!(sequence, timeout_ms = lookup_budget.as_millis() as u64, "Baseline lookup timed out");
                return StageOutcome::Degraded {
                    baseline: BaselineRecommendation::neutral(),
                    reason: DegradeReason::BaselineUnavailable,
                };
            }
        };

    if deadline.saturating_duration_since(Instant::now()).is_zero() {
        warn!(sequence, "No budget left for reasoning");
        return StageOutcome::Degraded {
            baseline: recommendation,
            reason: DegradeReason::BudgetExhausted,
        };
    }

    debug!(sequence, state = %CycleState::Reasoning, "Resolving through cascade");
    let request = ReasoningRequest {
        observation: validated,
        baseline: recommendation,
        prior_decisions,
    };
    let resolution = cascade.resolve_by(&request, deadline).await;
    StageOutcome::Reasoned {
        baseline: request.baseline,
        resolution,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::StrategyTable;
    use crate::cascade::ProviderError;
    use crate::sink::ChannelSink;
    use crate::types::Provenance;
    use async_trait::async_trait;

    struct Fixed(&'static str);

    #[async_trait]
    impl ReasoningProvider for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        async fn invoke(
            &self,
            request: &ReasoningRequest,
            _timeout: Duration,
        ) -> Result<ReasoningResult, ProviderError> {
            Ok(ReasoningResult {
                action: "raise".to_string(),
                amount: 10.0,
                confidence: 0.8,
                rationale: format!("{} prior", request.prior_decisions.len()),
                alternatives: Vec::new(),
                provenance: Provenance::BaselineOnly,
            })
        }
    }

    fn orchestrator(
        config: OrchestratorConfig,
    ) -> (
        DecisionOrchestrator,
        tokio::sync::mpsc::UnboundedReceiver<EmittedDecision>,
    ) {
        let (sink, rx) = ChannelSink::new();
        let providers: Vec<Arc<dyn ReasoningProvider>> = vec![Arc::new(Fixed("fixed"))];
        let config = OrchestratorConfig {
            provider_order: vec!["fixed".to_string()],
            ..config
        };
        let orch = DecisionOrchestrator::new(
            config,
            Collaborators::new(providers, Arc::new(StrategyTable::default()), Arc::new(sink)),
        )
        .unwrap();
        (orch, rx)
    }

    fn obs(seq: u64, conf: f64) -> Observation {
        Observation::new(seq).with_field("pot", seq as f64, conf)
    }

    #[tokio::test]
    async fn test_decision_carries_provider_and_latency() {
        let (mut orch, mut rx) = orchestrator(OrchestratorConfig::default());
        let emitted = orch.process(obs(1, 0.9)).await;
        assert!(matches!(emitted.event, DecisionEvent::Decision(_)));
        assert_eq!(emitted.metadata.provider.as_deref(), Some("fixed"));
        assert!(emitted.metadata.within_budget);
        assert_eq!(emitted.metadata.session_id, orch.session_id());
        assert_eq!(rx.try_recv().unwrap(), emitted);
    }

    #[tokio::test]
    async fn test_prior_decisions_bounded_by_context() {
        let config = OrchestratorConfig {
            context_decisions: 2,
            ..OrchestratorConfig::default()
        };
        let (mut orch, _rx) = orchestrator(config);
        let mut last = None;
        for seq in 1..=4 {
            last = Some(orch.process(obs(seq, 0.9)).await);
        }
        match last.unwrap().event {
            DecisionEvent::Decision(result) => assert_eq!(result.rationale, "2 prior"),
            other => panic!("expected decision, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_low_confidence_is_uncertain_without_stages() {
        let (mut orch, _rx) = orchestrator(OrchestratorConfig::default());
        match orch.begin(obs(1, 0.3)) {
            CycleStart::Finished(emitted) => {
                assert_eq!(emitted.event, DecisionEvent::Uncertain(0.3));
            }
            CycleStart::Pending(_) => panic!("low confidence must not start reasoning"),
        }
        assert_eq!(orch.stats().uncertain, 1);
    }

    #[tokio::test]
    async fn test_supersede_emits_nothing() {
        let (mut orch, mut rx) = orchestrator(OrchestratorConfig::default());
        let CycleStart::Pending(pending) = orch.begin(obs(1, 0.9)) else {
            panic!("expected pending cycle");
        };
        orch.supersede(pending);
        assert!(rx.try_recv().is_err());
        assert_eq!(orch.stats().superseded, 1);
        assert_eq!(orch.stats().emitted(), 0);
    }

    #[test]
    fn test_rejects_empty_provider_order() {
        let (sink, _rx) = ChannelSink::new();
        let config = OrchestratorConfig {
            provider_order: Vec::new(),
            ..OrchestratorConfig::default()
        };
        let result = DecisionOrchestrator::new(
            config,
            Collaborators::new(Vec::new(), Arc::new(StrategyTable::default()), Arc::new(sink)),
        );
        assert!(matches!(result, Err(ConfigurationError::NoProviders)));
    }

    #[test]
    fn test_captured_at_counts_against_budget() {
        let old = Observation::new(1).captured_at(chrono::Utc::now() - chrono::Duration::seconds(2));
        let start = cycle_start(&old);
        assert!(start.elapsed() >= Duration::from_millis(1_900));
    }
}
