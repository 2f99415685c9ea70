//! Orchestrator Scenario Tests
//!
//! Drives the full pipeline (validator → baseline → cascade → sink) with
//! scripted providers and baselines. Timing-sensitive tests run on tokio's
//! paused clock, so multi-second budgets complete instantly.

use async_trait::async_trait;
use cascade_advisor::baseline::{BaselineError, BaselineProvider};
use cascade_advisor::cascade::{CascadeSettings, ProviderError, ReasoningCascade, ReasoningProvider};
use cascade_advisor::config::OrchestratorConfig;
use cascade_advisor::observability::{AuditRecord, ChannelHook};
use cascade_advisor::pipeline::{Collaborators, DecisionOrchestrator, ProcessingLoop, ReplaySource};
use cascade_advisor::sink::{ChannelSink, DecisionSink, SinkError};
use cascade_advisor::types::{
    AttemptOutcome, BaselineRecommendation, DecisionEvent, DegradeReason, EmittedDecision,
    Observation, Provenance, ReasoningRequest, ReasoningResult, SkipReason, ValidatedObservation,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Scripted Collaborators
// ============================================================================

#[derive(Clone)]
enum Behavior {
    Succeed(&'static str, f64),
    Fail(ProviderError),
    Hang,
}

struct ScriptedProvider {
    name: &'static str,
    behavior: Behavior,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(name: &'static str, behavior: Behavior, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            name,
            behavior,
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningProvider for ScriptedProvider {
    fn name(&self) -> &str {
        self.name
    }

    async fn invoke(
        &self,
        _request: &ReasoningRequest,
        _timeout: Duration,
    ) -> Result<ReasoningResult, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        match &self.behavior {
            Behavior::Succeed(action, amount) => Ok(ReasoningResult {
                action: (*action).to_string(),
                amount: *amount,
                confidence: 0.8,
                rationale: format!("from {}", self.name),
                alternatives: Vec::new(),
                provenance: Provenance::BaselineOnly,
            }),
            Behavior::Fail(e) => Err(e.clone()),
            Behavior::Hang => std::future::pending().await,
        }
    }
}

struct ScriptedBaseline {
    recommendation: Option<BaselineRecommendation>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedBaseline {
    fn answering(recommendation: BaselineRecommendation, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            recommendation: Some(recommendation),
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            recommendation: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl BaselineProvider for ScriptedBaseline {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn lookup(
        &self,
        _observation: &ValidatedObservation,
    ) -> Result<BaselineRecommendation, BaselineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.recommendation
            .clone()
            .ok_or_else(|| BaselineError::Unavailable("scripted outage".to_string()))
    }
}

struct RejectingSink;

impl DecisionSink for RejectingSink {
    fn deliver(&self, _decision: &EmittedDecision) -> Result<(), SinkError> {
        Err(SinkError::Closed)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn hold_baseline() -> BaselineRecommendation {
    BaselineRecommendation::new("hold", 0.0, 0.4)
}

/// Default field rules: hole_cards stable, pot non-decreasing, board append-only.
fn config(order: &[&str]) -> OrchestratorConfig {
    OrchestratorConfig {
        provider_order: order.iter().map(|s| (*s).to_string()).collect(),
        ..OrchestratorConfig::default()
    }
}

fn build(
    config: OrchestratorConfig,
    providers: Vec<Arc<ScriptedProvider>>,
    baseline: Arc<ScriptedBaseline>,
) -> (DecisionOrchestrator, UnboundedReceiver<EmittedDecision>) {
    let (sink, rx) = ChannelSink::new();
    let providers: Vec<Arc<dyn ReasoningProvider>> = providers
        .into_iter()
        .map(|p| p as Arc<dyn ReasoningProvider>)
        .collect();
    let orch = DecisionOrchestrator::new(config, Collaborators::new(providers, baseline, Arc::new(sink)))
        .expect("valid orchestrator");
    (orch, rx)
}

fn hand(seq: u64, cards: Vec<&str>, pot: f64, confidence: f64) -> Observation {
    Observation::new(seq)
        .with_field("hole_cards", cards, confidence)
        .with_field("pot", pot, confidence)
}

fn drain(rx: &mut UnboundedReceiver<EmittedDecision>) -> Vec<EmittedDecision> {
    std::iter::from_fn(|| rx.try_recv().ok()).collect()
}

// ============================================================================
// Concrete Scenarios
// ============================================================================

#[tokio::test]
async fn stable_hand_is_accepted_every_cycle() {
    let provider = ScriptedProvider::new("a", Behavior::Succeed("raise", 6.0), Duration::ZERO);
    let (mut orch, mut rx) = build(
        config(&["a"]),
        vec![provider],
        ScriptedBaseline::answering(hold_baseline(), Duration::ZERO),
    );

    for (seq, (pot, conf)) in [(3.0, 0.95), (5.0, 0.9), (9.0, 0.92)].into_iter().enumerate() {
        let emitted = orch.process(hand(seq as u64 + 1, vec!["Ah", "Kd"], pot, conf)).await;
        assert!((emitted.metadata.aggregate_confidence - conf).abs() < 1e-9);
        assert!(matches!(emitted.event, DecisionEvent::Decision(_)));
    }

    assert_eq!(drain(&mut rx).len(), 3);
    assert_eq!(orch.stats().history_resets, 0);
    assert_eq!(orch.validator().window().len(), 3);
}

#[tokio::test]
async fn identity_change_resets_history_and_is_uncertain() {
    let provider = ScriptedProvider::new("a", Behavior::Succeed("raise", 6.0), Duration::ZERO);
    let (mut orch, mut rx) = build(
        config(&["a"]),
        vec![Arc::clone(&provider)],
        ScriptedBaseline::answering(hold_baseline(), Duration::ZERO),
    );

    orch.process(hand(1, vec!["Ah", "Kd"], 3.0, 0.95)).await;
    orch.process(hand(2, vec!["Ah", "Kd"], 5.0, 0.95)).await;
    let third = orch.process(hand(3, vec!["7c", "2d"], 1.5, 0.95)).await;

    assert_eq!(third.event, DecisionEvent::Uncertain(0.0));
    assert_eq!(orch.stats().history_resets, 1);
    let window: Vec<u64> = orch.validator().window().iter().map(|o| o.sequence).collect();
    assert_eq!(window, vec![3]);
    // Rejected cycles never reach reasoning.
    assert_eq!(provider.calls(), 2);
    assert_eq!(drain(&mut rx).len(), 3);
}

#[tokio::test]
async fn default_rules_detect_new_hand() {
    let provider = ScriptedProvider::new("a", Behavior::Succeed("raise", 6.0), Duration::ZERO);
    let (mut orch, _rx) = build(
        config(&["a"]),
        vec![Arc::clone(&provider)],
        ScriptedBaseline::answering(hold_baseline(), Duration::ZERO),
    );

    let first = orch.process(hand(1, vec!["Ah", "Kd"], 40.0, 0.95)).await;
    let second = orch.process(hand(2, vec!["7c", "2d"], 3.0, 0.95)).await;

    assert!(matches!(first.event, DecisionEvent::Decision(_)));
    assert_eq!(second.event, DecisionEvent::Uncertain(0.0));
    assert_eq!(orch.stats().history_resets, 1);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn emptied_board_resets_history() {
    let provider = ScriptedProvider::new("a", Behavior::Succeed("raise", 6.0), Duration::ZERO);
    let (mut orch, _rx) = build(
        config(&["a"]),
        vec![Arc::clone(&provider)],
        ScriptedBaseline::answering(hold_baseline(), Duration::ZERO),
    );
    let with_board = |seq: u64, board: Vec<&str>| {
        hand(seq, vec!["Ah", "Kd"], 10.0, 0.95).with_field("board", board, 0.95)
    };

    orch.process(with_board(1, vec!["2h", "3h", "4h"])).await;
    let emitted = orch.process(with_board(2, vec![])).await;

    assert_eq!(emitted.event, DecisionEvent::Uncertain(0.0));
    assert_eq!(orch.stats().history_resets, 1);
    let window: Vec<u64> = orch.validator().window().iter().map(|o| o.sequence).collect();
    assert_eq!(window, vec![2]);
}

#[tokio::test(start_paused = true)]
async fn timed_out_provider_falls_through_to_next() {
    let a = ScriptedProvider::new(
        "a",
        Behavior::Fail(ProviderError::Timeout(Duration::from_secs(5))),
        Duration::ZERO,
    );
    let b = ScriptedProvider::new("b", Behavior::Succeed("call", 4.0), Duration::from_millis(200));
    let settings = CascadeSettings {
        provider_timeout: Duration::from_secs(5),
        cascade_deadline: None,
        min_attempt_budget: Duration::from_millis(250),
    };
    let cascade = ReasoningCascade::new(
        vec![Arc::clone(&a) as Arc<dyn ReasoningProvider>, Arc::clone(&b) as _],
        settings,
    )
    .unwrap();
    let request = ReasoningRequest {
        observation: ValidatedObservation {
            observation: hand(1, vec!["Ah", "Kd"], 3.0, 0.9),
            field_confidence: 0.9,
            consistency_score: 1.0,
            aggregate_confidence: 0.9,
            accepted: true,
            history_reset: false,
            violations: Vec::new(),
        },
        baseline: hold_baseline(),
        prior_decisions: Vec::new(),
    };

    let start = Instant::now();
    let resolution = cascade.resolve(&request).await;

    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(200) && elapsed < Duration::from_millis(250));
    assert_eq!(resolution.result.provenance, Provenance::Provider("b".to_string()));
    assert_eq!(resolution.attempts[0].outcome, AttemptOutcome::Timeout);
    assert!(resolution.attempts[1].outcome.is_success());
}

#[tokio::test(start_paused = true)]
async fn hung_provider_costs_its_full_timeout() {
    let a = ScriptedProvider::new("a", Behavior::Hang, Duration::ZERO);
    let b = ScriptedProvider::new("b", Behavior::Succeed("call", 4.0), Duration::from_millis(200));
    let mut cfg = config(&["a", "b"]);
    cfg.provider_timeout = Duration::from_secs(1);
    let (mut orch, _rx) = build(
        cfg,
        vec![a, b],
        ScriptedBaseline::answering(hold_baseline(), Duration::ZERO),
    );

    let emitted = orch.process(hand(1, vec!["Ah", "Kd"], 3.0, 0.9)).await;

    assert_eq!(emitted.metadata.provider.as_deref(), Some("b"));
    assert_eq!(emitted.metadata.attempts[0].outcome, AttemptOutcome::Timeout);
    let hung = emitted.metadata.attempts[0].elapsed;
    assert!(hung >= Duration::from_secs(1) && hung < Duration::from_millis(1050));
    assert!(emitted.metadata.within_budget);
}

#[tokio::test]
async fn exhausted_cascade_degrades_to_baseline() {
    let providers = vec![
        ScriptedProvider::new("a", Behavior::Fail(ProviderError::Transport("refused".into())), Duration::ZERO),
        ScriptedProvider::new("b", Behavior::Fail(ProviderError::InvalidResponse("no json".into())), Duration::ZERO),
        ScriptedProvider::new("c", Behavior::Fail(ProviderError::Unavailable("no key".into())), Duration::ZERO),
    ];
    let (mut orch, mut rx) = build(
        config(&["a", "b", "c"]),
        providers,
        ScriptedBaseline::answering(hold_baseline(), Duration::ZERO),
    );

    let emitted = orch.process(hand(1, vec!["Ah", "Kd"], 3.0, 0.9)).await;

    match &emitted.event {
        DecisionEvent::Degraded(baseline) => {
            assert_eq!(baseline.action, "hold");
            assert_eq!(baseline.amount, 0.0);
            assert_eq!(baseline.confidence, 0.4);
        }
        other => panic!("expected degraded, got {other:?}"),
    }
    assert_eq!(emitted.metadata.degrade_reason, Some(DegradeReason::CascadeExhausted));
    assert_eq!(emitted.metadata.attempts.len(), 3);
    assert_eq!(drain(&mut rx), vec![emitted]);
}

#[tokio::test(start_paused = true)]
async fn slow_baseline_leaves_no_budget_for_reasoning() {
    let a = ScriptedProvider::new("a", Behavior::Succeed("raise", 6.0), Duration::ZERO);
    let mut cfg = config(&["a"]);
    cfg.cycle_deadline = Duration::from_millis(3000);
    cfg.baseline_timeout = Duration::from_millis(2950);
    let (mut orch, _rx) = build(
        cfg,
        vec![Arc::clone(&a)],
        ScriptedBaseline::answering(hold_baseline(), Duration::from_millis(2900)),
    );

    let emitted = orch.process(hand(1, vec!["Ah", "Kd"], 3.0, 0.9)).await;

    assert_eq!(a.calls(), 0, "provider must not be started without budget");
    assert!(matches!(emitted.event, DecisionEvent::Degraded(_)));
    assert_eq!(emitted.metadata.degrade_reason, Some(DegradeReason::BudgetExhausted));
    assert_eq!(
        emitted.metadata.attempts[0].outcome,
        AttemptOutcome::Skipped(SkipReason::DeadlineExhausted)
    );
}

#[tokio::test(start_paused = true)]
async fn newer_observation_supersedes_pending_reasoning() {
    let slow = ScriptedProvider::new("slow", Behavior::Succeed("raise", 6.0), Duration::from_secs(4));
    let (orch, mut rx) = build(
        config(&["slow"]),
        vec![Arc::clone(&slow)],
        ScriptedBaseline::answering(hold_baseline(), Duration::ZERO),
    );
    let source = ReplaySource::new(
        vec![
            hand(1, vec!["Ah", "Kd"], 3.0, 0.9),
            hand(2, vec!["Ah", "Kd"], 5.0, 0.9),
        ],
        50,
    );

    let stats = ProcessingLoop::new(orch, CancellationToken::new()).run(source).await;

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1, "only the second cycle may emit");
    assert_eq!(events[0].metadata.sequence, 2);
    assert_eq!(stats.superseded, 1);
    assert_eq!(slow.calls(), 2);
}

// ============================================================================
// Properties
// ============================================================================

#[tokio::test]
async fn one_event_per_observation() {
    let a = ScriptedProvider::new("a", Behavior::Succeed("raise", 6.0), Duration::ZERO);
    let (mut orch, mut rx) = build(
        config(&["a"]),
        vec![a],
        ScriptedBaseline::answering(hold_baseline(), Duration::ZERO),
    );

    let confidences = [0.9, 0.3, 0.95, 0.1, 0.8, 0.85, 0.2];
    for (i, conf) in confidences.iter().enumerate() {
        orch.process(hand(i as u64 + 1, vec!["Ah", "Kd"], 3.0 + i as f64, *conf)).await;
    }

    let events = drain(&mut rx);
    assert_eq!(events.len(), confidences.len());
    let seqs: Vec<u64> = events.iter().map(|e| e.metadata.sequence).collect();
    assert_eq!(seqs, (1..=confidences.len() as u64).collect::<Vec<_>>());
    assert_eq!(orch.stats().emitted(), confidences.len() as u64);
}

#[tokio::test(start_paused = true)]
async fn cycle_latency_stays_within_deadline() {
    let providers = vec![
        ScriptedProvider::new("a", Behavior::Hang, Duration::ZERO),
        ScriptedProvider::new("b", Behavior::Hang, Duration::ZERO),
        ScriptedProvider::new("c", Behavior::Hang, Duration::ZERO),
    ];
    let cfg = config(&["a", "b", "c"]);
    let deadline = cfg.cycle_deadline;
    let (mut orch, _rx) = build(
        cfg,
        providers,
        ScriptedBaseline::answering(hold_baseline(), Duration::from_millis(100)),
    );

    let emitted = orch.process(hand(1, vec!["Ah", "Kd"], 3.0, 0.9)).await;

    assert!(emitted.metadata.cycle_latency <= deadline + Duration::from_millis(50));
    let outcomes: Vec<&AttemptOutcome> = emitted.metadata.attempts.iter().map(|a| &a.outcome).collect();
    assert_eq!(outcomes[0], &AttemptOutcome::Timeout);
    for later in &outcomes[1..] {
        assert_eq!(*later, &AttemptOutcome::Skipped(SkipReason::DeadlineExhausted));
    }
    assert_eq!(emitted.metadata.degrade_reason, Some(DegradeReason::BudgetExhausted));
}

#[tokio::test]
async fn cascade_stops_at_first_success() {
    let a = ScriptedProvider::new("a", Behavior::Fail(ProviderError::Transport("500".into())), Duration::ZERO);
    let b = ScriptedProvider::new("b", Behavior::Succeed("call", 2.0), Duration::ZERO);
    let c = ScriptedProvider::new("c", Behavior::Succeed("fold", 0.0), Duration::ZERO);
    let (mut orch, _rx) = build(
        config(&["a", "b", "c"]),
        vec![Arc::clone(&a), Arc::clone(&b), Arc::clone(&c)],
        ScriptedBaseline::answering(hold_baseline(), Duration::ZERO),
    );

    let emitted = orch.process(hand(1, vec!["Ah", "Kd"], 3.0, 0.9)).await;

    match emitted.event {
        DecisionEvent::Decision(result) => {
            assert_eq!(result.provenance.tag(), "b");
            assert_eq!(result.action, "call");
        }
        other => panic!("expected decision, got {other:?}"),
    }
    assert_eq!((a.calls(), b.calls(), c.calls()), (1, 1, 0));
}

#[tokio::test]
async fn provider_order_follows_config_not_registration() {
    let a = ScriptedProvider::new("a", Behavior::Succeed("raise", 6.0), Duration::ZERO);
    let b = ScriptedProvider::new("b", Behavior::Succeed("call", 2.0), Duration::ZERO);
    let (mut orch, _rx) = build(
        config(&["b", "a"]),
        vec![Arc::clone(&a), Arc::clone(&b)],
        ScriptedBaseline::answering(hold_baseline(), Duration::ZERO),
    );

    let emitted = orch.process(hand(1, vec!["Ah", "Kd"], 3.0, 0.9)).await;

    assert_eq!(emitted.metadata.provider.as_deref(), Some("b"));
    assert_eq!(a.calls(), 0);
}

// ============================================================================
// Failure Handling
// ============================================================================

#[tokio::test]
async fn low_confidence_skips_baseline_and_providers() {
    let a = ScriptedProvider::new("a", Behavior::Succeed("raise", 6.0), Duration::ZERO);
    let baseline = ScriptedBaseline::answering(hold_baseline(), Duration::ZERO);
    let (mut orch, _rx) = build(config(&["a"]), vec![Arc::clone(&a)], Arc::clone(&baseline));

    let emitted = orch.process(hand(1, vec!["Ah", "Kd"], 3.0, 0.4)).await;

    assert_eq!(emitted.event, DecisionEvent::Uncertain(0.4));
    assert_eq!(a.calls(), 0);
    assert_eq!(baseline.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn baseline_outage_degrades_to_neutral_hold() {
    let a = ScriptedProvider::new("a", Behavior::Succeed("raise", 6.0), Duration::ZERO);
    let (mut orch, _rx) = build(config(&["a"]), vec![Arc::clone(&a)], ScriptedBaseline::failing());

    let emitted = orch.process(hand(1, vec!["Ah", "Kd"], 3.0, 0.9)).await;

    assert_eq!(emitted.event, DecisionEvent::Degraded(BaselineRecommendation::neutral()));
    assert_eq!(emitted.metadata.degrade_reason, Some(DegradeReason::BaselineUnavailable));
    assert_eq!(a.calls(), 0);
}

#[tokio::test]
async fn sink_failure_is_counted_not_fatal() {
    let a = ScriptedProvider::new("a", Behavior::Succeed("raise", 6.0), Duration::ZERO);
    let mut orch = DecisionOrchestrator::new(
        config(&["a"]),
        Collaborators::new(
            vec![a as Arc<dyn ReasoningProvider>],
            ScriptedBaseline::answering(hold_baseline(), Duration::ZERO),
            Arc::new(RejectingSink),
        ),
    )
    .unwrap();

    let emitted = orch.process(hand(1, vec!["Ah", "Kd"], 3.0, 0.9)).await;

    assert!(matches!(emitted.event, DecisionEvent::Decision(_)));
    assert_eq!(orch.stats().sink_failures, 1);
    assert_eq!(orch.stats().decisions, 1);
}

#[tokio::test]
async fn hook_sees_attempts_and_cycles() {
    let a = ScriptedProvider::new("a", Behavior::Fail(ProviderError::Transport("reset".into())), Duration::ZERO);
    let b = ScriptedProvider::new("b", Behavior::Succeed("call", 2.0), Duration::ZERO);
    let (hook, mut audit) = ChannelHook::new(16);
    let (sink, _rx) = ChannelSink::new();
    let mut orch = DecisionOrchestrator::new(
        config(&["a", "b"]),
        Collaborators::new(
            vec![a as Arc<dyn ReasoningProvider>, b as _],
            ScriptedBaseline::answering(hold_baseline(), Duration::ZERO),
            Arc::new(sink),
        )
        .with_hook(Arc::new(hook)),
    )
    .unwrap();

    orch.process(hand(1, vec!["Ah", "Kd"], 3.0, 0.9)).await;

    let records: Vec<AuditRecord> = std::iter::from_fn(|| audit.try_recv().ok()).collect();
    assert_eq!(records.len(), 3);
    assert!(matches!(&records[0], AuditRecord::Attempt(r) if r.provider == "a"));
    assert!(matches!(&records[1], AuditRecord::Attempt(r) if r.outcome.is_success()));
    assert!(matches!(&records[2], AuditRecord::Cycle(r) if r.sequence == 1));
}

#[tokio::test]
async fn repeated_exhaustion_builds_streak() {
    let a = ScriptedProvider::new("a", Behavior::Fail(ProviderError::Transport("down".into())), Duration::ZERO);
    let (mut orch, _rx) = build(
        config(&["a"]),
        vec![a],
        ScriptedBaseline::answering(hold_baseline(), Duration::ZERO),
    );

    for seq in 1..=4 {
        orch.process(hand(seq, vec!["Ah", "Kd"], seq as f64, 0.9)).await;
    }

    assert_eq!(orch.stats().exhaustion_streak, 4);
    assert_eq!(orch.stats().cascade_exhaustions, 4);
}
