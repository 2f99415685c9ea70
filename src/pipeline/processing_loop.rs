//! Observation processing loop.
//!
//! Reads observations from an [`ObservationSource`] on a separate task and
//! feeds them to the [`DecisionOrchestrator`]. At most one cycle is in
//! flight; a newer observation supersedes it, dropping its pending baseline
//! lookup or provider call without emitting anything.

use super::orchestrator::{CycleStart, DecisionOrchestrator, PendingCycle, StageOutcome};
use super::source::{ObservationEvent, ObservationSource};
use super::stats::PipelineStats;
use crate::config::defaults;
use crate::types::{DecisionEvent, EmittedDecision};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

// ============================================================================
// Processing Loop
// ============================================================================

/// Owns the orchestrator for the lifetime of one session.
///
/// Built with [`new()`](ProcessingLoop::new), then consumed by
/// [`run()`](ProcessingLoop::run).
pub struct ProcessingLoop {
    orchestrator: DecisionOrchestrator,
    cancel_token: CancellationToken,
}

impl ProcessingLoop {
    pub fn new(orchestrator: DecisionOrchestrator, cancel_token: CancellationToken) -> Self {
        Self {
            orchestrator,
            cancel_token,
        }
    }

    /// Run until the source is exhausted or the token is cancelled.
    ///
    /// On EOF the in-flight cycle is allowed to finish. On cancellation it is
    /// superseded. Returns final pipeline statistics.
    pub async fn run<S: ObservationSource>(mut self, source: S) -> PipelineStats {
        info!(
            "📊 Processing observations from {} (session {})...",
            source.source_name(),
            self.orchestrator.session_id()
        );
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        let (tx, mut rx) = mpsc::channel(defaults::SOURCE_CHANNEL_CAPACITY);
        let reader_token = self.cancel_token.child_token();
        let reader = tokio::spawn(read_source(source, tx, reader_token.clone()));

        let mut in_flight: Option<PendingCycle> = None;
        let mut source_done = false;

        while !(source_done && in_flight.is_none()) {
            tokio::select! {
                biased;

                _ = self.cancel_token.cancelled() => {
                    info!("[ProcessingLoop] Shutdown signal received");
                    if let Some(pending) = in_flight.take() {
                        self.orchestrator.supersede(pending);
                    }
                    break;
                }

                outcome = poll_in_flight(&mut in_flight), if in_flight.is_some() => {
                    if let Some(pending) = in_flight.take() {
                        let emitted = self.orchestrator.complete(pending.ticket, outcome);
                        log_decision(&emitted);
                    }
                }

                event = rx.recv(), if !source_done => {
                    match event {
                        Some(ObservationEvent::Observation(obs)) => {
                            if let Some(pending) = in_flight.take() {
                                debug!(
                                    superseded = pending.ticket.sequence,
                                    by = obs.sequence,
                                    "Newer observation arrived"
                                );
                                self.orchestrator.supersede(pending);
                            }
                            match self.orchestrator.begin(obs) {
                                CycleStart::Finished(emitted) => log_decision(&emitted),
                                CycleStart::Pending(pending) => in_flight = Some(pending),
                            }
                            self.log_progress();
                        }
                        Some(ObservationEvent::Eof) | None => {
                            info!(
                                "[ProcessingLoop] Source reached end ({} observations)",
                                self.orchestrator.stats().observations
                            );
                            source_done = true;
                        }
                    }
                }
            }
        }

        reader_token.cancel();
        reader.abort();

        let stats = self.orchestrator.stats().clone();
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!("📊 FINAL STATISTICS");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!("   Observations:     {}", stats.observations);
        info!("   Decisions:        {}", stats.decisions);
        info!("   Uncertain:        {}", stats.uncertain);
        info!("   Degraded:         {}", stats.degraded);
        info!("   Superseded:       {}", stats.superseded);
        info!("   History Resets:   {}", stats.history_resets);
        info!("   Exhaustions:      {}", stats.cascade_exhaustions);
        info!("   Over Budget:      {}", stats.over_budget);
        info!("   Sink Failures:    {}", stats.sink_failures);
        info!(
            "   Latency:          mean {}ms, p95 {}ms",
            stats.mean_latency().map_or(0, |d| d.as_millis()),
            stats.p95_latency().map_or(0, |d| d.as_millis())
        );
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        stats
    }

    fn log_progress(&self) {
        let stats = self.orchestrator.stats();
        if stats.observations % 10 == 0 {
            info!("📈 Progress: {}", stats);
        }
    }
}

/// Pump the source into the channel until EOF, error, or cancellation.
async fn read_source<S: ObservationSource>(
    mut source: S,
    tx: mpsc::Sender<ObservationEvent>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            result = source.next_observation() => match result {
                Ok(event) => event,
                Err(e) => {
                    warn!("[ProcessingLoop] Source error: {}", e);
                    ObservationEvent::Eof
                }
            },
        };
        let eof = matches!(event, ObservationEvent::Eof);
        if tx.send(event).await.is_err() || eof {
            break;
        }
    }
}

/// Drive the in-flight cycle's stages. Never resolves when nothing is in flight.
async fn poll_in_flight(in_flight: &mut Option<PendingCycle>) -> StageOutcome {
    match in_flight {
        Some(pending) => (&mut pending.work).await,
        None => std::future::pending().await,
    }
}

fn log_decision(emitted: &EmittedDecision) {
    let meta = &emitted.metadata;
    match &emitted.event {
        DecisionEvent::Decision(result) => info!(
            "🎯 #{} {} {:.2} (conf {:.0}%, {}, {}ms)",
            meta.sequence,
            result.action.to_uppercase(),
            result.amount,
            result.confidence * 100.0,
            result.provenance,
            meta.cycle_latency.as_millis()
        ),
        DecisionEvent::Uncertain(aggregate) => info!(
            "❔ #{} uncertain (aggregate {:.2})",
            meta.sequence, aggregate
        ),
        DecisionEvent::Degraded(baseline) => warn!(
            "⚠️  #{} degraded ({}): baseline {} {:.2}",
            meta.sequence,
            meta.degrade_reason
                .map_or_else(|| "unknown".to_string(), |r| r.to_string()),
            baseline.action.to_uppercase(),
            baseline.amount
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::StrategyTable;
    use crate::cascade::{ProviderError, ReasoningProvider};
    use crate::config::OrchestratorConfig;
    use crate::pipeline::orchestrator::Collaborators;
    use crate::pipeline::source::ReplaySource;
    use crate::sink::ChannelSink;
    use crate::types::{Observation, Provenance, ReasoningRequest, ReasoningResult};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    /// Answers after a fixed delay.
    struct Slow(Duration);

    #[async_trait]
    impl ReasoningProvider for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn invoke(
            &self,
            request: &ReasoningRequest,
            _timeout: Duration,
        ) -> Result<ReasoningResult, ProviderError> {
            tokio::time::sleep(self.0).await;
            Ok(ReasoningResult {
                action: "call".to_string(),
                amount: request.observation.sequence() as f64,
                confidence: 0.7,
                rationale: "slow".to_string(),
                alternatives: Vec::new(),
                provenance: Provenance::BaselineOnly,
            })
        }
    }

    fn processing_loop(
        delay: Duration,
        cancel: CancellationToken,
    ) -> (ProcessingLoop, mpsc::UnboundedReceiver<EmittedDecision>) {
        let (sink, rx) = ChannelSink::new();
        let config = OrchestratorConfig {
            provider_order: vec!["slow".to_string()],
            ..OrchestratorConfig::default()
        };
        let orch = DecisionOrchestrator::new(
            config,
            Collaborators::new(
                vec![Arc::new(Slow(delay))],
                Arc::new(StrategyTable::default()),
                Arc::new(sink),
            ),
        )
        .unwrap();
        (ProcessingLoop::new(orch, cancel), rx)
    }

    fn obs(seq: u64) -> Observation {
        Observation::new(seq).with_field("pot", seq as f64, 0.9)
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_observation_supersedes_in_flight_cycle() {
        let (pl, mut rx) = processing_loop(Duration::from_secs(2), CancellationToken::new());
        let source = ReplaySource::new(vec![obs(1), obs(2)], 500);

        let stats = pl.run(source).await;

        assert_eq!(stats.superseded, 1);
        assert_eq!(stats.decisions, 1);
        let emitted = rx.try_recv().unwrap();
        assert_eq!(emitted.metadata.sequence, 2);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_eof_lets_in_flight_cycle_finish() {
        let (pl, mut rx) = processing_loop(Duration::from_millis(800), CancellationToken::new());
        let source = ReplaySource::new(vec![obs(1)], 0);

        let stats = pl.run(source).await;

        assert_eq!(stats.decisions, 1);
        assert_eq!(stats.superseded, 0);
        assert!(matches!(rx.try_recv().unwrap().event, DecisionEvent::Decision(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_supersedes_in_flight_cycle() {
        let cancel = CancellationToken::new();
        let (pl, mut rx) = processing_loop(Duration::from_secs(2), cancel.clone());
        // Long gap so the source never reaches EOF before cancellation.
        let source = ReplaySource::new(vec![obs(1), obs(2)], 60_000);

        let handle = tokio::spawn(pl.run(source));
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
        let stats = handle.await.unwrap();

        assert_eq!(stats.superseded, 1);
        assert_eq!(stats.emitted(), 0);
        assert!(rx.try_recv().is_err());
    }
}
