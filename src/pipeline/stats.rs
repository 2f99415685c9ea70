//! Session counters and rolling cycle latency.

use crate::config::defaults;
use crate::types::{CycleOutcome, DegradeReason};
use std::collections::VecDeque;
use std::time::Duration;

/// Counters for one orchestrator session.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub observations: u64,
    pub decisions: u64,
    pub uncertain: u64,
    pub degraded: u64,
    pub superseded: u64,
    pub history_resets: u64,
    /// Degraded cycles where no provider produced a result.
    pub cascade_exhaustions: u64,
    pub sink_failures: u64,
    /// Cycles that finished past their deadline.
    pub over_budget: u64,
    /// Consecutive cycles that ended with the cascade exhausted.
    pub exhaustion_streak: u32,
    latencies: VecDeque<Duration>,
}

impl PipelineStats {
    /// Events handed to the sink: one per non-superseded cycle.
    pub fn emitted(&self) -> u64 {
        self.decisions + self.uncertain + self.degraded
    }

    /// Count a finished cycle. Returns the updated exhaustion streak.
    pub(crate) fn record_cycle(&mut self, outcome: CycleOutcome, latency: Duration) -> u32 {
        match outcome {
            CycleOutcome::Decided => {
                self.decisions += 1;
                self.exhaustion_streak = 0;
            }
            CycleOutcome::Uncertain => self.uncertain += 1,
            CycleOutcome::Degraded(reason) => {
                self.degraded += 1;
                if matches!(
                    reason,
                    DegradeReason::CascadeExhausted | DegradeReason::BudgetExhausted
                ) {
                    self.cascade_exhaustions += 1;
                    self.exhaustion_streak += 1;
                }
            }
            CycleOutcome::Superseded => {
                self.superseded += 1;
                return self.exhaustion_streak;
            }
        }
        if self.latencies.len() == defaults::LATENCY_WINDOW {
            self.latencies.pop_front();
        }
        self.latencies.push_back(latency);
        self.exhaustion_streak
    }

    pub fn mean_latency(&self) -> Option<Duration> {
        if self.latencies.is_empty() {
            return None;
        }
        let total: Duration = self.latencies.iter().sum();
        Some(total / self.latencies.len() as u32)
    }

    /// 95th percentile over the rolling window.
    pub fn p95_latency(&self) -> Option<Duration> {
        if self.latencies.is_empty() {
            return None;
        }
        let mut sorted: Vec<Duration> = self.latencies.iter().copied().collect();
        sorted.sort();
        let idx = (sorted.len() as f64 * 0.95) as usize;
        Some(sorted[idx.min(sorted.len() - 1)])
    }
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ms = |d: Option<Duration>| d.map_or(0, |d| d.as_millis());
        write!(
            f,
            "Pipeline: {} observations, {} decisions, {} uncertain, {} degraded, {} superseded, {} resets | latency mean {}ms p95 {}ms",
            self.observations,
            self.decisions,
            self.uncertain,
            self.degraded,
            self.superseded,
            self.history_resets,
            ms(self.mean_latency()),
            ms(self.p95_latency()),
        )
    }
}
