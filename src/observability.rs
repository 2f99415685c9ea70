//! Observability hooks for cascade attempts and finished cycles.
//!
//! Hooks are called inline on the cycle's task, so implementations must not
//! block: `TracingHook` only logs and `ChannelHook` uses `try_send`, counting
//! records it had to drop when the observer falls behind.

use crate::types::{AttemptRecord, CycleOutcome, CycleRecord};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Receiver of structured audit records.
///
/// Both methods default to no-ops so an observer only implements what it
/// consumes.
pub trait ObservabilityHook: Send + Sync {
    /// One record per cascade attempt, including skips.
    fn on_attempt(&self, _record: &AttemptRecord) {}

    /// One record per cycle, including superseded ones.
    fn on_cycle(&self, _record: &CycleRecord) {}
}

/// No-op hook for tests and embedders that do not need audit records.
impl ObservabilityHook for () {}

// ============================================================================
// Tracing Hook
// ============================================================================

/// Logs every record through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingHook;

impl ObservabilityHook for TracingHook {
    fn on_attempt(&self, record: &AttemptRecord) {
        let elapsed_ms = record.elapsed.as_millis() as u64;
        if record.outcome.is_success() {
            info!(
                sequence = record.sequence,
                provider = %record.provider,
                elapsed_ms,
                "Provider attempt succeeded"
            );
        } else {
            warn!(
                sequence = record.sequence,
                provider = %record.provider,
                outcome = record.outcome.label(),
                elapsed_ms,
                "Provider attempt failed"
            );
        }
    }

    fn on_cycle(&self, record: &CycleRecord) {
        let latency_ms = record.total_latency.as_millis() as u64;
        match record.outcome {
            CycleOutcome::Superseded => debug!(
                sequence = record.sequence,
                latency_ms,
                "Cycle superseded by newer observation"
            ),
            outcome => info!(
                sequence = record.sequence,
                outcome = %outcome,
                aggregate_confidence = record.aggregate_confidence,
                latency_ms,
                "Cycle complete"
            ),
        }
    }
}

// ============================================================================
// Channel Hook
// ============================================================================

/// Record forwarded by [`ChannelHook`].
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum AuditRecord {
    Attempt(AttemptRecord),
    Cycle(CycleRecord),
}

/// Forwards records to a bounded channel without ever waiting.
pub struct ChannelHook {
    tx: mpsc::Sender<AuditRecord>,
    dropped: AtomicU64,
}

impl ChannelHook {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AuditRecord>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Records discarded because the channel was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn forward(&self, record: AuditRecord) {
        if self.tx.try_send(record).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl ObservabilityHook for ChannelHook {
    fn on_attempt(&self, record: &AttemptRecord) {
        self.forward(AuditRecord::Attempt(record.clone()));
    }

    fn on_cycle(&self, record: &CycleRecord) {
        self.forward(AuditRecord::Cycle(record.clone()));
    }
}

// ============================================================================
// Fan-out
// ============================================================================

/// Calls every registered hook in registration order.
#[derive(Default, Clone)]
pub struct HookSet {
    hooks: Vec<Arc<dyn ObservabilityHook>>,
}

impl HookSet {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, hook: Arc<dyn ObservabilityHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl ObservabilityHook for HookSet {
    fn on_attempt(&self, record: &AttemptRecord) {
        for hook in &self.hooks {
            hook.on_attempt(record);
        }
    }

    fn on_cycle(&self, record: &CycleRecord) {
        for hook in &self.hooks {
            hook.on_cycle(record);
        }
    }
}
