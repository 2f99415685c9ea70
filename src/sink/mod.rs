//! Decision Sinks
//!
//! Where emitted decisions go. Delivery is fire-and-forget from the
//! pipeline's point of view: a failing sink is logged and counted, never
//! allowed to change a cycle's outcome.

use crate::types::EmittedDecision;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("sink closed")]
    Closed,
    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sink serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("sink storage error: {0}")]
    Storage(String),
}

/// Receives every emitted decision exactly once, in emission order.
pub trait DecisionSink: Send + Sync {
    fn deliver(&self, decision: &EmittedDecision) -> Result<(), SinkError>;
}

// ============================================================================
// Channel Sink
// ============================================================================

/// Forwards decisions to an unbounded channel (display task, tests).
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<EmittedDecision>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EmittedDecision>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl DecisionSink for ChannelSink {
    fn deliver(&self, decision: &EmittedDecision) -> Result<(), SinkError> {
        self.tx.send(decision.clone()).map_err(|_| SinkError::Closed)
    }
}

// ============================================================================
// JSON Lines Sink
// ============================================================================

/// Writes one JSON object per line (stdout, a file).
pub struct JsonLinesSink<W: Write + Send> {
    out: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> DecisionSink for JsonLinesSink<W> {
    fn deliver(&self, decision: &EmittedDecision) -> Result<(), SinkError> {
        let line = serde_json::to_string(decision)?;
        let mut out = self
            .out
            .lock()
            .map_err(|_| SinkError::Storage("writer lock poisoned".to_string()))?;
        writeln!(out, "{line}")?;
        out.flush()?;
        Ok(())
    }
}

// ============================================================================
// Fan-out
// ============================================================================

/// Delivers to every sink; reports the first failure after trying them all.
#[derive(Default, Clone)]
pub struct SinkSet {
    sinks: Vec<Arc<dyn DecisionSink>>,
}

impl SinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, sink: Arc<dyn DecisionSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl DecisionSink for SinkSet {
    fn deliver(&self, decision: &EmittedDecision) -> Result<(), SinkError> {
        let mut first_err = None;
        for sink in &self.sinks {
            if let Err(e) = sink.deliver(decision) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::types::{CycleMetadata, DecisionEvent, EmittedDecision};
    use chrono::Utc;
    use std::time::Duration;

    pub fn emitted(sequence: u64, event: DecisionEvent) -> EmittedDecision {
        EmittedDecision {
            event,
            metadata: CycleMetadata {
                session_id: "test".to_string(),
                sequence,
                emitted_at: Utc::now(),
                cycle_latency: Duration::from_millis(120),
                within_budget: true,
                aggregate_confidence: 0.9,
                degrade_reason: None,
                provider: None,
                attempts: Vec::new(),
            },
        }
    }
}
