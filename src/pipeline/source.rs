//! Observation source abstraction.
//!
//! Provides a unified trait for reading observations from different sources:
//! a replay of a JSON-lines file (or an in-memory list) and live JSON on stdin.

use crate::types::Observation;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;

/// Events produced by an observation source.
#[derive(Debug)]
pub enum ObservationEvent {
    /// A parsed observation.
    Observation(Observation),
    /// Source reached end of data.
    Eof,
}

/// Trait abstracting where observations come from.
///
/// The driver runs the source on its own task and forwards events over a
/// channel, so `next_observation` is never cancelled mid-read.
#[async_trait]
pub trait ObservationSource: Send + 'static {
    /// Read the next observation.
    ///
    /// Returns `ObservationEvent::Eof` when no more data is available.
    /// Returns `Err` on unrecoverable errors.
    async fn next_observation(&mut self) -> Result<ObservationEvent>;

    /// Human-readable name for logging (e.g. "replay", "stdin").
    fn source_name(&self) -> &str;
}

// ============================================================================
// Replay Source (file / in-memory)
// ============================================================================

/// Replays pre-loaded observations with optional inter-observation delay.
pub struct ReplaySource {
    observations: std::vec::IntoIter<Observation>,
    delay_ms: u64,
    yielded_first: bool,
    restamp: bool,
}

impl ReplaySource {
    pub fn new(observations: Vec<Observation>, delay_ms: u64) -> Self {
        Self {
            observations: observations.into_iter(),
            delay_ms,
            yielded_first: false,
            restamp: false,
        }
    }

    /// Load a JSON-lines file, one observation per line.
    ///
    /// Blank lines are ignored; malformed lines are logged and skipped.
    /// Replayed observations are re-stamped with the time they are emitted,
    /// so recorded capture times do not count against the cycle budget.
    pub fn from_jsonl(path: &Path, delay_ms: u64) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read replay file {}", path.display()))?;
        let mut observations = Vec::new();
        for (line_no, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Observation>(line) {
                Ok(obs) => observations.push(obs),
                Err(e) => {
                    tracing::warn!(line = line_no + 1, error = %e, "[ReplaySource] Skipping malformed observation");
                }
            }
        }
        tracing::info!(
            path = %path.display(),
            observations = observations.len(),
            "Loaded replay file"
        );
        Ok(Self {
            restamp: true,
            ..Self::new(observations, delay_ms)
        })
    }

    pub fn remaining(&self) -> usize {
        self.observations.len()
    }
}

#[async_trait]
impl ObservationSource for ReplaySource {
    async fn next_observation(&mut self) -> Result<ObservationEvent> {
        // No delay before the first observation.
        if self.yielded_first && self.delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.delay_ms)).await;
        }
        match self.observations.next() {
            Some(mut obs) => {
                self.yielded_first = true;
                if self.restamp {
                    obs.captured_at = chrono::Utc::now();
                }
                Ok(ObservationEvent::Observation(obs))
            }
            None => Ok(ObservationEvent::Eof),
        }
    }

    fn source_name(&self) -> &str {
        "replay"
    }
}

// ============================================================================
// Stdin Source (JSON observations, one per line)
// ============================================================================

/// Reads JSON observations from stdin.
///
/// Used with an upstream perception process:
/// `perception --json | cascade-advisor --stdin`
pub struct StdinSource {
    reader: tokio::io::BufReader<tokio::io::Stdin>,
    line_buffer: String,
}

impl StdinSource {
    pub fn new() -> Self {
        Self {
            reader: tokio::io::BufReader::new(tokio::io::stdin()),
            line_buffer: String::with_capacity(2048),
        }
    }
}

impl Default for StdinSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObservationSource for StdinSource {
    async fn next_observation(&mut self) -> Result<ObservationEvent> {
        use tokio::io::AsyncBufReadExt;
        loop {
            self.line_buffer.clear();
            let bytes = self.reader.read_line(&mut self.line_buffer).await?;
            if bytes == 0 {
                return Ok(ObservationEvent::Eof);
            }
            let line = self.line_buffer.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Observation>(line) {
                Ok(obs) => return Ok(ObservationEvent::Observation(obs)),
                Err(e) => {
                    tracing::warn!("[StdinSource] Failed to parse observation: {}", e);
                }
            }
        }
    }

    fn source_name(&self) -> &str {
        "stdin"
    }
}
