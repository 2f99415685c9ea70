//! Decision Audit Log
//!
//! Persists every emitted decision in a sled tree so a session can be audited
//! after the fact.
//!
//! Key: sled-generated monotonic id as u64 big-endian bytes (sorts in
//! emission order). Value: JSON-serialized `EmittedDecision`.

use crate::sink::{DecisionSink, SinkError};
use crate::types::{DecisionEvent, EmittedDecision};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Counts by event kind, for end-of-session reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecisionLogStats {
    pub decisions: usize,
    pub uncertain: usize,
    pub degraded: usize,
}

/// Append-only log of emitted decisions.
#[derive(Clone)]
pub struct DecisionLog {
    db: Arc<sled::Db>,
}

impl DecisionLog {
    /// Open or create the log at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref();
        let db = sled::open(path)?;
        info!(path = %path.display(), existing = db.len(), "Decision log opened");
        Ok(Self { db: Arc::new(db) })
    }

    /// Append one decision.
    ///
    /// Does not flush; sled flushes in the background and `flush` is called
    /// on shutdown.
    pub fn record(&self, decision: &EmittedDecision) -> Result<(), StorageError> {
        let key = self.db.generate_id()?.to_be_bytes();
        let value = serde_json::to_vec(decision)?;
        self.db.insert(key, value)?;
        Ok(())
    }

    /// Most recent `limit` decisions, newest first.
    pub fn recent(&self, limit: usize) -> Vec<EmittedDecision> {
        self.db
            .iter()
            .rev()
            .filter_map(|item| match item {
                Ok((_, value)) => serde_json::from_slice(&value).ok(),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable decision log entry");
                    None
                }
            })
            .take(limit)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.db.len()
    }

    pub fn stats(&self) -> DecisionLogStats {
        let mut stats = DecisionLogStats::default();
        for decision in self.recent(usize::MAX) {
            match decision.event {
                DecisionEvent::Decision(_) => stats.decisions += 1,
                DecisionEvent::Uncertain(_) => stats.uncertain += 1,
                DecisionEvent::Degraded(_) => stats.degraded += 1,
            }
        }
        stats
    }

    pub fn flush(&self) -> Result<(), StorageError> {
        self.db.flush()?;
        Ok(())
    }

    /// Remove every entry.
    pub fn clear(&self) -> Result<(), StorageError> {
        self.db.clear()?;
        self.db.flush()?;
        Ok(())
    }
}

impl DecisionSink for DecisionLog {
    fn deliver(&self, decision: &EmittedDecision) -> Result<(), SinkError> {
        self.record(decision)
            .map_err(|e| SinkError::Storage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::test_support::emitted;
    use crate::types::{BaselineRecommendation, DecisionEvent};

    #[test]
    fn test_log_open() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log = DecisionLog::open(temp_dir.path().join("decisions.db")).unwrap();
        assert_eq!(log.count(), 0);
    }

    #[test]
    fn test_record_and_recent_newest_first() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log = DecisionLog::open(temp_dir.path().join("decisions.db")).unwrap();

        for seq in 1..=5 {
            log.record(&emitted(seq, DecisionEvent::Uncertain(0.1))).unwrap();
        }

        assert_eq!(log.count(), 5);
        let recent: Vec<u64> = log.recent(3).iter().map(|d| d.metadata.sequence).collect();
        assert_eq!(recent, vec![5, 4, 3]);
    }

    #[test]
    fn test_stats_by_kind() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log = DecisionLog::open(temp_dir.path().join("decisions.db")).unwrap();
        log.deliver(&emitted(1, DecisionEvent::Uncertain(0.2))).unwrap();
        log.deliver(&emitted(
            2,
            DecisionEvent::Degraded(BaselineRecommendation::new("check", 0.0, 0.5)),
        ))
        .unwrap();

        let stats = log.stats();
        assert_eq!(stats.uncertain, 1);
        assert_eq!(stats.degraded, 1);
        assert_eq!(stats.decisions, 0);
    }

    #[test]
    fn test_clear() {
        let temp_dir = tempfile::tempdir().unwrap();
        let log = DecisionLog::open(temp_dir.path().join("decisions.db")).unwrap();
        log.record(&emitted(1, DecisionEvent::Uncertain(0.2))).unwrap();
        log.clear().unwrap();
        assert_eq!(log.count(), 0);
    }

    #[test]
    fn test_reopen_keeps_entries() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("decisions.db");
        {
            let log = DecisionLog::open(&path).unwrap();
            log.record(&emitted(7, DecisionEvent::Uncertain(0.2))).unwrap();
            log.flush().unwrap();
        }
        let log = DecisionLog::open(&path).unwrap();
        assert_eq!(log.recent(1)[0].metadata.sequence, 7);
    }
}
