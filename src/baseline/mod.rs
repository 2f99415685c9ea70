//! Baseline Recommendations
//!
//! The deterministic grounding every reasoning call starts from. A cycle
//! never reasons without one: if the lookup fails the cycle degrades to a
//! neutral hold instead.
//!
//! ## Strategy Table
//!
//! ```toml
//! key_fields = ["position", "hand_class"]
//!
//! [default]
//! action = "check"
//! confidence = 0.50
//!
//! [[entries]]
//! key = "BTN|AKo"
//! action = "raise"
//! amount = 2.5
//! confidence = 0.85
//! note = "top 15%"
//! ```
//!
//! The lookup key is the observation's `key_fields` values joined with `|`.
//! Keys without an entry get the table default.

use crate::types::{BaselineRecommendation, ValidatedObservation, BASELINE_PROVENANCE};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Separator between key-field values in a strategy key.
pub const KEY_SEPARATOR: &str = "|";

/// Why a baseline lookup produced nothing.
#[derive(Debug, thiserror::Error)]
pub enum BaselineError {
    #[error("observation has no value for key field '{0}'")]
    MissingKey(String),
    #[error("baseline source unavailable: {0}")]
    Unavailable(String),
    #[error("failed to read strategy table {}: {1}", .0.display())]
    Io(PathBuf, std::io::Error),
    #[error("failed to parse strategy table: {0}")]
    Parse(#[from] toml::de::Error),
}

/// External collaborator that turns a validated observation into a baseline.
///
/// Must answer quickly; the orchestrator bounds every call with its own
/// timeout and treats expiry as failure.
#[async_trait]
pub trait BaselineProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn lookup(
        &self,
        observation: &ValidatedObservation,
    ) -> Result<BaselineRecommendation, BaselineError>;
}

// ============================================================================
// Strategy Table
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyEntry {
    #[serde(default)]
    pub key: String,
    pub action: String,
    #[serde(default)]
    pub amount: f64,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl StrategyEntry {
    fn recommendation(&self) -> BaselineRecommendation {
        BaselineRecommendation {
            action: self.action.clone(),
            amount: self.amount,
            confidence: self.confidence.clamp(0.0, 1.0),
            provenance: BASELINE_PROVENANCE.to_string(),
            note: self.note.clone(),
        }
    }
}

fn default_entry() -> StrategyEntry {
    StrategyEntry {
        key: String::new(),
        action: "check".to_string(),
        amount: 0.0,
        confidence: 0.50,
        note: Some("no matching strategy entry".to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct StrategyFile {
    #[serde(default)]
    key_fields: Vec<String>,
    #[serde(default = "default_entry")]
    default: StrategyEntry,
    #[serde(default)]
    entries: Vec<StrategyEntry>,
}

/// Precomputed lookup table keyed by observation fields.
#[derive(Debug, Clone)]
pub struct StrategyTable {
    key_fields: Vec<String>,
    default: StrategyEntry,
    entries: HashMap<String, StrategyEntry>,
}

impl Default for StrategyTable {
    /// No key fields and no entries: every lookup returns the default.
    fn default() -> Self {
        Self {
            key_fields: Vec::new(),
            default: default_entry(),
            entries: HashMap::new(),
        }
    }
}

impl StrategyTable {
    pub fn load(path: &Path) -> Result<Self, BaselineError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| BaselineError::Io(path.to_path_buf(), e))?;
        let table = Self::from_toml(&contents)?;
        info!(
            path = %path.display(),
            entries = table.len(),
            key_fields = ?table.key_fields,
            "Loaded strategy table"
        );
        Ok(table)
    }

    pub fn from_toml(contents: &str) -> Result<Self, BaselineError> {
        let file: StrategyFile = toml::from_str(contents)?;
        let entries = file
            .entries
            .into_iter()
            .map(|e| (e.key.clone(), e))
            .collect();
        Ok(Self {
            key_fields: file.key_fields,
            default: file.default,
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Build the lookup key for an observation.
    pub fn key_for(&self, observation: &ValidatedObservation) -> Result<String, BaselineError> {
        let mut parts = Vec::with_capacity(self.key_fields.len());
        for field in &self.key_fields {
            let value = observation
                .observation
                .field(field)
                .filter(|v| v.is_set())
                .ok_or_else(|| BaselineError::MissingKey(field.clone()))?;
            parts.push(value.key_fragment());
        }
        Ok(parts.join(KEY_SEPARATOR))
    }

    pub fn recommend(
        &self,
        observation: &ValidatedObservation,
    ) -> Result<BaselineRecommendation, BaselineError> {
        let key = self.key_for(observation)?;
        match self.entries.get(&key) {
            Some(entry) => Ok(entry.recommendation()),
            None => {
                debug!(key = %key, "No strategy entry, using table default");
                Ok(self.default.recommendation())
            }
        }
    }
}

#[async_trait]
impl BaselineProvider for StrategyTable {
    fn name(&self) -> &str {
        "strategy_table"
    }

    async fn lookup(
        &self,
        observation: &ValidatedObservation,
    ) -> Result<BaselineRecommendation, BaselineError> {
        self.recommend(observation)
    }
}
