//! Observation types: the sensed snapshot and its validated form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Field Values
// ============================================================================

/// A typed value for one named observation field.
///
/// Deserialized untagged so upstream perception output can stay plain JSON:
/// `"Ah"` → `Text`, `120.5` → `Number`, `true` → `Flag`, `["Ah","Kd"]` → `List`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    /// Whether the field carries information.
    ///
    /// Empty text and empty lists count as "not set" for the stable-identity
    /// rule: perception often reports `[]` before an element is visible.
    pub fn is_set(&self) -> bool {
        match self {
            FieldValue::Text(s) => !s.trim().is_empty(),
            FieldValue::List(items) => !items.is_empty(),
            FieldValue::Number(n) => n.is_finite(),
            FieldValue::Flag(_) => true,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) if n.is_finite() => Some(*n),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            FieldValue::List(items) => Some(items),
            _ => None,
        }
    }

    /// Render the value as a lookup-key fragment.
    pub fn key_fragment(&self) -> String {
        match self {
            FieldValue::Flag(b) => b.to_string(),
            FieldValue::Number(n) => format!("{n}"),
            FieldValue::Text(s) => s.trim().to_string(),
            FieldValue::List(items) => items.join(","),
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::List(items) if items.is_empty() => write!(f, "-"),
            FieldValue::List(items) => write!(f, "{}", items.join(" ")),
            other => write!(f, "{}", other.key_fragment()),
        }
    }
}

impl From<f64> for FieldValue {
    fn from(n: f64) -> Self {
        FieldValue::Number(n)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Flag(b)
    }
}

impl From<Vec<&str>> for FieldValue {
    fn from(items: Vec<&str>) -> Self {
        FieldValue::List(items.into_iter().map(str::to_string).collect())
    }
}

// ============================================================================
// Observation
// ============================================================================

/// One sensed snapshot, as produced by the external perception stage.
///
/// Immutable once created; the cycle that processes it owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Monotonic sequence number assigned by the source.
    pub sequence: u64,

    /// Capture timestamp. Cycle latency is measured from here.
    #[serde(default = "Utc::now")]
    pub captured_at: DateTime<Utc>,

    /// Named fields (identity markers, quantities, revealed elements, ...).
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,

    /// Per-field confidence in [0, 1].
    #[serde(default)]
    pub confidence: BTreeMap<String, f64>,
}

impl Observation {
    /// Start an observation captured now.
    pub fn new(sequence: u64) -> Self {
        Self {
            sequence,
            captured_at: Utc::now(),
            fields: BTreeMap::new(),
            confidence: BTreeMap::new(),
        }
    }

    /// Builder-style field setter with its confidence.
    #[must_use]
    pub fn with_field(mut self, name: &str, value: impl Into<FieldValue>, confidence: f64) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self.confidence.insert(name.to_string(), confidence);
        self
    }

    #[must_use]
    pub fn captured_at(mut self, at: DateTime<Utc>) -> Self {
        self.captured_at = at;
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Mean of the per-field confidences.
    ///
    /// Non-finite scores count as 0 and every score is clamped into [0, 1].
    /// An observation without any confidence scores has confidence 0.
    pub fn mean_confidence(&self) -> f64 {
        if self.confidence.is_empty() {
            return 0.0;
        }
        let total: f64 = self
            .confidence
            .values()
            .map(|c| if c.is_finite() { c.clamp(0.0, 1.0) } else { 0.0 })
            .sum();
        total / self.confidence.len() as f64
    }
}

// ============================================================================
// Validated Observation
// ============================================================================

/// A broken field-agreement rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub field: String,
    pub rule: String,
    pub detail: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.field, self.rule, self.detail)
    }
}

/// An observation scored against recent history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedObservation {
    pub observation: Observation,
    /// Mean per-field confidence.
    pub field_confidence: f64,
    /// Cross-frame agreement: 1.0, or 0.0 on a hard violation.
    pub consistency_score: f64,
    /// `field_confidence * consistency_score`
    pub aggregate_confidence: f64,
    pub accepted: bool,
    /// Set when a hard violation cleared and reseeded the history window.
    pub history_reset: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
}

impl ValidatedObservation {
    pub fn sequence(&self) -> u64 {
        self.observation.sequence
    }
}
