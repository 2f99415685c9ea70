//! Consistency Validator
//!
//! Scores each observation by its own field confidence and by agreement with
//! the last N accepted observations:
//!
//! ```text
//! aggregate = mean(field confidence) × consistency      (consistency ∈ {0, 1})
//! accepted  = aggregate ≥ threshold
//! ```
//!
//! A hard rule violation (identity marker changed, monotone quantity went
//! down, revealed list rewritten) is read as the start of a new domain
//! session: the window is cleared and reseeded with the violating
//! observation, and the observation itself scores 0.

mod history;
mod rules;

pub use history::HistoryWindow;
pub use rules::FieldRule;

use crate::types::{Observation, ValidatedObservation, Violation};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Stateful validator. Owned by exactly one orchestrator.
#[derive(Debug)]
pub struct ConsistencyValidator {
    window: HistoryWindow,
    threshold: f64,
    rules: BTreeMap<String, FieldRule>,
}

impl ConsistencyValidator {
    pub fn new(capacity: usize, threshold: f64, rules: BTreeMap<String, FieldRule>) -> Self {
        Self {
            window: HistoryWindow::new(capacity),
            threshold,
            rules,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn window(&self) -> &HistoryWindow {
        &self.window
    }

    /// Forget all history.
    pub fn reset(&mut self) {
        self.window.clear();
    }

    /// Score `obs` against the window and update the window.
    ///
    /// Accepted observations are appended; rejected ones are not, except
    /// after a hard violation where the window is reseeded with `obs`.
    pub fn validate(&mut self, obs: Observation) -> ValidatedObservation {
        let field_confidence = obs.mean_confidence();
        let violations = self.find_violations(&obs);

        if !violations.is_empty() {
            for v in &violations {
                warn!(sequence = obs.sequence, violation = %v, "Hard consistency violation, resetting history");
            }
            let aggregate = 0.0;
            let accepted = aggregate >= self.threshold;
            self.window.reseed(obs.clone());
            return ValidatedObservation {
                observation: obs,
                field_confidence,
                consistency_score: 0.0,
                aggregate_confidence: aggregate,
                accepted,
                history_reset: true,
                violations,
            };
        }

        let aggregate = field_confidence;
        let accepted = aggregate >= self.threshold;
        debug!(
            sequence = obs.sequence,
            field_confidence,
            accepted,
            window = self.window.len(),
            "Observation validated"
        );
        if accepted {
            self.window.push(obs.clone());
        }

        ValidatedObservation {
            observation: obs,
            field_confidence,
            consistency_score: 1.0,
            aggregate_confidence: aggregate,
            accepted,
            history_reset: false,
            violations: Vec::new(),
        }
    }

    /// First violation per field, checked against every window entry that
    /// carries the field.
    fn find_violations(&self, obs: &Observation) -> Vec<Violation> {
        let mut violations = Vec::new();
        for (field, rule) in &self.rules {
            if *rule == FieldRule::Free {
                continue;
            }
            let Some(current) = obs.field(field) else {
                continue;
            };
            let found = self
                .window
                .iter()
                .filter_map(|prev| prev.field(field))
                .find_map(|previous| rule.check(field, previous, current));
            if let Some(v) = found {
                violations.push(v);
            }
        }
        violations
    }
}
