//! Per-field agreement rules between an observation and its history.

use crate::types::{FieldValue, Violation};
use serde::{Deserialize, Serialize};

/// How a field must relate to the same field in earlier accepted frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRule {
    /// Identity marker: once set, must not change (lists compared as sets).
    Stable,
    /// Monotone quantity: must not decrease.
    NonDecreasing,
    /// Revealed elements: earlier values must be a prefix of later ones.
    AppendOnly,
    /// Not checked.
    Free,
}

impl FieldRule {
    pub fn label(self) -> &'static str {
        match self {
            FieldRule::Stable => "stable",
            FieldRule::NonDecreasing => "non_decreasing",
            FieldRule::AppendOnly => "append_only",
            FieldRule::Free => "free",
        }
    }

    /// Check `current` against one earlier value of the same field.
    ///
    /// An unset earlier value never violates, and neither does an unset
    /// current value for stable and monotone fields: a field perception has
    /// not picked up yet carries no evidence. An append-only field that was
    /// set and is now empty has lost elements.
    pub fn check(
        self,
        field: &str,
        previous: &FieldValue,
        current: &FieldValue,
    ) -> Option<Violation> {
        if !previous.is_set() {
            return None;
        }
        let broken = match self {
            FieldRule::Free => None,
            FieldRule::AppendOnly => append_only(previous, current),
            _ if !current.is_set() => None,
            FieldRule::Stable => stable(previous, current),
            FieldRule::NonDecreasing => non_decreasing(previous, current),
        };
        broken.map(|detail| Violation {
            field: field.to_string(),
            rule: self.label().to_string(),
            detail,
        })
    }
}

fn stable(previous: &FieldValue, current: &FieldValue) -> Option<String> {
    let same = match (previous.as_list(), current.as_list()) {
        (Some(a), Some(b)) => {
            let mut a = a.to_vec();
            let mut b = b.to_vec();
            a.sort();
            b.sort();
            a == b
        }
        _ => previous == current,
    };
    (!same).then(|| format!("changed from {previous} to {current}"))
}

fn non_decreasing(previous: &FieldValue, current: &FieldValue) -> Option<String> {
    match (previous.as_number(), current.as_number()) {
        (Some(a), Some(b)) if b < a => Some(format!("decreased from {a} to {b}")),
        (Some(_), Some(_)) => None,
        _ => Some(format!("expected numbers, got {previous} and {current}")),
    }
}

fn append_only(previous: &FieldValue, current: &FieldValue) -> Option<String> {
    match (previous.as_list(), current.as_list()) {
        (Some(a), Some(b)) if b.starts_with(a) => None,
        (Some(a), Some(b)) if b.len() < a.len() => Some(format!(
            "lost {} of {} elements ({previous} to {current})",
            a.len() - b.len(),
            a.len()
        )),
        (Some(_), Some(_)) => Some(format!("{previous} is not a prefix of {current}")),
        _ => Some(format!("expected lists, got {previous} and {current}")),
    }
}
