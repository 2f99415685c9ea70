//! Config validation: unknown-key detection with Levenshtein suggestions
//! and timing budget sanity checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, ", did you mean '{s}'?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Tables whose keys are user-chosen (field names), so any child is valid.
const OPEN_TABLES: &[&str] = &["validator.fields"];

/// Returns the complete set of valid dotted key paths for `PipelineConfig`.
///
/// Array-of-table entries are walked as `name[]`, so `[[providers]]` keys
/// appear as `providers[].model`. Keep in sync with `pipeline_config.rs`.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [session]
        "session",
        "session.name",
        // [validator]
        "validator",
        "validator.history_capacity",
        "validator.confidence_threshold",
        "validator.fields",
        // [cascade]
        "cascade",
        "cascade.provider_timeout_ms",
        "cascade.cascade_deadline_ms",
        "cascade.min_attempt_budget_ms",
        "cascade.provider_order",
        // [cycle]
        "cycle",
        "cycle.deadline_ms",
        "cycle.baseline_timeout_ms",
        "cycle.context_decisions",
        // [baseline]
        "baseline",
        "baseline.table",
        // [storage]
        "storage",
        "storage.decision_log",
        // [[providers]]
        "providers",
        "providers[].name",
        "providers[].kind",
        "providers[].program",
        "providers[].args",
        "providers[].prompt_via_stdin",
        "providers[].base_url",
        "providers[].model",
        "providers[].api_key_env",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`. Arrays of tables contribute `a[].b` paths.
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if OPEN_TABLES.contains(&path.as_str()) {
                continue;
            }
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            } else if let Some(items) = v.as_array() {
                let item_prefix = format!("{path}[]");
                for item in items.iter().filter(|i| i.is_table()) {
                    keys.extend(walk_toml_keys(item, &item_prefix));
                }
            }
        }
    }
    keys.sort();
    keys.dedup();
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (k, levenshtein(unknown, k)))
        .filter(|&(_, dist)| dist <= 3)
        .min_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)))
        .map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// Unknown keys only warn; existing configs keep working.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Budget Range Validation
// ============================================================================

/// Flag budgets that validate but can never do useful work.
///
/// Hard errors (zero durations, thresholds outside [0, 1]) are rejected by
/// `OrchestratorConfig::validate`; these are only suspicious.
pub fn validate_budget_ranges(config: &super::PipelineConfig) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let cycle = config.cycle.deadline_ms;

    if config.cascade.min_attempt_budget_ms >= cycle {
        warnings.push(ValidationWarning {
            field: "cascade.min_attempt_budget_ms".to_string(),
            message: format!(
                "cascade.min_attempt_budget_ms = {} is not below cycle.deadline_ms = {cycle}; no provider will ever be called",
                config.cascade.min_attempt_budget_ms
            ),
            suggestion: None,
        });
    }

    if config.cycle.baseline_timeout_ms >= cycle {
        warnings.push(ValidationWarning {
            field: "cycle.baseline_timeout_ms".to_string(),
            message: format!(
                "cycle.baseline_timeout_ms = {} can consume the whole cycle budget ({cycle} ms)",
                config.cycle.baseline_timeout_ms
            ),
            suggestion: None,
        });
    }

    if config.validator.confidence_threshold == 0.0 {
        warnings.push(ValidationWarning {
            field: "validator.confidence_threshold".to_string(),
            message: "validator.confidence_threshold = 0 accepts every observation, including ones that fail consistency".to_string(),
            suggestion: None,
        });
    }

    if config.validator.fields.is_empty() {
        warnings.push(ValidationWarning {
            field: "validator.fields".to_string(),
            message: "validator.fields is empty; no hard violation can be detected and history never resets".to_string(),
            suggestion: None,
        });
    }

    if config.validator.history_capacity > 100 {
        warnings.push(ValidationWarning {
            field: "validator.history_capacity".to_string(),
            message: format!(
                "validator.history_capacity = {} is unusually large; stale frames will veto fresh ones",
                config.validator.history_capacity
            ),
            suggestion: None,
        });
    }

    warnings
}

// ============================================================================
// Tests
// ============================================================================
