//! Prompt construction shared by every text-in/text-out provider.

use crate::config::defaults;
use crate::types::{ReasoningRequest, ReasoningResult};

const SYSTEM_PROMPT: &str = "You are a real-time decision advisor. Ground every recommendation \
in the statistical baseline you are given and answer with a single JSON object.";

const DECISION_PROMPT: &str = r#"Analyze this decision point and recommend an action.

### OBSERVATION (sequence {sequence}, confidence {aggregate})
{fields}

### BASELINE RECOMMENDATION
```json
{baseline}
```

### RECENT DECISIONS (last {history_len})
{history}

### TASK
Respond with JSON only:
```json
{
  "action": "<action>",
  "amount": <number, 0 if not applicable>,
  "confidence": <0.0-1.0>,
  "reasoning": "<short explanation>",
  "alternatives": [{"action": "...", "confidence": <0.0-1.0>}]
}
```
Depart from the baseline only with a concrete reason."#;

/// System message for chat-style providers.
pub fn system_prompt() -> &'static str {
    SYSTEM_PROMPT
}

/// Render the full decision prompt for one request.
pub fn build_decision_prompt(request: &ReasoningRequest) -> String {
    let obs = &request.observation;

    let fields = if obs.observation.fields.is_empty() {
        "No fields observed.".to_string()
    } else {
        obs.observation
            .fields
            .iter()
            .map(|(name, value)| match obs.observation.confidence.get(name) {
                Some(c) => format!("- {name}: {value} (confidence {c:.2})"),
                None => format!("- {name}: {value}"),
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let baseline = serde_json::to_string_pretty(&request.baseline).unwrap_or_default();

    let recent = recent_decisions(&request.prior_decisions);
    let history = if recent.is_empty() {
        "No recent decisions.".to_string()
    } else {
        recent
            .iter()
            .map(|d| format!("- {} {:.2} (confidence {:.2}, {})", d.action, d.amount, d.confidence, d.provenance))
            .collect::<Vec<_>>()
            .join("\n")
    };

    fill(
        DECISION_PROMPT,
        &[
            ("sequence", obs.sequence().to_string()),
            ("aggregate", format!("{:.2}", obs.aggregate_confidence)),
            ("fields", fields),
            ("baseline", baseline),
            ("history_len", recent.len().to_string()),
            ("history", history),
        ],
    )
}

/// Substitute `{name}` placeholders in one pass over `template`.
///
/// Inserted values are never rescanned, and braces that do not name a known
/// placeholder are copied as-is.
fn fill(template: &str, values: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let hit = tail.find('}').and_then(|close| {
            let name = &tail[1..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (value, close))
        });
        match hit {
            Some((value, close)) => {
                out.push_str(value);
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn recent_decisions(prior: &[ReasoningResult]) -> &[ReasoningResult] {
    let skip = prior.len().saturating_sub(defaults::PROMPT_HISTORY_LIMIT);
    &prior[skip..]
}
