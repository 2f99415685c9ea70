//! Response parsing: pull one JSON recommendation out of free-form model text.

use crate::cascade::ProviderError;
use crate::types::{Alternative, Provenance, ReasoningResult};
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

static FENCED_JSON: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").ok());

#[derive(Debug, Deserialize)]
struct RawResponse {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    amount: Option<f64>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default, alias = "rationale")]
    reasoning: Option<String>,
    #[serde(default)]
    alternatives: Vec<RawAlternative>,
}

#[derive(Debug, Deserialize)]
struct RawAlternative {
    action: String,
    #[serde(default)]
    confidence: f64,
}

/// Locate the JSON object in `text`.
///
/// A fenced ```json block wins; otherwise the outermost `{...}` span.
pub fn extract_json(text: &str) -> Option<&str> {
    let fenced = FENCED_JSON.as_ref().and_then(|re| re.captures(text));
    if let Some(m) = fenced.as_ref().and_then(|c| c.get(1)) {
        return Some(m.as_str());
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parse a provider's answer into a result attributed to `provider`.
///
/// `action` and `confidence` (in [0, 1]) are required; a missing or null
/// `amount` is 0.
pub fn parse_recommendation(text: &str, provider: &str) -> Result<ReasoningResult, ProviderError> {
    let json = extract_json(text)
        .ok_or_else(|| ProviderError::InvalidResponse("no JSON object in response".to_string()))?;
    let raw: RawResponse = serde_json::from_str(json)
        .map_err(|e| ProviderError::InvalidResponse(format!("malformed JSON: {e}")))?;

    let action = raw
        .action
        .map(|a| a.trim().to_lowercase())
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ProviderError::InvalidResponse("missing action".to_string()))?;
    let confidence = raw
        .confidence
        .ok_or_else(|| ProviderError::InvalidResponse("missing confidence".to_string()))?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(ProviderError::InvalidResponse(format!(
            "confidence {confidence} outside [0, 1]"
        )));
    }
    let amount = raw.amount.unwrap_or(0.0);
    if !amount.is_finite() || amount < 0.0 {
        return Err(ProviderError::InvalidResponse(format!(
            "amount {amount} must be finite and non-negative"
        )));
    }

    Ok(ReasoningResult {
        action,
        amount,
        confidence,
        rationale: raw.reasoning.unwrap_or_default(),
        alternatives: raw
            .alternatives
            .into_iter()
            .map(|a| Alternative {
                action: a.action.trim().to_lowercase(),
                confidence: a.confidence,
            })
            .collect(),
        provenance: Provenance::Provider(provider.to_string()),
    })
}
