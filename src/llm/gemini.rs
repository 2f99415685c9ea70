//! Gemini `generateContent` provider.

use super::openai::transport_error;
use super::{parsing, prompt};
use crate::cascade::{ProviderError, ReasoningProvider};
use crate::config::{defaults, ConfigurationError};
use crate::types::{ReasoningRequest, ReasoningResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

pub struct GeminiProvider {
    name: String,
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl GeminiProvider {
    pub fn new(
        name: &str,
        base_url: &str,
        model: &str,
        api_key_env: &str,
    ) -> Result<Self, ConfigurationError> {
        let api_key = std::env::var(api_key_env).ok().filter(|k| !k.trim().is_empty());
        Self::with_key(name, base_url, model, api_key)
    }

    pub fn with_key(
        name: &str,
        base_url: &str,
        model: &str,
        api_key: Option<String>,
    ) -> Result<Self, ConfigurationError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ConfigurationError::ProviderSetup {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            name: name.to_string(),
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl ReasoningProvider for GeminiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn invoke(
        &self,
        request: &ReasoningRequest,
        timeout: Duration,
    ) -> Result<ReasoningResult, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Unavailable("no API key".to_string()))?;

        let text = format!(
            "{}\n\n{}",
            prompt::system_prompt(),
            prompt::build_decision_prompt(request)
        );
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": text }] }],
            "generationConfig": {
                "temperature": defaults::PROVIDER_TEMPERATURE,
                "maxOutputTokens": defaults::PROVIDER_MAX_TOKENS,
            },
        });

        debug!(provider = %self.name, model = %self.model, "Requesting generateContent");
        let resp = self
            .http
            .post(format!("{}/models/{}:generateContent", self.base_url, self.model))
            .header("x-goog-api-key", api_key)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e, timeout))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderError::Transport(format!("server returned status {status}")));
        }

        let generated: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("unexpected body: {e}")))?;
        let text: String = generated
            .candidates
            .into_iter()
            .next()
            .map(|c| c.content.parts.into_iter().filter_map(|p| p.text).collect())
            .filter(|t: &String| !t.is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse("no candidate text".to_string()))?;

        parsing::parse_recommendation(&text, &self.name)
    }
}
