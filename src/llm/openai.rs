//! OpenAI-compatible chat completions provider.

use super::{parsing, prompt};
use crate::cascade::{ProviderError, ReasoningProvider};
use crate::config::{defaults, ConfigurationError};
use crate::types::{ReasoningRequest, ReasoningResult};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiProvider {
    name: String,
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiProvider {
    /// The API key is read from `api_key_env` once, here.
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
impl ReasoningProvider for OpenAiProvider {
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

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": prompt::system_prompt() },
                { "role": "user", "content": prompt::build_decision_prompt(request) },
            ],
            "temperature": defaults::PROVIDER_TEMPERATURE,
            "max_tokens": defaults::PROVIDER_MAX_TOKENS,
        });

        debug!(provider = %self.name, model = %self.model, "Requesting chat completion");
        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&e, timeout))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderError::Transport(format!("server returned status {status}")));
        }

        let chat: ChatResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("unexpected body: {e}")))?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("no completion content".to_string()))?;

        parsing::parse_recommendation(&content, &self.name)
    }
}

/// Map a reqwest failure onto the attempt taxonomy.
pub(super) fn transport_error(e: &reqwest::Error, timeout: Duration) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(timeout)
    } else {
        ProviderError::Transport(e.to_string())
    }
}
