//! Reasoning Provider Backends
//!
//! Concrete [`ReasoningProvider`]s for the cascade.
//!
//! ## Architecture
//!
//! - **CommandProvider**: local CLI model, prompt as argument or on stdin
//! - **OpenAiProvider**: OpenAI-compatible `/chat/completions`
//! - **GeminiProvider**: Gemini `models/{model}:generateContent`
//!
//! All three share one prompt builder and one response parser, so the cascade
//! sees the same request and the same output validation whichever backend
//! answers.

mod command;
mod gemini;
mod openai;
pub mod parsing;
pub mod prompt;

pub use command::CommandProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

use crate::cascade::ReasoningProvider;
use crate::config::{ConfigurationError, ProviderConfig, ProviderKind};
use std::sync::Arc;
use tracing::{info, warn};

/// Instantiate every configured provider, in configuration order.
pub fn build_providers(
    configs: &[ProviderConfig],
) -> Result<Vec<Arc<dyn ReasoningProvider>>, ConfigurationError> {
    let mut providers: Vec<Arc<dyn ReasoningProvider>> = Vec::with_capacity(configs.len());
    for config in configs {
        let provider: Arc<dyn ReasoningProvider> = match &config.kind {
            ProviderKind::Command {
                program,
                args,
                prompt_via_stdin,
            } => Arc::new(CommandProvider::new(
                &config.name,
                program,
                args.clone(),
                *prompt_via_stdin,
            )),
            ProviderKind::Openai {
                base_url,
                model,
                api_key_env,
            } => Arc::new(OpenAiProvider::new(&config.name, base_url, model, api_key_env)?),
            ProviderKind::Gemini {
                base_url,
                model,
                api_key_env,
            } => Arc::new(GeminiProvider::new(&config.name, base_url, model, api_key_env)?),
        };
        if provider.is_available() {
            info!(provider = %config.name, "Reasoning provider ready");
        } else {
            warn!(provider = %config.name, "Reasoning provider unavailable, will be skipped");
        }
        providers.push(provider);
    }
    Ok(providers)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_providers;

    #[test]
    fn test_build_default_providers_in_order() {
        let providers = build_providers(&default_providers()).unwrap();
        let names: Vec<&str> = providers.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["claude_cli", "openai", "gemini"]);
    }
}
