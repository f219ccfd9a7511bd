//! LLM integration for NestWise.
//!
//! Supports:
//! - **Anthropic**: Direct API access via rig-core (completions only)
//! - **OpenAI**: Direct API access via rig-core (completions and embeddings)
//!
//! Uses the rig-core crate for HTTP transport and the adapters in
//! `rig_adapter` to bridge rig's model traits to our `LlmProvider` and
//! `Embedder` traits.

pub mod provider;
mod rig_adapter;

pub use provider::*;
pub use rig_adapter::{RigAdapter, RigEmbedder};

use std::sync::Arc;

use rig::client::CompletionClient;
use rig::client::EmbeddingsClient;
use secrecy::ExposeSecret;

use crate::error::{ConfigError, LlmError};

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

/// Configuration for creating an LLM provider or embedder.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.backend {
        LlmBackend::Anthropic => create_anthropic_provider(config),
        LlmBackend::OpenAi => create_openai_provider(config),
    }
}

fn create_anthropic_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::Unavailable {
                provider: "anthropic".to_string(),
                reason: format!("Failed to create Anthropic client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using Anthropic (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}

fn create_openai_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::Unavailable {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using OpenAI (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}

/// Create a text embedder from configuration.
///
/// Only the OpenAI backend exposes embeddings; the corpus index is built
/// once at startup, so this is a startup-time error, never a turn-time one.
pub fn create_embedder(config: &LlmConfig) -> Result<Arc<dyn Embedder>, ConfigError> {
    use rig::providers::openai;

    match config.backend {
        LlmBackend::OpenAi => {
            let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
                openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
                    ConfigError::InvalidValue {
                        key: "OPENAI_API_KEY".to_string(),
                        message: format!("Failed to create OpenAI client: {}", e),
                    }
                })?;
            let model = client.embedding_model(&config.model);
            tracing::info!("Using OpenAI embeddings (model: {})", config.model);
            Ok(Arc::new(RigEmbedder::new(model, &config.model)))
        }
        LlmBackend::Anthropic => Err(ConfigError::UnsupportedCapability {
            backend: "anthropic".to_string(),
            capability: "embeddings".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_provider_missing_key_still_constructs() {
        // rig-core clients accept any string as API key at construction time.
        // The actual auth failure happens when making a request.
        let config = LlmConfig {
            backend: LlmBackend::Anthropic,
            api_key: secrecy::SecretString::from("test-key"),
            model: "claude-3-5-sonnet-latest".to_string(),
        };
        let provider = create_provider(&config);
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().model_name(), "claude-3-5-sonnet-latest");
    }

    #[test]
    fn test_create_openai_provider() {
        let config = LlmConfig {
            backend: LlmBackend::OpenAi,
            api_key: secrecy::SecretString::from("sk-test"),
            model: "gpt-4o".to_string(),
        };
        let provider = create_provider(&config);
        assert!(provider.is_ok());
        assert_eq!(provider.unwrap().model_name(), "gpt-4o");
    }

    #[test]
    fn test_anthropic_embedder_rejected() {
        let config = LlmConfig {
            backend: LlmBackend::Anthropic,
            api_key: secrecy::SecretString::from("test-key"),
            model: "n/a".to_string(),
        };
        assert!(create_embedder(&config).is_err());
    }
}
