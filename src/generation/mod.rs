//! Language model access for the reflection and response stages.
//!
//! Both providers sit behind [`Generator`]; [`ModelRouter`] picks one per
//! request from the model id.

mod anthropic;
mod openai;

pub use anthropic::AnthropicGenerator;
pub use openai::OpenAIGenerator;

use crate::conversation::Role;
use crate::error::{Result, WiseoneError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// One message of the prompt sent to a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A single generation call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Model identifier (e.g. "gpt-4o", "claude-3-5-sonnet-20241022").
    pub model: String,
    /// System instruction.
    pub system: String,
    /// Conversation messages, oldest first. The last one is the current prompt.
    pub messages: Vec<ChatTurn>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Trait for text generation backends.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce the model's reply to `request`.
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// Whether a model id belongs to the Anthropic API.
pub fn is_anthropic_model(model: &str) -> bool {
    model.to_lowercase().contains("claude")
}

/// Dispatches each request to OpenAI or Anthropic based on its model id.
pub struct ModelRouter {
    openai: OpenAIGenerator,
    anthropic: Option<AnthropicGenerator>,
}

impl ModelRouter {
    /// Build the router. The Anthropic client is only configured when
    /// `ANTHROPIC_API_KEY` is set.
    pub fn new(timeout: Duration) -> Result<Self> {
        let anthropic = match std::env::var(anthropic::API_KEY_ENV) {
            Ok(key) if !key.is_empty() => Some(AnthropicGenerator::new(&key, timeout)?),
            _ => None,
        };
        Ok(Self {
            openai: OpenAIGenerator::new(timeout)?,
            anthropic,
        })
    }
}

#[async_trait]
impl Generator for ModelRouter {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        if is_anthropic_model(&request.model) {
            debug!("Routing {} to Anthropic", request.model);
            let client = self.anthropic.as_ref().ok_or_else(|| {
                WiseoneError::Config(format!(
                    "Model '{}' needs {} to be set",
                    request.model,
                    anthropic::API_KEY_ENV
                ))
            })?;
            client.generate(request).await
        } else {
            self.openai.generate(request).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_routing_rule() {
        assert!(is_anthropic_model("claude-3-5-sonnet-20241022"));
        assert!(is_anthropic_model("Claude-Opus"));
        assert!(!is_anthropic_model("gpt-4o"));
        assert!(!is_anthropic_model("gpt-4o-mini"));
    }
}
