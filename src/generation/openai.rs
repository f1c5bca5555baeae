//! OpenAI chat completions backend.

use super::{GenerationRequest, Generator};
use crate::conversation::Role;
use crate::error::{Result, WiseoneError};
use crate::openai::create_client_with_timeout;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

/// Chat completion generator backed by the OpenAI API.
pub struct OpenAIGenerator {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
}

impl OpenAIGenerator {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: create_client_with_timeout(timeout)?,
        })
    }

    fn build_messages(request: &GenerationRequest) -> Result<Vec<ChatCompletionRequestMessage>> {
        let build_err = |e: async_openai::error::OpenAIError| {
            WiseoneError::generation("chat completion", e.to_string())
        };

        let mut messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(request.system.clone())
                .build()
                .map_err(build_err)?
                .into(),
        ];

        for turn in &request.messages {
            let message: ChatCompletionRequestMessage = match turn.role {
                Role::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(turn.content.clone())
                    .build()
                    .map_err(build_err)?
                    .into(),
                Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(turn.content.clone())
                    .build()
                    .map_err(build_err)?
                    .into(),
                Role::System => ChatCompletionRequestSystemMessageArgs::default()
                    .content(turn.content.clone())
                    .build()
                    .map_err(build_err)?
                    .into(),
            };
            messages.push(message);
        }

        Ok(messages)
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    #[instrument(skip(self, request), fields(model = %request.model, messages = request.messages.len()))]
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let messages = Self::build_messages(request)?;

        let chat_request = CreateChatCompletionRequestArgs::default()
            .model(&request.model)
            .messages(messages)
            .temperature(request.temperature)
            .max_tokens(request.max_tokens)
            .build()
            .map_err(|e| WiseoneError::generation("chat completion", e.to_string()))?;

        let response = self.client.chat().create(chat_request).await.map_err(|e| {
            WiseoneError::generation("chat completion", format!("OpenAI API error: {}", e))
        })?;

        let text = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| WiseoneError::generation("chat completion", "Empty response from model"))?
            .clone();

        debug!("Generated {} characters", text.len());
        Ok(text)
    }
}
