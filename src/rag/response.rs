//! Second generation pass: the user-facing answer.

use super::context::AssembledContext;
use super::reflection::Synthesis;
use crate::config::Prompts;
use crate::conversation::{Citation, Message, Role};
use crate::error::{Result, WiseoneError};
use crate::generation::{ChatTurn, GenerationRequest, Generator};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

/// The final answer with the citations of the context it was grounded on.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<Citation>,
}

/// Writes the answer in the persona voice from question, context, synthesis
/// and recent history.
pub struct ResponseGenerator {
    generator: Arc<dyn Generator>,
    prompts: Arc<Prompts>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl ResponseGenerator {
    pub fn new(generator: Arc<dyn Generator>, prompts: Arc<Prompts>, model: &str) -> Self {
        Self {
            generator,
            prompts,
            model: model.to_string(),
            temperature: 0.75,
            max_tokens: 2000,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn request(
        &self,
        question: &str,
        context: &AssembledContext,
        synthesis: &Synthesis,
        history: &[Message],
    ) -> GenerationRequest {
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), question.to_string());
        vars.insert("context".to_string(), context.text.clone());
        vars.insert("synthesis".to_string(), synthesis.text.clone());

        let mut messages: Vec<ChatTurn> = history
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| ChatTurn {
                role: m.role,
                content: m.content.clone(),
            })
            .collect();
        messages.push(ChatTurn::user(
            self.prompts
                .render_with_custom(&self.prompts.response.user, &vars),
        ));

        GenerationRequest {
            model: self.model.clone(),
            system: self
                .prompts
                .render_with_custom(&self.prompts.response.system, &vars),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    #[instrument(skip_all, fields(sources = context.citations.len(), history = history.len()))]
    pub async fn respond(
        &self,
        question: &str,
        context: &AssembledContext,
        synthesis: &Synthesis,
        history: &[Message],
    ) -> Result<Answer> {
        let request = self.request(question, context, synthesis, history);

        let text = self.generator.generate(&request).await.map_err(|e| match e {
            WiseoneError::Generation { message, .. } => WiseoneError::generation("response", message),
            other => WiseoneError::generation("response", other.to_string()),
        })?;

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(WiseoneError::generation("response", "Empty answer"));
        }

        info!("Response generated with {} sources", context.citations.len());
        Ok(Answer {
            text,
            citations: context.citations.clone(),
        })
    }
}
