//! First generation pass: an internal synthesis of what the sources say.

use super::context::AssembledContext;
use crate::config::Prompts;
use crate::error::{Result, WiseoneError};
use crate::generation::{ChatTurn, GenerationRequest, Generator};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

/// Intermediate artifact between the two stages. Never shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub text: String,
}

/// Runs the reflection prompt over the question and the retrieved context.
pub struct ReflectionStage {
    generator: Arc<dyn Generator>,
    prompts: Arc<Prompts>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl ReflectionStage {
    pub fn new(generator: Arc<dyn Generator>, prompts: Arc<Prompts>, model: &str) -> Self {
        Self {
            generator,
            prompts,
            model: model.to_string(),
            temperature: 0.4,
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

    fn request(&self, question: &str, context: &AssembledContext, history: &str) -> GenerationRequest {
        let mut vars = HashMap::new();
        vars.insert("question".to_string(), question.to_string());
        vars.insert("context".to_string(), context.text.clone());
        vars.insert(
            "history".to_string(),
            if history.is_empty() {
                "(This is the start of the conversation.)".to_string()
            } else {
                history.to_string()
            },
        );

        GenerationRequest {
            model: self.model.clone(),
            system: self
                .prompts
                .render_with_custom(&self.prompts.reflection.system, &vars),
            messages: vec![ChatTurn::user(
                self.prompts
                    .render_with_custom(&self.prompts.reflection.user, &vars),
            )],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }

    /// Produce the synthesis. Any failure, including an empty reply, is a
    /// `Generation` error tagged with the reflection stage.
    #[instrument(skip_all, fields(sources = context.citations.len()))]
    pub async fn reflect(
        &self,
        question: &str,
        context: &AssembledContext,
        history_summary: &str,
    ) -> Result<Synthesis> {
        let request = self.request(question, context, history_summary);

        let text = self.generator.generate(&request).await.map_err(|e| match e {
            WiseoneError::Generation { message, .. } => WiseoneError::generation("reflection", message),
            other => WiseoneError::generation("reflection", other.to_string()),
        })?;

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(WiseoneError::generation("reflection", "Empty synthesis"));
        }

        info!("Reflection produced {} characters", text.len());
        Ok(Synthesis { text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedGenerator;

    fn context() -> AssembledContext {
        AssembledContext {
            text: "[Source 1: 2026-02-08 - Ego (relevance: 80%)]\nThe ego is a story.".to_string(),
            citations: Vec::new(),
            duplicates_skipped: 0,
        }
    }

    #[tokio::test]
    async fn test_prompt_carries_question_context_and_history() {
        let generator = Arc::new(ScriptedGenerator::new());
        generator.push_ok("The sources say the ego is narrative.");
        let stage = ReflectionStage::new(generator.clone(), Arc::new(Prompts::default()), "gpt-4o");

        let synthesis = stage
            .reflect("What is ego?", &context(), "User: hello")
            .await
            .unwrap();
        assert_eq!(synthesis.text, "The sources say the ego is narrative.");

        let requests = generator.requests();
        assert_eq!(requests.len(), 1);
        let prompt = &requests[0].messages[0].content;
        assert!(prompt.contains("What is ego?"));
        assert!(prompt.contains("The ego is a story."));
        assert!(prompt.contains("User: hello"));
        assert!((requests[0].temperature - 0.4).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_failures_are_tagged_with_stage() {
        let generator = Arc::new(ScriptedGenerator::new());
        generator.push_err("connection reset");
        generator.push_ok("   ");
        let stage = ReflectionStage::new(generator, Arc::new(Prompts::default()), "gpt-4o");

        for _ in 0..2 {
            match stage.reflect("q", &context(), "").await {
                Err(WiseoneError::Generation { stage, .. }) => assert_eq!(stage, "reflection"),
                other => panic!("expected generation error, got {:?}", other),
            }
        }
    }
}
