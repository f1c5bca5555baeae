//! The per-turn pipeline: record, retrieve, assemble, reflect, respond, record.

use super::context::ContextAssembler;
use super::reflection::ReflectionStage;
use super::response::{Answer, ResponseGenerator};
use super::retriever::Retriever;
use crate::conversation::{derive_title, Citation, Conversation, Message};
use crate::error::{Result, WiseoneError};
use crate::store::ConversationStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Reply used when nothing in the corpus clears the retrieval bar.
pub const NO_SOURCES_REPLY: &str = "I couldn't find anything in the session transcripts that speaks to this question. Could you rephrase it, or ask about a theme from one of the sessions?";

/// Result of one completed turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub conversation_id: Uuid,
    pub answer: String,
    pub sources: Vec<Citation>,
}

/// Retrieval-augmented answer engine.
pub struct RagEngine {
    retriever: Retriever,
    assembler: ContextAssembler,
    reflection: ReflectionStage,
    response: ResponseGenerator,
    conversations: Arc<dyn ConversationStore>,
    history_messages: usize,
    contextual_queries: bool,
    turn_timeout: Duration,
}

impl RagEngine {
    /// Create a new engine with a 10 message history window and a two
    /// minute turn timeout.
    pub fn new(
        retriever: Retriever,
        assembler: ContextAssembler,
        reflection: ReflectionStage,
        response: ResponseGenerator,
        conversations: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            retriever,
            assembler,
            reflection,
            response,
            conversations,
            history_messages: 10,
            contextual_queries: true,
            turn_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_history_messages(mut self, n: usize) -> Self {
        self.history_messages = n;
        self
    }

    /// Prefix follow-up queries with the previous question for embedding.
    pub fn with_contextual_queries(mut self, enabled: bool) -> Self {
        self.contextual_queries = enabled;
        self
    }

    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout = timeout;
        self
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn conversations(&self) -> Arc<dyn ConversationStore> {
        self.conversations.clone()
    }

    /// Ask a single question in a fresh conversation.
    pub async fn ask(&self, question: &str) -> Result<TurnOutcome> {
        let mut conversation = Conversation::new();
        self.turn(&mut conversation, question).await
    }

    /// Run one turn. The user message is recorded before retrieval; on
    /// failure it stays in the conversation unanswered and can be retried.
    #[instrument(skip(self, conversation, question), fields(conversation = ?conversation.id))]
    pub async fn turn(&self, conversation: &mut Conversation, question: &str) -> Result<TurnOutcome> {
        let question = question.trim();
        if question.is_empty() {
            return Err(WiseoneError::InvalidInput("Question is empty".to_string()));
        }
        if conversation.pending_question().is_some() {
            return Err(WiseoneError::InvalidInput(
                "The previous question has no answer yet; retry it first".to_string(),
            ));
        }

        let id = match conversation.id {
            Some(id) => id,
            None => {
                let title = derive_title(question);
                let id = self
                    .conversations
                    .create_conversation(&title)
                    .await
                    .map_err(turn_error)?;
                conversation.id = Some(id);
                conversation.title = Some(title);
                info!("Started conversation {}", id);
                id
            }
        };

        let message = Message::user(question);
        self.conversations
            .append_message(id, &message)
            .await
            .map_err(turn_error)?;
        conversation.push(message);

        self.answer_pending(id, conversation).await
    }

    /// Answer the trailing unanswered user message again.
    pub async fn retry(&self, conversation: &mut Conversation) -> Result<TurnOutcome> {
        let id = conversation
            .id
            .ok_or_else(|| WiseoneError::InvalidInput("Conversation has not started".to_string()))?;
        if conversation.pending_question().is_none() {
            return Err(WiseoneError::InvalidInput(
                "There is no unanswered question to retry".to_string(),
            ));
        }
        info!("Retrying pending question in {}", id);
        self.answer_pending(id, conversation).await
    }

    async fn answer_pending(&self, id: Uuid, conversation: &mut Conversation) -> Result<TurnOutcome> {
        let question = conversation
            .pending_question()
            .map(str::to_string)
            .ok_or_else(|| WiseoneError::InvalidInput("No pending question".to_string()))?;

        let answer = match tokio::time::timeout(
            self.turn_timeout,
            self.run_stages(conversation, &question),
        )
        .await
        {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                warn!("Turn failed: {}", e);
                return Err(turn_error(e));
            }
            Err(_) => {
                warn!("Turn timed out after {:?}", self.turn_timeout);
                return Err(turn_error(WiseoneError::Timeout(format!(
                    "no answer within {} seconds",
                    self.turn_timeout.as_secs()
                ))));
            }
        };

        let message = Message::assistant(answer.text.clone(), answer.citations.clone());
        self.conversations
            .append_message(id, &message)
            .await
            .map_err(turn_error)?;
        conversation.push(message);

        Ok(TurnOutcome {
            conversation_id: id,
            answer: answer.text,
            sources: answer.citations,
        })
    }

    async fn run_stages(&self, conversation: &Conversation, question: &str) -> Result<Answer> {
        let embed_text = conversation.retrieval_query(question, self.contextual_queries);
        let candidates = self.retriever.retrieve(&embed_text, Some(question)).await?;

        let context = self.assembler.assemble(&candidates);
        if context.is_empty() {
            info!("No sources cleared the retrieval bar");
            return Ok(Answer {
                text: NO_SOURCES_REPLY.to_string(),
                citations: Vec::new(),
            });
        }

        info!("Reflecting over {} sources", context.citations.len());
        let summary = conversation.summary(self.history_messages);
        let synthesis = self.reflection.reflect(question, &context, &summary).await?;

        info!("Writing response");
        self.response
            .respond(
                question,
                &context,
                &synthesis,
                conversation.recent(self.history_messages),
            )
            .await
    }
}

fn turn_error(e: WiseoneError) -> WiseoneError {
    match e {
        WiseoneError::Turn(_) => e,
        other => WiseoneError::Turn(Box::new(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Prompts;
    use crate::conversation::Role;
    use crate::store::{MemoryStore, NewChunk, TranscriptStore};
    use crate::test_support::{unit_at, ScriptedGenerator, StaticEmbedder};
    use crate::transcript::Transcript;
    use chrono::NaiveDate;

    struct Fixture {
        engine: RagEngine,
        store: Arc<MemoryStore>,
        generator: Arc<ScriptedGenerator>,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        store
            .upsert_transcript(
                &Transcript::new(
                    "2026-02-08-ego.md",
                    NaiveDate::from_ymd_opt(2026, 2, 8).unwrap(),
                    "Ego and Awakening",
                    "",
                ),
                &[NewChunk {
                    index: 0,
                    content: "The ego is a story we keep telling.".to_string(),
                    section_header: Some("Key Teachings".to_string()),
                    token_count: 8,
                    embedding: unit_at(0.8),
                }],
            )
            .await
            .unwrap();

        let embedder = Arc::new(StaticEmbedder::new().with_rule("weather", vec![-1.0, 0.0]));
        let generator = Arc::new(ScriptedGenerator::new());
        let prompts = Arc::new(Prompts::default());

        let engine = RagEngine::new(
            Retriever::new(store.clone(), embedder),
            ContextAssembler::default(),
            ReflectionStage::new(generator.clone(), prompts.clone(), "gpt-4o"),
            ResponseGenerator::new(generator.clone(), prompts, "gpt-4o"),
            store.clone(),
        );

        Fixture {
            engine,
            store,
            generator,
        }
    }

    #[tokio::test]
    async fn test_turn_records_both_messages_with_sources() {
        let f = fixture().await;
        f.generator.push_ok("sources agree: narrative self");
        f.generator.push_ok("The ego is a story.");

        let mut conversation = Conversation::new();
        let outcome = f.engine.turn(&mut conversation, "What is ego?").await.unwrap();

        assert_eq!(outcome.answer, "The ego is a story.");
        assert_eq!(outcome.sources.len(), 1);
        assert_eq!(outcome.sources[0].filename, "2026-02-08-ego.md");

        let stored = f.store.load_conversation(outcome.conversation_id).await.unwrap().unwrap();
        assert_eq!(stored.title.as_deref(), Some("What is ego?"));
        assert_eq!(stored.messages().len(), 2);
        assert_eq!(stored.messages()[1].sources, outcome.sources);

        // The response stage saw the synthesis from the reflection stage.
        let requests = f.generator.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].messages.last().unwrap().content.contains("sources agree: narrative self"));
    }

    #[tokio::test]
    async fn test_reflection_failure_then_retry() {
        let f = fixture().await;
        f.generator.push_err("model overloaded");

        let mut conversation = Conversation::new();
        let err = f.engine.turn(&mut conversation, "What is ego?").await.unwrap_err();
        assert!(matches!(err, WiseoneError::Turn(_)));
        assert!(err.is_retryable());
        assert!(err.to_string().starts_with("Could not complete this turn"));

        let id = conversation.id.unwrap();
        let stored = f.store.load_conversation(id).await.unwrap().unwrap();
        assert_eq!(stored.messages().len(), 1);
        assert_eq!(stored.messages()[0].role, Role::User);
        assert_eq!(conversation.pending_question(), Some("What is ego?"));

        // Only the reflection call ran.
        assert_eq!(f.generator.requests().len(), 1);

        f.generator.push_ok("synthesis");
        f.generator.push_ok("Here is what the sessions say.");
        let outcome = f.engine.retry(&mut conversation).await.unwrap();
        assert_eq!(outcome.conversation_id, id);

        let stored = f.store.load_conversation(id).await.unwrap().unwrap();
        let roles: Vec<Role> = stored.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert_eq!(conversation.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_new_question_while_pending_is_rejected() {
        let f = fixture().await;
        f.generator.push_err("boom");

        let mut conversation = Conversation::new();
        assert!(f.engine.turn(&mut conversation, "What is ego?").await.is_err());
        let second = f.engine.turn(&mut conversation, "Another?").await;
        assert!(matches!(second, Err(WiseoneError::InvalidInput(_))));
        assert_eq!(conversation.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_no_sources_skips_generation() {
        let f = fixture().await;
        let mut conversation = Conversation::new();
        let outcome = f
            .engine
            .turn(&mut conversation, "How is the weather today?")
            .await
            .unwrap();

        assert_eq!(outcome.answer, NO_SOURCES_REPLY);
        assert!(outcome.sources.is_empty());
        assert!(f.generator.requests().is_empty());
        assert_eq!(conversation.messages().len(), 2);
    }

    #[tokio::test]
    async fn test_follow_up_carries_history() {
        let f = fixture().await;
        for reply in ["s1", "First answer.", "s2", "Second answer."] {
            f.generator.push_ok(reply);
        }

        let mut conversation = Conversation::new();
        f.engine.turn(&mut conversation, "What is ego?").await.unwrap();
        f.engine.turn(&mut conversation, "And the story?").await.unwrap();

        let requests = f.generator.requests();
        let second_reflection = &requests[2].messages[0].content;
        assert!(second_reflection.contains("User: What is ego?"));
        let second_response = &requests[3];
        // Two history messages plus the new prompt.
        assert_eq!(second_response.messages.len(), 3);
        assert_eq!(conversation.messages().len(), 4);
    }

    #[tokio::test]
    async fn test_timeout_aborts_turn() {
        struct Stalled;

        #[async_trait::async_trait]
        impl crate::generation::Generator for Stalled {
            async fn generate(&self, _: &crate::generation::GenerationRequest) -> Result<String> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(String::new())
            }
        }

        let f = fixture().await;
        let prompts = Arc::new(Prompts::default());
        let stalled: Arc<dyn crate::generation::Generator> = Arc::new(Stalled);
        let engine = RagEngine::new(
            f.engine.retriever().clone(),
            ContextAssembler::default(),
            ReflectionStage::new(stalled.clone(), prompts.clone(), "gpt-4o"),
            ResponseGenerator::new(stalled, prompts, "gpt-4o"),
            f.store.clone(),
        )
        .with_turn_timeout(Duration::from_millis(20));

        let mut conversation = Conversation::new();
        match engine.turn(&mut conversation, "What is ego?").await {
            Err(WiseoneError::Turn(inner)) => assert!(matches!(*inner, WiseoneError::Timeout(_))),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(conversation.pending_question(), Some("What is ego?"));
    }
}
