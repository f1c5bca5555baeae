//! In-memory store implementation.
//!
//! Useful for testing and small datasets.

use super::scoring::{self, ScoredRow};
use super::{
    cosine_similarity, count_themes, lexical, ChunkRecord, ConversationStore, ConversationSummary,
    NewChunk, RetrievedCandidate, StoreStats, ThemeCount, TranscriptStore, TranscriptSummary,
};
use crate::conversation::{Conversation, Message};
use crate::error::{Result, WiseoneError};
use crate::transcript::Transcript;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

struct StoredChunk {
    id: i64,
    chunk: NewChunk,
    terms: Vec<String>,
}

struct StoredTranscript {
    id: i64,
    transcript: Transcript,
    ingested_at: DateTime<Utc>,
    chunks: Vec<StoredChunk>,
}

struct StoredConversation {
    id: Uuid,
    title: String,
    created_at: DateTime<Utc>,
    messages: Vec<Message>,
}

#[derive(Default)]
struct State {
    /// Ingestion order.
    transcripts: Vec<StoredTranscript>,
    conversations: Vec<StoredConversation>,
    next_id: i64,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Transcripts by session date; equal dates keep ingestion order.
    fn by_date(&self) -> Vec<&StoredTranscript> {
        let mut sorted: Vec<&StoredTranscript> = self.transcripts.iter().collect();
        sorted.sort_by_key(|t| t.transcript.session_date);
        sorted
    }

    fn rows(&self, query_embedding: &[f32]) -> Vec<ScoredRow> {
        self.transcripts
            .iter()
            .flat_map(|t| {
                t.chunks.iter().map(move |c| {
                    let similarity = cosine_similarity(query_embedding, &c.chunk.embedding);
                    ScoredRow {
                        candidate: RetrievedCandidate {
                            chunk_id: c.id,
                            transcript_id: t.id,
                            filename: t.transcript.filename.clone(),
                            session_date: t.transcript.session_date,
                            title: t.transcript.title.clone(),
                            section_header: c.chunk.section_header.clone(),
                            chunk_index: c.chunk.index,
                            content: c.chunk.content.clone(),
                            token_count: c.chunk.token_count,
                            vector_similarity: similarity,
                            lexical_score: None,
                            score: similarity,
                        },
                        terms: c.terms.clone(),
                    }
                })
            })
            .collect()
    }
}

/// In-memory store.
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    /// Create a new, empty in-memory store.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|e| WiseoneError::Store(format!("Failed to acquire lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|e| WiseoneError::Store(format!("Failed to acquire lock: {}", e)))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TranscriptStore for MemoryStore {
    async fn upsert_transcript(&self, transcript: &Transcript, chunks: &[NewChunk]) -> Result<i64> {
        super::check_chunk_indexes(chunks)?;

        let mut state = self.write()?;
        state
            .transcripts
            .retain(|t| t.transcript.filename != transcript.filename);

        let id = state.next_id();
        let mut stored = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            stored.push(StoredChunk {
                id: state.next_id(),
                terms: lexical::terms(&chunk.content),
                chunk: chunk.clone(),
            });
        }

        state.transcripts.push(StoredTranscript {
            id,
            transcript: transcript.clone(),
            ingested_at: Utc::now(),
            chunks: stored,
        });
        Ok(id)
    }

    async fn transcript_exists(&self, filename: &str) -> Result<bool> {
        let state = self.read()?;
        Ok(state
            .transcripts
            .iter()
            .any(|t| t.transcript.filename == filename))
    }

    async fn delete_transcript(&self, filename: &str) -> Result<bool> {
        let mut state = self.write()?;
        let before = state.transcripts.len();
        state.transcripts.retain(|t| t.transcript.filename != filename);
        Ok(state.transcripts.len() != before)
    }

    async fn list_transcripts(&self) -> Result<Vec<TranscriptSummary>> {
        let state = self.read()?;
        Ok(state
            .by_date()
            .into_iter()
            .map(|t| TranscriptSummary {
                id: t.id,
                filename: t.transcript.filename.clone(),
                session_date: t.transcript.session_date,
                title: t.transcript.title.clone(),
                themes: t.transcript.themes.clone(),
                participants: t.transcript.participants.clone(),
                duration: t.transcript.duration.clone(),
                chunk_count: t.chunks.len(),
                ingested_at: t.ingested_at,
            })
            .collect())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let state = self.read()?;
        Ok(StoreStats {
            transcripts: state.transcripts.len(),
            chunks: state.transcripts.iter().map(|t| t.chunks.len()).sum(),
            conversations: state.conversations.len(),
        })
    }

    async fn chunks(&self, filename: &str) -> Result<Vec<ChunkRecord>> {
        let state = self.read()?;
        Ok(state
            .transcripts
            .iter()
            .find(|t| t.transcript.filename == filename)
            .map(|t| {
                t.chunks
                    .iter()
                    .map(|c| ChunkRecord {
                        id: c.id,
                        chunk_index: c.chunk.index,
                        content: c.chunk.content.clone(),
                        section_header: c.chunk.section_header.clone(),
                        token_count: c.chunk.token_count,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn vector_search(
        &self,
        query_embedding: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<RetrievedCandidate>> {
        let rows = self.read()?.rows(query_embedding);
        Ok(scoring::vector_rank(
            rows.into_iter().map(|r| r.candidate).collect(),
            threshold,
            limit,
        ))
    }

    async fn hybrid_search(
        &self,
        query_embedding: &[f32],
        query_text: &str,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<RetrievedCandidate>> {
        let rows = self.read()?.rows(query_embedding);
        Ok(scoring::hybrid_rank(rows, query_text, threshold, limit))
    }

    async fn theme_counts(&self) -> Result<Vec<ThemeCount>> {
        let state = self.read()?;
        Ok(count_themes(
            state
                .by_date()
                .into_iter()
                .map(|t| t.transcript.themes.as_slice()),
        ))
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn create_conversation(&self, title: &str) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.write()?.conversations.push(StoredConversation {
            id,
            title: title.to_string(),
            created_at: Utc::now(),
            messages: Vec::new(),
        });
        Ok(id)
    }

    async fn append_message(&self, conversation_id: Uuid, message: &Message) -> Result<()> {
        let mut state = self.write()?;
        let conversation = state
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
            .ok_or_else(|| {
                WiseoneError::Store(format!("Conversation {} not found", conversation_id))
            })?;
        conversation.messages.push(message.clone());
        Ok(())
    }

    async fn load_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        let state = self.read()?;
        Ok(state
            .conversations
            .iter()
            .find(|c| c.id == id)
            .map(|c| Conversation::from_parts(c.id, c.title.clone(), c.messages.clone())))
    }

    async fn list_conversations(&self, limit: usize) -> Result<Vec<ConversationSummary>> {
        let state = self.read()?;
        Ok(state
            .conversations
            .iter()
            .rev()
            .take(limit)
            .map(|c| ConversationSummary {
                id: c.id,
                title: c.title.clone(),
                created_at: c.created_at,
                message_count: c.messages.len(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn transcript(filename: &str, date: (i32, u32, u32), themes: &[&str]) -> Transcript {
        let date = NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap();
        Transcript::new(filename, date, filename, "raw").with_themes(themes.iter().copied())
    }

    fn chunk(index: usize, content: &str, embedding: Vec<f32>) -> NewChunk {
        NewChunk {
            index,
            content: content.to_string(),
            section_header: None,
            token_count: 3,
            embedding,
        }
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryStore::new();
        let t = transcript("2026-01-01-a.md", (2026, 1, 1), &["ego"]);
        store
            .upsert_transcript(
                &t,
                &[
                    chunk(0, "Hello world", vec![1.0, 0.0, 0.0]),
                    chunk(1, "Goodbye world", vec![0.0, 1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        assert_eq!(store.stats().await.unwrap().chunks, 2);

        let results = store.vector_search(&[1.0, 0.0, 0.0], 0.0, 10).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].score > results[1].score);

        let listed = store.list_transcripts().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].chunk_count, 2);
    }

    #[tokio::test]
    async fn test_replace_by_filename() {
        let store = MemoryStore::new();
        let t = transcript("2026-01-01-a.md", (2026, 1, 1), &[]);
        store
            .upsert_transcript(&t, &[chunk(0, "one", vec![1.0]), chunk(1, "two", vec![1.0])])
            .await
            .unwrap();
        store
            .upsert_transcript(&t, &[chunk(0, "only", vec![1.0])])
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.transcripts, 1);
        assert_eq!(stats.chunks, 1);
        assert_eq!(store.chunks("2026-01-01-a.md").await.unwrap()[0].content, "only");

        assert!(store.delete_transcript("2026-01-01-a.md").await.unwrap());
        assert!(!store.transcript_exists("2026-01-01-a.md").await.unwrap());
    }

    #[tokio::test]
    async fn test_theme_counts_by_session_date() {
        let store = MemoryStore::new();
        // Ingested out of date order.
        store
            .upsert_transcript(&transcript("c.md", (2026, 3, 1), &["awakening"]), &[])
            .await
            .unwrap();
        store
            .upsert_transcript(&transcript("a.md", (2026, 1, 1), &["nonduality", "ego"]), &[])
            .await
            .unwrap();
        store
            .upsert_transcript(&transcript("b.md", (2026, 2, 1), &["ego"]), &[])
            .await
            .unwrap();

        let counts = store.theme_counts().await.unwrap();
        let pairs: Vec<(&str, usize)> = counts.iter().map(|c| (c.theme.as_str(), c.count)).collect();
        assert_eq!(pairs, vec![("ego", 2), ("nonduality", 1), ("awakening", 1)]);
    }

    #[tokio::test]
    async fn test_conversation_log() {
        let store = MemoryStore::new();
        let id = store.create_conversation("What is ego?").await.unwrap();
        store.append_message(id, &Message::user("What is ego?")).await.unwrap();

        let loaded = store.load_conversation(id).await.unwrap().unwrap();
        assert_eq!(loaded.pending_question(), Some("What is ego?"));
        assert_eq!(store.list_conversations(10).await.unwrap()[0].message_count, 1);

        let missing = store.append_message(Uuid::new_v4(), &Message::user("x")).await;
        assert!(matches!(missing, Err(WiseoneError::Store(_))));
    }
}
