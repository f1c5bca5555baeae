//! Persistence for transcripts, chunks and conversations.
//!
//! Two traits cover the storage capability: [`TranscriptStore`] for the
//! corpus and its similarity search, [`ConversationStore`] for chat history.
//! Both backends compute cosine similarity in Rust over all stored chunks
//! and share the ranking policy in [`scoring`].

pub mod lexical;
mod memory;
pub mod scoring;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::conversation::{Conversation, Message};
use crate::error::Result;
use crate::transcript::Transcript;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A chunk ready to be written alongside its transcript.
#[derive(Debug, Clone)]
pub struct NewChunk {
    /// Zero-based position in the transcript.
    pub index: usize,
    pub content: String,
    pub section_header: Option<String>,
    pub token_count: usize,
    pub embedding: Vec<f32>,
}

/// A stored chunk, without its embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: i64,
    pub chunk_index: usize,
    pub content: String,
    pub section_header: Option<String>,
    pub token_count: usize,
}

/// Query-time projection of a chunk with its scores and citation metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedCandidate {
    pub chunk_id: i64,
    pub transcript_id: i64,
    pub filename: String,
    pub session_date: NaiveDate,
    pub title: String,
    pub section_header: Option<String>,
    pub chunk_index: usize,
    pub content: String,
    pub token_count: usize,
    /// Cosine similarity between the query and chunk embeddings.
    pub vector_similarity: f32,
    /// Lexical score in [0, 1), present only when a query term matched.
    pub lexical_score: Option<f32>,
    /// Ranking score.
    pub score: f32,
}

impl RetrievedCandidate {
    pub fn has_lexical_match(&self) -> bool {
        self.lexical_score.is_some()
    }
}

/// Summary information about an ingested transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSummary {
    pub id: i64,
    pub filename: String,
    pub session_date: NaiveDate,
    pub title: String,
    pub themes: Vec<String>,
    pub participants: Vec<String>,
    pub duration: Option<String>,
    pub chunk_count: usize,
    pub ingested_at: DateTime<Utc>,
}

/// Corpus and history sizes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub transcripts: usize,
    pub chunks: usize,
    pub conversations: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeCount {
    pub theme: String,
    pub count: usize,
}

/// Listing entry for a stored conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub message_count: usize,
}

/// Storage for the transcript corpus.
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    /// Write a transcript and its chunks, replacing any transcript with the
    /// same filename. Returns the transcript id.
    async fn upsert_transcript(&self, transcript: &Transcript, chunks: &[NewChunk]) -> Result<i64>;

    /// Check if a filename has been ingested.
    async fn transcript_exists(&self, filename: &str) -> Result<bool>;

    /// Delete a transcript and its chunks. Returns whether it existed.
    async fn delete_transcript(&self, filename: &str) -> Result<bool>;

    /// All transcripts ordered by session date (oldest first).
    async fn list_transcripts(&self) -> Result<Vec<TranscriptSummary>>;

    async fn stats(&self) -> Result<StoreStats>;

    /// Chunks of one transcript in index order.
    async fn chunks(&self, filename: &str) -> Result<Vec<ChunkRecord>>;

    /// Top `limit` chunks with cosine similarity >= `threshold`.
    async fn vector_search(
        &self,
        query_embedding: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<RetrievedCandidate>>;

    /// Top `limit` chunks under the hybrid policy of [`scoring::hybrid_rank`].
    async fn hybrid_search(
        &self,
        query_embedding: &[f32],
        query_text: &str,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<RetrievedCandidate>>;

    /// Theme counts over all transcripts, most frequent first.
    async fn theme_counts(&self) -> Result<Vec<ThemeCount>>;
}

/// Storage for conversation history.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(&self, title: &str) -> Result<Uuid>;

    async fn append_message(&self, conversation_id: Uuid, message: &Message) -> Result<()>;

    async fn load_conversation(&self, id: Uuid) -> Result<Option<Conversation>>;

    /// Most recent conversations first.
    async fn list_conversations(&self, limit: usize) -> Result<Vec<ConversationSummary>>;
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Chunk indexes must be dense and start at zero.
pub(crate) fn check_chunk_indexes(chunks: &[NewChunk]) -> Result<()> {
    match chunks.iter().enumerate().find(|(i, c)| c.index != *i) {
        Some((position, chunk)) => Err(crate::error::WiseoneError::Store(format!(
            "Chunk at position {} has index {}",
            position, chunk.index
        ))),
        None => Ok(()),
    }
}

/// Count themes across transcripts given in session order. A theme counts
/// once per transcript; equal counts keep first-appearance order.
pub(crate) fn count_themes<'a, I>(theme_lists: I) -> Vec<ThemeCount>
where
    I: IntoIterator<Item = &'a [String]>,
{
    let mut counts: Vec<ThemeCount> = Vec::new();
    for themes in theme_lists {
        let mut seen: Vec<&str> = Vec::new();
        for theme in themes.iter().map(|t| t.trim()).filter(|t| !t.is_empty()) {
            if seen.contains(&theme) {
                continue;
            }
            seen.push(theme);
            match counts.iter_mut().find(|c| c.theme == theme) {
                Some(entry) => entry.count += 1,
                None => counts.push(ThemeCount {
                    theme: theme.to_string(),
                    count: 1,
                }),
            }
        }
    }
    // Stable sort keeps first appearance among ties.
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}
