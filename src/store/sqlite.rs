//! SQLite-based store implementation.
//!
//! Embeddings are stored as little-endian f32 blobs and cosine similarity is
//! computed in Rust over all chunks, which is fine for a corpus of a few
//! hundred sessions.

use super::scoring::{self, ScoredRow};
use super::{
    count_themes, cosine_similarity, lexical, ChunkRecord, ConversationStore, ConversationSummary,
    NewChunk, RetrievedCandidate, StoreStats, ThemeCount, TranscriptStore, TranscriptSummary,
};
use crate::conversation::{Citation, Conversation, Message, Role};
use crate::error::{Result, WiseoneError};
use crate::transcript::Transcript;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS transcripts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    filename TEXT NOT NULL UNIQUE,
    session_date TEXT NOT NULL,
    title TEXT NOT NULL,
    themes TEXT NOT NULL DEFAULT '[]',
    participants TEXT NOT NULL DEFAULT '[]',
    duration TEXT,
    raw_content TEXT NOT NULL,
    ingested_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_transcripts_session_date ON transcripts(session_date);

CREATE TABLE IF NOT EXISTS transcript_chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    transcript_id INTEGER NOT NULL REFERENCES transcripts(id) ON DELETE CASCADE,
    chunk_index INTEGER NOT NULL,
    content TEXT NOT NULL,
    section_header TEXT,
    embedding BLOB NOT NULL,
    search_terms TEXT NOT NULL,
    token_count INTEGER NOT NULL,
    UNIQUE(transcript_id, chunk_index)
);

CREATE INDEX IF NOT EXISTS idx_chunks_transcript_id ON transcript_chunks(transcript_id);

CREATE TABLE IF NOT EXISTS conversations (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    conversation_id TEXT NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
    role TEXT NOT NULL CHECK (role IN ('user', 'assistant', 'system')),
    content TEXT NOT NULL,
    sources TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_conversation_id ON messages(conversation_id, id);
"#;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite-based store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(&conn)?;

        info!("Initialized SQLite store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init(conn: &Connection) -> Result<()> {
        // Cascading deletes need foreign keys enabled per connection.
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| WiseoneError::Store(format!("Failed to acquire lock: {}", e)))
    }

    /// Serialize embedding to bytes.
    fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Deserialize embedding from bytes.
    fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    /// Every chunk with its vector similarity to `query_embedding`.
    fn scored_rows(&self, query_embedding: &[f32]) -> Result<Vec<ScoredRow>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT c.id, c.transcript_id, t.filename, t.session_date, t.title,
                   c.section_header, c.chunk_index, c.content, c.token_count,
                   c.embedding, c.search_terms
            FROM transcript_chunks c
            JOIN transcripts t ON t.id = c.transcript_id
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            let embedding_bytes: Vec<u8> = row.get(9)?;
            let search_terms: String = row.get(10)?;
            let similarity =
                cosine_similarity(query_embedding, &Self::bytes_to_embedding(&embedding_bytes));

            Ok(ScoredRow {
                candidate: RetrievedCandidate {
                    chunk_id: row.get(0)?,
                    transcript_id: row.get(1)?,
                    filename: row.get(2)?,
                    session_date: parse_date(3, &row.get::<_, String>(3)?)?,
                    title: row.get(4)?,
                    section_header: row.get(5)?,
                    chunk_index: row.get::<_, i64>(6)? as usize,
                    content: row.get(7)?,
                    token_count: row.get::<_, i64>(8)? as usize,
                    vector_similarity: similarity,
                    lexical_score: None,
                    score: similarity,
                },
                terms: lexical::parse_index(&search_terms),
            })
        })?;

        let rows = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        debug!("Scored {} chunks", rows.len());
        Ok(rows)
    }
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_date(idx: usize, value: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|e| conversion_error(idx, e))
}

fn parse_timestamp(idx: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn parse_list(idx: usize, value: &str) -> rusqlite::Result<Vec<String>> {
    serde_json::from_str(value).map_err(|e| conversion_error(idx, e))
}

#[async_trait]
impl TranscriptStore for SqliteStore {
    #[instrument(skip(self, transcript, chunks), fields(filename = %transcript.filename, chunks = chunks.len()))]
    async fn upsert_transcript(&self, transcript: &Transcript, chunks: &[NewChunk]) -> Result<i64> {
        super::check_chunk_indexes(chunks)?;

        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;

        // Replacing the row cascades to its chunks.
        tx.execute(
            "DELETE FROM transcripts WHERE filename = ?1",
            params![transcript.filename],
        )?;

        tx.execute(
            r#"
            INSERT INTO transcripts
            (filename, session_date, title, themes, participants, duration, raw_content, ingested_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                transcript.filename,
                transcript.session_date.format(DATE_FORMAT).to_string(),
                transcript.title,
                serde_json::to_string(&transcript.themes)?,
                serde_json::to_string(&transcript.participants)?,
                transcript.duration,
                transcript.raw_content,
                Utc::now().to_rfc3339(),
            ],
        )?;
        let transcript_id = tx.last_insert_rowid();

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO transcript_chunks
                (transcript_id, chunk_index, content, section_header, embedding, search_terms, token_count)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )?;
            for chunk in chunks {
                stmt.execute(params![
                    transcript_id,
                    chunk.index as i64,
                    chunk.content,
                    chunk.section_header,
                    Self::embedding_to_bytes(&chunk.embedding),
                    lexical::index_terms(&chunk.content),
                    chunk.token_count as i64,
                ])?;
            }
        }

        tx.commit()?;
        info!("Stored {} with {} chunks", transcript.filename, chunks.len());
        Ok(transcript_id)
    }

    async fn transcript_exists(&self, filename: &str) -> Result<bool> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM transcripts WHERE filename = ?1",
            params![filename],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    #[instrument(skip(self))]
    async fn delete_transcript(&self, filename: &str) -> Result<bool> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM transcripts WHERE filename = ?1",
            params![filename],
        )?;
        if deleted > 0 {
            info!("Deleted transcript {}", filename);
        }
        Ok(deleted > 0)
    }

    #[instrument(skip(self))]
    async fn list_transcripts(&self) -> Result<Vec<TranscriptSummary>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT t.id, t.filename, t.session_date, t.title, t.themes, t.participants,
                   t.duration, t.ingested_at,
                   (SELECT COUNT(*) FROM transcript_chunks c WHERE c.transcript_id = t.id)
            FROM transcripts t
            ORDER BY t.session_date, t.id
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(TranscriptSummary {
                id: row.get(0)?,
                filename: row.get(1)?,
                session_date: parse_date(2, &row.get::<_, String>(2)?)?,
                title: row.get(3)?,
                themes: parse_list(4, &row.get::<_, String>(4)?)?,
                participants: parse_list(5, &row.get::<_, String>(5)?)?,
                duration: row.get(6)?,
                ingested_at: parse_timestamp(7, &row.get::<_, String>(7)?)?,
                chunk_count: row.get::<_, i64>(8)? as usize,
            })
        })?;

        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock()?;
        let count = |sql: &str| -> Result<usize> {
            let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as usize)
        };
        Ok(StoreStats {
            transcripts: count("SELECT COUNT(*) FROM transcripts")?,
            chunks: count("SELECT COUNT(*) FROM transcript_chunks")?,
            conversations: count("SELECT COUNT(*) FROM conversations")?,
        })
    }

    #[instrument(skip(self))]
    async fn chunks(&self, filename: &str) -> Result<Vec<ChunkRecord>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT c.id, c.chunk_index, c.content, c.section_header, c.token_count
            FROM transcript_chunks c
            JOIN transcripts t ON t.id = c.transcript_id
            WHERE t.filename = ?1
            ORDER BY c.chunk_index
            "#,
        )?;

        let rows = stmt.query_map(params![filename], |row| {
            Ok(ChunkRecord {
                id: row.get(0)?,
                chunk_index: row.get::<_, i64>(1)? as usize,
                content: row.get(2)?,
                section_header: row.get(3)?,
                token_count: row.get::<_, i64>(4)? as usize,
            })
        })?;

        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    #[instrument(skip(self, query_embedding))]
    async fn vector_search(
        &self,
        query_embedding: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<RetrievedCandidate>> {
        let rows = self.scored_rows(query_embedding)?;
        let results = scoring::vector_rank(
            rows.into_iter().map(|r| r.candidate).collect(),
            threshold,
            limit,
        );
        debug!("Found {} matching chunks", results.len());
        Ok(results)
    }

    #[instrument(skip(self, query_embedding))]
    async fn hybrid_search(
        &self,
        query_embedding: &[f32],
        query_text: &str,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<RetrievedCandidate>> {
        let rows = self.scored_rows(query_embedding)?;
        let results = scoring::hybrid_rank(rows, query_text, threshold, limit);
        debug!(
            "Found {} matching chunks ({} via keywords)",
            results.len(),
            results.iter().filter(|r| r.has_lexical_match()).count()
        );
        Ok(results)
    }

    async fn theme_counts(&self) -> Result<Vec<ThemeCount>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT themes FROM transcripts ORDER BY session_date, id")?;
        let lists = stmt
            .query_map([], |row| parse_list(0, &row.get::<_, String>(0)?))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(count_themes(lists.iter().map(|l| l.as_slice())))
    }
}

#[async_trait]
impl ConversationStore for SqliteStore {
    async fn create_conversation(&self, title: &str) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO conversations (id, title, created_at) VALUES (?1, ?2, ?3)",
            params![id.to_string(), title, Utc::now().to_rfc3339()],
        )?;
        debug!("Created conversation {}", id);
        Ok(id)
    }

    async fn append_message(&self, conversation_id: Uuid, message: &Message) -> Result<()> {
        let conn = self.lock()?;

        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM conversations WHERE id = ?1",
                params![conversation_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(WiseoneError::Store(format!(
                "Conversation {} not found",
                conversation_id
            )));
        }

        conn.execute(
            r#"
            INSERT INTO messages (conversation_id, role, content, sources, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                conversation_id.to_string(),
                message.role.as_str(),
                message.content,
                serde_json::to_string(&message.sources)?,
                message.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        let conn = self.lock()?;

        let title: Option<String> = conn
            .query_row(
                "SELECT title FROM conversations WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(title) = title else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            r#"
            SELECT role, content, sources, created_at
            FROM messages
            WHERE conversation_id = ?1
            ORDER BY id
            "#,
        )?;

        let rows = stmt
            .query_map(params![id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    parse_timestamp(3, &row.get::<_, String>(3)?)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut messages = Vec::with_capacity(rows.len());
        for (role, content, sources, created_at) in rows {
            let sources: Vec<Citation> = serde_json::from_str(&sources)?;
            messages.push(Message {
                role: role.parse::<Role>()?,
                content,
                sources,
                created_at,
            });
        }

        Ok(Some(Conversation::from_parts(id, title, messages)))
    }

    async fn list_conversations(&self, limit: usize) -> Result<Vec<ConversationSummary>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT c.id, c.title, c.created_at,
                   (SELECT COUNT(*) FROM messages m WHERE m.conversation_id = c.id)
            FROM conversations c
            ORDER BY c.created_at DESC, c.rowid DESC
            LIMIT ?1
            "#,
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            let id: String = row.get(0)?;
            Ok(ConversationSummary {
                id: Uuid::parse_str(&id).map_err(|e| conversion_error(0, e))?,
                title: row.get(1)?,
                created_at: parse_timestamp(2, &row.get::<_, String>(2)?)?,
                message_count: row.get::<_, i64>(3)? as usize,
            })
        })?;

        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript(filename: &str, date: &str, themes: &[&str]) -> Transcript {
        let date = NaiveDate::parse_from_str(date, DATE_FORMAT).unwrap();
        let mut t = Transcript::new(filename, date, "Session", "raw text");
        t.themes = themes.iter().map(|s| s.to_string()).collect();
        t.participants = vec!["Mentor".to_string()];
        t
    }

    fn chunk(index: usize, content: &str, embedding: Vec<f32>) -> NewChunk {
        NewChunk {
            index,
            content: content.to_string(),
            section_header: Some("Key Teachings".to_string()),
            token_count: content.split_whitespace().count(),
            embedding,
        }
    }

    #[tokio::test]
    async fn test_sqlite_transcript_store() {
        let store = SqliteStore::in_memory().unwrap();
        let t = transcript("2026-02-08-ego.md", "2026-02-08", &["ego"]);

        store
            .upsert_transcript(
                &t,
                &[
                    chunk(0, "The ego is a story", vec![1.0, 0.0, 0.0]),
                    chunk(1, "Silence remains", vec![0.0, 1.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let listed = store.list_transcripts().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].chunk_count, 2);
        assert_eq!(listed[0].themes, vec!["ego"]);
        assert_eq!(listed[0].participants, vec!["Mentor"]);

        let results = store.vector_search(&[1.0, 0.0, 0.0], 0.5, 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!((results[0].score - 1.0).abs() < 0.001);
        assert_eq!(results[0].section_header.as_deref(), Some("Key Teachings"));

        let hybrid = store
            .hybrid_search(&[0.0, 0.0, 1.0], "silence", 0.5, 10)
            .await
            .unwrap();
        assert_eq!(hybrid.len(), 1);
        assert_eq!(hybrid[0].chunk_index, 1);
        assert!(hybrid[0].has_lexical_match());
    }

    #[tokio::test]
    async fn test_reingest_replaces_chunks() {
        let store = SqliteStore::in_memory().unwrap();
        let t = transcript("2026-02-08-ego.md", "2026-02-08", &[]);

        let chunks = vec![chunk(0, "one", vec![1.0]), chunk(1, "two", vec![1.0])];
        store.upsert_transcript(&t, &chunks).await.unwrap();
        store.upsert_transcript(&t, &chunks).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.transcripts, 1);
        assert_eq!(stats.chunks, 2);

        assert!(store.delete_transcript("2026-02-08-ego.md").await.unwrap());
        assert_eq!(store.stats().await.unwrap().chunks, 0);
        assert!(!store.delete_transcript("2026-02-08-ego.md").await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_gapped_chunk_indexes() {
        let store = SqliteStore::in_memory().unwrap();
        let t = transcript("a.md", "2026-01-01", &[]);
        let result = store
            .upsert_transcript(&t, &[chunk(0, "a", vec![1.0]), chunk(2, "b", vec![1.0])])
            .await;
        assert!(matches!(result, Err(WiseoneError::Store(_))));
        assert!(!store.transcript_exists("a.md").await.unwrap());
    }

    #[tokio::test]
    async fn test_theme_counts() {
        let store = SqliteStore::in_memory().unwrap();
        for (name, date, themes) in [
            ("a.md", "2026-01-01", vec!["nonduality", "ego"]),
            ("b.md", "2026-01-15", vec!["ego"]),
            ("c.md", "2026-02-01", vec!["awakening"]),
        ] {
            store
                .upsert_transcript(&transcript(name, date, &themes), &[])
                .await
                .unwrap();
        }

        let counts = store.theme_counts().await.unwrap();
        let pairs: Vec<(&str, usize)> = counts.iter().map(|c| (c.theme.as_str(), c.count)).collect();
        assert_eq!(pairs, vec![("ego", 2), ("nonduality", 1), ("awakening", 1)]);
    }

    #[tokio::test]
    async fn test_conversation_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("wiseone.db");

        let id = {
            let store = SqliteStore::new(&path).unwrap();
            let id = store.create_conversation("What is ego?").await.unwrap();
            store.append_message(id, &Message::user("What is ego?")).await.unwrap();
            let citation = Citation {
                filename: "2026-02-08-ego.md".to_string(),
                title: "Ego".to_string(),
                session_date: NaiveDate::from_ymd_opt(2026, 2, 8).unwrap(),
                chunk_index: 3,
                section_header: None,
                similarity: 0.42,
            };
            store
                .append_message(id, &Message::assistant("It is a story.", vec![citation]))
                .await
                .unwrap();
            id
        };

        let store = SqliteStore::new(&path).unwrap();
        let loaded = store.load_conversation(id).await.unwrap().unwrap();
        assert_eq!(loaded.title.as_deref(), Some("What is ego?"));
        assert_eq!(loaded.messages().len(), 2);
        assert_eq!(loaded.messages()[1].sources[0].chunk_index, 3);
        assert_eq!(loaded.pending_question(), None);

        let listed = store.list_conversations(5).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].message_count, 2);

        assert!(store.load_conversation(Uuid::new_v4()).await.unwrap().is_none());
        let orphan = store.append_message(Uuid::new_v4(), &Message::user("hi")).await;
        assert!(matches!(orphan, Err(WiseoneError::Store(_))));
    }
}
