//! Pipeline orchestrator for Wiseone.
//!
//! Builds the clients and stores once from [`Settings`] and hands them to
//! ingestion and to the answer engine.

use crate::chunking::{create_chunker, ChunkingConfig, TextChunk};
use crate::config::{Prompts, Settings};
use crate::embedding::{Embedder, OpenAIEmbedder};
use crate::error::{Result, WiseoneError};
use crate::generation::{Generator, ModelRouter};
use crate::rag::{ContextAssembler, RagEngine, ReflectionStage, ResponseGenerator, Retriever};
use crate::retry::RetryPolicy;
use crate::store::{ConversationStore, NewChunk, SqliteStore, TranscriptStore};
use crate::transcript::{is_transcript_file, parse_transcript, Transcript};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// The main orchestrator for the Wiseone pipeline.
pub struct Orchestrator {
    settings: Settings,
    prompts: Arc<Prompts>,
    embedder: Arc<dyn Embedder>,
    generator: Arc<dyn Generator>,
    transcripts: Arc<dyn TranscriptStore>,
    conversations: Arc<dyn ConversationStore>,
    retry: RetryPolicy,
}

/// Flags for a batch ingestion run.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Parse and chunk only; no embedding and no writes.
    pub dry_run: bool,
    /// Re-ingest files that are already stored.
    pub force: bool,
    /// Restrict the run to one filename in the directory.
    pub file: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "error")]
pub enum FileStatus {
    Ingested,
    Skipped,
    Previewed,
    Failed(String),
}

/// Outcome for one transcript file.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub filename: String,
    pub status: FileStatus,
    pub title: Option<String>,
    pub chunks: usize,
    pub tokens: usize,
    pub warnings: Vec<String>,
}

impl FileReport {
    fn new(filename: &str, status: FileStatus) -> Self {
        Self {
            filename: filename.to_string(),
            status,
            title: None,
            chunks: 0,
            tokens: 0,
            warnings: Vec::new(),
        }
    }
}

/// Summary of a batch ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub files: Vec<FileReport>,
}

impl IngestReport {
    fn count(&self, pred: impl Fn(&FileStatus) -> bool) -> usize {
        self.files.iter().filter(|f| pred(&f.status)).count()
    }

    pub fn ingested(&self) -> usize {
        self.count(|s| *s == FileStatus::Ingested)
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| *s == FileStatus::Skipped)
    }

    pub fn previewed(&self) -> usize {
        self.count(|s| *s == FileStatus::Previewed)
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, FileStatus::Failed(_)))
    }

    pub fn total_chunks(&self) -> usize {
        self.files.iter().map(|f| f.chunks).sum()
    }

    pub fn total_tokens(&self) -> usize {
        self.files.iter().map(|f| f.tokens).sum()
    }
}

/// A parsed and chunked transcript, not yet embedded.
#[derive(Debug, Clone)]
pub struct PreparedTranscript {
    pub transcript: Transcript,
    pub chunks: Vec<TextChunk>,
}

impl Orchestrator {
    /// Create a new orchestrator backed by OpenAI and the SQLite store.
    pub fn new(settings: Settings) -> Result<Self> {
        let prompts = Prompts::load(
            settings.prompts.custom_dir.as_deref(),
            Some(&settings.prompts.variables),
        )?;

        let timeout = settings.generation.request_timeout();

        let embedder: Arc<dyn Embedder> = Arc::new(OpenAIEmbedder::with_config(
            &settings.embedding.model,
            settings.embedding.dimensions as usize,
            timeout,
        )?);

        let generator: Arc<dyn Generator> = Arc::new(ModelRouter::new(timeout)?);

        let store = Arc::new(SqliteStore::new(&settings.sqlite_path())?);

        Ok(Self::with_components(
            settings,
            prompts,
            embedder,
            generator,
            store.clone(),
            store,
        ))
    }

    /// Create an orchestrator with custom components.
    pub fn with_components(
        settings: Settings,
        prompts: Prompts,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        transcripts: Arc<dyn TranscriptStore>,
        conversations: Arc<dyn ConversationStore>,
    ) -> Self {
        let retry = RetryPolicy::new(settings.embedding.max_retries);
        Self {
            settings,
            prompts: Arc::new(prompts),
            embedder,
            generator,
            transcripts,
            conversations,
            retry,
        }
    }

    /// Override the embedding retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn transcripts(&self) -> Arc<dyn TranscriptStore> {
        self.transcripts.clone()
    }

    pub fn conversations(&self) -> Arc<dyn ConversationStore> {
        self.conversations.clone()
    }

    /// A retriever configured from the retrieval settings.
    pub fn retriever(&self) -> Retriever {
        let retrieval = &self.settings.retrieval;
        Retriever::new(self.transcripts.clone(), self.embedder.clone())
            .with_top_k(retrieval.top_k)
            .with_threshold(retrieval.similarity_threshold)
            .with_hybrid(retrieval.hybrid)
    }

    /// The answer engine, with optional per-call overrides for K and threshold.
    pub fn engine(&self, top_k: Option<usize>, threshold: Option<f32>) -> RagEngine {
        let generation = &self.settings.generation;

        let mut retriever = self.retriever();
        if let Some(k) = top_k {
            retriever = retriever.with_top_k(k);
        }
        if let Some(t) = threshold {
            retriever = retriever.with_threshold(t);
        }

        let assembler = ContextAssembler::new(self.settings.context.max_chars)
            .with_dedup_similarity(self.settings.context.dedup_similarity);

        let reflection = ReflectionStage::new(
            self.generator.clone(),
            self.prompts.clone(),
            generation.reflection_model(),
        )
        .with_temperature(generation.reflection_temperature)
        .with_max_tokens(generation.max_tokens);

        let response = ResponseGenerator::new(
            self.generator.clone(),
            self.prompts.clone(),
            &generation.chat_model,
        )
        .with_temperature(generation.temperature)
        .with_max_tokens(generation.max_tokens);

        RagEngine::new(
            retriever,
            assembler,
            reflection,
            response,
            self.conversations.clone(),
        )
        .with_history_messages(generation.history_messages)
        .with_contextual_queries(self.settings.retrieval.contextual_queries)
        .with_turn_timeout(generation.turn_timeout())
    }

    /// Parse and chunk one transcript document.
    pub fn prepare(&self, filename: &str, text: &str) -> Result<PreparedTranscript> {
        let transcript = parse_transcript(filename, text)?;
        let config = ChunkingConfig::from_settings(&self.settings.chunking)
            .map_err(|e| WiseoneError::ingestion(filename, e.to_string()))?;
        let chunker = create_chunker(self.settings.chunking.strategy);
        let chunks = chunker.chunk(&transcript.raw_content, &config);
        debug!("{}: {} chunks", filename, chunks.len());
        Ok(PreparedTranscript { transcript, chunks })
    }

    /// Embed chunk texts in configured batch sizes, retrying transient failures.
    async fn embed_chunks(&self, chunks: &[TextChunk]) -> Result<Vec<Vec<f32>>> {
        let mut embeddings = Vec::with_capacity(chunks.len());
        let batch_size = self.settings.embedding.batch_size.max(1);

        for (i, batch) in chunks.chunks(batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = self
                .retry
                .run("embedding batch", || self.embedder.embed_batch(&texts))
                .await?;
            crate::embedding::check_embeddings(&vectors, texts.len(), self.embedder.dimensions())?;
            debug!("Embedded batch {} ({} chunks)", i + 1, texts.len());
            embeddings.extend(vectors);
        }

        Ok(embeddings)
    }

    /// Ingest one transcript file.
    #[instrument(skip(self, path, options), fields(path = %path.display()))]
    pub async fn ingest_file(&self, path: &Path, options: &IngestOptions) -> FileReport {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        match self.try_ingest_file(path, &filename, options).await {
            Ok(report) => report,
            Err(e) => {
                warn!("{}", e);
                let message = match e {
                    WiseoneError::Ingestion { message, .. } => message,
                    other => other.to_string(),
                };
                FileReport::new(&filename, FileStatus::Failed(message))
            }
        }
    }

    async fn try_ingest_file(
        &self,
        path: &Path,
        filename: &str,
        options: &IngestOptions,
    ) -> Result<FileReport> {
        if !options.dry_run && !options.force && self.transcripts.transcript_exists(filename).await? {
            info!("{} is already ingested, skipping", filename);
            return Ok(FileReport::new(filename, FileStatus::Skipped));
        }

        let text = std::fs::read_to_string(path)
            .map_err(|e| WiseoneError::ingestion(filename, format!("Could not read file: {}", e)))?;
        let prepared = self.prepare(filename, &text)?;

        let status = if options.dry_run {
            FileStatus::Previewed
        } else {
            FileStatus::Ingested
        };
        let mut report = FileReport::new(filename, status);
        report.title = Some(prepared.transcript.title.clone());
        report.chunks = prepared.chunks.len();
        report.tokens = prepared.chunks.iter().map(|c| c.token_count).sum();

        if prepared.chunks.is_empty() {
            warn!("{} has no text to chunk", filename);
            report.warnings.push("Transcript is empty; no chunks created".to_string());
        }

        if options.dry_run {
            return Ok(report);
        }

        let embeddings = self
            .embed_chunks(&prepared.chunks)
            .await
            .map_err(|e| WiseoneError::ingestion(filename, e.to_string()))?;

        let new_chunks: Vec<NewChunk> = prepared
            .chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| NewChunk {
                index: chunk.index,
                content: chunk.content,
                section_header: chunk.section_header,
                token_count: chunk.token_count,
                embedding,
            })
            .collect();

        self.transcripts
            .upsert_transcript(&prepared.transcript, &new_chunks)
            .await
            .map_err(|e| WiseoneError::ingestion(filename, e.to_string()))?;

        info!("Ingested {} ({} chunks)", filename, report.chunks);
        Ok(report)
    }

    /// Transcript files in `dir`, sorted by name, or just `options.file`.
    pub fn transcript_files(&self, dir: &Path, options: &IngestOptions) -> Result<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Err(WiseoneError::InvalidInput(format!(
                "Not a directory: {}",
                dir.display()
            )));
        }

        if let Some(name) = &options.file {
            let path = dir.join(name);
            if !path.is_file() {
                return Err(WiseoneError::InvalidInput(format!(
                    "No file named '{}' in {}",
                    name,
                    dir.display()
                )));
            }
            return Ok(vec![path]);
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_transcript_file(p))
            .collect();
        files.sort();
        Ok(files)
    }

    /// Ingest every transcript in `dir`. One file's failure never stops the
    /// batch. `on_file` is called after each file.
    #[instrument(skip(self, dir, options, on_file), fields(dir = %dir.display()))]
    pub async fn ingest_directory<F>(
        &self,
        dir: &Path,
        options: &IngestOptions,
        mut on_file: F,
    ) -> Result<IngestReport>
    where
        F: FnMut(&FileReport),
    {
        let files = self.transcript_files(dir, options)?;
        info!("Found {} transcript files", files.len());

        let mut report = IngestReport::default();
        for path in files {
            let file_report = self.ingest_file(&path, options).await;
            on_file(&file_report);
            report.files.push(file_report);
        }

        info!(
            "Ingestion finished: {} ingested, {} skipped, {} failed, {} previewed",
            report.ingested(),
            report.skipped(),
            report.failed(),
            report.previewed()
        );
        Ok(report)
    }
}
