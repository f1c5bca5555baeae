//! Chunking strategies for breaking transcripts into searchable spans.
//!
//! Chunks carry byte offsets into the transcript text, so overlapping
//! neighbours can be stitched back into the original document.

mod section;
pub mod tokens;

pub use section::{SectionChunker, WindowChunker, FULL_TRANSCRIPT_LABEL};

use crate::config::ChunkingSettings;
use crate::error::{Result, WiseoneError};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// A contiguous span of a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Zero-based position in the document.
    pub index: usize,
    /// Exact text of the span.
    pub content: String,
    /// Section heading the span belongs to, if known.
    pub section_header: Option<String>,
    /// Approximate token count.
    pub token_count: usize,
    /// Byte offset of the first character.
    pub start: usize,
    /// Byte offset one past the last character.
    pub end: usize,
}

impl TextChunk {
    /// Byte range of this chunk in the source text.
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Chunking strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingStrategy {
    /// Split at `##`/`###` headings, then by token windows.
    #[default]
    Sections,
    /// Token windows over the whole document.
    Windows,
}

impl std::str::FromStr for ChunkingStrategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sections" | "section" => Ok(ChunkingStrategy::Sections),
            "windows" | "window" => Ok(ChunkingStrategy::Windows),
            _ => Err(format!("Unknown chunking strategy: {}", s)),
        }
    }
}

/// Size limits for chunking, in tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Target chunk size.
    pub chunk_size: usize,
    /// Tokens shared by consecutive windows.
    pub overlap: usize,
    /// Tokens a chunk may run past `chunk_size` instead of leaving a tiny tail.
    pub tolerance: usize,
}

impl ChunkingConfig {
    /// Create a config with the default tolerance (a fifth of the size).
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        Self::with_tolerance(chunk_size, overlap, chunk_size / 5)
    }

    /// Create a config with an explicit tolerance.
    pub fn with_tolerance(chunk_size: usize, overlap: usize, tolerance: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(WiseoneError::Config("chunk size must be positive".to_string()));
        }
        if overlap >= chunk_size {
            return Err(WiseoneError::Config(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
            tolerance,
        })
    }

    /// Build from the `[chunking]` settings section.
    pub fn from_settings(settings: &ChunkingSettings) -> Result<Self> {
        match settings.tolerance {
            Some(t) => Self::with_tolerance(settings.chunk_size, settings.chunk_overlap, t),
            None => Self::new(settings.chunk_size, settings.chunk_overlap),
        }
    }

    /// Largest token count any chunk may have.
    pub fn max_tokens(&self) -> usize {
        self.chunk_size + self.tolerance
    }

    /// Distance between the starts of consecutive windows.
    fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
            tolerance: 200,
        }
    }
}

/// Trait for chunking implementations.
pub trait Chunker: Send + Sync {
    /// Split `text` into ordered chunks with dense indexes starting at 0.
    fn chunk(&self, text: &str, config: &ChunkingConfig) -> Vec<TextChunk>;
}

/// Create a chunker for the strategy.
pub fn create_chunker(strategy: ChunkingStrategy) -> Box<dyn Chunker> {
    match strategy {
        ChunkingStrategy::Sections => Box::new(SectionChunker::new()),
        ChunkingStrategy::Windows => Box::new(WindowChunker::new()),
    }
}

/// Split the token range `0..n` into windows of `config.chunk_size` tokens,
/// each starting `chunk_size - overlap` after the previous one. A tail of at
/// most `tolerance` tokens is folded into the last window.
pub(crate) fn token_windows(n: usize, config: &ChunkingConfig) -> Vec<Range<usize>> {
    if n == 0 {
        return Vec::new();
    }
    if n <= config.max_tokens() {
        return vec![0..n];
    }

    let mut windows = Vec::new();
    let mut start = 0;
    loop {
        let mut end = (start + config.chunk_size).min(n);
        if n - end <= config.tolerance {
            end = n;
        }
        windows.push(start..end);
        if end == n {
            break;
        }
        start += config.step();
    }
    windows
}
