//! Section-aware and whole-document window chunking.

use super::tokens::token_spans;
use super::{token_windows, Chunker, ChunkingConfig, TextChunk};
use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

/// Section label for chunks produced without section awareness.
pub const FULL_TRANSCRIPT_LABEL: &str = "Full Transcript";

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^#{2,3}[ \t]+\S").expect("valid regex"))
}

/// Splits at `##`/`###` headings, then into token windows when a section
/// runs past the size limit. A transcript that fits in one chunk is kept whole.
pub struct SectionChunker;

impl SectionChunker {
    pub fn new() -> Self {
        Self
    }

    /// Byte ranges of the sections of `text` with their heading labels.
    ///
    /// The ranges tile the text. Text before the first heading forms an
    /// unlabelled section; blank sections are merged into their neighbour.
    fn sections(text: &str) -> Vec<(Range<usize>, Option<String>)> {
        let mut starts: Vec<(usize, Option<String>)> = Vec::new();
        for m in heading_re().find_iter(text) {
            let line_end = text[m.start()..]
                .find('\n')
                .map(|i| m.start() + i)
                .unwrap_or(text.len());
            let label = text[m.start()..line_end]
                .trim_start_matches('#')
                .trim()
                .to_string();
            starts.push((m.start(), Some(label)));
        }
        if starts.first().map(|(s, _)| *s != 0).unwrap_or(true) {
            starts.insert(0, (0, None));
        }

        let mut sections: Vec<(Range<usize>, Option<String>)> = Vec::new();
        let mut carried_start: Option<usize> = None;
        for (i, (start, label)) in starts.iter().enumerate() {
            let end = starts.get(i + 1).map(|(s, _)| *s).unwrap_or(text.len());
            let start = carried_start.take().unwrap_or(*start);

            if text[start..end].trim().is_empty() {
                carried_start = Some(start);
                continue;
            }
            sections.push((start..end, label.clone()));
        }

        // Trailing blank text joins the last real section.
        if let (Some(_), Some(last)) = (carried_start, sections.last_mut()) {
            last.0.end = text.len();
        }

        sections
    }
}

impl Default for SectionChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunker for SectionChunker {
    fn chunk(&self, text: &str, config: &ChunkingConfig) -> Vec<TextChunk> {
        let mut chunks = Vec::new();
        let sections = Self::sections(text);
        if sections.len() > 1 && token_spans(text).len() <= config.chunk_size {
            push_windows(text, 0..text.len(), None, config, &mut chunks);
            return chunks;
        }
        for (range, label) in sections {
            push_windows(text, range, label, config, &mut chunks);
        }
        chunks
    }
}

/// Token windows over the whole document, labelled as the full transcript.
pub struct WindowChunker;

impl WindowChunker {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WindowChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunker for WindowChunker {
    fn chunk(&self, text: &str, config: &ChunkingConfig) -> Vec<TextChunk> {
        let mut chunks = Vec::new();
        if !text.trim().is_empty() {
            push_windows(
                text,
                0..text.len(),
                Some(FULL_TRANSCRIPT_LABEL.to_string()),
                config,
                &mut chunks,
            );
        }
        chunks
    }
}

/// Append the windows of one section to `chunks`, continuing the index sequence.
fn push_windows(
    text: &str,
    section: Range<usize>,
    label: Option<String>,
    config: &ChunkingConfig,
    chunks: &mut Vec<TextChunk>,
) {
    let offset = section.start;
    let spans = token_spans(&text[section.clone()]);

    for window in token_windows(spans.len(), config) {
        let start = if window.start == 0 {
            section.start
        } else {
            offset + spans[window.start].start
        };
        let end = if window.end == spans.len() {
            section.end
        } else {
            offset + spans[window.end - 1].end
        };

        chunks.push(TextChunk {
            index: chunks.len(),
            content: text[start..end].to_string(),
            section_header: label.clone(),
            token_count: window.len(),
            start,
            end,
        });
    }
}
