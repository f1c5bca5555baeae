//! Context assembly for the generation stages.

use crate::conversation::Citation;
use crate::store::RetrievedCandidate;
use std::collections::HashSet;
use tracing::debug;

const ENTRY_SEPARATOR: &str = "\n\n---\n\n";

/// The context block handed to both generation stages.
#[derive(Debug, Clone, Default)]
pub struct AssembledContext {
    /// Formatted entries, one per citation, in citation order.
    pub text: String,
    pub citations: Vec<Citation>,
    /// Candidates dropped as near-duplicates.
    pub duplicates_skipped: usize,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.citations.is_empty()
    }
}

/// Selects ranked candidates into a budgeted, deduplicated context block.
#[derive(Debug, Clone)]
pub struct ContextAssembler {
    max_chars: usize,
    dedup_similarity: f32,
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(12_000)
    }
}

impl ContextAssembler {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars,
            dedup_similarity: 0.9,
        }
    }

    /// Word-set Jaccard similarity at which two chunks count as repeats.
    pub fn with_dedup_similarity(mut self, similarity: f32) -> Self {
        self.dedup_similarity = similarity;
        self
    }

    /// Walk `candidates` in rank order until the next entry would exceed
    /// the character budget. Entries are never truncated.
    pub fn assemble(&self, candidates: &[RetrievedCandidate]) -> AssembledContext {
        let mut context = AssembledContext::default();
        let mut used_chars = 0;
        let mut selected: Vec<Normalized> = Vec::new();

        for candidate in candidates {
            let normalized = Normalized::new(&candidate.content);
            if selected
                .iter()
                .any(|s| s.is_near_duplicate(&normalized, self.dedup_similarity))
            {
                context.duplicates_skipped += 1;
                continue;
            }

            let entry = format_entry(context.citations.len() + 1, candidate);
            let separator = if context.text.is_empty() { "" } else { ENTRY_SEPARATOR };
            let cost = separator.chars().count() + entry.chars().count();
            if used_chars + cost > self.max_chars {
                break;
            }

            context.text.push_str(separator);
            context.text.push_str(&entry);
            used_chars += cost;
            context.citations.push(citation_for(candidate));
            selected.push(normalized);
        }

        debug!(
            "Assembled {} sources ({} chars, {} duplicates skipped)",
            context.citations.len(),
            used_chars,
            context.duplicates_skipped
        );
        context
    }
}

fn citation_for(candidate: &RetrievedCandidate) -> Citation {
    Citation {
        filename: candidate.filename.clone(),
        title: candidate.title.clone(),
        session_date: candidate.session_date,
        chunk_index: candidate.chunk_index,
        section_header: candidate.section_header.clone(),
        similarity: candidate.score,
    }
}

fn format_entry(number: usize, candidate: &RetrievedCandidate) -> String {
    let section = candidate
        .section_header
        .as_ref()
        .map(|s| format!(" > {}", s))
        .unwrap_or_default();
    format!(
        "[Source {}: {} - {}{} (relevance: {:.0}%)]\n{}",
        number,
        candidate.session_date,
        candidate.title,
        section,
        candidate.score * 100.0,
        candidate.content.trim()
    )
}

/// Lowercased, whitespace-collapsed text plus its word set.
///
/// `text` is padded with a space on both ends so containment only matches
/// whole word sequences.
struct Normalized {
    text: String,
    words: HashSet<String>,
}

impl Normalized {
    fn new(content: &str) -> Self {
        let words: Vec<String> = content.split_whitespace().map(str::to_lowercase).collect();
        let text = if words.is_empty() {
            String::new()
        } else {
            format!(" {} ", words.join(" "))
        };
        Self {
            text,
            words: words.into_iter().collect(),
        }
    }

    fn is_near_duplicate(&self, other: &Normalized, threshold: f32) -> bool {
        if self.text.is_empty() || other.text.is_empty() {
            return self.text == other.text;
        }
        if self.text.contains(&other.text) || other.text.contains(&self.text) {
            return true;
        }
        let intersection = self.words.intersection(&other.words).count();
        let union = self.words.union(&other.words).count();
        union > 0 && intersection as f32 / union as f32 >= threshold
    }
}
