//! Lexical representation of chunk text for keyword matching.
//!
//! Chunks store a space-separated list of normalized terms (`search_terms`)
//! computed at ingestion; queries go through the same normalization.

use regex::Regex;
use std::sync::OnceLock;

const STOPWORDS: &[&str] = &[
    "a", "about", "after", "all", "also", "am", "an", "and", "any", "are", "as", "at", "be",
    "been", "before", "being", "but", "by", "can", "could", "did", "do", "does", "doing", "for",
    "from", "had", "has", "have", "he", "her", "here", "him", "his", "how", "i", "if", "in",
    "into", "is", "it", "its", "just", "me", "more", "my", "no", "not", "of", "on", "or", "our",
    "out", "say", "said", "says", "she", "so", "some", "than", "that", "the", "their", "them",
    "then", "there", "these", "they", "this", "those", "to", "up", "us", "was", "we", "were",
    "what", "when", "where", "which", "while", "who", "why", "will", "with", "would", "you",
    "your",
];

fn term_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\p{L}\p{N}]+(?:['-][\p{L}\p{N}]+)*").expect("valid regex"))
}

/// Strip simple English plural endings so "egos" matches "ego".
fn stem(word: &str) -> String {
    let len = word.chars().count();
    if len > 4 && word.ends_with("ies") {
        return format!("{}y", &word[..word.len() - 3]);
    }
    if len > 3 && word.ends_with('s') && !word.ends_with("ss") && !word.ends_with("us") {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

/// Normalized terms of `text` in order of appearance, duplicates kept.
pub fn terms(text: &str) -> Vec<String> {
    term_regex()
        .find_iter(text)
        .map(|m| m.as_str().to_lowercase().replace('\'', ""))
        .filter(|w| !STOPWORDS.contains(&w.as_str()))
        .map(|w| stem(&w))
        .filter(|w| !w.is_empty())
        .collect()
}

/// Distinct query terms, first occurrence order.
pub fn query_terms(query: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for term in terms(query) {
        if !seen.contains(&term) {
            seen.push(term);
        }
    }
    seen
}

/// The stored lexical representation of a chunk.
pub fn index_terms(content: &str) -> String {
    terms(content).join(" ")
}

/// Parse a stored representation back into terms.
pub fn parse_index(search_terms: &str) -> Vec<String> {
    search_terms.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalization() {
        assert_eq!(
            terms("The Ego's games, and EGOS!"),
            vec!["ego", "game", "ego"]
        );
        assert_eq!(terms("Consciousness is process"), vec!["consciousness", "process"]);
        assert_eq!(terms("stories"), vec!["story"]);
    }

    #[test]
    fn test_query_terms_drop_stopwords_and_duplicates() {
        let q = query_terms("What did the session on 2026-02-08 say about ego? Ego.");
        assert_eq!(q, vec!["session", "2026-02-08", "ego"]);
    }

    #[test]
    fn test_index_round_trip() {
        let stored = index_terms("Non-duality and the ego");
        assert_eq!(stored, "non-duality ego");
        assert_eq!(parse_index(&stored), vec!["non-duality", "ego"]);
    }
}
