//! Approximate tokenization.
//!
//! Word runs and single punctuation marks each count as one token, which
//! tracks BPE token counts closely enough for sizing chunks. Token spans
//! tile the input: span 0 starts at byte 0, each span runs up to the start
//! of the next token, and the last span runs to the end of the text.

use regex::Regex;
use std::ops::Range;
use std::sync::OnceLock;

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w+|[^\w\s]").expect("valid regex"))
}

/// Byte ranges of the tokens of `text`, covering it without gaps.
///
/// Whitespace before the first token belongs to the first span, whitespace
/// after a token belongs to that token. Text without tokens yields no spans.
pub fn token_spans(text: &str) -> Vec<Range<usize>> {
    let starts: Vec<usize> = token_re().find_iter(text).map(|m| m.start()).collect();

    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let from = if i == 0 { 0 } else { start };
            let to = starts.get(i + 1).copied().unwrap_or(text.len());
            from..to
        })
        .collect()
}

/// Approximate token count of `text`.
pub fn count_tokens(text: &str) -> usize {
    token_re().find_iter(text).count()
}
