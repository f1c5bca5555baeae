//! Ranking policy shared by all store backends.
//!
//! A chunk is returned when its vector similarity clears the threshold OR
//! when it matches the query lexically. The combined score is the larger of
//! the two signals, so a strong keyword hit can outrank a weak embedding
//! match. This is a union, not a weighted average.

use super::lexical;
use super::RetrievedCandidate;
use std::cmp::Ordering;
use std::collections::HashMap;

/// BM25 term-frequency saturation.
const K1: f32 = 1.2;

/// A candidate together with the lexical terms of its chunk.
#[derive(Debug, Clone)]
pub struct ScoredRow {
    pub candidate: RetrievedCandidate,
    pub terms: Vec<String>,
}

/// Result order: score descending, then most recent session, then filename,
/// then chunk index ascending.
pub fn rank_order(a: &RetrievedCandidate, b: &RetrievedCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.session_date.cmp(&a.session_date))
        .then_with(|| a.filename.cmp(&b.filename))
        .then_with(|| a.chunk_index.cmp(&b.chunk_index))
}

/// Pure vector ranking: similarity >= threshold, top `limit`.
pub fn vector_rank(
    candidates: Vec<RetrievedCandidate>,
    threshold: f32,
    limit: usize,
) -> Vec<RetrievedCandidate> {
    let mut results: Vec<RetrievedCandidate> = candidates
        .into_iter()
        .map(|mut c| {
            c.lexical_score = None;
            c.score = c.vector_similarity;
            c
        })
        .filter(|c| c.vector_similarity >= threshold)
        .collect();

    results.sort_by(rank_order);
    results.truncate(limit);
    results
}

fn idf(total: usize, df: usize) -> f32 {
    let n = total as f32;
    let df = df as f32;
    (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
}

/// Lexical score of one chunk's term counts against weighted query terms.
/// Returns `None` when no query term occurs in the chunk.
fn lexical_score(counts: &HashMap<String, usize>, weighted: &[(String, f32)]) -> Option<f32> {
    let total_idf: f32 = weighted.iter().map(|(_, w)| w).sum();
    if total_idf <= 0.0 {
        return None;
    }

    let mut matched = false;
    let mut sum = 0.0;
    for (term, weight) in weighted {
        let tf = counts.get(term).copied().unwrap_or(0);
        if tf > 0 {
            matched = true;
            let tf = tf as f32;
            sum += weight * tf / (tf + K1);
        }
    }

    matched.then_some(sum / total_idf)
}

/// Hybrid ranking over every stored chunk.
///
/// Document frequencies are taken over all `rows`, so callers must pass the
/// whole corpus rather than a pre-filtered subset.
pub fn hybrid_rank(
    rows: Vec<ScoredRow>,
    query_text: &str,
    threshold: f32,
    limit: usize,
) -> Vec<RetrievedCandidate> {
    let query = lexical::query_terms(query_text);
    if query.is_empty() {
        return vector_rank(rows.into_iter().map(|r| r.candidate).collect(), threshold, limit);
    }

    let counts: Vec<HashMap<String, usize>> = rows
        .iter()
        .map(|row| {
            let mut counts = HashMap::new();
            for term in &row.terms {
                *counts.entry(term.clone()).or_insert(0) += 1;
            }
            counts
        })
        .collect();

    let weighted: Vec<(String, f32)> = query
        .into_iter()
        .map(|term| {
            let df = counts.iter().filter(|c| c.contains_key(&term)).count();
            let weight = idf(rows.len(), df);
            (term, weight)
        })
        .collect();

    let mut results: Vec<RetrievedCandidate> = rows
        .into_iter()
        .zip(counts)
        .filter_map(|(row, counts)| {
            let mut candidate = row.candidate;
            let lexical = lexical_score(&counts, &weighted);
            candidate.lexical_score = lexical;
            candidate.score = match lexical {
                Some(l) => candidate.vector_similarity.max(l),
                None => candidate.vector_similarity,
            };
            (candidate.vector_similarity >= threshold || lexical.is_some()).then_some(candidate)
        })
        .collect();

    results.sort_by(rank_order);
    results.truncate(limit);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use quickcheck_macros::quickcheck;

    fn row(filename: &str, date: &str, index: usize, similarity: f32, content: &str) -> ScoredRow {
        ScoredRow {
            candidate: RetrievedCandidate {
                chunk_id: index as i64,
                transcript_id: 1,
                filename: filename.to_string(),
                session_date: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
                title: filename.to_string(),
                section_header: None,
                chunk_index: index,
                content: content.to_string(),
                token_count: 10,
                vector_similarity: similarity,
                lexical_score: None,
                score: similarity,
            },
            terms: lexical::terms(content),
        }
    }

    #[test]
    fn test_vector_rank_threshold_and_limit() {
        let rows = vec![
            row("a.md", "2026-01-01", 0, 0.9, ""),
            row("a.md", "2026-01-01", 1, 0.2, ""),
            row("a.md", "2026-01-01", 2, 0.5, ""),
        ];
        let results = vector_rank(rows.into_iter().map(|r| r.candidate).collect(), 0.3, 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_index, 0);
    }

    #[test]
    fn test_lexical_match_rescues_below_threshold() {
        let rows = vec![
            row("a.md", "2026-02-08", 0, 0.25, "The ego resists being seen."),
            row("b.md", "2026-01-10", 0, 0.28, "Breathing and the body."),
        ];
        let results = hybrid_rank(rows, "what about ego", 0.30, 8);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].filename, "a.md");
        assert!(results[0].has_lexical_match());
        assert!(results[0].score >= results[0].vector_similarity);
    }

    #[test]
    fn test_combined_score_is_max() {
        let rows = vec![
            row("a.md", "2026-02-08", 0, 0.95, "ego"),
            row("a.md", "2026-02-08", 1, 0.10, "nothing relevant"),
        ];
        let results = hybrid_rank(rows, "ego", 0.3, 5);
        assert_eq!(results.len(), 1);
        assert!((results[0].score - 0.95).abs() < 1e-6);
        let lexical = results[0].lexical_score.unwrap();
        assert!(lexical > 0.0 && lexical < 1.0);
    }

    #[test]
    fn test_no_query_terms_falls_back_to_vector() {
        let rows = vec![row("a.md", "2026-02-08", 0, 0.1, "the and of")];
        assert!(hybrid_rank(rows, "the of and", 0.3, 5).is_empty());
    }

    #[test]
    fn test_tie_break_order() {
        let rows = vec![
            row("old.md", "2025-01-01", 0, 0.5, ""),
            row("new.md", "2026-01-01", 3, 0.5, ""),
            row("new.md", "2026-01-01", 1, 0.5, ""),
            row("best.md", "2024-01-01", 7, 0.8, ""),
        ];
        let results = vector_rank(rows.into_iter().map(|r| r.candidate).collect(), 0.0, 10);
        let order: Vec<(&str, usize)> = results
            .iter()
            .map(|r| (r.filename.as_str(), r.chunk_index))
            .collect();
        assert_eq!(
            order,
            vec![("best.md", 7), ("new.md", 1), ("new.md", 3), ("old.md", 0)]
        );
    }

    #[test]
    fn test_repeated_terms_score_higher() {
        let rows = vec![
            row("a.md", "2026-01-01", 0, 0.0, "ego"),
            row("a.md", "2026-01-01", 1, 0.0, "ego ego ego"),
            row("a.md", "2026-01-01", 2, 0.0, "silence"),
        ];
        let results = hybrid_rank(rows, "ego", 0.5, 5);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk_index, 1);
    }

    #[test]
    fn test_rare_terms_weigh_more_than_common_ones() {
        // "ego" occurs in every chunk, "satsang" in one.
        let rows = vec![
            row("a.md", "2026-01-01", 0, 0.0, "ego satsang"),
            row("a.md", "2026-01-01", 1, 0.0, "ego ego"),
            row("a.md", "2026-01-01", 2, 0.0, "ego rests"),
        ];
        let results = hybrid_rank(rows, "ego satsang", 0.5, 5);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].chunk_index, 0);
        assert!(results.iter().all(|r| r.score < 1.0));
    }

    #[test]
    fn test_nan_scores_have_a_total_order() {
        let mut candidates: Vec<RetrievedCandidate> = (0..40)
            .map(|i| {
                let sim = if i % 3 == 0 { f32::NAN } else { i as f32 / 40.0 };
                row("a.md", "2026-01-01", i, sim, "").candidate
            })
            .map(|mut c| {
                c.score = c.vector_similarity;
                c
            })
            .collect();
        candidates.sort_by(rank_order);
        let finite: Vec<f32> = candidates.iter().map(|c| c.score).filter(|s| !s.is_nan()).collect();
        assert!(finite.windows(2).all(|w| w[0] >= w[1]));
    }

    /// Every returned candidate clears the threshold or matched lexically,
    /// and results are sorted by descending score.
    #[quickcheck]
    fn prop_inclusion_and_order(entries: Vec<(u8, bool)>, threshold: u8) -> bool {
        let threshold = threshold as f32 / 255.0;
        let rows: Vec<ScoredRow> = entries
            .iter()
            .enumerate()
            .map(|(i, (sim, keyword))| {
                let content = if *keyword { "ego teaching" } else { "quiet morning" };
                row("t.md", "2026-01-01", i, *sim as f32 / 255.0, content)
            })
            .collect();

        let results = hybrid_rank(rows, "ego", threshold, entries.len().max(1));
        let included = results
            .iter()
            .all(|r| r.vector_similarity >= threshold || r.has_lexical_match());
        let sorted = results.windows(2).all(|w| w[0].score >= w[1].score);
        let complete = results.len()
            == entries
                .iter()
                .filter(|(sim, kw)| *kw || *sim as f32 / 255.0 >= threshold)
                .count();
        included && sorted && complete
    }
}
