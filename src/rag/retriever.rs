//! Query-time retrieval over stored chunks.

use crate::embedding::Embedder;
use crate::error::{Result, WiseoneError};
use crate::store::{RetrievedCandidate, TranscriptStore};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Embeds a query and runs a thresholded top-K search.
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn TranscriptStore>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
    threshold: f32,
    hybrid: bool,
}

impl Retriever {
    /// Create a retriever with top 5, threshold 0.30 and hybrid search.
    pub fn new(store: Arc<dyn TranscriptStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            store,
            embedder,
            top_k: 5,
            threshold: 0.30,
            hybrid: true,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Enable or disable the lexical half of the search.
    pub fn with_hybrid(mut self, hybrid: bool) -> Self {
        self.hybrid = hybrid;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(WiseoneError::Retrieval(format!(
                "Similarity threshold {} is outside [0, 1]",
                self.threshold
            )));
        }
        if self.top_k == 0 {
            return Err(WiseoneError::Retrieval(
                "Result count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Embed `embed_text` and search. `query_text`, when given, drives the
    /// lexical match.
    #[instrument(skip(self, embed_text, query_text))]
    pub async fn retrieve(
        &self,
        embed_text: &str,
        query_text: Option<&str>,
    ) -> Result<Vec<RetrievedCandidate>> {
        self.validate()?;
        let embedding = self.embedder.embed(embed_text).await?;
        self.search(&embedding, query_text).await
    }

    /// Search with an existing query vector.
    pub async fn search(
        &self,
        query_embedding: &[f32],
        query_text: Option<&str>,
    ) -> Result<Vec<RetrievedCandidate>> {
        self.validate()?;

        let results = match query_text.filter(|_| self.hybrid) {
            Some(text) => {
                self.store
                    .hybrid_search(query_embedding, text, self.threshold, self.top_k)
                    .await
            }
            None => {
                self.store
                    .vector_search(query_embedding, self.threshold, self.top_k)
                    .await
            }
        }
        .map_err(|e| match e {
            WiseoneError::Retrieval(_) => e,
            other => WiseoneError::Retrieval(other.to_string()),
        })?;

        debug!(
            "Top scores: {:?}",
            results.iter().map(|r| r.score).collect::<Vec<_>>()
        );
        info!(
            "Retrieved {} candidates (threshold {:.2}, k {})",
            results.len(),
            self.threshold,
            self.top_k
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, NewChunk};
    use crate::test_support::{unit_at, StaticEmbedder};
    use crate::transcript::Transcript;
    use chrono::NaiveDate;

    const QUESTION: &str = "What did the session on 2026-02-08 say about ego?";

    fn chunk(index: usize, content: &str, similarity: f32) -> NewChunk {
        NewChunk {
            index,
            content: content.to_string(),
            section_header: None,
            token_count: content.split_whitespace().count(),
            embedding: unit_at(similarity),
        }
    }

    async fn corpus() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let day = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();

        store
            .upsert_transcript(
                &Transcript::new("2026-02-08-ego.md", day(2026, 2, 8), "Ego", ""),
                &[
                    chunk(0, "The ego wants to be special.", 0.25),
                    chunk(1, "Seeing through the ego brings relief.", 0.55),
                ],
            )
            .await
            .unwrap();
        store
            .upsert_transcript(
                &Transcript::new("2026-01-10-breath.md", day(2026, 1, 10), "Breath", ""),
                &[chunk(0, "Attention rests on breathing.", 0.28)],
            )
            .await
            .unwrap();
        store
            .upsert_transcript(
                &Transcript::new("2026-03-01-silence.md", day(2026, 3, 1), "Silence", ""),
                &[chunk(0, "Stillness underneath thought.", 0.10)],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_keyword_rescues_chunk_below_threshold() {
        let retriever = Retriever::new(corpus().await, Arc::new(StaticEmbedder::new()))
            .with_top_k(8)
            .with_threshold(0.30);

        let results = retriever.retrieve(QUESTION, Some(QUESTION)).await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.filename == "2026-02-08-ego.md"));
        assert_eq!(results[0].chunk_index, 1);

        let rescued = &results[1];
        assert!(rescued.vector_similarity < 0.30);
        assert!(rescued.has_lexical_match());
    }

    #[tokio::test]
    async fn test_vector_only_drops_low_similarity() {
        let retriever = Retriever::new(corpus().await, Arc::new(StaticEmbedder::new()))
            .with_top_k(8)
            .with_hybrid(false);

        let results = retriever.retrieve(QUESTION, Some(QUESTION)).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].vector_similarity >= 0.30);
    }

    #[tokio::test]
    async fn test_every_result_clears_threshold_or_matches() {
        let retriever = Retriever::new(corpus().await, Arc::new(StaticEmbedder::new()))
            .with_top_k(10)
            .with_threshold(0.2);

        let results = retriever.retrieve("ego", Some("ego")).await.unwrap();
        assert!(results
            .iter()
            .all(|r| r.vector_similarity >= 0.2 || r.has_lexical_match()));
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        // The 0.10 chunk has neither.
        assert!(results.iter().all(|r| r.filename != "2026-03-01-silence.md"));
    }

    #[tokio::test]
    async fn test_malformed_queries_are_rejected() {
        let store = corpus().await;
        let embedder = Arc::new(StaticEmbedder::new());

        let bad_threshold = Retriever::new(store.clone(), embedder.clone()).with_threshold(1.5);
        assert!(matches!(
            bad_threshold.retrieve("ego", None).await,
            Err(WiseoneError::Retrieval(_))
        ));

        let zero_k = Retriever::new(store, embedder).with_top_k(0);
        assert!(matches!(
            zero_k.retrieve("ego", None).await,
            Err(WiseoneError::Retrieval(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_result_is_not_an_error() {
        let retriever = Retriever::new(Arc::new(MemoryStore::new()), Arc::new(StaticEmbedder::new()));
        assert!(retriever.retrieve("ego", Some("ego")).await.unwrap().is_empty());
    }
}
