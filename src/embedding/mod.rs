//! Embedding generation for semantic search and retrieval.

mod openai;

pub use openai::OpenAIEmbedder;

use crate::error::{Result, WiseoneError};
use async_trait::async_trait;

/// Trait for embedding generation.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| WiseoneError::Embedding("Empty embedding response".to_string()))
    }

    /// Generate embeddings for multiple texts, one per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimensions.
    fn dimensions(&self) -> usize;
}

/// Reject a response that does not pair one vector of the expected size with each input.
pub fn check_embeddings(
    embeddings: &[Vec<f32>],
    expected_count: usize,
    dimensions: usize,
) -> Result<()> {
    if embeddings.len() != expected_count {
        return Err(WiseoneError::Embedding(format!(
            "Expected {} embeddings, got {}",
            expected_count,
            embeddings.len()
        )));
    }
    if let Some((i, bad)) = embeddings
        .iter()
        .enumerate()
        .find(|(_, e)| e.len() != dimensions)
    {
        return Err(WiseoneError::Embedding(format!(
            "Embedding {} has {} dimensions, expected {}",
            i,
            bad.len(),
            dimensions
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_embeddings() {
        let good = vec![vec![0.0; 3], vec![1.0; 3]];
        assert!(check_embeddings(&good, 2, 3).is_ok());
        assert!(check_embeddings(&good, 3, 3).is_err());

        let ragged = vec![vec![0.0; 3], vec![1.0; 2]];
        let err = check_embeddings(&ragged, 2, 3).unwrap_err();
        assert!(matches!(err, WiseoneError::Embedding(_)));
    }
}
