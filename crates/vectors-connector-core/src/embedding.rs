//! Embedding provider trait and vector utilities.
//!
//! Defines the [`EmbeddingProvider`] trait that every AI service variant
//! implements, plus pure helpers for similarity computation.
//!
//! Concrete providers (OpenAI, Azure OpenAI, Mistral AI, Nomic, Hugging
//! Face, Ollama, Azure AI Vision, local fastembed) live in the
//! `vectors-connector` app crate.

use async_trait::async_trait;

use crate::error::ConnectorError;

/// Trait for embedding providers.
///
/// # Lifecycle
///
/// 1. Created by a registry from configuration (no network I/O).
/// 2. [`connect`](EmbeddingProvider::connect) builds the session.
/// 3. `embed_*` calls run against the session.
/// 4. [`disconnect`](EmbeddingProvider::disconnect) releases it; calling it
///    again, or without a prior `connect`, is a no-op.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Service discriminant (e.g. `"openai"`).
    fn service(&self) -> &str;

    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding dimensionality when known up front.
    fn dims(&self) -> Option<usize>;

    /// Whether [`embed_image`](EmbeddingProvider::embed_image) is available.
    fn supports_images(&self) -> bool {
        false
    }

    async fn connect(&mut self) -> Result<(), ConnectorError>;

    async fn disconnect(&mut self);

    /// Cheap, non-mutating health probe.
    async fn is_valid(&self) -> bool;

    /// Embed a batch of texts, one vector per input in input order.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ConnectorError>;

    async fn embed_image(&self, _image: &[u8]) -> Result<Vec<f32>, ConnectorError> {
        Err(ConnectorError::UnsupportedOperation(format!(
            "{} does not support image embeddings",
            self.service()
        )))
    }
}

/// Embed a single text.
///
/// Convenience wrapper around [`EmbeddingProvider::embed_texts`] for
/// single-text use cases such as embedding a query.
pub async fn embed_text(
    provider: &dyn EmbeddingProvider,
    text: &str,
) -> Result<Vec<f32>, ConnectorError> {
    provider
        .embed_texts(&[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ConnectorError::AiService("empty embedding response".to_string()))
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    #[async_trait]
    impl EmbeddingProvider for Fixed {
        fn service(&self) -> &str {
            "fixed"
        }
        fn model_name(&self) -> &str {
            "fixed-1"
        }
        fn dims(&self) -> Option<usize> {
            Some(2)
        }
        async fn connect(&mut self) -> Result<(), ConnectorError> {
            Ok(())
        }
        async fn disconnect(&mut self) {}
        async fn is_valid(&self) -> bool {
            true
        }
        async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ConnectorError> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    #[tokio::test]
    async fn test_embed_text_single() {
        let v = embed_text(&Fixed, "abc").await.unwrap();
        assert_eq!(v, vec![3.0, 1.0]);
    }

    #[tokio::test]
    async fn test_image_unsupported_by_default() {
        let err = Fixed.embed_image(&[1, 2, 3]).await.unwrap_err();
        assert!(matches!(err, ConnectorError::UnsupportedOperation(_)));
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_empty_or_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }
}
