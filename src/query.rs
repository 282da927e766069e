//! Similarity query and one-off embedding.
//!
//! A query embeds the question, asks the store for the closest segments,
//! and returns them together with their texts joined into one `response`:
//!
//! ```json
//! {
//!   "question": "...",
//!   "response": "segment one\n\nsegment two",
//!   "maxResults": 5,
//!   "minScore": 0.7,
//!   "sources": [ { "id": "...", "text": "...", "score": 0.83, "metadata": { ... } } ]
//! }
//! ```

use anyhow::{bail, Result};
use serde::Serialize;
use tracing::debug;

use vectors_connector_core::embedding::{embed_text, EmbeddingProvider};
use vectors_connector_core::models::{QueryMatch, VectorQuery};
use vectors_connector_core::store::VectorStore;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    pub question: String,
    pub response: String,
    pub max_results: usize,
    pub min_score: f32,
    pub sources: Vec<QueryMatch>,
}

pub async fn query_store(
    store: &dyn VectorStore,
    provider: &dyn EmbeddingProvider,
    store_name: &str,
    question: &str,
    max_results: usize,
    min_score: f32,
) -> Result<QueryResponse> {
    if question.trim().is_empty() {
        bail!("question must not be empty");
    }
    if max_results < 1 {
        bail!("max_results must be >= 1");
    }
    if !(0.0..=1.0).contains(&min_score) {
        bail!("min_score must be in [0.0, 1.0]");
    }

    let vector = embed_text(provider, question).await?;
    let query = VectorQuery {
        vector,
        max_results,
        min_score,
    };
    let sources = store.query(store_name, &query).await?;
    debug!(store = store_name, matches = sources.len(), "Query complete");

    let response = sources
        .iter()
        .map(|m| m.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    Ok(QueryResponse {
        question: question.to_string(),
        response,
        max_results,
        min_score,
        sources,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingResponse {
    pub service: String,
    pub model: String,
    pub dimensions: usize,
    pub embedding: Vec<f32>,
}

pub enum EmbedInput<'a> {
    Text(&'a str),
    Image(&'a [u8]),
}

/// Embed a single text or image and describe the result.
pub async fn embed_input(
    provider: &dyn EmbeddingProvider,
    input: EmbedInput<'_>,
) -> Result<EmbeddingResponse> {
    let embedding = match input {
        EmbedInput::Text(text) => embed_text(provider, text).await?,
        EmbedInput::Image(bytes) => provider.embed_image(bytes).await?,
    };
    Ok(EmbeddingResponse {
        service: provider.service().to_string(),
        model: provider.model_name().to_string(),
        dimensions: embedding.len(),
        embedding,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use vectors_connector_core::models::EmbeddedSegment;
    use vectors_connector_core::store::memory::InMemoryStore;
    use vectors_connector_core::ConnectorError;

    /// Maps "cats" and "dogs" onto orthogonal axes.
    struct AxisProvider;

    #[async_trait]
    impl EmbeddingProvider for AxisProvider {
        fn service(&self) -> &str {
            "axis"
        }
        fn model_name(&self) -> &str {
            "axis-1"
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
            Ok(texts
                .iter()
                .map(|t| {
                    if t.contains("cats") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }
    }

    fn segment(id: &str, text: &str, vector: Vec<f32>) -> EmbeddedSegment {
        EmbeddedSegment {
            id: id.to_string(),
            text: text.to_string(),
            vector,
            metadata: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_query_joins_matching_texts() {
        let mut store = InMemoryStore::new();
        store.connect().await.unwrap();
        store
            .upsert(
                "docs",
                &[
                    segment("1", "cats purr", vec![1.0, 0.0]),
                    segment("2", "cats nap", vec![0.9, 0.1]),
                    segment("3", "dogs bark", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let response = query_store(&store, &AxisProvider, "docs", "about cats", 5, 0.5)
            .await
            .unwrap();
        assert_eq!(response.sources.len(), 2);
        assert_eq!(response.response, "cats purr\n\ncats nap");

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["maxResults"], 5);
        assert_eq!(json["question"], "about cats");
    }

    #[tokio::test]
    async fn test_query_validates_arguments() {
        let mut store = InMemoryStore::new();
        store.connect().await.unwrap();
        assert!(query_store(&store, &AxisProvider, "docs", " ", 5, 0.5).await.is_err());
        assert!(query_store(&store, &AxisProvider, "docs", "q", 0, 0.5).await.is_err());
        assert!(query_store(&store, &AxisProvider, "docs", "q", 5, 1.5).await.is_err());
    }

    #[tokio::test]
    async fn test_embed_input() {
        let response = embed_input(&AxisProvider, EmbedInput::Text("cats"))
            .await
            .unwrap();
        assert_eq!(response.dimensions, 2);
        assert_eq!(response.model, "axis-1");

        let err = embed_input(&AxisProvider, EmbedInput::Image(&[1, 2, 3]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not support image embeddings"));
    }
}
