//! Local inference through fastembed (feature `local-embeddings`).
//!
//! Models are downloaded from Hugging Face on first connect and cached.
//! After that no network calls are made.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use vectors_connector_core::embedding::EmbeddingProvider;
use vectors_connector_core::ConnectorError;

use crate::config::EmbeddingConfig;

pub struct LocalProvider {
    model_name: String,
    model: fastembed::EmbeddingModel,
    dims: usize,
    batch_size: usize,
    engine: Option<Arc<Mutex<fastembed::TextEmbedding>>>,
}

impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, ConnectorError> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
        let (model, default_dims) = resolve_model(&model_name)?;
        Ok(Self {
            model_name,
            model,
            dims: config.dims.unwrap_or(default_dims),
            batch_size: config.batch_size,
            engine: None,
        })
    }
}

fn resolve_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize), ConnectorError> {
    use fastembed::EmbeddingModel::*;
    let resolved = match name {
        "all-minilm-l6-v2" => (AllMiniLML6V2, 384),
        "bge-small-en-v1.5" => (BGESmallENV15, 384),
        "bge-base-en-v1.5" => (BGEBaseENV15, 768),
        "bge-large-en-v1.5" => (BGELargeENV15, 1024),
        "nomic-embed-text-v1" => (NomicEmbedTextV1, 768),
        "nomic-embed-text-v1.5" => (NomicEmbedTextV15, 768),
        "multilingual-e5-small" => (MultilingualE5Small, 384),
        "multilingual-e5-base" => (MultilingualE5Base, 768),
        "multilingual-e5-large" => (MultilingualE5Large, 1024),
        other => {
            return Err(ConnectorError::Configuration(format!(
                "unknown local embedding model '{}'",
                other
            )))
        }
    };
    Ok(resolved)
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn service(&self) -> &str {
        "local"
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> Option<usize> {
        Some(self.dims)
    }

    async fn connect(&mut self) -> Result<(), ConnectorError> {
        let model = self.model.clone();
        let engine = tokio::task::spawn_blocking(move || {
            fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(model).with_show_download_progress(true),
            )
        })
        .await
        .map_err(|e| ConnectorError::Connection(format!("local model loader panicked: {}", e)))?
        .map_err(|e| {
            ConnectorError::Connection(format!("failed to initialize local model: {}", e))
        })?;
        self.engine = Some(Arc::new(Mutex::new(engine)));
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.engine = None;
    }

    async fn is_valid(&self) -> bool {
        self.engine.is_some()
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ConnectorError> {
        let engine = self
            .engine
            .clone()
            .ok_or_else(|| ConnectorError::not_connected("local embedding model"))?;
        let texts = texts.to_vec();
        let batch_size = self.batch_size;

        tokio::task::spawn_blocking(move || {
            let mut engine = engine
                .lock()
                .map_err(|_| ConnectorError::AiService("local model lock poisoned".to_string()))?;
            engine
                .embed(texts, Some(batch_size))
                .map_err(|e| ConnectorError::AiService(format!("local embedding failed: {}", e)))
        })
        .await
        .map_err(|e| ConnectorError::AiService(format!("local embedding task failed: {}", e)))?
    }
}
