//! Vertex AI prediction endpoint embeddings.
//!
//! The credential is an OAuth access token (`gcloud auth
//! print-access-token`) sent as a bearer token. Text models
//! (`text-embedding-004`, ...) answer with `embeddings.values`; the
//! `multimodalembedding` family also embeds images sent as base64.

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};

use vectors_connector_core::embedding::EmbeddingProvider;
use vectors_connector_core::ConnectorError;

use crate::config::EmbeddingConfig;
use crate::http::{base_url, parse_vector, HttpSession};

use super::{check_count, model_or, require_api_key, send_with_retry};

const DEFAULT_LOCATION: &str = "us-central1";

pub struct VertexAiProvider {
    session: HttpSession,
    predict_url: String,
    model: String,
    dims: Option<usize>,
    max_retries: u32,
}

impl VertexAiProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, ConnectorError> {
        let token = require_api_key(config)?;
        let project = config.project_id.as_deref().ok_or_else(|| {
            ConnectorError::Configuration(
                "embedding.project_id required for vertex_ai service".to_string(),
            )
        })?;
        let location = config.location.as_deref().unwrap_or(DEFAULT_LOCATION);
        let model = model_or(config, Some("text-embedding-004"))?;
        let url = match config.url.as_deref() {
            Some(url) => base_url(url),
            None => format!("https://{}-aiplatform.googleapis.com", location),
        };
        let predict_url = format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:predict",
            url, project, location, model
        );

        Ok(Self {
            session: HttpSession::new("vertex_ai", config.timeout_secs)
                .with_header("authorization", &format!("Bearer {}", token))?,
            predict_url,
            model,
            dims: config.dims,
            max_retries: config.max_retries,
        })
    }

    fn is_multimodal(&self) -> bool {
        self.model.starts_with("multimodalembedding")
    }

    async fn predict(&self, instances: Vec<Value>) -> Result<Vec<Value>, ConnectorError> {
        let client = self.session.client()?;
        let body = json!({ "instances": instances });
        let response = send_with_retry("vertex_ai", self.max_retries, || {
            client.post(&self.predict_url).json(&body)
        })
        .await?;
        response
            .get("predictions")
            .and_then(|p| p.as_array())
            .cloned()
            .ok_or_else(|| {
                ConnectorError::AiService(
                    "vertex_ai: invalid response: missing predictions".to_string(),
                )
            })
    }
}

#[async_trait]
impl EmbeddingProvider for VertexAiProvider {
    fn service(&self) -> &str {
        "vertex_ai"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> Option<usize> {
        self.dims
    }

    fn supports_images(&self) -> bool {
        self.is_multimodal()
    }

    async fn connect(&mut self) -> Result<(), ConnectorError> {
        self.session.connect()
    }

    async fn disconnect(&mut self) {
        self.session.disconnect();
    }

    async fn is_valid(&self) -> bool {
        self.session.is_connected()
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ConnectorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let multimodal = self.is_multimodal();
        let instances = texts
            .iter()
            .map(|t| {
                if multimodal {
                    json!({ "text": t })
                } else {
                    json!({ "content": t })
                }
            })
            .collect();
        let predictions = self.predict(instances).await?;
        let vectors = predictions
            .iter()
            .map(|p| text_vector(p, multimodal))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                ConnectorError::AiService(
                    "vertex_ai: invalid response: missing embedding values".to_string(),
                )
            })?;
        check_count("vertex_ai", texts.len(), vectors)
    }

    async fn embed_image(&self, image: &[u8]) -> Result<Vec<f32>, ConnectorError> {
        if !self.is_multimodal() {
            return Err(ConnectorError::UnsupportedOperation(format!(
                "vertex_ai model {} does not support image embeddings",
                self.model
            )));
        }
        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let predictions = self
            .predict(vec![json!({ "image": { "bytesBase64Encoded": encoded } })])
            .await?;
        predictions
            .first()
            .and_then(|p| p.get("imageEmbedding"))
            .and_then(parse_vector)
            .ok_or_else(|| {
                ConnectorError::AiService(
                    "vertex_ai: invalid response: missing imageEmbedding".to_string(),
                )
            })
    }
}

fn text_vector(prediction: &Value, multimodal: bool) -> Option<Vec<f32>> {
    if multimodal {
        prediction.get("textEmbedding").and_then(parse_vector)
    } else {
        prediction
            .get("embeddings")
            .and_then(|e| e.get("values"))
            .and_then(parse_vector)
    }
}
