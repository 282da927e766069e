//! Azure AI Vision multimodal embeddings.
//!
//! Text and images are vectorised into the same space through
//! `computervision/retrieval:vectorizeText` and `:vectorizeImage`. The
//! service takes one input per request.

use async_trait::async_trait;
use serde_json::{json, Value};

use vectors_connector_core::embedding::EmbeddingProvider;
use vectors_connector_core::ConnectorError;

use crate::config::EmbeddingConfig;
use crate::http::{parse_vector, probe, HttpSession};

use super::{model_or, require_api_key, require_url, send_with_retry};

const API_VERSION: &str = "2024-02-01";
const DEFAULT_MODEL_VERSION: &str = "2023-04-15";
const DIMS: usize = 1024;

pub struct AzureVisionProvider {
    session: HttpSession,
    url: String,
    model: String,
    api_version: String,
    max_retries: u32,
}

impl AzureVisionProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, ConnectorError> {
        let api_key = require_api_key(config)?;
        Ok(Self {
            session: HttpSession::new("azure_ai_vision", config.timeout_secs)
                .with_header("ocp-apim-subscription-key", &api_key)?,
            url: require_url(config)?,
            model: model_or(config, Some(DEFAULT_MODEL_VERSION))?,
            api_version: config
                .api_version
                .clone()
                .unwrap_or_else(|| API_VERSION.to_string()),
            max_retries: config.max_retries,
        })
    }

    fn vectorize_url(&self, kind: &str) -> String {
        format!(
            "{}/computervision/retrieval:vectorize{}?api-version={}&model-version={}",
            self.url, kind, self.api_version, self.model
        )
    }
}

#[async_trait]
impl EmbeddingProvider for AzureVisionProvider {
    fn service(&self) -> &str {
        "azure_ai_vision"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> Option<usize> {
        Some(DIMS)
    }

    fn supports_images(&self) -> bool {
        true
    }

    async fn connect(&mut self) -> Result<(), ConnectorError> {
        self.session.connect()
    }

    async fn disconnect(&mut self) {
        self.session.disconnect();
    }

    async fn is_valid(&self) -> bool {
        match self.session.client() {
            Ok(client) => {
                let url = format!(
                    "{}/computervision/models?api-version={}",
                    self.url, self.api_version
                );
                probe(client.get(url)).await
            }
            Err(_) => false,
        }
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ConnectorError> {
        let client = self.session.client()?;
        let url = self.vectorize_url("Text");
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            let body = json!({ "text": text });
            let response = send_with_retry(self.service(), self.max_retries, || {
                client.post(&url).json(&body)
            })
            .await?;
            vectors.push(parse_vectorize_response(&response)?);
        }
        Ok(vectors)
    }

    async fn embed_image(&self, image: &[u8]) -> Result<Vec<f32>, ConnectorError> {
        let client = self.session.client()?;
        let url = self.vectorize_url("Image");
        let response = send_with_retry(self.service(), self.max_retries, || {
            client
                .post(&url)
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(image.to_vec())
        })
        .await?;
        parse_vectorize_response(&response)
    }
}

fn parse_vectorize_response(json: &Value) -> Result<Vec<f32>, ConnectorError> {
    json.get("vector").and_then(parse_vector).ok_or_else(|| {
        ConnectorError::AiService("azure_ai_vision: invalid response: missing vector".to_string())
    })
}
