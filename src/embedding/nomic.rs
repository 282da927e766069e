//! Nomic Atlas embeddings (`POST /v1/embedding/text`).

use async_trait::async_trait;
use serde_json::{json, Value};

use vectors_connector_core::embedding::EmbeddingProvider;
use vectors_connector_core::ConnectorError;

use crate::config::EmbeddingConfig;
use crate::http::{base_url, parse_vector, HttpSession};

use super::{check_count, model_or, require_api_key, send_with_retry};

const DEFAULT_URL: &str = "https://api-atlas.nomic.ai";

pub struct NomicProvider {
    session: HttpSession,
    url: String,
    model: String,
    dims: Option<usize>,
    max_retries: u32,
}

impl NomicProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, ConnectorError> {
        let api_key = require_api_key(config)?;
        Ok(Self {
            session: HttpSession::new("nomic", config.timeout_secs)
                .with_header("authorization", &format!("Bearer {}", api_key))?,
            url: base_url(config.url.as_deref().unwrap_or(DEFAULT_URL)),
            model: model_or(config, Some("nomic-embed-text-v1.5"))?,
            dims: config.dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for NomicProvider {
    fn service(&self) -> &str {
        "nomic"
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> Option<usize> {
        self.dims
    }

    async fn connect(&mut self) -> Result<(), ConnectorError> {
        self.session.connect()
    }

    async fn disconnect(&mut self) {
        self.session.disconnect();
    }

    // Atlas has no free read-only endpoint; a built client is the probe.
    async fn is_valid(&self) -> bool {
        self.session.is_connected()
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ConnectorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let client = self.session.client()?;
        let url = format!("{}/v1/embedding/text", self.url);
        let mut body = json!({
            "model": self.model,
            "texts": texts,
            "task_type": "search_document",
        });
        if let Some(dims) = self.dims {
            body["dimensionality"] = json!(dims);
        }

        let response =
            send_with_retry("nomic", self.max_retries, || client.post(&url).json(&body)).await?;
        let vectors = parse_nomic_response(&response).ok_or_else(|| {
            ConnectorError::AiService("nomic: invalid response: missing embeddings".to_string())
        })?;
        check_count("nomic", texts.len(), vectors)
    }
}

fn parse_nomic_response(json: &Value) -> Option<Vec<Vec<f32>>> {
    json.get("embeddings")?
        .as_array()?
        .iter()
        .map(parse_vector)
        .collect()
}
