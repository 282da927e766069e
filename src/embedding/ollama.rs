//! Ollama embeddings (`POST /api/embed`).
//!
//! Requires Ollama to be running with an embedding model pulled
//! (e.g. `ollama pull nomic-embed-text`).

use async_trait::async_trait;
use serde_json::{json, Value};

use vectors_connector_core::embedding::EmbeddingProvider;
use vectors_connector_core::ConnectorError;

use crate::config::EmbeddingConfig;
use crate::http::{base_url, parse_vector, probe, HttpSession};

use super::{check_count, model_or, send_with_retry};

const DEFAULT_URL: &str = "http://localhost:11434";

pub struct OllamaProvider {
    session: HttpSession,
    url: String,
    model: String,
    dims: Option<usize>,
    max_retries: u32,
}

impl OllamaProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, ConnectorError> {
        Ok(Self {
            session: HttpSession::new("ollama", config.timeout_secs),
            url: base_url(config.url.as_deref().unwrap_or(DEFAULT_URL)),
            model: model_or(config, Some("nomic-embed-text"))?,
            dims: config.dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    fn service(&self) -> &str {
        "ollama"
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

    async fn is_valid(&self) -> bool {
        match self.session.client() {
            Ok(client) => probe(client.get(format!("{}/api/tags", self.url))).await,
            Err(_) => false,
        }
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ConnectorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let client = self.session.client()?;
        let url = format!("{}/api/embed", self.url);
        let body = json!({
            "model": self.model,
            "input": texts,
        });

        let response =
            send_with_retry("ollama", self.max_retries, || client.post(&url).json(&body)).await?;
        let vectors = parse_ollama_response(&response).ok_or_else(|| {
            ConnectorError::AiService(
                "ollama: invalid response: missing embeddings array".to_string(),
            )
        })?;
        check_count("ollama", texts.len(), vectors)
    }
}

fn parse_ollama_response(json: &Value) -> Option<Vec<Vec<f32>>> {
    json.get("embeddings")?
        .as_array()?
        .iter()
        .map(parse_vector)
        .collect()
}
