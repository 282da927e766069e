//! Hugging Face Inference API feature extraction.
//!
//! Sentence-transformer models answer with one vector per input. Plain
//! transformer models answer with one vector per token; those are
//! mean-pooled into a single vector.

use async_trait::async_trait;
use serde_json::{json, Value};

use vectors_connector_core::embedding::EmbeddingProvider;
use vectors_connector_core::ConnectorError;

use crate::config::EmbeddingConfig;
use crate::http::{base_url, parse_vector, HttpSession};

use super::{check_count, model_or, require_api_key, send_with_retry};

const DEFAULT_URL: &str = "https://api-inference.huggingface.co";

pub struct HuggingFaceProvider {
    session: HttpSession,
    url: String,
    model: String,
    dims: Option<usize>,
    max_retries: u32,
}

impl HuggingFaceProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, ConnectorError> {
        let api_key = require_api_key(config)?;
        Ok(Self {
            session: HttpSession::new("hugging_face", config.timeout_secs)
                .with_header("authorization", &format!("Bearer {}", api_key))?,
            url: base_url(config.url.as_deref().unwrap_or(DEFAULT_URL)),
            model: model_or(config, Some("sentence-transformers/all-MiniLM-L6-v2"))?,
            dims: config.dims,
            max_retries: config.max_retries,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for HuggingFaceProvider {
    fn service(&self) -> &str {
        "hugging_face"
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
        self.session.is_connected()
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ConnectorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let client = self.session.client()?;
        let url = format!("{}/pipeline/feature-extraction/{}", self.url, self.model);
        let body = json!({
            "inputs": texts,
            "options": { "wait_for_model": true },
        });

        let response =
            send_with_retry("hugging_face", self.max_retries, || client.post(&url).json(&body))
                .await?;
        let vectors = parse_feature_extraction(&response).ok_or_else(|| {
            ConnectorError::AiService(
                "hugging_face: unexpected feature-extraction response".to_string(),
            )
        })?;
        check_count("hugging_face", texts.len(), vectors)
    }
}

fn parse_feature_extraction(json: &Value) -> Option<Vec<Vec<f32>>> {
    json.as_array()?
        .iter()
        .map(|item| parse_vector(item).or_else(|| mean_pool(item)))
        .collect()
}

/// Average a `[tokens][dims]` matrix into one vector.
fn mean_pool(value: &Value) -> Option<Vec<f32>> {
    let rows: Vec<Vec<f32>> = value
        .as_array()?
        .iter()
        .map(parse_vector)
        .collect::<Option<_>>()?;
    let first = rows.first()?;
    let mut sum = vec![0.0f32; first.len()];
    for row in &rows {
        if row.len() != sum.len() {
            return None;
        }
        for (acc, x) in sum.iter_mut().zip(row) {
            *acc += x;
        }
    }
    let n = rows.len() as f32;
    Some(sum.into_iter().map(|x| x / n).collect())
}
