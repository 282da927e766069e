//! OpenAI-compatible embeddings: OpenAI, Azure OpenAI and Mistral AI.
//!
//! All three accept `{"model", "input": [...]}` and answer with
//! `{"data": [{"index", "embedding"}]}`; they differ in URL layout and in
//! how the credential is carried.

use async_trait::async_trait;
use serde_json::{json, Value};

use vectors_connector_core::embedding::EmbeddingProvider;
use vectors_connector_core::ConnectorError;

use crate::config::EmbeddingConfig;
use crate::http::{base_url, parse_vector, probe, HttpSession};

use super::{check_count, model_or, require_api_key, require_url, send_with_retry};

const AZURE_API_VERSION: &str = "2024-02-01";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenAiFlavor {
    OpenAi,
    AzureOpenAi,
    MistralAi,
}

impl OpenAiFlavor {
    fn service(self) -> &'static str {
        match self {
            OpenAiFlavor::OpenAi => "openai",
            OpenAiFlavor::AzureOpenAi => "azure_openai",
            OpenAiFlavor::MistralAi => "mistral_ai",
        }
    }

    fn default_url(self) -> Option<&'static str> {
        match self {
            OpenAiFlavor::OpenAi => Some("https://api.openai.com/v1"),
            OpenAiFlavor::AzureOpenAi => None,
            OpenAiFlavor::MistralAi => Some("https://api.mistral.ai/v1"),
        }
    }

    fn default_model(self) -> Option<&'static str> {
        match self {
            OpenAiFlavor::OpenAi => Some("text-embedding-3-small"),
            // Azure addresses deployments, which have no universal default.
            OpenAiFlavor::AzureOpenAi => None,
            OpenAiFlavor::MistralAi => Some("mistral-embed"),
        }
    }
}

/// Embedding provider for OpenAI-style `embeddings` endpoints.
///
/// For Azure OpenAI, `embedding.model` names the deployment and
/// `embedding.url` is the resource endpoint
/// (`https://<resource>.openai.azure.com`).
pub struct OpenAiCompatibleProvider {
    flavor: OpenAiFlavor,
    session: HttpSession,
    url: String,
    model: String,
    dims: Option<usize>,
    api_version: String,
    max_retries: u32,
}

impl OpenAiCompatibleProvider {
    pub fn new(flavor: OpenAiFlavor, config: &EmbeddingConfig) -> Result<Self, ConnectorError> {
        let model = model_or(config, flavor.default_model())?;
        let url = match flavor.default_url() {
            Some(default) => base_url(config.url.as_deref().unwrap_or(default)),
            None => require_url(config)?,
        };
        let api_key = require_api_key(config)?;

        let session = HttpSession::new(flavor.service(), config.timeout_secs);
        let session = match flavor {
            OpenAiFlavor::AzureOpenAi => session.with_header("api-key", &api_key)?,
            _ => session.with_header("authorization", &format!("Bearer {}", api_key))?,
        };

        Ok(Self {
            flavor,
            session,
            url,
            model,
            dims: config.dims,
            api_version: config
                .api_version
                .clone()
                .unwrap_or_else(|| AZURE_API_VERSION.to_string()),
            max_retries: config.max_retries,
        })
    }

    fn embeddings_url(&self) -> String {
        match self.flavor {
            OpenAiFlavor::AzureOpenAi => format!(
                "{}/openai/deployments/{}/embeddings?api-version={}",
                self.url, self.model, self.api_version
            ),
            _ => format!("{}/embeddings", self.url),
        }
    }

    fn models_url(&self) -> String {
        match self.flavor {
            OpenAiFlavor::AzureOpenAi => format!(
                "{}/openai/models?api-version={}",
                self.url, self.api_version
            ),
            _ => format!("{}/models", self.url),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiCompatibleProvider {
    fn service(&self) -> &str {
        self.flavor.service()
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
            Ok(client) => probe(client.get(self.models_url())).await,
            Err(_) => false,
        }
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ConnectorError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let client = self.session.client()?;
        let url = self.embeddings_url();
        let body = json!({
            "model": self.model,
            "input": texts,
        });

        let response = send_with_retry(self.service(), self.max_retries, || {
            client.post(&url).json(&body)
        })
        .await?;

        let vectors = parse_embeddings_response(&response)
            .map_err(|e| ConnectorError::AiService(format!("{}: {}", self.service(), e)))?;
        check_count(self.service(), texts.len(), vectors)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
pub(crate) fn parse_embeddings_response(json: &Value) -> Result<Vec<Vec<f32>>, String> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or("invalid response: missing data array")?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let vector = item
            .get("embedding")
            .and_then(parse_vector)
            .ok_or("invalid response: missing embedding")?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map_or(position, |i| i as usize);
        indexed.push((index, vector));
    }
    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}
