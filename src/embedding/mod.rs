//! Embedding service implementations and the registry that selects them.
//!
//! The [`EmbeddingProvider`] trait lives in `vectors-connector-core`; this
//! module provides the concrete services:
//!
//! | Discriminant | Type |
//! |--------------|------|
//! | `disabled` | [`DisabledProvider`] |
//! | `openai`, `azure_openai`, `mistral_ai` | [`OpenAiCompatibleProvider`] |
//! | `nomic` | [`NomicProvider`] |
//! | `hugging_face` | [`HuggingFaceProvider`] |
//! | `ollama` | [`OllamaProvider`] |
//! | `azure_ai_vision` | [`AzureVisionProvider`] (text and image) |
//! | `vertex_ai` | [`VertexAiProvider`] (image with multimodal models) |
//! | `local` | `LocalProvider` (fastembed, `local-embeddings` feature) |
//!
//! # Retry Strategy
//!
//! Network services retry transient errors with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

mod azure_vision;
mod huggingface;
#[cfg(feature = "local-embeddings")]
mod local;
mod nomic;
mod ollama;
mod openai;
mod vertex;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde_json::Value;
use tracing::warn;

use vectors_connector_core::embedding::EmbeddingProvider;
use vectors_connector_core::ConnectorError;

use crate::config::EmbeddingConfig;
use crate::http::{send_json, HttpFailure};

pub use azure_vision::AzureVisionProvider;
pub use huggingface::HuggingFaceProvider;
#[cfg(feature = "local-embeddings")]
pub use local::LocalProvider;
pub use nomic::NomicProvider;
pub use ollama::OllamaProvider;
pub use openai::{OpenAiCompatibleProvider, OpenAiFlavor};
pub use vertex::VertexAiProvider;

/// Builds a provider from configuration without any network I/O.
pub type ProviderConstructor =
    fn(&EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>, ConnectorError>;

/// Maps service discriminants to provider constructors.
///
/// ```rust
/// use vectors_connector::config::EmbeddingConfig;
/// use vectors_connector::embedding::EmbeddingRegistry;
///
/// let registry = EmbeddingRegistry::with_builtins();
/// let provider = registry.create(&EmbeddingConfig::default()).unwrap();
/// assert_eq!(provider.service(), "disabled");
///
/// let err = registry.create(&EmbeddingConfig::new("einstein")).err().unwrap();
/// assert!(err.is_configuration());
/// ```
pub struct EmbeddingRegistry {
    constructors: BTreeMap<String, ProviderConstructor>,
}

impl EmbeddingRegistry {
    pub fn new() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Registry with every built-in service registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("disabled", disabled);
        registry.register("openai", openai);
        registry.register("azure_openai", azure_openai);
        registry.register("mistral_ai", mistral_ai);
        registry.register("nomic", nomic);
        registry.register("hugging_face", hugging_face);
        registry.register("ollama", ollama);
        registry.register("azure_ai_vision", azure_ai_vision);
        registry.register("vertex_ai", vertex_ai);
        registry.register("local", local);
        registry
    }

    /// Register (or replace) the constructor for `service`.
    pub fn register(&mut self, service: impl Into<String>, constructor: ProviderConstructor) {
        self.constructors.insert(service.into(), constructor);
    }

    /// Instantiate the provider named by `config.service`.
    ///
    /// # Errors
    ///
    /// `UnsupportedService` when the discriminant is unknown; whatever the
    /// constructor reports (missing model, url, credential) otherwise.
    pub fn create(
        &self,
        config: &EmbeddingConfig,
    ) -> Result<Box<dyn EmbeddingProvider>, ConnectorError> {
        let constructor = self
            .constructors
            .get(config.service.as_str())
            .ok_or_else(|| ConnectorError::unsupported_service(&config.service))?;
        constructor(config)
    }

    pub fn contains(&self, service: &str) -> bool {
        self.constructors.contains_key(service)
    }

    /// Registered discriminants in sorted order.
    pub fn services(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }
}

impl Default for EmbeddingRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

type Boxed = Result<Box<dyn EmbeddingProvider>, ConnectorError>;

fn disabled(_: &EmbeddingConfig) -> Boxed {
    Ok(Box::new(DisabledProvider))
}

fn openai(config: &EmbeddingConfig) -> Boxed {
    Ok(Box::new(OpenAiCompatibleProvider::new(OpenAiFlavor::OpenAi, config)?))
}

fn azure_openai(config: &EmbeddingConfig) -> Boxed {
    Ok(Box::new(OpenAiCompatibleProvider::new(OpenAiFlavor::AzureOpenAi, config)?))
}

fn mistral_ai(config: &EmbeddingConfig) -> Boxed {
    Ok(Box::new(OpenAiCompatibleProvider::new(OpenAiFlavor::MistralAi, config)?))
}

fn nomic(config: &EmbeddingConfig) -> Boxed {
    Ok(Box::new(NomicProvider::new(config)?))
}

fn hugging_face(config: &EmbeddingConfig) -> Boxed {
    Ok(Box::new(HuggingFaceProvider::new(config)?))
}

fn ollama(config: &EmbeddingConfig) -> Boxed {
    Ok(Box::new(OllamaProvider::new(config)?))
}

fn azure_ai_vision(config: &EmbeddingConfig) -> Boxed {
    Ok(Box::new(AzureVisionProvider::new(config)?))
}

fn vertex_ai(config: &EmbeddingConfig) -> Boxed {
    Ok(Box::new(VertexAiProvider::new(config)?))
}

#[cfg(feature = "local-embeddings")]
fn local(config: &EmbeddingConfig) -> Boxed {
    Ok(Box::new(LocalProvider::new(config)?))
}

#[cfg(not(feature = "local-embeddings"))]
fn local(_: &EmbeddingConfig) -> Boxed {
    Err(ConnectorError::Configuration(
        "local embedding service requires --features local-embeddings".to_string(),
    ))
}

/// Create the provider for `config` from the built-in registry.
pub fn create_provider(
    config: &EmbeddingConfig,
) -> Result<Box<dyn EmbeddingProvider>, ConnectorError> {
    EmbeddingRegistry::with_builtins().create(config)
}

// ============ Disabled Provider ============

/// A no-op provider used when `embedding.service = "disabled"`.
///
/// Connecting succeeds so list and remove operations still work; any
/// attempt to embed fails.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn service(&self) -> &str {
        "disabled"
    }
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> Option<usize> {
        None
    }
    async fn connect(&mut self) -> Result<(), ConnectorError> {
        Ok(())
    }
    async fn disconnect(&mut self) {}
    async fn is_valid(&self) -> bool {
        false
    }
    async fn embed_texts(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ConnectorError> {
        Err(ConnectorError::Configuration(
            "embedding service is disabled".to_string(),
        ))
    }
}

// ============ Shared helpers ============

pub(crate) fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1 << (attempt - 1).min(5))
}

/// Send the request produced by `build` until it succeeds, a
/// non-retryable error occurs, or `max_retries` retries are spent.
pub(crate) async fn send_with_retry<F>(
    service: &str,
    max_retries: u32,
    build: F,
) -> Result<Value, ConnectorError>
where
    F: Fn() -> RequestBuilder,
{
    let mut last_err: Option<HttpFailure> = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            tokio::time::sleep(backoff(attempt)).await;
        }
        match send_json(build()).await {
            Ok(json) => return Ok(json),
            Err(failure) if failure.is_retryable() => {
                warn!(
                    service,
                    attempt = attempt + 1,
                    status = failure.status,
                    "Embedding request failed, retrying"
                );
                last_err = Some(failure);
            }
            Err(failure) => return Err(failure.into_ai_service(service)),
        }
    }

    Err(match last_err {
        Some(failure) => failure.into_ai_service(service),
        None => ConnectorError::AiService(format!("{}: embedding failed after retries", service)),
    })
}

/// Require `model`, falling back to `default` when given.
pub(crate) fn model_or(
    config: &EmbeddingConfig,
    default: Option<&str>,
) -> Result<String, ConnectorError> {
    config
        .model
        .clone()
        .or_else(|| default.map(str::to_string))
        .ok_or_else(|| {
            ConnectorError::Configuration(format!(
                "embedding.model required for {} service",
                config.service
            ))
        })
}

pub(crate) fn require_api_key(config: &EmbeddingConfig) -> Result<String, ConnectorError> {
    config.resolved_api_key().ok_or_else(|| {
        ConnectorError::Configuration(format!(
            "no API key configured for {} service",
            config.service
        ))
    })
}

pub(crate) fn require_url(config: &EmbeddingConfig) -> Result<String, ConnectorError> {
    config
        .url
        .as_deref()
        .map(crate::http::base_url)
        .ok_or_else(|| {
            ConnectorError::Configuration(format!(
                "embedding.url required for {} service",
                config.service
            ))
        })
}

/// Fail when a service answered with a different number of vectors than
/// it was sent texts.
pub(crate) fn check_count(
    service: &str,
    expected: usize,
    vectors: Vec<Vec<f32>>,
) -> Result<Vec<Vec<f32>>, ConnectorError> {
    if vectors.len() != expected {
        return Err(ConnectorError::AiService(format!(
            "{}: expected {} embeddings, got {}",
            service,
            expected,
            vectors.len()
        )));
    }
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_registered() {
        let registry = EmbeddingRegistry::with_builtins();
        for service in [
            "disabled",
            "openai",
            "azure_openai",
            "mistral_ai",
            "nomic",
            "hugging_face",
            "ollama",
            "azure_ai_vision",
            "vertex_ai",
            "local",
        ] {
            assert!(registry.contains(service), "{} missing", service);
        }
        assert_eq!(registry.len(), 10);
    }

    #[test]
    fn test_unknown_service_is_unsupported() {
        let err = create_provider(&EmbeddingConfig::new("einstein")).err().unwrap();
        assert_eq!(
            err.to_string(),
            "embedding model service \"einstein\" is not supported"
        );
    }

    #[test]
    fn test_custom_registration() {
        let mut registry = EmbeddingRegistry::new();
        assert!(registry.is_empty());
        registry.register("mine", disabled);
        assert!(registry.create(&EmbeddingConfig::new("mine")).is_ok());
        assert_eq!(registry.services(), vec!["mine"]);
    }

    #[tokio::test]
    async fn test_disabled_provider_refuses_to_embed() {
        let provider = create_provider(&EmbeddingConfig::default()).unwrap();
        assert!(provider.embed_texts(&["x".to_string()]).await.is_err());
    }

    #[test]
    fn test_backoff_caps() {
        assert_eq!(backoff(1), Duration::from_secs(1));
        assert_eq!(backoff(3), Duration::from_secs(4));
        assert_eq!(backoff(9), Duration::from_secs(32));
    }

    #[test]
    fn test_check_count() {
        assert!(check_count("s", 2, vec![vec![1.0]]).is_err());
        assert!(check_count("s", 1, vec![vec![1.0]]).is_ok());
    }
}
