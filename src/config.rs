//! Configuration parsing and validation.
//!
//! The connector is configured with a TOML file (default
//! `config/vcx.toml`). Two independent axes are selected by discriminant:
//! the store backend (`[store].backend`) and the embedding service
//! (`[embedding].service`). Unknown discriminants are rejected by the
//! registries, not here, so they surface as "is not supported" errors.
//!
//! ```toml
//! [store]
//! backend = "ai_search"
//! url = "https://my-search.search.windows.net"
//! page_size = 1000
//!
//! [embedding]
//! service = "azure_openai"
//! url = "https://my-openai.openai.azure.com"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [ingest]
//! max_tokens = 500
//!
//! [query]
//! max_results = 5
//! min_score = 0.7
//! ```
//!
//! Credentials left out of the file are read from the environment
//! (see [`StoreConfig::resolved_api_key`] and
//! [`EmbeddingConfig::resolved_api_key`]).

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

use vectors_connector_core::metadata::{MissingIndexPolicy, INDEX_KEY};
use vectors_connector_core::reconcile::ReconcileOptions;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub query: QueryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub backend: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub missing_index: MissingIndexPolicy,
    /// Metadata attribute that carries the segment index. Ingestion writes
    /// it and listing reads it.
    #[serde(default = "default_index_key")]
    pub index_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_page_size() -> usize {
    1000
}
fn default_index_key() -> String {
    INDEX_KEY.to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_connections() -> u32 {
    5
}

impl StoreConfig {
    /// A config for `backend` with every optional field at its default.
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            url: None,
            api_key: None,
            user: None,
            password: None,
            api_version: None,
            page_size: default_page_size(),
            missing_index: MissingIndexPolicy::default(),
            index_key: default_index_key(),
            timeout_secs: default_timeout_secs(),
            max_connections: default_max_connections(),
        }
    }

    pub fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            page_size: self.page_size,
            missing_index: self.missing_index,
            index_key: self.index_key.clone(),
        }
    }

    /// `api_key`, or the backend's well-known environment variable.
    pub fn resolved_api_key(&self) -> Option<String> {
        let env_var = match self.backend.as_str() {
            "ai_search" => "AI_SEARCH_KEY",
            "qdrant" => "QDRANT_API_KEY",
            "opensearch" => "OPENSEARCH_API_KEY",
            _ => return self.api_key.clone(),
        };
        self.api_key.clone().or_else(|| non_empty_env(env_var))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_service")]
    pub service: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_version: Option<String>,
    /// Google Cloud project, used by `vertex_ai` only.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Google Cloud region, used by `vertex_ai` only.
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            service: default_service(),
            model: None,
            dims: None,
            url: None,
            api_key: None,
            api_version: None,
            project_id: None,
            location: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_service() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}

impl EmbeddingConfig {
    /// A config for `service` with every optional field at its default.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            ..Self::default()
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.service != "disabled"
    }

    /// `api_key`, or the service's well-known environment variable.
    pub fn resolved_api_key(&self) -> Option<String> {
        let env_var = match self.service.as_str() {
            "openai" => "OPENAI_API_KEY",
            "azure_openai" => "AZURE_OPENAI_KEY",
            "mistral_ai" => "MISTRAL_API_KEY",
            "nomic" => "NOMIC_API_KEY",
            "hugging_face" => "HUGGINGFACE_API_KEY",
            "azure_ai_vision" => "AZURE_AI_VISION_KEY",
            "vertex_ai" => "VERTEX_AI_ACCESS_TOKEN",
            _ => return self.api_key.clone(),
        };
        self.api_key.clone().or_else(|| non_empty_env(env_var))
    }
}

/// How ingested files are turned into text.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParserKind {
    /// Pick by file extension.
    #[default]
    Auto,
    Text,
    Pdf,
    Docx,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    #[serde(default)]
    pub parser: ParserKind,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            parser: ParserKind::Auto,
        }
    }
}

fn default_max_tokens() -> usize {
    500
}
fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.md".to_string(),
        "**/*.txt".to_string(),
        "**/*.pdf".to_string(),
        "**/*.docx".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_min_score")]
    pub min_score: f32,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            min_score: default_min_score(),
        }
    }
}

fn default_max_results() -> usize {
    5
}
fn default_min_score() -> f32 {
    0.7
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.store.backend.trim().is_empty() {
        bail!("store.backend must be specified");
    }
    if config.store.page_size == 0 {
        bail!("store.page_size must be > 0");
    }
    if config.store.index_key.trim().is_empty() {
        bail!("store.index_key must not be empty");
    }
    if config.ingest.max_tokens == 0 {
        bail!("ingest.max_tokens must be > 0");
    }
    if config.query.max_results < 1 {
        bail!("query.max_results must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.query.min_score) {
        bail!("query.min_score must be in [0.0, 1.0]");
    }
    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    if config.embedding.dims == Some(0) {
        bail!("embedding.dims must be > 0 when set");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_defaults() {
        let config = parse_config("[store]\nbackend = \"memory\"\n").unwrap();
        assert_eq!(config.store.page_size, 1000);
        assert_eq!(config.store.missing_index, MissingIndexPolicy::DefaultZero);
        assert_eq!(config.store.reconcile_options().index_key, "index");
        assert_eq!(config.embedding.service, "disabled");
        assert!(!config.embedding.is_enabled());
        assert_eq!(config.ingest.parser, ParserKind::Auto);
        assert_eq!(config.query.max_results, 5);
    }

    #[test]
    fn test_full_config() {
        let config = parse_config(
            r#"
            [store]
            backend = "ai_search"
            url = "https://search.example.net"
            api_key = "k"
            page_size = 50
            missing_index = "skip"

            [embedding]
            service = "openai"
            model = "text-embedding-3-small"
            dims = 1536

            [ingest]
            max_tokens = 200
            parser = "pdf"
            exclude_globs = ["**/drafts/**"]

            [query]
            max_results = 3
            min_score = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.store.reconcile_options().page_size, 50);
        assert_eq!(config.store.missing_index, MissingIndexPolicy::Skip);
        assert_eq!(config.store.resolved_api_key().as_deref(), Some("k"));
        assert_eq!(config.embedding.dims, Some(1536));
        assert_eq!(config.ingest.parser, ParserKind::Pdf);
        assert_eq!(config.query.min_score, 0.5);
    }

    #[test]
    fn test_rejects_zero_page_size() {
        let err = parse_config("[store]\nbackend = \"memory\"\npage_size = 0\n").unwrap_err();
        assert!(err.to_string().contains("page_size"));
    }

    #[test]
    fn test_index_key_reaches_reconcile_options() {
        let config = parse_config("[store]\nbackend = \"memory\"\nindex_key = \"chunk\"\n").unwrap();
        assert_eq!(config.store.reconcile_options().index_key, "chunk");

        let err = parse_config("[store]\nbackend = \"memory\"\nindex_key = \" \"\n").unwrap_err();
        assert!(err.to_string().contains("index_key"));
    }

    #[test]
    fn test_rejects_out_of_range_min_score() {
        let err = parse_config("[store]\nbackend = \"memory\"\n[query]\nmin_score = 1.5\n")
            .unwrap_err();
        assert!(err.to_string().contains("min_score"));
    }

    #[test]
    fn test_rejects_unknown_parser() {
        assert!(parse_config("[store]\nbackend = \"memory\"\n[ingest]\nparser = \"rtf\"\n").is_err());
    }

    #[test]
    fn test_unknown_backend_is_left_to_registry() {
        let config = parse_config("[store]\nbackend = \"milvus\"\n").unwrap();
        assert_eq!(config.store.backend, "milvus");
    }

    #[test]
    fn test_example_config_parses() {
        let config = parse_config(include_str!("../config/vcx.example.toml")).unwrap();
        assert_eq!(config.store.backend, "qdrant");
        assert_eq!(config.embedding.dims, Some(1536));
        assert_eq!(config.ingest.include_globs.len(), 4);
    }
}
