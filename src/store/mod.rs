//! Vector store backends and the registry that selects them.
//!
//! The [`VectorStore`] trait lives in `vectors-connector-core`. Each
//! backend here implements its native page fetch, upsert, query and delete;
//! listing sources runs the shared reconciler over that fetcher.
//!
//! | Discriminant | Type | Pagination |
//! |--------------|------|------------|
//! | `ai_search` | [`AiSearchStore`] | `$top`/`$skip` windows plus `@odata.nextLink` |
//! | `qdrant` | [`QdrantStore`] | scroll `next_page_offset` |
//! | `opensearch` | [`OpenSearchStore`] | scroll ids |
//! | `pgvector` | [`PgVectorStore`] | `LIMIT`/`OFFSET` |
//! | `memory` | [`InMemoryStore`] | in-process offsets |

mod ai_search;
mod opensearch;
mod pgvector;
mod qdrant;

use std::collections::BTreeMap;

use vectors_connector_core::store::VectorStore;
use vectors_connector_core::ConnectorError;

use crate::config::StoreConfig;

pub use ai_search::AiSearchStore;
pub use opensearch::OpenSearchStore;
pub use pgvector::PgVectorStore;
pub use qdrant::QdrantStore;
pub use vectors_connector_core::store::memory::InMemoryStore;

/// Builds a store from configuration without any network I/O.
pub type StoreConstructor = fn(&StoreConfig) -> Result<Box<dyn VectorStore>, ConnectorError>;

/// Maps backend discriminants to store constructors.
pub struct StoreRegistry {
    constructors: BTreeMap<String, StoreConstructor>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Registry with every built-in backend registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("ai_search", ai_search);
        registry.register("qdrant", qdrant);
        registry.register("opensearch", opensearch);
        registry.register("pgvector", pgvector);
        registry.register("memory", memory);
        registry
    }

    /// Register (or replace) the constructor for `backend`.
    pub fn register(&mut self, backend: impl Into<String>, constructor: StoreConstructor) {
        self.constructors.insert(backend.into(), constructor);
    }

    /// Instantiate the store named by `config.backend`.
    pub fn create(&self, config: &StoreConfig) -> Result<Box<dyn VectorStore>, ConnectorError> {
        let constructor = self
            .constructors
            .get(config.backend.as_str())
            .ok_or_else(|| ConnectorError::unsupported_store(&config.backend))?;
        constructor(config)
    }

    pub fn contains(&self, backend: &str) -> bool {
        self.constructors.contains_key(backend)
    }

    /// Registered discriminants in sorted order.
    pub fn backends(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

type Boxed = Result<Box<dyn VectorStore>, ConnectorError>;

fn ai_search(config: &StoreConfig) -> Boxed {
    Ok(Box::new(AiSearchStore::new(config)?))
}

fn qdrant(config: &StoreConfig) -> Boxed {
    Ok(Box::new(QdrantStore::new(config)?))
}

fn opensearch(config: &StoreConfig) -> Boxed {
    Ok(Box::new(OpenSearchStore::new(config)?))
}

fn pgvector(config: &StoreConfig) -> Boxed {
    Ok(Box::new(PgVectorStore::new(config)?))
}

fn memory(_: &StoreConfig) -> Boxed {
    Ok(Box::new(InMemoryStore::new()))
}

/// Create the store for `config` from the built-in registry.
pub fn create_store(config: &StoreConfig) -> Result<Box<dyn VectorStore>, ConnectorError> {
    StoreRegistry::with_builtins().create(config)
}

pub(crate) fn require_url(config: &StoreConfig) -> Result<String, ConnectorError> {
    config
        .url
        .as_deref()
        .map(crate::http::base_url)
        .ok_or_else(|| {
            ConnectorError::Configuration(format!(
                "store.url required for {} backend",
                config.backend
            ))
        })
}

/// Reject store names that cannot be embedded in a URL path or SQL
/// identifier.
pub(crate) fn check_store_name(store_name: &str) -> Result<(), ConnectorError> {
    let valid = !store_name.is_empty()
        && store_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ConnectorError::Configuration(format!(
            "invalid store name '{}': use letters, digits, '_' or '-'",
            store_name
        )))
    }
}
