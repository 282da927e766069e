//! Connection health report for the configured store and embedding service.

use serde::Serialize;

use vectors_connector_core::embedding::EmbeddingProvider;
use vectors_connector_core::store::VectorStore;

#[derive(Debug, Clone, Serialize)]
pub struct StoreHealth {
    pub backend: String,
    pub healthy: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingHealth {
    pub service: String,
    pub model: String,
    pub healthy: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub store: StoreHealth,
    pub embedding: EmbeddingHealth,
}

impl HealthReport {
    /// A disabled embedding service does not count against overall health.
    pub fn is_healthy(&self) -> bool {
        self.store.healthy && (self.embedding.healthy || self.embedding.service == "disabled")
    }
}

/// Probe both connections. Both must already be connected.
pub async fn check(store: &dyn VectorStore, provider: &dyn EmbeddingProvider) -> HealthReport {
    let (store_ok, embedding_ok) = tokio::join!(store.is_valid(), provider.is_valid());
    HealthReport {
        store: StoreHealth {
            backend: store.backend().to_string(),
            healthy: store_ok,
        },
        embedding: EmbeddingHealth {
            service: provider.service().to_string(),
            model: provider.model_name().to_string(),
            healthy: embedding_ok,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::DisabledProvider;
    use vectors_connector_core::store::memory::InMemoryStore;

    #[tokio::test]
    async fn test_disabled_embedding_is_not_unhealthy() {
        let mut store = InMemoryStore::new();
        let report = check(&store, &DisabledProvider).await;
        assert!(!report.store.healthy);
        assert!(!report.is_healthy());

        store.connect().await.unwrap();
        let report = check(&store, &DisabledProvider).await;
        assert!(report.store.healthy);
        assert!(!report.embedding.healthy);
        assert!(report.is_healthy());
    }
}
