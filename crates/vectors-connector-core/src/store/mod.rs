//! Vector store abstraction.
//!
//! The [`VectorStore`] trait is the single seam every backend (Azure AI
//! Search, Qdrant, OpenSearch, pgvector, in-memory) implements. It extends
//! [`PageFetcher`] so listing sources runs the same reconciliation engine
//! for every backend.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`connect`](VectorStore::connect) | Build the client session |
//! | [`disconnect`](VectorStore::disconnect) | Release it (idempotent) |
//! | [`is_valid`](VectorStore::is_valid) | Health probe |
//! | [`upsert`](VectorStore::upsert) | Write embedded segments |
//! | [`query`](VectorStore::query) | Similarity search |
//! | [`delete`](VectorStore::delete) | Remove segments by id or source |
//! | [`list_sources`](VectorStore::list_sources) | Reconcile segments into sources |

pub mod memory;

use async_trait::async_trait;

use crate::error::ConnectorError;
use crate::fetcher::PageFetcher;
use crate::models::{DeleteSelector, EmbeddedSegment, QueryMatch, VectorQuery};
use crate::reconcile::{reconcile, ReconcileOptions, ReconciliationOutcome};
use crate::source::{DefaultProjection, SourceProjection};

#[async_trait]
pub trait VectorStore: PageFetcher {
    /// Backend discriminant (e.g. `"ai_search"`).
    fn backend(&self) -> &str;

    async fn connect(&mut self) -> Result<(), ConnectorError>;

    async fn disconnect(&mut self);

    async fn is_valid(&self) -> bool;

    /// Insert or overwrite segments, returning their ids in input order.
    async fn upsert(
        &self,
        store_name: &str,
        segments: &[EmbeddedSegment],
    ) -> Result<Vec<String>, ConnectorError>;

    /// Similarity search, best match first.
    async fn query(
        &self,
        store_name: &str,
        query: &VectorQuery,
    ) -> Result<Vec<QueryMatch>, ConnectorError>;

    async fn delete(&self, store_name: &str, selector: &DeleteSelector)
        -> Result<(), ConnectorError>;

    /// How segment attributes are folded into sources for this backend.
    fn projection(&self) -> &dyn SourceProjection {
        &DefaultProjection
    }

    /// List the distinct sources stored in `store_name`.
    async fn list_sources(
        &self,
        store_name: &str,
        options: &ReconcileOptions,
    ) -> Result<ReconciliationOutcome, ConnectorError> {
        reconcile(self, self.projection(), store_name, options).await
    }
}
