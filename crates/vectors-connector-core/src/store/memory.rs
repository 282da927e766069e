//! In-memory [`VectorStore`] implementation for tests and local runs.
//!
//! Collections are kept in insertion order behind `std::sync::RwLock`.
//! Query is brute-force cosine similarity. Listing pages by offset without
//! next-links. Every operation fails with a connection error until
//! [`VectorStore::connect`] has been called.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::error::ConnectorError;
use crate::fetcher::{BackendPage, PageFetcher};
use crate::models::{
    DeleteSelector, EmbeddedSegment, MetadataAttribute, QueryMatch, SegmentMetadata,
    SegmentRecord, VectorQuery,
};
use crate::pagination::{Continuation, PaginationMode};
use crate::source::SOURCE_ID;

use super::VectorStore;

type Collections = HashMap<String, Vec<EmbeddedSegment>>;

/// In-memory store keyed by store (collection) name.
pub struct InMemoryStore {
    collections: RwLock<Collections>,
    connected: bool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            connected: false,
        }
    }

    /// Number of segments held in `store_name`.
    pub fn len(&self, store_name: &str) -> Result<usize, ConnectorError> {
        Ok(self.read()?.get(store_name).map_or(0, Vec::len))
    }

    fn ensure_connected(&self) -> Result<(), ConnectorError> {
        if self.connected {
            Ok(())
        } else {
            Err(ConnectorError::not_connected("memory store"))
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Collections>, ConnectorError> {
        self.collections
            .read()
            .map_err(|_| ConnectorError::Storage("in-memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Collections>, ConnectorError> {
        self.collections
            .write()
            .map_err(|_| ConnectorError::Storage("in-memory store lock poisoned".to_string()))
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn to_record(segment: &EmbeddedSegment) -> SegmentRecord {
    let attributes = segment
        .metadata
        .iter()
        .map(|(k, v)| MetadataAttribute::new(k, v))
        .collect();
    SegmentRecord {
        id: segment.id.clone(),
        metadata: Some(SegmentMetadata::from_attributes(attributes)),
    }
}

#[async_trait]
impl PageFetcher for InMemoryStore {
    fn pagination_mode(&self) -> PaginationMode {
        PaginationMode::OffsetAndLink
    }

    async fn fetch_page(
        &self,
        store_name: &str,
        page_size: usize,
        continuation: &Continuation,
    ) -> Result<BackendPage, ConnectorError> {
        self.ensure_connected()?;
        let offset = match continuation {
            Continuation::Offset(offset) => *offset,
            other => {
                return Err(ConnectorError::fetch(
                    None,
                    format!("unexpected continuation {:?}", other),
                ))
            }
        };
        let collections = self.read()?;
        let records = collections
            .get(store_name)
            .map(|segments| {
                segments
                    .iter()
                    .skip(offset)
                    .take(page_size)
                    .map(to_record)
                    .collect()
            })
            .unwrap_or_default();
        Ok(BackendPage::new(records, None))
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn backend(&self) -> &str {
        "memory"
    }

    async fn connect(&mut self) -> Result<(), ConnectorError> {
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.connected = false;
    }

    async fn is_valid(&self) -> bool {
        self.connected
    }

    async fn upsert(
        &self,
        store_name: &str,
        segments: &[EmbeddedSegment],
    ) -> Result<Vec<String>, ConnectorError> {
        self.ensure_connected()?;
        let mut collections = self.write()?;
        let stored = collections.entry(store_name.to_string()).or_default();
        for segment in segments {
            match stored.iter_mut().find(|s| s.id == segment.id) {
                Some(existing) => *existing = segment.clone(),
                None => stored.push(segment.clone()),
            }
        }
        Ok(segments.iter().map(|s| s.id.clone()).collect())
    }

    async fn query(
        &self,
        store_name: &str,
        query: &VectorQuery,
    ) -> Result<Vec<QueryMatch>, ConnectorError> {
        self.ensure_connected()?;
        let collections = self.read()?;
        let Some(segments) = collections.get(store_name) else {
            return Ok(Vec::new());
        };
        let mut matches: Vec<QueryMatch> = segments
            .iter()
            .map(|s| QueryMatch {
                id: s.id.clone(),
                text: s.text.clone(),
                score: cosine_similarity(&query.vector, &s.vector),
                metadata: s.metadata.clone(),
            })
            .filter(|m| m.score >= query.min_score)
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(query.max_results);
        Ok(matches)
    }

    async fn delete(
        &self,
        store_name: &str,
        selector: &DeleteSelector,
    ) -> Result<(), ConnectorError> {
        self.ensure_connected()?;
        let mut collections = self.write()?;
        if let Some(stored) = collections.get_mut(store_name) {
            match selector {
                DeleteSelector::Ids(ids) => stored.retain(|s| !ids.contains(&s.id)),
                DeleteSelector::SourceId(source_id) => {
                    stored.retain(|s| s.metadata.get(SOURCE_ID) != Some(source_id))
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::reconcile::ReconcileOptions;

    async fn connected() -> InMemoryStore {
        let mut store = InMemoryStore::new();
        store.connect().await.unwrap();
        store
    }

    fn segment(id: &str, source: &str, index: usize, vector: Vec<f32>) -> EmbeddedSegment {
        let mut metadata = BTreeMap::new();
        metadata.insert(SOURCE_ID.to_string(), source.to_string());
        metadata.insert("file_name".to_string(), format!("{}.txt", source));
        metadata.insert("index".to_string(), index.to_string());
        EmbeddedSegment {
            id: id.to_string(),
            text: format!("text of {}", id),
            vector,
            metadata,
        }
    }

    #[tokio::test]
    async fn test_upsert_overwrites_by_id() {
        let store = connected().await;
        store
            .upsert("idx", &[segment("a", "s1", 0, vec![1.0, 0.0])])
            .await
            .unwrap();
        store
            .upsert("idx", &[segment("a", "s1", 0, vec![0.0, 1.0])])
            .await
            .unwrap();
        assert_eq!(store.len("idx").unwrap(), 1);
    }

    #[tokio::test]
    async fn test_query_orders_and_filters() {
        let store = connected().await;
        store
            .upsert(
                "idx",
                &[
                    segment("near", "s1", 0, vec![1.0, 0.1]),
                    segment("far", "s1", 1, vec![0.0, 1.0]),
                    segment("exact", "s2", 0, vec![1.0, 0.0]),
                ],
            )
            .await
            .unwrap();
        let query = VectorQuery {
            vector: vec![1.0, 0.0],
            max_results: 5,
            min_score: 0.5,
        };
        let matches = store.query("idx", &query).await.unwrap();
        let ids: Vec<_> = matches.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["exact", "near"]);
    }

    #[tokio::test]
    async fn test_delete_by_source() {
        let store = connected().await;
        store
            .upsert(
                "idx",
                &[
                    segment("a", "s1", 0, vec![1.0]),
                    segment("b", "s1", 1, vec![1.0]),
                    segment("c", "s2", 0, vec![1.0]),
                ],
            )
            .await
            .unwrap();
        store
            .delete("idx", &DeleteSelector::SourceId("s1".to_string()))
            .await
            .unwrap();
        assert_eq!(store.len("idx").unwrap(), 1);
        store
            .delete("idx", &DeleteSelector::Ids(vec!["c".to_string()]))
            .await
            .unwrap();
        assert_eq!(store.len("idx").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_list_sources_across_pages() {
        let store = connected().await;
        let segments: Vec<_> = (0..5)
            .map(|i| segment(&format!("s1-{}", i), "s1", i, vec![1.0]))
            .chain(std::iter::once(segment("s2-0", "s2", 0, vec![1.0])))
            .collect();
        store.upsert("idx", &segments).await.unwrap();

        let outcome = store
            .list_sources("idx", &ReconcileOptions::new(2))
            .await
            .unwrap();
        assert!(!outcome.is_partial());
        assert_eq!(outcome.pages_fetched, 4);
        assert_eq!(outcome.result.source_count, 2);
        assert_eq!(outcome.result.sources[0].segment_count, 5);
        assert_eq!(outcome.result.sources[1].segment_count, 1);
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let mut store = InMemoryStore::new();
        assert!(!store.is_valid().await);
        store.connect().await.unwrap();
        assert!(store.is_valid().await);
        store.disconnect().await;
        store.disconnect().await;
        assert!(!store.is_valid().await);
    }

    #[tokio::test]
    async fn test_operations_require_connect() {
        let mut store = connected().await;
        store
            .upsert("idx", &[segment("a", "s1", 0, vec![1.0])])
            .await
            .unwrap();
        store.disconnect().await;

        let query = VectorQuery {
            vector: vec![1.0],
            max_results: 5,
            min_score: 0.0,
        };
        assert!(matches!(
            store.upsert("idx", &[segment("b", "s1", 1, vec![1.0])]).await,
            Err(ConnectorError::Connection(_))
        ));
        assert!(matches!(
            store.query("idx", &query).await,
            Err(ConnectorError::Connection(_))
        ));
        assert!(matches!(
            store.delete("idx", &DeleteSelector::Ids(vec!["a".to_string()])).await,
            Err(ConnectorError::Connection(_))
        ));
        assert!(matches!(
            store.list_sources("idx", &ReconcileOptions::new(2)).await,
            Err(ConnectorError::Connection(_))
        ));
        assert_eq!(store.len("idx").unwrap(), 1);

        store.connect().await.unwrap();
        assert_eq!(store.query("idx", &query).await.unwrap().len(), 1);
    }
}
