//! Azure AI Search backend.
//!
//! Segments are documents of an index named after the store:
//!
//! ```json
//! { "id": "…", "content": "…", "content_vector": [ … ],
//!   "metadata": { "attributes": [ { "key": "file_name", "value": "a.pdf" } ] } }
//! ```
//!
//! Listing pages through `GET /indexes/{store}/docs` in `$top`/`$skip`
//! windows and follows `@odata.nextLink` inside a window.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, info};

use vectors_connector_core::fetcher::{BackendPage, PageFetcher};
use vectors_connector_core::models::{
    DeleteSelector, EmbeddedSegment, MetadataAttribute, QueryMatch, SegmentMetadata,
    SegmentRecord, VectorQuery,
};
use vectors_connector_core::pagination::{Continuation, PaginationMode};
use vectors_connector_core::source::SOURCE_ID;
use vectors_connector_core::store::VectorStore;
use vectors_connector_core::ConnectorError;

use crate::config::StoreConfig;
use crate::http::{probe, send_json, HttpSession};

use super::{check_store_name, require_url};

const API_VERSION: &str = "2024-07-01";
/// Upper bound of documents per indexing batch and per `$top`.
const BATCH_LIMIT: usize = 1000;

pub struct AiSearchStore {
    session: HttpSession,
    url: String,
    api_version: String,
}

impl AiSearchStore {
    pub fn new(config: &StoreConfig) -> Result<Self, ConnectorError> {
        let url = require_url(config)?;
        let api_key = config.resolved_api_key().ok_or_else(|| {
            ConnectorError::Configuration("no API key configured for ai_search backend".into())
        })?;
        Ok(Self {
            session: HttpSession::new("ai_search", config.timeout_secs)
                .with_header("api-key", &api_key)?,
            url,
            api_version: config
                .api_version
                .clone()
                .unwrap_or_else(|| API_VERSION.to_string()),
        })
    }

    fn docs_url(&self, store_name: &str, top: usize, skip: usize, extra: &str) -> String {
        format!(
            "{}/indexes/{}/docs?search=*&$top={}&$skip={}&$select=id,metadata{}&api-version={}",
            self.url, store_name, top, skip, extra, self.api_version
        )
    }

    /// Create the index on first write when it does not exist yet.
    async fn ensure_index(&self, store_name: &str, dims: usize) -> Result<(), ConnectorError> {
        let client = self.session.client()?;
        let index_url = format!(
            "{}/indexes/{}?api-version={}",
            self.url, store_name, self.api_version
        );
        let existing = client
            .get(&index_url)
            .send()
            .await
            .map_err(|e| ConnectorError::Storage(e.to_string()))?;
        if existing.status().is_success() {
            return Ok(());
        }
        if existing.status().as_u16() != 404 {
            return Err(ConnectorError::Storage(format!(
                "index lookup failed: HTTP {}",
                existing.status().as_u16()
            )));
        }

        info!(index = store_name, dims, "Creating search index");
        send_json(client.put(&index_url).json(&index_schema(store_name, dims)))
            .await
            .map_err(|f| f.into_storage())?;
        Ok(())
    }

    /// Ids of every document whose `source_id` attribute equals `source_id`.
    async fn ids_for_source(
        &self,
        store_name: &str,
        source_id: &str,
    ) -> Result<Vec<String>, ConnectorError> {
        let client = self.session.client()?;
        let filter = format!(
            "&$filter=metadata/attributes/any(a: a/key eq '{}' and a/value eq '{}')",
            SOURCE_ID,
            source_id.replace('\'', "''")
        );
        let mut ids = Vec::new();
        let mut skip = 0;
        loop {
            let url = self.docs_url(store_name, BATCH_LIMIT, skip, &filter);
            let page = send_json(client.get(url))
                .await
                .map_err(|f| f.into_storage())?;
            let values = page
                .get("value")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            ids.extend(
                values
                    .iter()
                    .filter_map(|d| d.get("id").and_then(|id| id.as_str()))
                    .map(str::to_string),
            );
            if values.len() < BATCH_LIMIT {
                return Ok(ids);
            }
            skip += BATCH_LIMIT;
        }
    }

    async fn index_batch(&self, store_name: &str, actions: Vec<Value>) -> Result<(), ConnectorError> {
        let client = self.session.client()?;
        let url = format!(
            "{}/indexes/{}/docs/index?api-version={}",
            self.url, store_name, self.api_version
        );
        for batch in actions.chunks(BATCH_LIMIT) {
            send_json(client.post(&url).json(&json!({ "value": batch })))
                .await
                .map_err(|f| f.into_storage())?;
        }
        Ok(())
    }
}

fn index_schema(store_name: &str, dims: usize) -> Value {
    json!({
        "name": store_name,
        "fields": [
            { "name": "id", "type": "Edm.String", "key": true, "filterable": true },
            { "name": "content", "type": "Edm.String", "searchable": true },
            {
                "name": "content_vector",
                "type": "Collection(Edm.Single)",
                "searchable": true,
                "dimensions": dims,
                "vectorSearchProfile": "vector-profile"
            },
            {
                "name": "metadata",
                "type": "Edm.ComplexType",
                "fields": [{
                    "name": "attributes",
                    "type": "Collection(Edm.ComplexType)",
                    "fields": [
                        { "name": "key", "type": "Edm.String", "filterable": true },
                        { "name": "value", "type": "Edm.String", "filterable": true }
                    ]
                }]
            }
        ],
        "vectorSearch": {
            "algorithms": [{ "name": "hnsw", "kind": "hnsw" }],
            "profiles": [{ "name": "vector-profile", "algorithm": "hnsw" }]
        }
    })
}

/// Read one document of a `value` array as a segment record.
///
/// A document whose metadata does not have the expected shape is kept
/// with an empty attribute list so the reconciler counts it as malformed.
fn to_segment_record(document: &Value) -> SegmentRecord {
    serde_json::from_value(document.clone()).unwrap_or_else(|e| {
        let id = document
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        debug!(segment = %id, "Unreadable segment document: {}", e);
        SegmentRecord {
            id,
            metadata: Some(SegmentMetadata::default()),
        }
    })
}

fn attributes_to_map(document: &Value) -> BTreeMap<String, String> {
    document
        .get("metadata")
        .cloned()
        .and_then(|m| serde_json::from_value::<SegmentMetadata>(m).ok())
        .and_then(|m| m.attributes)
        .unwrap_or_default()
        .into_iter()
        .map(|a| (a.key, a.value))
        .collect()
}

#[async_trait]
impl PageFetcher for AiSearchStore {
    fn pagination_mode(&self) -> PaginationMode {
        PaginationMode::OffsetAndLink
    }

    async fn fetch_page(
        &self,
        store_name: &str,
        page_size: usize,
        continuation: &Continuation,
    ) -> Result<BackendPage, ConnectorError> {
        check_store_name(store_name)?;
        let client = self.session.client()?;
        let url = match continuation {
            Continuation::Offset(offset) => self.docs_url(store_name, page_size, *offset, ""),
            Continuation::Link(link) => link.clone(),
            other => {
                return Err(ConnectorError::fetch(
                    None,
                    format!("unexpected continuation {:?}", other),
                ))
            }
        };

        let response = send_json(client.get(url)).await.map_err(|f| f.into_fetch())?;
        let records = response
            .get("value")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ConnectorError::fetch(None, "response has no value array"))?
            .iter()
            .map(to_segment_record)
            .collect();
        let next = response
            .get("@odata.nextLink")
            .and_then(|l| l.as_str())
            .filter(|l| !l.is_empty())
            .map(|l| Continuation::Link(l.to_string()));
        Ok(BackendPage::new(records, next))
    }
}

#[async_trait]
impl VectorStore for AiSearchStore {
    fn backend(&self) -> &str {
        "ai_search"
    }

    async fn connect(&mut self) -> Result<(), ConnectorError> {
        self.session.connect()
    }

    async fn disconnect(&mut self) {
        self.session.disconnect();
    }

    async fn is_valid(&self) -> bool {
        match self.session.client() {
            Ok(client) => {
                let url = format!(
                    "{}/indexes?api-version={}&$select=name",
                    self.url, self.api_version
                );
                probe(client.get(url)).await
            }
            Err(_) => false,
        }
    }

    async fn upsert(
        &self,
        store_name: &str,
        segments: &[EmbeddedSegment],
    ) -> Result<Vec<String>, ConnectorError> {
        check_store_name(store_name)?;
        let Some(first) = segments.first() else {
            return Ok(Vec::new());
        };
        self.ensure_index(store_name, first.vector.len()).await?;

        let actions = segments
            .iter()
            .map(|s| {
                let attributes: Vec<MetadataAttribute> = s
                    .metadata
                    .iter()
                    .map(|(k, v)| MetadataAttribute::new(k, v))
                    .collect();
                json!({
                    "@search.action": "mergeOrUpload",
                    "id": s.id,
                    "content": s.text,
                    "content_vector": s.vector,
                    "metadata": { "attributes": attributes },
                })
            })
            .collect();
        self.index_batch(store_name, actions).await?;
        Ok(segments.iter().map(|s| s.id.clone()).collect())
    }

    async fn query(
        &self,
        store_name: &str,
        query: &VectorQuery,
    ) -> Result<Vec<QueryMatch>, ConnectorError> {
        check_store_name(store_name)?;
        let client = self.session.client()?;
        let url = format!(
            "{}/indexes/{}/docs/search?api-version={}",
            self.url, store_name, self.api_version
        );
        let body = json!({
            "select": "id,content,metadata",
            "top": query.max_results,
            "vectorQueries": [{
                "kind": "vector",
                "vector": query.vector,
                "fields": "content_vector",
                "k": query.max_results,
            }],
        });
        let response = send_json(client.post(url).json(&body))
            .await
            .map_err(|f| f.into_storage())?;

        let matches = response
            .get("value")
            .and_then(|v| v.as_array())
            .map(|docs| {
                docs.iter()
                    .map(|d| QueryMatch {
                        id: d.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
                        text: d
                            .get("content")
                            .and_then(|v| v.as_str())
                            .unwrap_or_default()
                            .to_string(),
                        score: d.get("@search.score").and_then(|v| v.as_f64()).unwrap_or(0.0)
                            as f32,
                        metadata: attributes_to_map(d),
                    })
                    .filter(|m| m.score >= query.min_score)
                    .collect()
            })
            .unwrap_or_default();
        Ok(matches)
    }

    async fn delete(
        &self,
        store_name: &str,
        selector: &DeleteSelector,
    ) -> Result<(), ConnectorError> {
        check_store_name(store_name)?;
        let ids = match selector {
            DeleteSelector::Ids(ids) => ids.clone(),
            DeleteSelector::SourceId(source_id) => self.ids_for_source(store_name, source_id).await?,
        };
        if ids.is_empty() {
            return Ok(());
        }
        let actions = ids
            .iter()
            .map(|id| json!({ "@search.action": "delete", "id": id }))
            .collect();
        self.index_batch(store_name, actions).await?;
        info!(index = store_name, deleted = ids.len(), "Deleted segments");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> AiSearchStore {
        let mut config = StoreConfig::new("ai_search");
        config.url = Some("https://search.example.net/".to_string());
        config.api_key = Some("key".to_string());
        AiSearchStore::new(&config).unwrap()
    }

    #[test]
    fn test_docs_url() {
        assert_eq!(
            store().docs_url("docs", 2, 4, ""),
            "https://search.example.net/indexes/docs/docs?search=*&$top=2&$skip=4&$select=id,metadata&api-version=2024-07-01"
        );
    }

    #[test]
    fn test_to_segment_record() {
        let ok = json!({
            "id": "1",
            "metadata": { "attributes": [ { "key": "index", "value": "3" } ] }
        });
        let record = to_segment_record(&ok);
        assert_eq!(record.id, "1");
        assert_eq!(
            record.metadata.unwrap().attributes.unwrap(),
            vec![MetadataAttribute::new("index", "3")]
        );

        let no_metadata = to_segment_record(&json!({ "id": "2" }));
        assert!(no_metadata.metadata.is_none());

        let bad = to_segment_record(&json!({ "id": "3", "metadata": { "attributes": "x" } }));
        assert_eq!(bad.metadata, Some(SegmentMetadata::default()));
    }

    #[test]
    fn test_index_schema_dimensions() {
        let schema = index_schema("docs", 1536);
        assert_eq!(schema["fields"][2]["dimensions"], 1536);
    }

    #[tokio::test]
    async fn test_fetch_requires_connect() {
        let err = store()
            .fetch_page("docs", 10, &Continuation::Offset(0))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::Connection(_)));
    }
}
