//! OpenSearch backend (k-NN plugin).
//!
//! Each store is an index of `{text, vector, metadata}` documents. Listing
//! uses the scroll API: the first page opens a scroll context and every
//! full page hands back the scroll id for the next one.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

use vectors_connector_core::fetcher::{BackendPage, PageFetcher};
use vectors_connector_core::models::{
    DeleteSelector, EmbeddedSegment, QueryMatch, SegmentMetadata, SegmentRecord, VectorQuery,
};
use vectors_connector_core::pagination::{Continuation, PaginationMode};
use vectors_connector_core::source::SOURCE_ID;
use vectors_connector_core::store::VectorStore;
use vectors_connector_core::ConnectorError;

use crate::config::StoreConfig;
use crate::http::{probe, send_json, HttpSession};

use super::{check_store_name, require_url};

const SCROLL_KEEP_ALIVE: &str = "1m";

pub struct OpenSearchStore {
    session: HttpSession,
    url: String,
}

/// Scroll position. OpenSearch may reuse one scroll id for every page, so
/// the number of records already read keeps consecutive cursors distinct.
#[derive(Debug, Serialize, Deserialize)]
struct ScrollCursor {
    scroll_id: String,
    seen: usize,
}

impl OpenSearchStore {
    pub fn new(config: &StoreConfig) -> Result<Self, ConnectorError> {
        let url = require_url(config)?;
        let session = HttpSession::new("opensearch", config.timeout_secs);
        let session = match (&config.user, &config.password, config.resolved_api_key()) {
            (Some(user), Some(password), _) => {
                let token = base64::engine::general_purpose::STANDARD
                    .encode(format!("{}:{}", user, password));
                session.with_header("authorization", &format!("Basic {}", token))?
            }
            (_, _, Some(api_key)) => {
                session.with_header("authorization", &format!("ApiKey {}", api_key))?
            }
            _ => session,
        };
        Ok(Self { session, url })
    }

    async fn ensure_index(&self, store_name: &str, dims: usize) -> Result<(), ConnectorError> {
        let client = self.session.client()?;
        let url = format!("{}/{}", self.url, store_name);
        let existing = client
            .head(&url)
            .send()
            .await
            .map_err(|e| ConnectorError::Storage(e.to_string()))?;
        if existing.status().is_success() {
            return Ok(());
        }
        info!(index = store_name, dims, "Creating k-NN index");
        let body = json!({
            "settings": { "index": { "knn": true } },
            "mappings": {
                "properties": {
                    "text": { "type": "text" },
                    "vector": {
                        "type": "knn_vector",
                        "dimension": dims,
                        "method": { "name": "hnsw", "space_type": "cosinesimil", "engine": "lucene" }
                    },
                    "metadata": {
                        "properties": { SOURCE_ID: { "type": "keyword" } }
                    }
                }
            }
        });
        send_json(client.put(&url).json(&body))
            .await
            .map_err(|f| f.into_storage())?;
        Ok(())
    }

    /// Release a scroll context once the stream is exhausted.
    async fn clear_scroll(&self, scroll_id: &str) {
        if let Ok(client) = self.session.client() {
            let url = format!("{}/_search/scroll", self.url);
            let request = client.delete(url).json(&json!({ "scroll_id": scroll_id }));
            if let Err(e) = send_json(request).await {
                debug!("Failed to clear scroll context: {}", e.message);
            }
        }
    }
}

fn to_segment_record(hit: &Value) -> SegmentRecord {
    SegmentRecord {
        id: hit
            .get("_id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        metadata: hit
            .get("_source")
            .and_then(|s| s.get("metadata"))
            .and_then(|m| m.as_object())
            .map(SegmentMetadata::from_flat_json),
    }
}

fn to_query_match(hit: &Value) -> QueryMatch {
    let source = hit.get("_source");
    let record = to_segment_record(hit);
    QueryMatch {
        id: record.id,
        text: source
            .and_then(|s| s.get("text"))
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string(),
        score: hit.get("_score").and_then(|s| s.as_f64()).unwrap_or(0.0) as f32,
        metadata: record
            .metadata
            .and_then(|m| m.attributes)
            .unwrap_or_default()
            .into_iter()
            .map(|a| (a.key, a.value))
            .collect(),
    }
}

fn hits(response: &Value) -> Option<&Vec<Value>> {
    response.get("hits")?.get("hits")?.as_array()
}

#[async_trait]
impl PageFetcher for OpenSearchStore {
    fn pagination_mode(&self) -> PaginationMode {
        PaginationMode::CursorOnly
    }

    async fn fetch_page(
        &self,
        store_name: &str,
        page_size: usize,
        continuation: &Continuation,
    ) -> Result<BackendPage, ConnectorError> {
        check_store_name(store_name)?;
        let client = self.session.client()?;
        let (request, seen) = match continuation {
            Continuation::Start => (
                client
                    .post(format!(
                        "{}/{}/_search?scroll={}",
                        self.url, store_name, SCROLL_KEEP_ALIVE
                    ))
                    .json(&json!({
                        "size": page_size,
                        "_source": ["metadata"],
                        "query": { "match_all": {} },
                        "sort": ["_doc"],
                    })),
                0,
            ),
            Continuation::Cursor(raw) => {
                let cursor: ScrollCursor = serde_json::from_str(raw).map_err(|e| {
                    ConnectorError::fetch(None, format!("invalid scroll cursor: {}", e))
                })?;
                (
                    client
                        .post(format!("{}/_search/scroll", self.url))
                        .json(&json!({
                            "scroll": SCROLL_KEEP_ALIVE,
                            "scroll_id": cursor.scroll_id,
                        })),
                    cursor.seen,
                )
            }
            other => {
                return Err(ConnectorError::fetch(
                    None,
                    format!("unexpected continuation {:?}", other),
                ))
            }
        };

        let response = send_json(request).await.map_err(|f| f.into_fetch())?;
        let records: Vec<SegmentRecord> = hits(&response)
            .ok_or_else(|| ConnectorError::fetch(None, "response has no hits"))?
            .iter()
            .map(to_segment_record)
            .collect();
        let scroll_id = response
            .get("_scroll_id")
            .and_then(|s| s.as_str())
            .map(str::to_string);

        let next = match scroll_id {
            Some(scroll_id) if records.len() == page_size => {
                let cursor = ScrollCursor {
                    scroll_id,
                    seen: seen + records.len(),
                };
                serde_json::to_string(&cursor).ok().map(Continuation::Cursor)
            }
            Some(scroll_id) => {
                self.clear_scroll(&scroll_id).await;
                None
            }
            None => None,
        };
        Ok(BackendPage::new(records, next))
    }
}

#[async_trait]
impl VectorStore for OpenSearchStore {
    fn backend(&self) -> &str {
        "opensearch"
    }

    async fn connect(&mut self) -> Result<(), ConnectorError> {
        self.session.connect()
    }

    async fn disconnect(&mut self) {
        self.session.disconnect();
    }

    async fn is_valid(&self) -> bool {
        match self.session.client() {
            Ok(client) => probe(client.get(format!("{}/_cluster/health", self.url))).await,
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

        let mut body = String::new();
        for s in segments {
            let action = json!({ "index": { "_index": store_name, "_id": s.id } });
            let document = json!({ "text": s.text, "vector": s.vector, "metadata": s.metadata });
            body.push_str(&action.to_string());
            body.push('\n');
            body.push_str(&document.to_string());
            body.push('\n');
        }

        let client = self.session.client()?;
        let response = send_json(
            client
                .post(format!("{}/_bulk?refresh=true", self.url))
                .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
                .body(body),
        )
        .await
        .map_err(|f| f.into_storage())?;
        if response.get("errors").and_then(|e| e.as_bool()) == Some(true) {
            return Err(ConnectorError::Storage(
                "bulk request reported item errors".to_string(),
            ));
        }
        Ok(segments.iter().map(|s| s.id.clone()).collect())
    }

    async fn query(
        &self,
        store_name: &str,
        query: &VectorQuery,
    ) -> Result<Vec<QueryMatch>, ConnectorError> {
        check_store_name(store_name)?;
        let client = self.session.client()?;
        let body = json!({
            "size": query.max_results,
            "_source": { "excludes": ["vector"] },
            "query": { "knn": { "vector": { "vector": query.vector, "k": query.max_results } } },
        });
        let response = send_json(
            client
                .post(format!("{}/{}/_search", self.url, store_name))
                .json(&body),
        )
        .await
        .map_err(|f| f.into_storage())?;
        Ok(hits(&response)
            .map(|h| {
                h.iter()
                    .map(to_query_match)
                    .filter(|m| m.score >= query.min_score)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete(
        &self,
        store_name: &str,
        selector: &DeleteSelector,
    ) -> Result<(), ConnectorError> {
        check_store_name(store_name)?;
        let client = self.session.client()?;
        let query = match selector {
            DeleteSelector::Ids(ids) => json!({ "ids": { "values": ids } }),
            DeleteSelector::SourceId(source_id) => {
                let field = format!("metadata.{}", SOURCE_ID);
                json!({ "term": { field: source_id } })
            }
        };
        send_json(
            client
                .post(format!(
                    "{}/{}/_delete_by_query?refresh=true",
                    self.url, store_name
                ))
                .json(&json!({ "query": query })),
        )
        .await
        .map_err(|f| f.into_storage())?;
        Ok(())
    }
}
