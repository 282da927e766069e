//! Qdrant backend (REST API).
//!
//! Each store is a collection with cosine distance. Points carry
//! `{"text_segment": …, "metadata": {…flat attributes…}}` as payload.
//! Listing scrolls the collection: every page returns `next_page_offset`,
//! a point id passed back verbatim to get the following page.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::info;

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

const TEXT_KEY: &str = "text_segment";
const METADATA_KEY: &str = "metadata";

pub struct QdrantStore {
    session: HttpSession,
    url: String,
}

impl QdrantStore {
    pub fn new(config: &StoreConfig) -> Result<Self, ConnectorError> {
        let url = require_url(config)?;
        let mut session = HttpSession::new("qdrant", config.timeout_secs);
        if let Some(api_key) = config.resolved_api_key() {
            session = session.with_header("api-key", &api_key)?;
        }
        Ok(Self { session, url })
    }

    fn collection_url(&self, store_name: &str) -> String {
        format!("{}/collections/{}", self.url, store_name)
    }

    async fn ensure_collection(&self, store_name: &str, dims: usize) -> Result<(), ConnectorError> {
        let client = self.session.client()?;
        let url = self.collection_url(store_name);
        let existing = client
            .get(&url)
            .send()
            .await
            .map_err(|e| ConnectorError::Storage(e.to_string()))?;
        if existing.status().is_success() {
            return Ok(());
        }
        info!(collection = store_name, dims, "Creating collection");
        let body = json!({ "vectors": { "size": dims, "distance": "Cosine" } });
        send_json(client.put(&url).json(&body))
            .await
            .map_err(|f| f.into_storage())?;
        Ok(())
    }
}

fn point_id(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn payload_metadata(payload: Option<&Value>) -> Option<&Map<String, Value>> {
    payload?.get(METADATA_KEY)?.as_object()
}

fn to_segment_record(point: &Value) -> SegmentRecord {
    SegmentRecord {
        id: point.get("id").map(point_id).unwrap_or_default(),
        metadata: payload_metadata(point.get("payload")).map(SegmentMetadata::from_flat_json),
    }
}

fn to_query_match(point: &Value) -> QueryMatch {
    let payload = point.get("payload");
    let metadata = payload_metadata(payload)
        .map(SegmentMetadata::from_flat_json)
        .and_then(|m| m.attributes)
        .unwrap_or_default()
        .into_iter()
        .map(|a| (a.key, a.value))
        .collect();
    QueryMatch {
        id: point.get("id").map(point_id).unwrap_or_default(),
        text: payload
            .and_then(|p| p.get(TEXT_KEY))
            .and_then(|t| t.as_str())
            .unwrap_or_default()
            .to_string(),
        score: point.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0) as f32,
        metadata,
    }
}

#[async_trait]
impl PageFetcher for QdrantStore {
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
        let mut body = json!({
            "limit": page_size,
            "with_payload": true,
            "with_vector": false,
        });
        match continuation {
            Continuation::Start => {}
            Continuation::Cursor(cursor) => {
                body["offset"] = serde_json::from_str(cursor).map_err(|e| {
                    ConnectorError::fetch(None, format!("invalid scroll offset: {}", e))
                })?;
            }
            other => {
                return Err(ConnectorError::fetch(
                    None,
                    format!("unexpected continuation {:?}", other),
                ))
            }
        }

        let url = format!("{}/points/scroll", self.collection_url(store_name));
        let response = send_json(client.post(url).json(&body))
            .await
            .map_err(|f| f.into_fetch())?;
        let result = response
            .get("result")
            .ok_or_else(|| ConnectorError::fetch(None, "response has no result"))?;
        let records = result
            .get("points")
            .and_then(|p| p.as_array())
            .ok_or_else(|| ConnectorError::fetch(None, "response has no points array"))?
            .iter()
            .map(to_segment_record)
            .collect();
        let next = result
            .get("next_page_offset")
            .filter(|o| !o.is_null())
            .map(|o| Continuation::Cursor(o.to_string()));
        Ok(BackendPage::new(records, next))
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    fn backend(&self) -> &str {
        "qdrant"
    }

    async fn connect(&mut self) -> Result<(), ConnectorError> {
        self.session.connect()
    }

    async fn disconnect(&mut self) {
        self.session.disconnect();
    }

    async fn is_valid(&self) -> bool {
        match self.session.client() {
            Ok(client) => probe(client.get(format!("{}/collections", self.url))).await,
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
        self.ensure_collection(store_name, first.vector.len()).await?;

        let client = self.session.client()?;
        let points: Vec<Value> = segments
            .iter()
            .map(|s| {
                json!({
                    "id": s.id,
                    "vector": s.vector,
                    "payload": { TEXT_KEY: s.text, METADATA_KEY: s.metadata },
                })
            })
            .collect();
        let url = format!("{}/points?wait=true", self.collection_url(store_name));
        send_json(client.put(url).json(&json!({ "points": points })))
            .await
            .map_err(|f| f.into_storage())?;
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
            "vector": query.vector,
            "limit": query.max_results,
            "with_payload": true,
            "score_threshold": query.min_score,
        });
        let url = format!("{}/points/search", self.collection_url(store_name));
        let response = send_json(client.post(url).json(&body))
            .await
            .map_err(|f| f.into_storage())?;
        Ok(response
            .get("result")
            .and_then(|r| r.as_array())
            .map(|points| points.iter().map(to_query_match).collect())
            .unwrap_or_default())
    }

    async fn delete(
        &self,
        store_name: &str,
        selector: &DeleteSelector,
    ) -> Result<(), ConnectorError> {
        check_store_name(store_name)?;
        let client = self.session.client()?;
        let body = match selector {
            DeleteSelector::Ids(ids) => json!({ "points": ids }),
            DeleteSelector::SourceId(source_id) => json!({
                "filter": {
                    "must": [{
                        "key": format!("{}.{}", METADATA_KEY, SOURCE_ID),
                        "match": { "value": source_id },
                    }]
                }
            }),
        };
        let url = format!("{}/points/delete?wait=true", self.collection_url(store_name));
        send_json(client.post(url).json(&body))
            .await
            .map_err(|f| f.into_storage())?;
        Ok(())
    }
}
