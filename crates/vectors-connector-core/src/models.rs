//! Data types that flow between backends, the reconciler, and callers.
//!
//! Segment-level types mirror the record shape read from a store index:
//!
//! ```json
//! { "id": "…", "metadata": { "attributes": [ { "key": "file_name", "value": "a.pdf" } ] } }
//! ```
//!
//! Source-level types are what the reconciler produces from them.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// One `{key, value}` pair of a segment's metadata attribute list.
///
/// Values are always carried as strings; numeric or boolean values coming
/// from flat JSON payloads are stringified on read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataAttribute {
    pub key: String,
    #[serde(deserialize_with = "scalar_as_string")]
    pub value: String,
}

impl MetadataAttribute {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Nested metadata block of a segment record.
///
/// `attributes` is optional on the wire: a present metadata object without
/// an attribute list is a malformed segment, not a missing one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentMetadata {
    #[serde(default)]
    pub attributes: Option<Vec<MetadataAttribute>>,
}

impl SegmentMetadata {
    pub fn from_attributes(attributes: Vec<MetadataAttribute>) -> Self {
        Self {
            attributes: Some(attributes),
        }
    }

    /// Build an attribute list from a flat JSON object (Qdrant payloads,
    /// OpenSearch `_source.metadata`, pgvector `metadata` columns).
    ///
    /// Nulls, arrays, and nested objects are not representable as attribute
    /// values and are dropped.
    pub fn from_flat_json(object: &serde_json::Map<String, serde_json::Value>) -> Self {
        let attributes = object
            .iter()
            .filter_map(|(k, v)| scalar_to_string(v).map(|s| MetadataAttribute::new(k, s)))
            .collect();
        Self::from_attributes(attributes)
    }
}

/// A raw per-segment record as returned by one page fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub id: String,
    #[serde(default)]
    pub metadata: Option<SegmentMetadata>,
}

/// Flattened metadata of a single segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMetadata {
    pub attributes: BTreeMap<String, String>,
    pub segment_index: usize,
}

/// Best known description of one logical source document.
///
/// Serialises flat: the projected fields followed by `segmentCount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceRecord {
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
    #[serde(rename = "segmentCount")]
    pub segment_count: usize,
}

/// Externally observable result of one `list_sources` invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationResult {
    pub store_name: String,
    pub sources: Vec<SourceRecord>,
    pub source_count: usize,
}

/// A text segment with its embedding, ready to be written to a store.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedSegment {
    pub id: String,
    pub text: String,
    pub vector: Vec<f32>,
    pub metadata: BTreeMap<String, String>,
}

/// Parameters of a similarity query.
#[derive(Debug, Clone)]
pub struct VectorQuery {
    pub vector: Vec<f32>,
    pub max_results: usize,
    /// Matches scoring below this value are dropped.
    pub min_score: f32,
}

/// One similarity match returned by a store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryMatch {
    pub id: String,
    pub text: String,
    pub score: f32,
    pub metadata: BTreeMap<String, String>,
}

/// Which segments a delete call removes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteSelector {
    /// Explicit segment ids.
    Ids(Vec<String>),
    /// Every segment whose `source_id` attribute equals the value.
    SourceId(String),
}

fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn scalar_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Null => Ok(String::new()),
        other => scalar_to_string(&other)
            .ok_or_else(|| serde::de::Error::custom("attribute value must be a scalar")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_segment_record_deserialize_numeric_value() {
        let record: SegmentRecord = serde_json::from_value(json!({
            "id": "seg-1",
            "metadata": { "attributes": [
                { "key": "index", "value": 3 },
                { "key": "file_name", "value": "a.txt" }
            ]}
        }))
        .unwrap();
        let attrs = record.metadata.unwrap().attributes.unwrap();
        assert_eq!(attrs[0], MetadataAttribute::new("index", "3"));
        assert_eq!(attrs[1].value, "a.txt");
    }

    #[test]
    fn test_segment_record_without_metadata() {
        let record: SegmentRecord = serde_json::from_value(json!({ "id": "seg-2" })).unwrap();
        assert!(record.metadata.is_none());

        let record: SegmentRecord =
            serde_json::from_value(json!({ "id": "seg-3", "metadata": {} })).unwrap();
        assert_eq!(record.metadata, Some(SegmentMetadata { attributes: None }));
    }

    #[test]
    fn test_from_flat_json_drops_nested_values() {
        let payload = json!({ "index": 1, "title": "Guide", "tags": ["a"], "deleted": false });
        let meta = SegmentMetadata::from_flat_json(payload.as_object().unwrap());
        let mut attrs = meta.attributes.unwrap();
        attrs.sort_by(|a, b| a.key.cmp(&b.key));
        assert_eq!(
            attrs,
            vec![
                MetadataAttribute::new("deleted", "false"),
                MetadataAttribute::new("index", "1"),
                MetadataAttribute::new("title", "Guide"),
            ]
        );
    }

    #[test]
    fn test_reconciliation_result_shape() {
        let mut fields = BTreeMap::new();
        fields.insert("file_name".to_string(), "a.txt".to_string());
        let result = ReconciliationResult {
            store_name: "docs".to_string(),
            sources: vec![SourceRecord {
                fields,
                segment_count: 2,
            }],
            source_count: 1,
        };
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({
                "storeName": "docs",
                "sources": [ { "file_name": "a.txt", "segmentCount": 2 } ],
                "sourceCount": 1
            })
        );
    }
}
