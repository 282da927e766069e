//! Segment metadata parsing.
//!
//! Flattens the `metadata.attributes` list of a [`SegmentRecord`] into a
//! key/value map and reads the segment's position from the well-known
//! [`INDEX_KEY`] attribute.
//!
//! | Record shape | Result |
//! |--------------|--------|
//! | no `metadata` | `Ok(None)`, caller logs and skips |
//! | `metadata` without `attributes` | `Err(MalformedSegment)` |
//! | non-numeric or negative `index` | `Err(MalformedSegment)` |
//! | no `index` attribute | per [`MissingIndexPolicy`] |

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::ConnectorError;
use crate::models::{ParsedMetadata, SegmentRecord};

/// Attribute key carrying a segment's zero-based position in its source.
pub const INDEX_KEY: &str = "index";

/// What to do with a segment whose metadata has no [`INDEX_KEY`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingIndexPolicy {
    /// Treat the segment as index 0.
    #[default]
    DefaultZero,
    /// Reject the segment as malformed.
    Skip,
}

#[derive(Debug, Clone)]
pub struct SegmentMetadataParser {
    index_key: String,
    missing_index: MissingIndexPolicy,
}

impl Default for SegmentMetadataParser {
    fn default() -> Self {
        Self::new(MissingIndexPolicy::default())
    }
}

impl SegmentMetadataParser {
    pub fn new(missing_index: MissingIndexPolicy) -> Self {
        Self {
            index_key: INDEX_KEY.to_string(),
            missing_index,
        }
    }

    /// Use a different attribute key for the segment index.
    pub fn with_index_key(mut self, key: impl Into<String>) -> Self {
        self.index_key = key.into();
        self
    }

    pub fn parse(&self, record: &SegmentRecord) -> Result<Option<ParsedMetadata>, ConnectorError> {
        let Some(metadata) = &record.metadata else {
            return Ok(None);
        };
        let attributes = metadata
            .attributes
            .as_ref()
            .ok_or_else(|| ConnectorError::malformed(&record.id, "metadata has no attributes"))?;

        let mut flat = BTreeMap::new();
        let mut segment_index = None;

        for attribute in attributes {
            if attribute.key == self.index_key {
                let parsed = attribute.value.trim().parse::<usize>().map_err(|_| {
                    ConnectorError::malformed(
                        &record.id,
                        format!("index value {:?} is not a non-negative integer", attribute.value),
                    )
                })?;
                segment_index = Some(parsed);
            }
            flat.insert(attribute.key.clone(), attribute.value.clone());
        }

        let segment_index = match (segment_index, self.missing_index) {
            (Some(i), _) => i,
            (None, MissingIndexPolicy::DefaultZero) => 0,
            (None, MissingIndexPolicy::Skip) => {
                return Err(ConnectorError::malformed(
                    &record.id,
                    format!("missing \"{}\" attribute", self.index_key),
                ))
            }
        };

        Ok(Some(ParsedMetadata {
            attributes: flat,
            segment_index,
        }))
    }
}
