//! Source projection and source key derivation.
//!
//! A [`SourceProjection`] decides which segment attributes describe the
//! logical source document (as opposed to the individual segment) and how
//! to compute a stable identity key from them. Two segments with the same
//! key belong to the same source.
//!
//! [`DefaultProjection`] keeps the attributes written by the ingestion
//! pipeline and derives the key from the first identifying field present:
//!
//! 1. `source_id`
//! 2. `full_path` (normalised to forward slashes)
//! 3. `absolute_directory_path` + `file_name`
//! 4. `url`
//! 5. `title`

use std::collections::BTreeMap;

pub const SOURCE_ID: &str = "source_id";
pub const FILE_NAME: &str = "file_name";
pub const FILE_TYPE: &str = "file_type";
pub const FULL_PATH: &str = "full_path";
pub const ABSOLUTE_DIRECTORY_PATH: &str = "absolute_directory_path";
pub const URL: &str = "url";
pub const TITLE: &str = "title";
pub const INGESTION_DATETIME: &str = "ingestion_datetime";

/// Attributes that describe a source rather than a single segment.
pub const SOURCE_FIELDS: &[&str] = &[
    SOURCE_ID,
    FILE_NAME,
    FILE_TYPE,
    FULL_PATH,
    ABSOLUTE_DIRECTORY_PATH,
    URL,
    TITLE,
    INGESTION_DATETIME,
];

pub trait SourceProjection: Send + Sync {
    /// Restrict a segment's attributes to the source-describing subset.
    fn project(&self, attributes: &BTreeMap<String, String>) -> BTreeMap<String, String>;

    /// Identity key of the source, or `None` when the fields cannot
    /// identify one. Never returns an empty string.
    fn derive_key(&self, fields: &BTreeMap<String, String>) -> Option<String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultProjection;

impl SourceProjection for DefaultProjection {
    fn project(&self, attributes: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        SOURCE_FIELDS
            .iter()
            .filter_map(|&k| {
                attributes
                    .get(k)
                    .filter(|v| !v.trim().is_empty())
                    .map(|v| (k.to_string(), v.clone()))
            })
            .collect()
    }

    fn derive_key(&self, fields: &BTreeMap<String, String>) -> Option<String> {
        let get = |k: &str| fields.get(k).map(|v| v.trim()).filter(|v| !v.is_empty());

        if let Some(id) = get(SOURCE_ID) {
            return Some(id.to_string());
        }
        if let Some(path) = get(FULL_PATH) {
            return Some(normalize_path(path));
        }
        if let (Some(dir), Some(name)) = (get(ABSOLUTE_DIRECTORY_PATH), get(FILE_NAME)) {
            let dir = normalize_path(dir);
            return Some(format!("{}/{}", dir.trim_end_matches('/'), name));
        }
        get(URL).or_else(|| get(TITLE)).map(str::to_string)
    }
}

/// Normalise a file path for use as an identity key.
///
/// Converts backslashes to forward slashes and collapses repeated separators.
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut prev_sep = false;
    for c in path.trim().chars() {
        let c = if c == '\\' { '/' } else { c };
        if c == '/' {
            if prev_sep {
                continue;
            }
            prev_sep = true;
        } else {
            prev_sep = false;
        }
        out.push(c);
    }
    out
}
