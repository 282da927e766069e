//! Ingestion pipeline: parse → segment → embed → upsert.
//!
//! Three entry points share one write path:
//!
//! - [`Ingestor::add_text`]: raw text, random `source_id`
//! - [`Ingestor::add_file`]: one file, `source_id` derived from its path
//! - [`Ingestor::add_folder`]: every file under a root matching the
//!   `[ingest]` include/exclude globs
//!
//! Every segment carries the source attributes the reconciler reads back
//! (`source_id`, `file_name`, `full_path`, …) plus its own `index`.
//! Segment ids are derived from `(source_id, index)`, so re-ingesting a
//! file overwrites its segments in place.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use vectors_connector_core::chunk::{random_source_id, segment_id, source_id_for, split_text};
use vectors_connector_core::embedding::EmbeddingProvider;
use vectors_connector_core::models::EmbeddedSegment;
use vectors_connector_core::source::{
    ABSOLUTE_DIRECTORY_PATH, FILE_NAME, FILE_TYPE, FULL_PATH, INGESTION_DATETIME, SOURCE_ID,
    TITLE, URL,
};
use vectors_connector_core::store::VectorStore;
use vectors_connector_core::ConnectorError;

use crate::config::{Config, IngestConfig};
use crate::parser::parse_file;

/// Optional descriptive attributes for raw text ingestion.
#[derive(Debug, Clone, Default)]
pub struct TextSource {
    pub title: Option<String>,
    pub url: Option<String>,
}

/// Result of ingesting one source.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestedSource {
    pub store_name: String,
    pub status: &'static str,
    pub source_id: String,
    pub file_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_path: Option<String>,
    pub segment_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedFile {
    pub path: String,
    pub reason: String,
}

/// Result of ingesting a folder.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderReport {
    pub store_name: String,
    pub sources: Vec<IngestedSource>,
    pub source_count: usize,
    pub segment_count: usize,
    pub skipped: Vec<SkippedFile>,
}

pub struct Ingestor<'a> {
    store: &'a dyn VectorStore,
    provider: &'a dyn EmbeddingProvider,
    ingest: &'a IngestConfig,
    index_key: &'a str,
    batch_size: usize,
}

impl<'a> Ingestor<'a> {
    pub fn new(
        store: &'a dyn VectorStore,
        provider: &'a dyn EmbeddingProvider,
        config: &'a Config,
    ) -> Self {
        Self {
            store,
            provider,
            ingest: &config.ingest,
            index_key: &config.store.index_key,
            batch_size: config.embedding.batch_size.max(1),
        }
    }

    pub async fn add_text(
        &self,
        store_name: &str,
        text: &str,
        source: &TextSource,
    ) -> Result<IngestedSource> {
        let source_id = random_source_id();
        let mut attributes = BTreeMap::new();
        attributes.insert(SOURCE_ID.to_string(), source_id.clone());
        attributes.insert(FILE_TYPE.to_string(), "text".to_string());
        if let Some(title) = &source.title {
            attributes.insert(TITLE.to_string(), title.clone());
        }
        if let Some(url) = &source.url {
            attributes.insert(URL.to_string(), url.clone());
        }

        let segment_count = self.write_source(store_name, text, attributes).await?;
        Ok(IngestedSource {
            store_name: store_name.to_string(),
            status: "updated",
            source_id,
            file_type: "text".to_string(),
            file_name: None,
            full_path: None,
            segment_count,
        })
    }

    pub async fn add_file(&self, store_name: &str, path: &Path) -> Result<IngestedSource> {
        let path = std::fs::canonicalize(path)
            .with_context(|| format!("File not found: {}", path.display()))?;
        let parsed = parse_file(&path, self.ingest.parser)?;
        self.write_file(store_name, &path, &parsed.text, parsed.file_type)
            .await
    }

    /// Ingest every matching file under `root`. Files that fail to parse
    /// are reported in `skipped`; store and embedding failures abort.
    pub async fn add_folder(&self, store_name: &str, root: &Path) -> Result<FolderReport> {
        let files = scan_folder(root, self.ingest)?;
        info!(root = %root.display(), files = files.len(), "Ingesting folder");

        let mut sources = Vec::new();
        let mut skipped = Vec::new();
        for path in files {
            let parsed = match parse_file(&path, self.ingest.parser) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(path = %path.display(), "Skipping file: {}", e);
                    skipped.push(SkippedFile {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            let source = self
                .write_file(store_name, &path, &parsed.text, parsed.file_type)
                .await?;
            sources.push(source);
        }

        let segment_count = sources.iter().map(|s| s.segment_count).sum();
        Ok(FolderReport {
            store_name: store_name.to_string(),
            source_count: sources.len(),
            sources,
            segment_count,
            skipped,
        })
    }

    async fn write_file(
        &self,
        store_name: &str,
        path: &Path,
        text: &str,
        file_type: &str,
    ) -> Result<IngestedSource> {
        let full_path = path.to_string_lossy().to_string();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let directory = path
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default();
        let source_id = source_id_for(&full_path);

        let mut attributes = BTreeMap::new();
        attributes.insert(SOURCE_ID.to_string(), source_id.clone());
        attributes.insert(FILE_NAME.to_string(), file_name.clone());
        attributes.insert(FILE_TYPE.to_string(), file_type.to_string());
        attributes.insert(FULL_PATH.to_string(), full_path.clone());
        attributes.insert(ABSOLUTE_DIRECTORY_PATH.to_string(), directory);

        let segment_count = self.write_source(store_name, text, attributes).await?;
        Ok(IngestedSource {
            store_name: store_name.to_string(),
            status: "updated",
            source_id,
            file_type: file_type.to_string(),
            file_name: Some(file_name),
            full_path: Some(full_path),
            segment_count,
        })
    }

    /// Segment, embed and upsert one source. Returns the segment count.
    async fn write_source(
        &self,
        store_name: &str,
        text: &str,
        mut attributes: BTreeMap<String, String>,
    ) -> Result<usize, ConnectorError> {
        let segments = split_text(text, self.ingest.max_tokens);
        if segments.is_empty() {
            debug!("Source has no text, nothing to write");
            return Ok(0);
        }
        attributes.insert(
            INGESTION_DATETIME.to_string(),
            chrono::Utc::now().to_rfc3339(),
        );
        let source_id = attributes.get(SOURCE_ID).cloned().unwrap_or_default();

        let texts: Vec<String> = segments.iter().map(|s| s.text.clone()).collect();
        let vectors = self.embed(&texts).await?;

        let embedded: Vec<EmbeddedSegment> = segments
            .into_iter()
            .zip(vectors)
            .map(|(segment, vector)| {
                let mut metadata = attributes.clone();
                metadata.insert(self.index_key.to_string(), segment.index.to_string());
                EmbeddedSegment {
                    id: segment_id(&source_id, segment.index),
                    text: segment.text,
                    vector,
                    metadata,
                }
            })
            .collect();

        self.store.upsert(store_name, &embedded).await?;
        info!(
            store = store_name,
            source_id = %source_id,
            segments = embedded.len(),
            "Ingested source"
        );
        Ok(embedded.len())
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ConnectorError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let batch_vectors = self.provider.embed_texts(batch).await?;
            if batch_vectors.len() != batch.len() {
                return Err(ConnectorError::AiService(format!(
                    "{}: expected {} vectors, got {}",
                    self.provider.service(),
                    batch.len(),
                    batch_vectors.len()
                )));
            }
            vectors.extend(batch_vectors);
        }
        if let Some(dims) = self.provider.dims() {
            if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
                return Err(ConnectorError::AiService(format!(
                    "{}: expected {} dimensions, got {}",
                    self.provider.service(),
                    dims,
                    bad.len()
                )));
            }
        }
        Ok(vectors)
    }
}

/// Files under `root` that pass the include/exclude globs, sorted by path.
pub fn scan_folder(root: &Path, ingest: &IngestConfig) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        bail!("Folder does not exist: {}", root.display());
    }
    let root = std::fs::canonicalize(root)?;
    let include_set = build_globset(&ingest.include_globs)?;

    let mut excludes = vec![
        "**/.git/**".to_string(),
        "**/target/**".to_string(),
        "**/node_modules/**".to_string(),
    ];
    excludes.extend(ingest.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(&root).follow_links(ingest.follow_symlinks) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(&root).unwrap_or(path);
        let rel_str = relative.to_string_lossy();
        if exclude_set.is_match(rel_str.as_ref()) || !include_set.is_match(rel_str.as_ref()) {
            continue;
        }
        files.push(path.to_path_buf());
    }
    files.sort();
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern).with_context(|| format!("Invalid glob: {}", pattern))?);
    }
    Ok(builder.build()?)
}
