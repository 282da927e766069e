//! Source reconciliation.
//!
//! Turns a paginated stream of per-segment records into a deduplicated
//! list of source documents.
//!
//! # Algorithm
//!
//! 1. Drive the backend's [`PageFetcher`] through a [`Pager`] until the
//!    stream ends or a fetch fails.
//! 2. For each record: parse its metadata, project the source fields,
//!    derive the source key. Records without metadata, with malformed
//!    metadata, or without a derivable key are counted and skipped.
//! 3. Merge by key. A new key is inserted with
//!    `segment_count = segment_index + 1`; an existing key is replaced only
//!    when the new segment's `segment_index + 1` is strictly greater than
//!    the stored count. Ties keep the stored record.
//! 4. Emit the records in first-insertion order.
//!
//! A failed fetch stops the run. Everything merged before the failure is
//! still returned, with the failure attached to the
//! [`ReconciliationOutcome`].

use std::collections::HashMap;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::ConnectorError;
use crate::fetcher::PageFetcher;
use crate::metadata::{MissingIndexPolicy, SegmentMetadataParser, INDEX_KEY};
use crate::models::{ReconciliationResult, SegmentRecord, SourceRecord};
use crate::pagination::Pager;
use crate::source::SourceProjection;

/// Tuning for one reconciliation run.
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcileOptions {
    pub page_size: usize,
    #[serde(default)]
    pub missing_index: MissingIndexPolicy,
    /// Metadata attribute holding the segment index.
    #[serde(default = "default_index_key")]
    pub index_key: String,
}

fn default_index_key() -> String {
    INDEX_KEY.to_string()
}

impl ReconcileOptions {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            missing_index: MissingIndexPolicy::default(),
            index_key: default_index_key(),
        }
    }
}

/// What merging a single record did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Replaced,
    Kept,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoMetadata,
    Malformed,
    NoSourceFields,
    NoSourceKey,
}

/// Result of a run plus the counters and failure (if any) behind it.
#[derive(Debug)]
pub struct ReconciliationOutcome {
    pub result: ReconciliationResult,
    /// Every record read, including skipped ones.
    pub segments_scanned: usize,
    pub segments_skipped: usize,
    pub pages_fetched: usize,
    /// The fetch failure that cut the run short.
    pub failure: Option<ConnectorError>,
}

impl ReconciliationOutcome {
    pub fn is_partial(&self) -> bool {
        self.failure.is_some()
    }
}

/// Accumulates segment records into source records.
///
/// Owned by exactly one run; build it, feed it, and consume it with
/// [`finish`](SourceReconciler::finish).
pub struct SourceReconciler<'a> {
    projection: &'a dyn SourceProjection,
    parser: SegmentMetadataParser,
    positions: HashMap<String, usize>,
    sources: Vec<SourceRecord>,
    scanned: usize,
    skipped: usize,
}

impl<'a> SourceReconciler<'a> {
    pub fn new(projection: &'a dyn SourceProjection, parser: SegmentMetadataParser) -> Self {
        Self {
            projection,
            parser,
            positions: HashMap::new(),
            sources: Vec::new(),
            scanned: 0,
            skipped: 0,
        }
    }

    pub fn merge(&mut self, record: &SegmentRecord) -> MergeOutcome {
        self.scanned += 1;
        let outcome = self.merge_inner(record);
        if let MergeOutcome::Skipped(_) = outcome {
            self.skipped += 1;
        }
        outcome
    }

    fn merge_inner(&mut self, record: &SegmentRecord) -> MergeOutcome {
        let parsed = match self.parser.parse(record) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => {
                warn!(segment = %record.id, "No metadata available, skipping segment");
                return MergeOutcome::Skipped(SkipReason::NoMetadata);
            }
            Err(e) => {
                warn!("Skipping segment: {}", e);
                return MergeOutcome::Skipped(SkipReason::Malformed);
            }
        };

        let fields = self.projection.project(&parsed.attributes);
        if fields.is_empty() {
            debug!(segment = %record.id, "Segment has no source fields");
            return MergeOutcome::Skipped(SkipReason::NoSourceFields);
        }
        let key = match self.projection.derive_key(&fields) {
            Some(k) if !k.is_empty() => k,
            _ => {
                debug!(segment = %record.id, "Cannot derive a source key");
                return MergeOutcome::Skipped(SkipReason::NoSourceKey);
            }
        };

        let segment_count = parsed.segment_index + 1;
        match self.positions.get(&key) {
            Some(&pos) => {
                let stored = &mut self.sources[pos];
                if segment_count > stored.segment_count {
                    debug!(key = %key, from = stored.segment_count, to = segment_count, "Source record replaced");
                    *stored = SourceRecord {
                        fields,
                        segment_count,
                    };
                    MergeOutcome::Replaced
                } else {
                    MergeOutcome::Kept
                }
            }
            None => {
                debug!(key = %key, segment_count, "Source record added");
                self.positions.insert(key, self.sources.len());
                self.sources.push(SourceRecord {
                    fields,
                    segment_count,
                });
                MergeOutcome::Inserted
            }
        }
    }

    pub fn merge_page(&mut self, records: &[SegmentRecord]) {
        for record in records {
            self.merge(record);
        }
    }

    pub fn segments_scanned(&self) -> usize {
        self.scanned
    }

    pub fn segments_skipped(&self) -> usize {
        self.skipped
    }

    pub fn finish(self, store_name: &str) -> ReconciliationResult {
        ReconciliationResult {
            store_name: store_name.to_string(),
            source_count: self.sources.len(),
            sources: self.sources,
        }
    }
}

/// Run a full reconciliation of `store_name` against `fetcher`.
///
/// Returns `Err` for configuration and connection errors, including those
/// raised by the fetcher itself. Only [`ConnectorError::Fetch`] failures are
/// reported through [`ReconciliationOutcome::failure`], with whatever was
/// merged before them.
pub async fn reconcile<F>(
    fetcher: &F,
    projection: &dyn SourceProjection,
    store_name: &str,
    options: &ReconcileOptions,
) -> Result<ReconciliationOutcome, ConnectorError>
where
    F: PageFetcher + ?Sized,
{
    if options.page_size == 0 {
        return Err(ConnectorError::Configuration(
            "page size must be greater than 0".to_string(),
        ));
    }

    let mut pager = Pager::new(fetcher.pagination_mode(), options.page_size);
    let parser = SegmentMetadataParser::new(options.missing_index)
        .with_index_key(options.index_key.as_str());
    let mut reconciler = SourceReconciler::new(projection, parser);
    let mut pages_fetched = 0;
    let mut failure = None;

    while let Some(continuation) = pager.next_request() {
        match fetcher
            .fetch_page(store_name, options.page_size, &continuation)
            .await
        {
            Ok(page) => {
                pages_fetched += 1;
                reconciler.merge_page(&page.records);
                pager.on_page(page.records.len(), page.next);
            }
            Err(e @ ConnectorError::Fetch { .. }) => {
                warn!(store = store_name, "Listing sources aborted: {}", e);
                pager.fail();
                failure = Some(e);
            }
            Err(e) => {
                warn!(store = store_name, "Listing sources failed: {}", e);
                return Err(e);
            }
        }
    }

    let segments_scanned = reconciler.segments_scanned();
    let segments_skipped = reconciler.segments_skipped();
    let result = reconciler.finish(store_name);
    info!(
        store = store_name,
        pages = pages_fetched,
        segments = segments_scanned,
        sources = result.source_count,
        "Listed sources"
    );

    Ok(ReconciliationOutcome {
        result,
        segments_scanned,
        segments_skipped,
        pages_fetched,
        failure,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::BackendPage;
    use crate::models::{MetadataAttribute, SegmentMetadata};
    use crate::pagination::{Continuation, PaginationMode};
    use crate::source::DefaultProjection;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn segment(id: &str, path: &str, index: usize) -> SegmentRecord {
        SegmentRecord {
            id: id.to_string(),
            metadata: Some(SegmentMetadata::from_attributes(vec![
                MetadataAttribute::new("full_path", path),
                MetadataAttribute::new("file_name", path),
                MetadataAttribute::new("index", index.to_string()),
            ])),
        }
    }

    /// Serves a fixed list of pages in order; `None` entries fail with
    /// `error`.
    struct ScriptedFetcher {
        mode: PaginationMode,
        pages: Vec<Option<BackendPage>>,
        error: fn() -> ConnectorError,
        calls: Mutex<Vec<Continuation>>,
    }

    impl ScriptedFetcher {
        fn offset(pages: Vec<Option<BackendPage>>) -> Self {
            Self {
                mode: PaginationMode::OffsetAndLink,
                pages,
                error: || ConnectorError::fetch(Some(500), "Internal Server Error"),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing_with(mut self, error: fn() -> ConnectorError) -> Self {
            self.error = error;
            self
        }

        fn calls(&self) -> Vec<Continuation> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for ScriptedFetcher {
        fn pagination_mode(&self) -> PaginationMode {
            self.mode
        }

        async fn fetch_page(
            &self,
            _store_name: &str,
            _page_size: usize,
            continuation: &Continuation,
        ) -> Result<BackendPage, ConnectorError> {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.len();
            calls.push(continuation.clone());
            match self.pages.get(n) {
                Some(Some(page)) => Ok(page.clone()),
                Some(None) => Err((self.error)()),
                None => Ok(BackendPage::default()),
            }
        }
    }

    fn count_for<'a>(result: &'a ReconciliationResult, path: &str) -> Option<&'a SourceRecord> {
        result
            .sources
            .iter()
            .find(|s| s.fields.get("full_path").map(String::as_str) == Some(path))
    }

    #[tokio::test]
    async fn test_two_page_scenario() {
        let fetcher = ScriptedFetcher::offset(vec![
            Some(BackendPage::new(
                vec![segment("1", "fileA", 0), segment("2", "fileA", 1)],
                None,
            )),
            Some(BackendPage::new(
                vec![segment("3", "fileA", 2), segment("4", "fileB", 0)],
                None,
            )),
            Some(BackendPage::new(vec![], None)),
        ]);
        let outcome = reconcile(&fetcher, &DefaultProjection, "docs", &ReconcileOptions::new(2))
            .await
            .unwrap();

        assert!(!outcome.is_partial());
        assert_eq!(outcome.result.store_name, "docs");
        assert_eq!(outcome.result.source_count, 2);
        assert_eq!(outcome.result.sources.len(), 2);
        assert_eq!(count_for(&outcome.result, "fileA").unwrap().segment_count, 3);
        assert_eq!(count_for(&outcome.result, "fileB").unwrap().segment_count, 1);
        assert_eq!(outcome.segments_scanned, 4);
    }

    #[tokio::test]
    async fn test_terminates_after_short_page() {
        let page = |n: usize| {
            Some(BackendPage::new(
                (0..n)
                    .map(|i| segment(&i.to_string(), &format!("f{}", i), 0))
                    .collect(),
                None,
            ))
        };
        let fetcher = ScriptedFetcher::offset(vec![page(3), page(3), page(2), page(3)]);
        let outcome = reconcile(&fetcher, &DefaultProjection, "docs", &ReconcileOptions::new(3))
            .await
            .unwrap();

        assert_eq!(outcome.pages_fetched, 3);
        assert_eq!(
            fetcher.calls(),
            vec![
                Continuation::Offset(0),
                Continuation::Offset(3),
                Continuation::Offset(6)
            ]
        );
    }

    #[tokio::test]
    async fn test_follows_links_before_advancing() {
        let fetcher = ScriptedFetcher::offset(vec![
            Some(BackendPage::new(
                vec![segment("1", "a", 0)],
                Some(Continuation::Link("link-1".into())),
            )),
            Some(BackendPage::new(vec![segment("2", "b", 0)], None)),
        ]);
        let outcome = reconcile(&fetcher, &DefaultProjection, "docs", &ReconcileOptions::new(5))
            .await
            .unwrap();
        assert_eq!(outcome.pages_fetched, 2);
        assert_eq!(
            fetcher.calls(),
            vec![Continuation::Offset(0), Continuation::Link("link-1".into())]
        );
        assert_eq!(outcome.result.source_count, 2);
    }

    #[tokio::test]
    async fn test_failure_returns_partial_result() {
        let fetcher = ScriptedFetcher::offset(vec![
            Some(BackendPage::new(
                vec![segment("1", "fileA", 0), segment("2", "fileA", 1)],
                None,
            )),
            None,
        ]);
        let outcome = reconcile(&fetcher, &DefaultProjection, "docs", &ReconcileOptions::new(2))
            .await
            .unwrap();

        assert!(outcome.is_partial());
        assert!(matches!(
            outcome.failure,
            Some(ConnectorError::Fetch {
                status: Some(500),
                ..
            })
        ));
        assert_eq!(outcome.result.source_count, 1);
        assert_eq!(outcome.result.sources[0].segment_count, 2);
        assert_eq!(fetcher.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_connection_error_is_not_partial() {
        let fetcher = ScriptedFetcher::offset(vec![
            Some(BackendPage::new(vec![segment("1", "fileA", 0)], None)),
            None,
        ])
        .failing_with(|| ConnectorError::not_connected("scripted"));
        let err = reconcile(&fetcher, &DefaultProjection, "docs", &ReconcileOptions::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::Connection(_)));
        assert_eq!(fetcher.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_configuration_error_is_not_partial() {
        let fetcher = ScriptedFetcher::offset(vec![None])
            .failing_with(|| ConnectorError::Configuration("invalid store name".to_string()));
        let err = reconcile(&fetcher, &DefaultProjection, "docs", &ReconcileOptions::new(2))
            .await
            .unwrap_err();
        assert!(err.is_configuration());
        assert_eq!(fetcher.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_custom_index_key_drives_segment_count() {
        let chunked = |id: &str, chunk: &str| SegmentRecord {
            id: id.to_string(),
            metadata: Some(SegmentMetadata::from_attributes(vec![
                MetadataAttribute::new("full_path", "doc"),
                MetadataAttribute::new("chunk", chunk),
            ])),
        };
        let fetcher = ScriptedFetcher::offset(vec![Some(BackendPage::new(
            vec![chunked("1", "0"), chunked("2", "6")],
            None,
        ))]);
        let mut options = ReconcileOptions::new(5);
        options.index_key = "chunk".to_string();
        let outcome = reconcile(&fetcher, &DefaultProjection, "docs", &options)
            .await
            .unwrap();
        assert_eq!(outcome.result.sources[0].segment_count, 7);
        assert_eq!(outcome.segments_skipped, 0);
    }

    #[tokio::test]
    async fn test_zero_page_size_rejected() {
        let fetcher = ScriptedFetcher::offset(vec![]);
        let err = reconcile(&fetcher, &DefaultProjection, "docs", &ReconcileOptions::new(0))
            .await
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(fetcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_is_idempotent() {
        let pages = vec![
            Some(BackendPage::new(
                vec![segment("1", "x", 1), segment("2", "y", 0), segment("3", "x", 0)],
                None,
            )),
            Some(BackendPage::new(vec![segment("4", "z", 4)], None)),
        ];
        let first = reconcile(
            &ScriptedFetcher::offset(pages.clone()),
            &DefaultProjection,
            "s",
            &ReconcileOptions::new(3),
        )
        .await
        .unwrap();
        let second = reconcile(
            &ScriptedFetcher::offset(pages),
            &DefaultProjection,
            "s",
            &ReconcileOptions::new(3),
        )
        .await
        .unwrap();
        assert_eq!(
            serde_json::to_string(&first.result).unwrap(),
            serde_json::to_string(&second.result).unwrap()
        );
    }

    #[test]
    fn test_monotonic_merge_either_order() {
        for order in [[1usize, 4], [4, 1]] {
            let mut r = SourceReconciler::new(&DefaultProjection, SegmentMetadataParser::default());
            for (n, idx) in order.iter().enumerate() {
                r.merge(&segment(&n.to_string(), "doc", *idx));
            }
            let result = r.finish("s");
            assert_eq!(result.source_count, 1);
            assert_eq!(result.sources[0].segment_count, 5);
        }
    }

    #[test]
    fn test_tie_keeps_first_record() {
        let mut r = SourceReconciler::new(&DefaultProjection, SegmentMetadataParser::default());
        let mut first = segment("1", "doc", 2);
        if let Some(meta) = first.metadata.as_mut() {
            meta.attributes
                .as_mut()
                .unwrap()
                .push(MetadataAttribute::new("title", "First"));
        }
        assert_eq!(r.merge(&first), MergeOutcome::Inserted);
        assert_eq!(r.merge(&segment("2", "doc", 2)), MergeOutcome::Kept);
        assert_eq!(r.merge(&segment("3", "doc", 1)), MergeOutcome::Kept);
        let result = r.finish("s");
        assert_eq!(result.sources[0].fields["title"], "First");
    }

    #[test]
    fn test_replacement_takes_new_fields() {
        let mut r = SourceReconciler::new(&DefaultProjection, SegmentMetadataParser::default());
        r.merge(&segment("1", "doc", 0));
        let mut later = segment("2", "doc", 3);
        if let Some(meta) = later.metadata.as_mut() {
            meta.attributes
                .as_mut()
                .unwrap()
                .push(MetadataAttribute::new("file_type", "pdf"));
        }
        assert_eq!(r.merge(&later), MergeOutcome::Replaced);
        let result = r.finish("s");
        assert_eq!(result.sources[0].segment_count, 4);
        assert_eq!(result.sources[0].fields["file_type"], "pdf");
    }

    #[test]
    fn test_skips_are_counted() {
        let mut r = SourceReconciler::new(&DefaultProjection, SegmentMetadataParser::default());
        let no_meta = SegmentRecord {
            id: "a".into(),
            metadata: None,
        };
        let bad_index = SegmentRecord {
            id: "b".into(),
            metadata: Some(SegmentMetadata::from_attributes(vec![
                MetadataAttribute::new("full_path", "p"),
                MetadataAttribute::new("index", "NaN"),
            ])),
        };
        let no_key = SegmentRecord {
            id: "c".into(),
            metadata: Some(SegmentMetadata::from_attributes(vec![
                MetadataAttribute::new("file_type", "pdf"),
                MetadataAttribute::new("index", "0"),
            ])),
        };
        let no_fields = SegmentRecord {
            id: "d".into(),
            metadata: Some(SegmentMetadata::from_attributes(vec![
                MetadataAttribute::new("index", "0"),
            ])),
        };
        assert_eq!(
            r.merge(&no_meta),
            MergeOutcome::Skipped(SkipReason::NoMetadata)
        );
        assert_eq!(
            r.merge(&bad_index),
            MergeOutcome::Skipped(SkipReason::Malformed)
        );
        assert_eq!(
            r.merge(&no_key),
            MergeOutcome::Skipped(SkipReason::NoSourceKey)
        );
        assert_eq!(
            r.merge(&no_fields),
            MergeOutcome::Skipped(SkipReason::NoSourceFields)
        );
        assert_eq!(r.merge(&segment("e", "p", 0)), MergeOutcome::Inserted);
        assert_eq!(r.segments_scanned(), 5);
        assert_eq!(r.segments_skipped(), 4);
        assert_eq!(r.finish("s").source_count, 1);
    }
}
