//! The page-fetch contract every backend implements.

use async_trait::async_trait;

use crate::error::ConnectorError;
use crate::models::SegmentRecord;
use crate::pagination::{Continuation, PaginationMode};

/// One fetched page of raw segment records.
#[derive(Debug, Clone, Default)]
pub struct BackendPage {
    pub records: Vec<SegmentRecord>,
    /// Link or cursor for the next page; `None` marks the end of whatever
    /// the backend paginates natively.
    pub next: Option<Continuation>,
}

impl BackendPage {
    pub fn new(records: Vec<SegmentRecord>, next: Option<Continuation>) -> Self {
        Self { records, next }
    }
}

/// Fetches one page of segment records from a store.
///
/// Implementations translate the [`Continuation`] handed to them by the
/// [`Pager`](crate::pagination::Pager) into their native request (`$skip`,
/// a next-link URL, a scroll id) and never keep pagination state of their
/// own, so concurrent runs against the same connection stay independent.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    fn pagination_mode(&self) -> PaginationMode;

    async fn fetch_page(
        &self,
        store_name: &str,
        page_size: usize,
        continuation: &Continuation,
    ) -> Result<BackendPage, ConnectorError>;
}
