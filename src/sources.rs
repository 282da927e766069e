//! Listing and removing sources.
//!
//! Listing runs the store's reconciler. A fetch failure mid-stream is left
//! on the outcome so the caller can still print the partial result.

use anyhow::{bail, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

use vectors_connector_core::models::DeleteSelector;
use vectors_connector_core::reconcile::{ReconcileOptions, ReconciliationOutcome};
use vectors_connector_core::store::VectorStore;

pub async fn list_sources(
    store: &dyn VectorStore,
    store_name: &str,
    options: &ReconcileOptions,
) -> Result<ReconciliationOutcome> {
    let outcome = store.list_sources(store_name, options).await?;
    debug!(
        store = store_name,
        backend = store.backend(),
        skipped = outcome.segments_skipped,
        "Source listing finished"
    );
    if let Some(failure) = &outcome.failure {
        warn!(
            store = store_name,
            "Source listing stopped early, result is partial: {}", failure
        );
    }
    Ok(outcome)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveReport {
    pub store_name: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
}

/// Delete every segment of `source_id`, or the explicit segment `ids`.
/// Exactly one of the two must be given.
pub async fn remove(
    store: &dyn VectorStore,
    store_name: &str,
    source_id: Option<String>,
    ids: Vec<String>,
) -> Result<RemoveReport> {
    let selector = match (source_id, ids.is_empty()) {
        (Some(source_id), true) => DeleteSelector::SourceId(source_id),
        (None, false) => DeleteSelector::Ids(ids),
        (Some(_), false) => bail!("pass either a source id or segment ids, not both"),
        (None, true) => bail!("nothing to remove: pass a source id or segment ids"),
    };
    store.delete(store_name, &selector).await?;
    info!(store = store_name, selector = ?selector, "Removed segments");

    let (source_id, ids) = match selector {
        DeleteSelector::SourceId(source_id) => (Some(source_id), None),
        DeleteSelector::Ids(ids) => (None, Some(ids)),
    };
    Ok(RemoveReport {
        store_name: store_name.to_string(),
        status: "deleted",
        source_id,
        ids,
    })
}
