//! # Vectors Connector Core
//!
//! Runtime-free logic for the vectors connector: the segment data model,
//! the error taxonomy, metadata parsing, source projection, the pagination
//! state machine, the source reconciliation engine, and the store and
//! embedding traits that concrete backends implement.
//!
//! This crate contains no tokio, reqwest, sqlx, or filesystem I/O.
//!
//! ## Pipeline
//!
//! ```text
//! PageFetcher ──▶ Pager ──▶ SegmentMetadataParser ──▶ SourceProjection ──▶ SourceReconciler
//!  (backend)    (offset/link/   (attributes + index)    (fields + key)       (key → best record)
//!                cursor)
//! ```

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod fetcher;
pub mod metadata;
pub mod models;
pub mod pagination;
pub mod reconcile;
pub mod source;
pub mod store;

pub use error::ConnectorError;
