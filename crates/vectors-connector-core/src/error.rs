//! Error taxonomy shared by every backend and embedding service.
//!
//! | Variant | Fatal? | Typical source |
//! |---------|--------|----------------|
//! | [`UnsupportedService`](ConnectorError::UnsupportedService) | yes, at construction | registry lookup |
//! | [`Configuration`](ConnectorError::Configuration) | yes, at construction | missing field, page size 0 |
//! | [`Connection`](ConnectorError::Connection) | per invocation | `connect()`, use before connect |
//! | [`Fetch`](ConnectorError::Fetch) | aborts one reconciliation run | non-success page response |
//! | [`MalformedSegment`](ConnectorError::MalformedSegment) | never, segment skipped | bad metadata |
//! | [`AiService`](ConnectorError::AiService) | per call | embedding API failure |
//! | [`Storage`](ConnectorError::Storage) | per call | upsert / query / delete |
//! | [`Document`](ConnectorError::Document) | per file | parse failure during ingestion |

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("{kind} \"{name}\" is not supported")]
    UnsupportedService { kind: &'static str, name: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("page fetch failed{}: {message}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
    Fetch {
        status: Option<u16>,
        message: String,
    },

    #[error("malformed segment {id}: {reason}")]
    MalformedSegment { id: String, reason: String },

    #[error("AI service failure: {0}")]
    AiService(String),

    #[error("storage service failure: {0}")]
    Storage(String),

    #[error("document operation failure: {0}")]
    Document(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
}

impl ConnectorError {
    pub fn unsupported_service(name: impl Into<String>) -> Self {
        ConnectorError::UnsupportedService {
            kind: "embedding model service",
            name: name.into(),
        }
    }

    pub fn unsupported_store(name: impl Into<String>) -> Self {
        ConnectorError::UnsupportedService {
            kind: "vector store",
            name: name.into(),
        }
    }

    pub fn fetch(status: Option<u16>, message: impl Into<String>) -> Self {
        ConnectorError::Fetch {
            status,
            message: message.into(),
        }
    }

    pub fn malformed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        ConnectorError::MalformedSegment {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn not_connected(what: &str) -> Self {
        ConnectorError::Connection(format!("{} is not connected", what))
    }

    /// Configuration errors are never retried; they need a config change.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ConnectorError::UnsupportedService { .. }
                | ConnectorError::Configuration(_)
                | ConnectorError::UnsupportedOperation(_)
        )
    }
}
