//! PostgreSQL + pgvector backend (sqlx).
//!
//! Each store is a table:
//!
//! ```sql
//! CREATE TABLE "<store>" (
//!     embedding_id UUID PRIMARY KEY,
//!     embedding    vector(<dims>),
//!     text         TEXT,
//!     metadata     JSONB
//! );
//! ```
//!
//! Vectors travel as pgvector text literals (`[0.1,0.2]`) cast with
//! `::vector`, so no pgvector-specific sqlx type is needed. Listing pages
//! with `LIMIT`/`OFFSET` ordered by `embedding_id`.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::Row;
use tracing::{debug, info};

use vectors_connector_core::fetcher::{BackendPage, PageFetcher};
use vectors_connector_core::models::{
    DeleteSelector, EmbeddedSegment, QueryMatch, SegmentMetadata, SegmentRecord, VectorQuery,
};
use vectors_connector_core::pagination::{Continuation, PaginationMode};
use vectors_connector_core::source::SOURCE_ID;
use vectors_connector_core::store::VectorStore;
use vectors_connector_core::ConnectorError;

use crate::config::StoreConfig;

use super::{check_store_name, require_url};

pub struct PgVectorStore {
    options: PgConnectOptions,
    max_connections: u32,
    timeout: Duration,
    pool: Option<PgPool>,
}

impl PgVectorStore {
    pub fn new(config: &StoreConfig) -> Result<Self, ConnectorError> {
        let url = require_url(config)?;
        let mut options = PgConnectOptions::from_str(&url).map_err(|e| {
            ConnectorError::Configuration(format!("invalid postgres url: {}", e))
        })?;
        if let Some(user) = &config.user {
            options = options.username(user);
        }
        if let Some(password) = &config.password {
            options = options.password(password);
        }
        Ok(Self {
            options,
            max_connections: config.max_connections.max(1),
            timeout: Duration::from_secs(config.timeout_secs),
            pool: None,
        })
    }

    fn pool(&self) -> Result<&PgPool, ConnectorError> {
        self.pool
            .as_ref()
            .ok_or_else(|| ConnectorError::not_connected("pgvector"))
    }

    async fn ensure_table(&self, table: &str, dims: usize) -> Result<(), ConnectorError> {
        let pool = self.pool()?;
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(pool)
            .await
            .map_err(storage)?;
        sqlx::query(&format!(
            r#"CREATE TABLE IF NOT EXISTS "{}" (
                embedding_id UUID PRIMARY KEY,
                embedding vector({}),
                text TEXT,
                metadata JSONB
            )"#,
            table, dims
        ))
        .execute(pool)
        .await
        .map_err(storage)?;
        Ok(())
    }
}

fn storage(e: sqlx::Error) -> ConnectorError {
    ConnectorError::Storage(e.to_string())
}

/// Format a vector as a pgvector text literal.
fn vector_literal(vector: &[f32]) -> String {
    let parts: Vec<String> = vector.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}

fn metadata_from_text(raw: Option<&str>) -> Option<SegmentMetadata> {
    let value: serde_json::Value = serde_json::from_str(raw?).ok()?;
    value.as_object().map(SegmentMetadata::from_flat_json)
}

#[async_trait]
impl PageFetcher for PgVectorStore {
    fn pagination_mode(&self) -> PaginationMode {
        PaginationMode::OffsetAndLink
    }

    async fn fetch_page(
        &self,
        store_name: &str,
        page_size: usize,
        continuation: &Continuation,
    ) -> Result<BackendPage, ConnectorError> {
        check_store_name(store_name)?;
        let offset = match continuation {
            Continuation::Offset(offset) => *offset,
            other => {
                return Err(ConnectorError::fetch(
                    None,
                    format!("unexpected continuation {:?}", other),
                ))
            }
        };
        let rows = sqlx::query(&format!(
            r#"SELECT embedding_id::text AS id, metadata::text AS metadata
               FROM "{}" ORDER BY embedding_id LIMIT $1 OFFSET $2"#,
            store_name
        ))
        .bind(page_size as i64)
        .bind(offset as i64)
        .fetch_all(self.pool()?)
        .await
        .map_err(|e| ConnectorError::fetch(None, e.to_string()))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row
                .try_get("id")
                .map_err(|e| ConnectorError::fetch(None, e.to_string()))?;
            let metadata: Option<String> = row
                .try_get("metadata")
                .map_err(|e| ConnectorError::fetch(None, e.to_string()))?;
            records.push(SegmentRecord {
                id,
                metadata: metadata_from_text(metadata.as_deref()),
            });
        }
        Ok(BackendPage::new(records, None))
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    fn backend(&self) -> &str {
        "pgvector"
    }

    async fn connect(&mut self) -> Result<(), ConnectorError> {
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(self.timeout)
            .connect_with(self.options.clone())
            .await
            .map_err(|e| ConnectorError::Connection(format!("pgvector: {}", e)))?;
        self.pool = Some(pool);
        debug!("Connected to pgvector");
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            debug!("Disconnected from pgvector");
        }
    }

    async fn is_valid(&self) -> bool {
        match self.pool() {
            Ok(pool) => sqlx::query("SELECT 1").execute(pool).await.is_ok(),
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
        self.ensure_table(store_name, first.vector.len()).await?;

        let sql = format!(
            r#"INSERT INTO "{}" (embedding_id, embedding, text, metadata)
               VALUES ($1::uuid, $2::vector, $3, $4::jsonb)
               ON CONFLICT (embedding_id) DO UPDATE SET
                   embedding = EXCLUDED.embedding,
                   text = EXCLUDED.text,
                   metadata = EXCLUDED.metadata"#,
            store_name
        );
        let mut tx = self.pool()?.begin().await.map_err(storage)?;
        for s in segments {
            let metadata = serde_json::to_string(&s.metadata)
                .map_err(|e| ConnectorError::Storage(e.to_string()))?;
            sqlx::query(&sql)
                .bind(&s.id)
                .bind(vector_literal(&s.vector))
                .bind(&s.text)
                .bind(metadata)
                .execute(&mut *tx)
                .await
                .map_err(storage)?;
        }
        tx.commit().await.map_err(storage)?;
        info!(table = store_name, segments = segments.len(), "Upserted segments");
        Ok(segments.iter().map(|s| s.id.clone()).collect())
    }

    async fn query(
        &self,
        store_name: &str,
        query: &VectorQuery,
    ) -> Result<Vec<QueryMatch>, ConnectorError> {
        check_store_name(store_name)?;
        let rows = sqlx::query(&format!(
            r#"SELECT embedding_id::text AS id, text, metadata::text AS metadata,
                      (1 - (embedding <=> $1::vector))::float8 AS score
               FROM "{}"
               ORDER BY embedding <=> $1::vector
               LIMIT $2"#,
            store_name
        ))
        .bind(vector_literal(&query.vector))
        .bind(query.max_results as i64)
        .fetch_all(self.pool()?)
        .await
        .map_err(storage)?;

        let mut matches = Vec::with_capacity(rows.len());
        for row in rows {
            let score: f64 = row.try_get("score").map_err(storage)?;
            if (score as f32) < query.min_score {
                continue;
            }
            let metadata: Option<String> = row.try_get("metadata").map_err(storage)?;
            let text: Option<String> = row.try_get("text").map_err(storage)?;
            matches.push(QueryMatch {
                id: row.try_get("id").map_err(storage)?,
                text: text.unwrap_or_default(),
                score: score as f32,
                metadata: metadata_from_text(metadata.as_deref())
                    .and_then(|m| m.attributes)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|a| (a.key, a.value))
                    .collect(),
            });
        }
        Ok(matches)
    }

    async fn delete(
        &self,
        store_name: &str,
        selector: &DeleteSelector,
    ) -> Result<(), ConnectorError> {
        check_store_name(store_name)?;
        let pool = self.pool()?;
        let result = match selector {
            DeleteSelector::Ids(ids) => {
                let sql = format!(
                    r#"DELETE FROM "{}" WHERE embedding_id::text = ANY($1)"#,
                    store_name
                );
                sqlx::query(&sql).bind(ids).execute(pool).await
            }
            DeleteSelector::SourceId(source_id) => {
                let sql = format!(
                    r#"DELETE FROM "{}" WHERE metadata->>'{}' = $1"#,
                    store_name, SOURCE_ID
                );
                sqlx::query(&sql).bind(source_id).execute(pool).await
            }
        }
        .map_err(storage)?;
        info!(table = store_name, deleted = result.rows_affected(), "Deleted segments");
        Ok(())
    }
}
