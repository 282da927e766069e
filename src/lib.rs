//! # Vectors Connector
//!
//! Ingest documents into a vector store, query them by similarity, and list
//! the logical sources behind the stored segments, over interchangeable
//! store backends and embedding services.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌─────────────────────────┐
//! │ parser       │──▶│ ingest       │──▶│ VectorStore             │
//! │ text/pdf/docx│   │ split+embed  │   │ ai_search / qdrant /    │
//! └──────────────┘   └──────┬───────┘   │ opensearch / pgvector / │
//!                           │           │ memory                  │
//!                    ┌──────▼───────┐   └───────────┬─────────────┘
//!                    │ Embedding    │               │ pages
//!                    │ Provider     │        ┌──────▼──────┐
//!                    └──────────────┘        │ reconciler  │──▶ sources
//!                                            └─────────────┘
//! ```
//!
//! The data model, the reconciler and the two traits live in
//! `vectors-connector-core`; this crate holds the network backends, the
//! registries that pick them from configuration, and the `vcx` CLI.
//!
//! ## Quick Start
//!
//! ```bash
//! vcx add folder docs ./handbook      # parse, split, embed, upsert
//! vcx sources docs                    # one record per source document
//! vcx query docs "how do I deploy?"   # similarity search
//! vcx remove docs --source-id <id>
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`http`] | Shared reqwest session and response helpers |
//! | [`store`] | Vector store backends and [`store::StoreRegistry`] |
//! | [`embedding`] | Embedding services and [`embedding::EmbeddingRegistry`] |
//! | [`parser`] | Text, PDF and DOCX extraction |
//! | [`ingest`] | Add text, files and folders to a store |
//! | [`query`] | Similarity query and one-off embedding |
//! | [`sources`] | List and remove sources |
//! | [`health`] | Connection health report |

pub mod config;
pub mod embedding;
pub mod health;
pub mod http;
pub mod ingest;
pub mod parser;
pub mod query;
pub mod sources;
pub mod store;

pub use vectors_connector_core as core;
