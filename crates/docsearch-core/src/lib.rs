//! Backend-agnostic document collection search engine.
//!
//! This crate provides:
//! - Vector index lifecycle management (parameter derivation, rebuild
//!   protocol, per-collection serialisation)
//! - An asynchronous embedding pipeline (bounded channels, a dedicated
//!   applier thread, cooperative shutdown)
//! - A hybrid search executor (similarity and MMR modes, metadata
//!   predicates, paging)
//! - A collection/document data access layer
//!
//! The storage engine and the embedding model are both external
//! collaborators, reached through the [`storage::Storage`] and
//! [`storage::Embedder`] traits; `docsearch-sqlite` provides one concrete
//! `Storage` implementation.
//!
//! # Timestamp Convention
//!
//! All timestamps are stored as `i64` microseconds since the Unix epoch
//! internally. Helper functions in [`model`] convert to/from
//! `chrono::DateTime<Utc>` for API compatibility.

#![forbid(unsafe_code)]

pub mod collection_dao;
pub mod config;
pub mod distance;
pub mod error;
pub mod index_manager;
pub mod model;
pub mod pipeline;
pub mod predicate;
pub mod search;
pub mod storage;
pub mod store;

pub use collection_dao::{CollectionPatch, CollectionSpec, NewDocument};
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use model::{Collection, Document, DocumentId, SearchMode, SearchRequest, SearchResultPage, SearchResultRow};
pub use storage::{Embedder, Storage};
pub use store::{DocumentStore, IndexBuildMode, IndexBuildOutcome};
