//! Data model for collections, documents, and the ephemeral pipeline
//! messages that pass between the collection DAO and the embedding
//! pipeline.
//!
//! # Timestamp Convention
//!
//! Timestamps are stored internally as `i64` microseconds since the Unix
//! epoch; `chrono` helpers are provided for API-facing conversions.

use serde::{Deserialize, Serialize};
use serde_json::Value;
pub use uuid_like::DocumentId;

/// A minimal, dependency-free UUID-shaped identifier so this crate does not
/// need to pull in the `uuid` crate just to format 128-bit random ids; the
/// storage backend is free to store these as text or blob.
pub mod uuid_like {
    use serde::{Deserialize, Serialize};
    use std::fmt;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    pub struct DocumentId(pub u128);

    impl DocumentId {
        #[must_use]
        pub fn from_u128(v: u128) -> Self {
            Self(v)
        }
    }

    impl fmt::Display for DocumentId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{:032x}", self.0)
        }
    }
}

/// Microseconds since the Unix epoch.
#[must_use]
pub fn now_micros() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

#[must_use]
pub fn micros_to_datetime(micros: i64) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from_timestamp_micros(micros).unwrap_or_else(chrono::Utc::now)
}

/// Distance function used to order a collection's vector search. Cosine is
/// the only function the vector index manager will build an index for;
/// any other value makes index rebuild `Unsupported`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceFunction {
    Cosine,
}

/// A named set of documents sharing an embedding dimensionality and
/// distance function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    pub name: String,
    pub dimension: usize,
    pub auto_embed: bool,
    pub distance_function: DistanceFunction,
    pub list_count: u32,
    pub probe_count: u32,
    pub is_indexed: bool,
    pub row_count: u64,
    pub metadata: Value,
    pub created_at_micros: i64,
    pub updated_at_micros: i64,
}

impl Collection {
    #[must_use]
    pub fn new(name: impl Into<String>, dimension: usize, auto_embed: bool) -> Self {
        let now = now_micros();
        Self {
            name: name.into(),
            dimension,
            auto_embed,
            distance_function: DistanceFunction::Cosine,
            list_count: 1,
            probe_count: 1,
            is_indexed: false,
            row_count: 0,
            metadata: Value::Object(serde_json::Map::new()),
            created_at_micros: now,
            updated_at_micros: now,
        }
    }
}

/// A single document within a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub document_id: Option<String>,
    pub content: String,
    pub embedding: Option<Vec<f32>>,
    pub is_embedded: bool,
    pub metadata: Value,
    pub created_at_micros: i64,
    pub updated_at_micros: i64,
    pub deleted: bool,
}

impl Document {
    #[must_use]
    pub fn new(id: DocumentId, content: impl Into<String>) -> Self {
        let now = now_micros();
        Self {
            id,
            document_id: None,
            content: content.into(),
            embedding: None,
            is_embedded: false,
            metadata: Value::Object(serde_json::Map::new()),
            created_at_micros: now,
            updated_at_micros: now,
            deleted: false,
        }
    }

    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.is_embedded = true;
        self.embedding = Some(embedding);
        self
    }
}

/// A unit of embedding work produced by the collection DAO on insert into
/// an auto-embed collection.
#[derive(Debug, Clone)]
pub struct EmbeddingTask {
    pub collection: String,
    pub document: DocumentId,
    pub content: String,
}

/// The outcome of an embedding task, consumed by the pipeline's applier.
#[derive(Debug, Clone)]
pub struct EmbeddingUpdate {
    pub collection: String,
    pub document: DocumentId,
    pub embedding: Vec<f32>,
}

/// How a search ranks and reduces its candidate set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Similarity,
    Mmr,
}

/// A search request against one collection.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub text: Option<String>,
    pub vector: Option<Vec<f32>>,
    pub predicate: Option<crate::predicate::Expr>,
    pub limit: Option<usize>,
    pub page_number: usize,
    pub page_size: usize,
    pub mode: SearchMode,
    pub mmr_lambda: Option<f32>,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            text: None,
            vector: None,
            predicate: None,
            limit: None,
            page_number: 1,
            page_size: 20,
            mode: SearchMode::Similarity,
            mmr_lambda: None,
        }
    }
}

/// One scored row in a search result page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResultRow {
    pub document: DocumentId,
    pub document_id: Option<String>,
    pub content: String,
    pub metadata: Value,
    pub score: f32,
}

/// A page of search results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResultPage {
    pub rows: Vec<SearchResultRow>,
    pub result_count: usize,
    pub page_number: usize,
    pub page_size: usize,
}
