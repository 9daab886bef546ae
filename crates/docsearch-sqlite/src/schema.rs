//! SQL schema for the collection and document tables.
//!
//! Documents for every collection share one physical table, scoped by a
//! `collection` column, rather than one physical table per collection; this
//! keeps `CREATE TABLE IF NOT EXISTS` idempotent across repeated
//! `create_collection_table` calls and avoids dynamic DDL per collection
//! name. Embeddings are stored as a JSON-encoded array of `f32` in a `TEXT`
//! column rather than a packed little-endian `BLOB` (the teacher's
//! `embeddings.rs` convention): the `BLOB` column there is only reachable
//! through the `#[derive(Model)]` macro's `#[sqlmodel(sql_type = "BLOB")]`
//! attribute, and this module issues raw SQL directly, where only the
//! `Value::{BigInt, Int, Text, Double, Null}` variants are exercised
//! anywhere in the corpus.

pub const CREATE_COLLECTIONS_TABLE_SQL: &str = r"
CREATE TABLE IF NOT EXISTS collections (
    name TEXT PRIMARY KEY,
    dimension INTEGER NOT NULL,
    auto_embed INTEGER NOT NULL,
    distance_function TEXT NOT NULL,
    list_count INTEGER NOT NULL,
    probe_count INTEGER NOT NULL,
    is_indexed INTEGER NOT NULL,
    row_count INTEGER NOT NULL,
    metadata TEXT NOT NULL,
    created_at_micros INTEGER NOT NULL,
    updated_at_micros INTEGER NOT NULL
);
";

pub const CREATE_DOCUMENTS_TABLE_SQL: &str = r"
CREATE TABLE IF NOT EXISTS documents (
    id TEXT NOT NULL,
    collection TEXT NOT NULL,
    document_id TEXT,
    content TEXT NOT NULL,
    embedding TEXT,
    is_embedded INTEGER NOT NULL,
    metadata TEXT NOT NULL,
    created_at_micros INTEGER NOT NULL,
    updated_at_micros INTEGER NOT NULL,
    deleted INTEGER NOT NULL,
    PRIMARY KEY (id, collection)
);
CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection);
";

/// Pack an embedding vector as a JSON array string.
#[must_use]
pub fn pack_vector(vector: &[f32]) -> String {
    serde_json::to_string(vector).unwrap_or_else(|_| "[]".to_string())
}

/// Unpack an embedding vector from its JSON array encoding.
#[must_use]
pub fn unpack_vector(encoded: &str) -> Vec<f32> {
    serde_json::from_str(encoded).unwrap_or_default()
}
