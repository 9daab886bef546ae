//! Capability traits the collection DAO, vector index manager, and search
//! executor are written against, keeping the storage backend swappable.

use asupersync::Cx;
use serde_json::Value;

use crate::error::StoreResult;
use crate::model::{Collection, Document, DocumentId};
use crate::predicate::CompiledPredicate;

/// A scoped session handle. Any parameter set through
/// [`Storage::set_probe_count`] is visible only for the lifetime of the
/// session that produced it and never leaks to another caller sharing the
/// same underlying connection pool.
///
/// Extends `Any` so a concrete `Storage` implementation can recover its own
/// session type out of the `&mut dyn Session` it is handed back.
pub trait Session: Send + std::any::Any {
    fn id(&self) -> u64;
}

/// One scored row returned from [`Storage::execute_scan`], before the
/// document content is joined in.
#[derive(Debug, Clone)]
pub struct ScanHit {
    pub document: DocumentId,
    pub score: f32,
}

/// Parameters for a single similarity scan.
#[derive(Debug, Clone)]
pub struct ScanRequest<'a> {
    pub collection: &'a str,
    pub query: &'a [f32],
    pub predicate: Option<&'a CompiledPredicate>,
    pub limit: usize,
}

/// The storage engine capability set: relational CRUD plus a scoped
/// similarity scan. Implemented by `docsearch-sqlite::SqliteStorage`.
#[async_trait::async_trait]
pub trait Storage: Send + Sync {
    async fn create_collection_table(&self, cx: &Cx, collection: &Collection) -> StoreResult<()>;
    async fn drop_collection_table(&self, cx: &Cx, name: &str) -> StoreResult<()>;

    async fn insert_collection_row(&self, cx: &Cx, collection: &Collection) -> StoreResult<()>;
    async fn update_collection_row(&self, cx: &Cx, collection: &Collection) -> StoreResult<()>;
    async fn get_collection_row(&self, cx: &Cx, name: &str) -> StoreResult<Option<Collection>>;
    async fn list_collection_rows(&self, cx: &Cx) -> StoreResult<Vec<Collection>>;
    async fn delete_collection_row(&self, cx: &Cx, name: &str) -> StoreResult<()>;

    async fn insert_documents(
        &self,
        cx: &Cx,
        collection: &str,
        documents: &[Document],
    ) -> StoreResult<()>;
    async fn update_document(
        &self,
        cx: &Cx,
        collection: &str,
        document: &Document,
    ) -> StoreResult<()>;
    async fn get_documents(
        &self,
        cx: &Cx,
        collection: &str,
        ids: &[DocumentId],
    ) -> StoreResult<Vec<Document>>;
    async fn delete_documents(
        &self,
        cx: &Cx,
        collection: &str,
        ids: &[DocumentId],
    ) -> StoreResult<()>;
    async fn row_count(&self, cx: &Cx, collection: &str) -> StoreResult<u64>;

    /// Whether an active (non-deleted) document already carries this
    /// caller-supplied `document_id` within `collection`. Backs the
    /// "unique within collection when present" invariant on `document_id`.
    async fn document_id_exists(&self, cx: &Cx, collection: &str, document_id: &str) -> StoreResult<bool>;

    /// Rebuild (drop + recreate) the collection's vector index with the
    /// given list count. Non-blocking with respect to concurrent readers.
    async fn rebuild_index(&self, cx: &Cx, collection: &str, list_count: u32) -> StoreResult<()>;

    /// Begin a scoped session for a single search; its probe-parameter
    /// override does not outlive the returned guard.
    async fn begin_session(&self, cx: &Cx) -> StoreResult<Box<dyn Session>>;
    async fn set_probe_count(
        &self,
        cx: &Cx,
        session: &mut dyn Session,
        probe_count: u32,
    ) -> StoreResult<()>;

    /// Run the similarity scan described by `request` within `session`.
    async fn execute_scan(
        &self,
        cx: &Cx,
        session: &mut dyn Session,
        request: ScanRequest<'_>,
    ) -> StoreResult<Vec<ScanHit>>;
}

/// The embedding capability the pipeline invokes for auto-embed
/// collections and for resolving a text query into a vector.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    /// The dimensionality this embedder produces; the store refuses to
    /// proceed when it disagrees with a collection's configured dimension.
    fn dimension(&self) -> usize;

    async fn embed(&self, cx: &Cx, texts: &[String]) -> StoreResult<Vec<Vec<f32>>>;
}

/// Metadata attached to a document's `metadata` field, used by
/// [`crate::collection_dao::merge_metadata`].
pub type Metadata = Value;
