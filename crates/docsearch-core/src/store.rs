//! `DocumentStore`: the public facade wiring the collection DAO, vector
//! index manager, embedding pipeline, and search executor together over a
//! pluggable [`Storage`] + [`Embedder`] pair.

use std::sync::Arc;

use asupersync::Cx;
use tracing::warn;

use crate::collection_dao::{self, CollectionPatch, CollectionSpec, NewDocument};
use crate::config::StoreConfig;
use crate::error::StoreResult;
use crate::index_manager::{self, IndexRegistry, RebuildHandle};
use crate::model::{Collection, Document, DocumentId, SearchRequest, SearchResultPage};
use crate::pipeline::{EmbeddingPipeline, EmbeddingTaskBatch};
use crate::storage::{Embedder, Storage};

/// Whether [`DocumentStore::create_index`] blocks for the full rebuild or
/// returns a joinable handle immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexBuildMode {
    Sync,
    Async,
}

/// Either a completed [`Collection`] (sync build) or a [`RebuildHandle`] the
/// caller may join later (async build).
pub enum IndexBuildOutcome {
    Ready(Collection),
    InProgress(RebuildHandle),
}

/// The document search engine facade: collection/document CRUD, index
/// lifecycle, and hybrid search, all scoped to one storage backend and one
/// embedder.
pub struct DocumentStore {
    storage: Arc<dyn Storage>,
    embedder: Arc<dyn Embedder>,
    pipeline: EmbeddingPipeline,
    registry: Arc<IndexRegistry>,
    config: StoreConfig,
    embedder_driver: Option<std::thread::JoinHandle<()>>,
}

impl DocumentStore {
    /// Build a store over `storage` and `embedder`, starting both the
    /// embedding pipeline's applier thread and a driver thread that pulls
    /// task batches and runs them through `embedder`.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>, embedder: Arc<dyn Embedder>, config: StoreConfig) -> Self {
        let pipeline = EmbeddingPipeline::start(Arc::clone(&storage), &config);
        let task_rx = pipeline
            .take_task_receiver()
            .expect("task receiver taken exactly once, at construction");
        let update_tx = pipeline.update_sender();

        let driver_embedder = Arc::clone(&embedder);
        let embedder_driver = std::thread::Builder::new()
            .name("docsearch-embedder-driver".into())
            .spawn(move || embedder_driver_loop(driver_embedder, task_rx, update_tx))
            .expect("spawn embedder driver thread");

        Self {
            storage,
            embedder,
            pipeline,
            registry: Arc::new(IndexRegistry::new()),
            config,
            embedder_driver: Some(embedder_driver),
        }
    }

    pub async fn create_collection(&self, cx: &Cx, spec: CollectionSpec) -> StoreResult<()> {
        collection_dao::create_collection(cx, self.storage.as_ref(), &spec).await
    }

    pub async fn get_collection(&self, cx: &Cx, name: &str) -> StoreResult<Collection> {
        collection_dao::get_collection(cx, self.storage.as_ref(), name).await
    }

    pub async fn list_collections(&self, cx: &Cx) -> StoreResult<Vec<Collection>> {
        collection_dao::list_collections(cx, self.storage.as_ref()).await
    }

    pub async fn update_collection(
        &self,
        cx: &Cx,
        name: &str,
        patch: CollectionPatch,
        privileged: bool,
    ) -> StoreResult<Collection> {
        collection_dao::update_collection(cx, self.storage.as_ref(), name, &patch, privileged).await
    }

    pub async fn delete_collection(&self, cx: &Cx, name: &str) -> StoreResult<()> {
        collection_dao::delete_collection(cx, self.storage.as_ref(), name).await
    }

    /// Insert documents, enqueueing any that still need an embedding onto
    /// the pipeline.
    pub async fn create_documents(
        &self,
        cx: &Cx,
        collection_name: &str,
        new_documents: &[NewDocument],
    ) -> StoreResult<Vec<DocumentId>> {
        let (ids, pending) = collection_dao::create_documents(
            cx,
            self.storage.as_ref(),
            collection_name,
            new_documents,
            random_document_id,
        )
        .await?;

        if !pending.is_empty() {
            // Use the same normalized name the documents were actually
            // stored under, so the applier's later lookup resolves them.
            let normalized_collection = collection_dao::normalize_name(collection_name);
            let tasks = pending
                .into_iter()
                .map(|(document, content)| crate::model::EmbeddingTask {
                    collection: normalized_collection.clone(),
                    document,
                    content,
                })
                .collect();
            self.pipeline
                .publish_tasks(EmbeddingTaskBatch { tasks })?;
        }

        Ok(ids)
    }

    pub async fn get_documents(
        &self,
        cx: &Cx,
        collection_name: &str,
        ids: &[DocumentId],
    ) -> StoreResult<Vec<Document>> {
        collection_dao::get_documents(cx, self.storage.as_ref(), collection_name, ids).await
    }

    pub async fn delete_documents(
        &self,
        cx: &Cx,
        collection_name: &str,
        ids: &[DocumentId],
    ) -> StoreResult<()> {
        collection_dao::delete_documents(cx, self.storage.as_ref(), collection_name, ids).await
    }

    /// Rebuild the collection's vector index, either inline or on a
    /// detached worker, per `mode`.
    pub async fn create_index(
        &self,
        cx: &Cx,
        collection_name: &str,
        force: bool,
        mode: IndexBuildMode,
    ) -> StoreResult<IndexBuildOutcome> {
        match mode {
            IndexBuildMode::Sync => {
                let collection = index_manager::rebuild_sync(
                    cx,
                    self.storage.as_ref(),
                    self.registry.as_ref(),
                    &self.config,
                    collection_name,
                    force,
                )
                .await?;
                Ok(IndexBuildOutcome::Ready(collection))
            }
            IndexBuildMode::Async => {
                let handle = index_manager::rebuild_async(
                    Arc::clone(&self.storage),
                    Arc::clone(&self.registry),
                    self.config.clone(),
                    collection_name.to_string(),
                );
                Ok(IndexBuildOutcome::InProgress(handle))
            }
        }
    }

    pub async fn search(
        &self,
        cx: &Cx,
        collection_name: &str,
        request: &SearchRequest,
    ) -> StoreResult<SearchResultPage> {
        crate::search::search(
            cx,
            self.storage.as_ref(),
            self.embedder.as_ref(),
            &self.config,
            collection_name,
            request,
        )
        .await
    }

    /// Shut down the embedding pipeline's applier and the embedder driver,
    /// draining whatever is already queued.
    pub fn shutdown(&mut self) {
        self.pipeline.shutdown();
        if let Some(handle) = self.embedder_driver.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DocumentStore {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn random_document_id() -> DocumentId {
    let mut bytes = [0_u8; 16];
    getrandom::getrandom(&mut bytes).expect("RNG failure");
    DocumentId::from_u128(u128::from_le_bytes(bytes))
}

/// Drains task batches from the pipeline and runs them through `embedder`,
/// publishing the resulting vectors as `EmbeddingUpdate`s. Runs on its own
/// OS thread since [`Embedder::embed`] is async and the channel is
/// synchronous; mirrors the applier's own current-thread-runtime shape.
fn embedder_driver_loop(
    embedder: Arc<dyn Embedder>,
    task_rx: std::sync::mpsc::Receiver<EmbeddingTaskBatch>,
    update_tx: std::sync::mpsc::SyncSender<crate::model::EmbeddingUpdate>,
) {
    let rt = match asupersync::runtime::RuntimeBuilder::current_thread().build() {
        Ok(rt) => rt,
        Err(err) => {
            tracing::error!(error = %err, "embedder driver failed to start its runtime");
            return;
        }
    };
    let cx = Cx::for_testing();

    while let Ok(batch) = task_rx.recv() {
        if batch.tasks.is_empty() {
            continue;
        }
        let texts: Vec<String> = batch.tasks.iter().map(|t| t.content.clone()).collect();
        let embeddings = rt.block_on(embedder.embed(&cx, &texts));
        match embeddings {
            Ok(vectors) if vectors.len() == batch.tasks.len() => {
                for (task, embedding) in batch.tasks.into_iter().zip(vectors) {
                    let update = crate::model::EmbeddingUpdate {
                        collection: task.collection,
                        document: task.document,
                        embedding,
                    };
                    if update_tx.send(update).is_err() {
                        return;
                    }
                }
            }
            Ok(_) => {
                warn!("embedder returned a mismatched number of vectors for a batch; dropping batch");
            }
            Err(error) => {
                warn!(%error, "embedder failed for a task batch; dropping batch");
            }
        }
    }
}
