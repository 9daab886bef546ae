//! Asynchronous embedding pipeline: bounded ingress/egress channels, a
//! single background applier thread, and cooperative two-phase shutdown.
//!
//! The applier runs on a dedicated OS thread with blocking channel receives,
//! matching the background-worker convention used elsewhere for workers
//! that live outside the async runtime (a `JoinHandle` owned behind a
//! `Mutex`, joined on shutdown).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::model::{EmbeddingTask, EmbeddingUpdate};
use crate::storage::Storage;

/// A batch of embedding tasks produced by one `CreateDocuments` call,
/// preserving input order.
#[derive(Debug, Clone)]
pub struct EmbeddingTaskBatch {
    pub tasks: Vec<EmbeddingTask>,
}

/// Outcome counters for a processed batch of updates, mirroring the shape
/// of a bulk-write result report.
#[derive(Debug, Clone, Default)]
pub struct BatchStats {
    pub updated: usize,
    pub errors: usize,
}

impl BatchStats {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.updated + self.errors
    }
}

/// Owns the two pipeline edges (`task_ch`, `update_ch`) and the single
/// applier worker thread that drains `update_ch` into storage.
pub struct EmbeddingPipeline {
    task_tx: SyncSender<EmbeddingTaskBatch>,
    task_rx_for_embedder: Mutex<Option<Receiver<EmbeddingTaskBatch>>>,
    update_tx: SyncSender<EmbeddingUpdate>,
    shutdown: Arc<AtomicBool>,
    applier: Mutex<Option<std::thread::JoinHandle<()>>>,
    drain_deadline: Duration,
}

impl EmbeddingPipeline {
    /// Construct the pipeline and start its applier worker against
    /// `storage`. The embedder side (consuming `task_ch`, producing into
    /// `update_ch`) is driven externally via [`Self::take_task_receiver`]
    /// and [`Self::update_sender`] so it can run on whatever executor the
    /// embedder implementation prefers.
    #[must_use]
    pub fn start(storage: Arc<dyn Storage>, config: &StoreConfig) -> Self {
        let (task_tx, task_rx) = sync_channel(config.task_channel_capacity);
        let (update_tx, update_rx) = sync_channel(config.update_channel_capacity);
        let shutdown = Arc::new(AtomicBool::new(false));

        let applier_shutdown = Arc::clone(&shutdown);
        let applier = std::thread::Builder::new()
            .name("docsearch-embedding-applier".into())
            .spawn(move || applier_loop(storage, update_rx, applier_shutdown))
            .expect("spawn embedding applier thread");

        Self {
            task_tx,
            task_rx_for_embedder: Mutex::new(Some(task_rx)),
            update_tx,
            shutdown,
            applier: Mutex::new(Some(applier)),
            drain_deadline: config.shutdown_drain_deadline,
        }
    }

    /// Publish a batch of embedding tasks. Fails with `Shutdown` once the
    /// pipeline has begun closing, and with `Busy`-shaped backpressure
    /// (blocking, per the bounded-channel contract) otherwise.
    pub fn publish_tasks(&self, batch: EmbeddingTaskBatch) -> StoreResult<()> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(StoreError::Shutdown);
        }
        self.task_tx
            .send(batch)
            .map_err(|_| StoreError::Shutdown)
    }

    /// Take the task receiver exactly once; the embedder-side driver reads
    /// batches from this and eventually calls [`Self::update_sender`] to
    /// publish results back.
    pub fn take_task_receiver(&self) -> Option<Receiver<EmbeddingTaskBatch>> {
        self.task_rx_for_embedder
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
    }

    #[must_use]
    pub fn update_sender(&self) -> SyncSender<EmbeddingUpdate> {
        self.update_tx.clone()
    }

    /// Two-phase cooperative shutdown: stop accepting new tasks, then give
    /// the applier up to `shutdown_drain_deadline` to finish the updates
    /// already queued, then join it.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        let deadline = Instant::now() + self.drain_deadline;

        let mut applier = self.applier.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = applier.take() {
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(10));
            }
            if !handle.is_finished() {
                warn!("embedding applier did not drain within the shutdown deadline");
            }
            let _ = handle.join();
        }
    }
}

impl Drop for EmbeddingPipeline {
    fn drop(&mut self) {
        if !self.shutdown.load(Ordering::Acquire) {
            self.shutdown();
        }
    }
}

/// Validate the embedding-mode rules for a batch of documents being
/// inserted into a collection: auto-embed collections must receive no
/// caller-supplied embeddings; non-auto-embed collections must receive a
/// correctly-dimensioned embedding for every document.
pub fn validate_embedding_mode(
    auto_embed: bool,
    dimension: usize,
    embeddings: &[Option<&[f32]>],
) -> StoreResult<()> {
    if auto_embed {
        if embeddings.iter().any(Option::is_some) {
            return Err(StoreError::invalid(
                "embedding",
                "auto-embed collections must not receive caller-supplied embeddings",
            ));
        }
        return Ok(());
    }

    for embedding in embeddings {
        match embedding {
            None => {
                return Err(StoreError::invalid(
                    "embedding",
                    "non-auto-embed collections require an embedding for every document",
                ));
            }
            Some(v) if v.len() != dimension => {
                return Err(StoreError::invalid(
                    "embedding",
                    format!("expected dimension {dimension}, got {}", v.len()),
                ));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn applier_loop(storage: Arc<dyn Storage>, update_rx: Receiver<EmbeddingUpdate>, shutdown: Arc<AtomicBool>) {
    let rt = match asupersync::runtime::RuntimeBuilder::current_thread().build() {
        Ok(rt) => rt,
        Err(err) => {
            error!(error = %err, "embedding applier failed to start its runtime");
            return;
        }
    };
    let cx = asupersync::Cx::for_testing();

    loop {
        match update_rx.recv_timeout(Duration::from_millis(200)) {
            Ok(update) => {
                let mut batch = vec![update];
                // Drain whatever else is immediately available so writes
                // land together, bounded by the channel's own capacity.
                while let Ok(more) = update_rx.try_recv() {
                    batch.push(more);
                }
                let stats = rt.block_on(apply_batch(&cx, storage.as_ref(), &batch));
                if stats.errors > 0 {
                    warn!(errors = stats.errors, updated = stats.updated, "embedding applier batch had failures");
                } else {
                    info!(updated = stats.updated, "embedding applier batch committed");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if shutdown.load(Ordering::Acquire) {
                    // Drain whatever is left without blocking, then exit.
                    let mut tail = Vec::new();
                    while let Ok(update) = update_rx.try_recv() {
                        tail.push(update);
                    }
                    if !tail.is_empty() {
                        let _ = rt.block_on(apply_batch(&cx, storage.as_ref(), &tail));
                    }
                    return;
                }
            }
            Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

async fn apply_batch(cx: &asupersync::Cx, storage: &dyn Storage, updates: &[EmbeddingUpdate]) -> BatchStats {
    let mut stats = BatchStats::default();
    for update in updates {
        let Ok(mut docs) = storage
            .get_documents(cx, &update.collection, &[update.document])
            .await
        else {
            stats.errors += 1;
            continue;
        };
        let Some(mut doc) = docs.pop() else {
            stats.errors += 1;
            continue;
        };
        doc.embedding = Some(update.embedding.clone());
        doc.is_embedded = true;
        doc.updated_at_micros = crate::model::now_micros();
        match storage.update_document(cx, &update.collection, &doc).await {
            Ok(()) => stats.updated += 1,
            Err(_) => stats.errors += 1,
        }
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_embed_rejects_supplied_embeddings() {
        let supplied = [Some([1.0_f32, 2.0].as_slice())];
        assert!(matches!(
            validate_embedding_mode(true, 2, &supplied),
            Err(StoreError::InvalidInput { .. })
        ));
    }

    #[test]
    fn auto_embed_accepts_missing_embeddings() {
        let none: [Option<&[f32]>; 1] = [None];
        assert!(validate_embedding_mode(true, 2, &none).is_ok());
    }

    #[test]
    fn non_auto_embed_requires_embedding_for_every_document() {
        let mixed: [Option<&[f32]>; 2] = [Some([1.0, 0.0].as_slice()), None];
        assert!(matches!(
            validate_embedding_mode(false, 2, &mixed),
            Err(StoreError::InvalidInput { .. })
        ));
    }

    // Scenario S3 from the spec.
    #[test]
    fn non_auto_embed_rejects_dimension_mismatch() {
        let five = [1.0_f32, 2.0, 3.0, 4.0, 5.0];
        let mismatched = [Some(five.as_slice())];
        assert!(matches!(
            validate_embedding_mode(false, 4, &mismatched),
            Err(StoreError::InvalidInput { .. })
        ));
    }

    #[test]
    fn non_auto_embed_accepts_correctly_dimensioned_embeddings() {
        let v = [1.0_f32, 2.0, 3.0, 4.0];
        let ok = [Some(v.as_slice())];
        assert!(validate_embedding_mode(false, 4, &ok).is_ok());
    }

    #[test]
    fn batch_stats_total_sums_updated_and_errors() {
        let stats = BatchStats {
            updated: 3,
            errors: 2,
        };
        assert_eq!(stats.total(), 5);
    }
}
