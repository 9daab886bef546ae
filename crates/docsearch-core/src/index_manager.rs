//! Vector index parameter derivation and the per-collection rebuild
//! protocol.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, OnceLock, RwLock};
use std::time::Duration;

use asupersync::runtime::RuntimeBuilder;
use asupersync::time::{timeout, wall_now};
use asupersync::Cx;
use tracing::{error, warn};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::model::{now_micros, Collection, DistanceFunction};
use crate::storage::Storage;

/// Derive `(list_count, probe_count)` from a current row count.
///
/// - `row_count == 0` -> `InvalidInput` (nothing to index).
/// - `row_count <= 1000` -> `list_count = 1`.
/// - `1000 < row_count <= 1_000_000` -> `list_count = row_count / 1000`.
/// - `row_count > 1_000_000` -> `list_count = floor(sqrt(row_count))`.
/// - `probe_count = max(1, floor(sqrt(list_count)))`.
pub fn derive_index_params(row_count: u64) -> StoreResult<(u32, u32)> {
    if row_count == 0 {
        return Err(StoreError::invalid("row_count", "must be positive"));
    }
    let list_count: u64 = if row_count <= 1_000 {
        1
    } else if row_count <= 1_000_000 {
        row_count / 1_000
    } else {
        (row_count as f64).sqrt().floor() as u64
    };
    let list_count = list_count.max(1);
    let probe_count = ((list_count as f64).sqrt().floor() as u64).max(1);
    Ok((list_count as u32, probe_count as u32))
}

/// Lazily-populated name -> gate registry, realising the "per-collection
/// rebuild serialised, created on first use, never destroyed" lifecycle.
///
/// Mirrors the fast-read / double-checked-write-lock shape of a
/// `sqlite_init_gate`-style registry: a read lock services the common case
/// (gate already exists); a write lock is taken only to insert a missing
/// entry, and is re-checked after acquisition. Each gate is an `AtomicBool`
/// rather than a `std::sync::Mutex` so a held gate can safely span `.await`
/// points in the async rebuild protocol below.
pub struct IndexRegistry {
    gates: OnceLock<RwLock<HashMap<String, Arc<AtomicBool>>>>,
}

impl IndexRegistry {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            gates: OnceLock::new(),
        }
    }

    fn gate_for(&self, collection: &str) -> Arc<AtomicBool> {
        let gates = self.gates.get_or_init(|| RwLock::new(HashMap::new()));

        if let Some(gate) = gates.read().unwrap_or_else(|e| e.into_inner()).get(collection) {
            return Arc::clone(gate);
        }

        let mut guard = gates.write().unwrap_or_else(|e| e.into_inner());
        if let Some(gate) = guard.get(collection) {
            return Arc::clone(gate);
        }
        let gate = Arc::new(AtomicBool::new(false));
        guard.insert(collection.to_string(), Arc::clone(&gate));
        gate
    }

    /// Try to acquire the per-collection rebuild gate; `None` if it is
    /// already held by another in-flight rebuild.
    fn try_acquire(&self, collection: &str) -> Option<RebuildGuard> {
        let gate = self.gate_for(collection);
        if gate
            .compare_exchange(false, true, AtomicOrdering::AcqRel, AtomicOrdering::Acquire)
            .is_ok()
        {
            Some(RebuildGuard { gate })
        } else {
            None
        }
    }
}

impl Default for IndexRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII release of a per-collection rebuild gate; releases on every exit
/// path, including early returns via `?` and panics.
struct RebuildGuard {
    gate: Arc<AtomicBool>,
}

impl Drop for RebuildGuard {
    fn drop(&mut self) {
        self.gate.store(false, AtomicOrdering::Release);
    }
}

/// A handle to an in-flight async rebuild. Resolves the §9 "fire-and-forget
/// is a bug smell" open question: joining surfaces the same outcome a
/// synchronous call would have produced; an abandoned handle's failure is
/// only logged by the worker.
pub struct RebuildHandle {
    inner: std::thread::JoinHandle<StoreResult<Collection>>,
}

impl RebuildHandle {
    /// Block until the rebuild completes (or the deadline configured at
    /// dispatch time elapses and the worker gives up), returning the same
    /// outcome a synchronous rebuild would have.
    pub fn join(self) -> StoreResult<Collection> {
        match self.inner.join() {
            Ok(result) => result,
            Err(_) => Err(StoreError::internal("index rebuild worker panicked")),
        }
    }
}

/// Run the rebuild protocol (§4.C steps 1-7) synchronously.
pub async fn rebuild_sync(
    cx: &Cx,
    storage: &dyn Storage,
    registry: &IndexRegistry,
    config: &StoreConfig,
    collection_name: &str,
    force: bool,
) -> StoreResult<Collection> {
    let collection_name = &crate::collection_dao::normalize_name(collection_name);
    let collection_name = collection_name.as_str();
    let _permit = registry
        .try_acquire(collection_name)
        .ok_or_else(|| StoreError::busy(collection_name))?;

    let mut collection = storage
        .get_collection_row(cx, collection_name)
        .await?
        .ok_or_else(|| StoreError::not_found("collection", collection_name))?;

    if collection.distance_function != DistanceFunction::Cosine {
        return Err(StoreError::unsupported(
            "only cosine distance supports an index",
        ));
    }

    let row_count = storage.row_count(cx, collection_name).await?;
    if !force && row_count < config.min_rows_for_index {
        return Err(StoreError::precondition(format!(
            "collection {collection_name} has {row_count} rows, fewer than the \
             {} required to build an index (pass force=true to override)",
            config.min_rows_for_index
        )));
    }

    let (list_count, probe_count) = derive_index_params(row_count.max(1))?;

    storage.rebuild_index(cx, collection_name, list_count).await?;

    collection.list_count = list_count;
    collection.probe_count = probe_count;
    collection.is_indexed = true;
    collection.row_count = row_count;
    collection.updated_at_micros = now_micros();
    storage.update_collection_row(cx, &collection).await?;

    Ok(collection)
}

/// Dispatch the rebuild protocol onto a background thread bounded by
/// `config.rebuild_timeout`. The caller gets a [`RebuildHandle`] it may join
/// or abandon; an abandoned handle's failure is only logged.
///
/// `storage` must be `'static` (an `Arc`-backed implementation) since the
/// work outlives this call.
pub fn rebuild_async(
    storage: std::sync::Arc<dyn Storage>,
    registry: std::sync::Arc<IndexRegistry>,
    config: StoreConfig,
    collection_name: String,
) -> RebuildHandle {
    let timeout_duration = config.rebuild_timeout;
    let inner = std::thread::Builder::new()
        .name(format!("docsearch-rebuild-{collection_name}"))
        .spawn(move || {
            run_rebuild_worker(storage, registry, config, collection_name, timeout_duration)
        })
        .expect("spawn index rebuild worker thread");

    RebuildHandle { inner }
}

fn run_rebuild_worker(
    storage: std::sync::Arc<dyn Storage>,
    registry: std::sync::Arc<IndexRegistry>,
    config: StoreConfig,
    collection_name: String,
    timeout_duration: Duration,
) -> StoreResult<Collection> {
    let rt = RuntimeBuilder::current_thread()
        .build()
        .map_err(|e| StoreError::internal(format!("failed to build rebuild runtime: {e}")))?;
    let cx = Cx::for_testing();

    let result = rt.block_on(timeout(
        wall_now(),
        timeout_duration,
        rebuild_sync(&cx, storage.as_ref(), registry.as_ref(), &config, &collection_name, false),
    ));

    match result {
        Ok(Ok(collection)) => Ok(collection),
        Ok(Err(e)) => {
            warn!(collection = %collection_name, error = %e, "async index rebuild failed");
            Err(e)
        }
        Err(_elapsed) => {
            error!(collection = %collection_name, ?timeout_duration, "async index rebuild timed out, abandoning");
            Err(StoreError::internal("index rebuild timed out"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_s1_parameter_derivation() {
        assert_eq!(derive_index_params(500).unwrap(), (1, 1));
        assert_eq!(derive_index_params(500_000).unwrap(), (500, 22));
        assert_eq!(derive_index_params(2_000_000).unwrap(), (1414, 37));
    }

    #[test]
    fn zero_rows_is_invalid_input() {
        assert!(matches!(
            derive_index_params(0),
            Err(StoreError::InvalidInput { .. })
        ));
    }

    #[test]
    fn boundary_at_1000_rows() {
        assert_eq!(derive_index_params(1_000).unwrap().0, 1);
        assert_eq!(derive_index_params(1_001).unwrap().0, 1);
        assert_eq!(derive_index_params(2_000).unwrap().0, 2);
    }

    #[test]
    fn registry_returns_same_gate_for_same_collection() {
        let registry = IndexRegistry::new();
        let a = registry.gate_for("c1");
        let b = registry.gate_for("c1");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn registry_returns_distinct_gates_for_distinct_collections() {
        let registry = IndexRegistry::new();
        let a = registry.gate_for("c1");
        let b = registry.gate_for("c2");
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn second_acquire_on_same_collection_is_busy() {
        let registry = IndexRegistry::new();
        let first = registry.try_acquire("c1");
        assert!(first.is_some());
        assert!(registry.try_acquire("c1").is_none());
        drop(first);
        assert!(registry.try_acquire("c1").is_some());
    }

    #[test]
    fn distinct_collections_can_rebuild_concurrently() {
        let registry = IndexRegistry::new();
        let a = registry.try_acquire("c1");
        let b = registry.try_acquire("c2");
        assert!(a.is_some());
        assert!(b.is_some());
    }

    // ─── Property tests ────────────────────────────────────────────────────

    mod proptest_index_manager {
        use super::*;
        use proptest::prelude::*;

        fn pt_config() -> ProptestConfig {
            ProptestConfig {
                cases: 500,
                ..ProptestConfig::default()
            }
        }

        proptest! {
            #![proptest_config(pt_config())]

            /// `probe_count` never exceeds `list_count`, and both are always
            /// at least 1 for any positive row count.
            #[test]
            fn prop_params_are_positive_and_ordered(row_count in 1u64..10_000_000) {
                let (list_count, probe_count) = derive_index_params(row_count).unwrap();
                prop_assert!(list_count >= 1);
                prop_assert!(probe_count >= 1);
                prop_assert!(probe_count <= list_count);
            }

            /// A larger row count never derives a smaller `list_count`.
            #[test]
            fn prop_list_count_is_monotonic(a in 1u64..5_000_000, delta in 0u64..5_000_000) {
                let b = a + delta;
                let (list_a, _) = derive_index_params(a).unwrap();
                let (list_b, _) = derive_index_params(b).unwrap();
                prop_assert!(list_b >= list_a);
            }
        }
    }
}
