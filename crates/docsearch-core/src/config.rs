//! Store-wide configuration, built once at startup and passed down explicitly.

use std::time::Duration;

/// Tunables for a [`crate::store::DocumentStore`].
///
/// Constructed once and handed to `DocumentStore::new`; no part of the core
/// reads configuration ambiently per call.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Capacity of the embedding task ingress channel.
    pub task_channel_capacity: usize,
    /// Capacity of the embedding update channel.
    pub update_channel_capacity: usize,
    /// Minimum row count before a non-forced index rebuild is allowed.
    pub min_rows_for_index: u64,
    /// Default timeout for an async index rebuild before it is abandoned.
    pub rebuild_timeout: Duration,
    /// Deadline for draining `update_ch` during shutdown.
    pub shutdown_drain_deadline: Duration,
    /// Cap on the MMR candidate over-fetch window.
    pub mmr_overfetch_cap: usize,
    /// Default page size / limit when a search request leaves it unset.
    pub default_limit: usize,
    /// Maximum dotted-path depth accepted by the predicate compiler.
    pub max_predicate_path_depth: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            task_channel_capacity: 100,
            update_channel_capacity: 100,
            min_rows_for_index: 10_000,
            rebuild_timeout: Duration::from_secs(3600),
            shutdown_drain_deadline: Duration::from_secs(30),
            mmr_overfetch_cap: 200,
            default_limit: 20,
            max_predicate_path_depth: 16,
        }
    }
}

impl StoreConfig {
    /// `effective_limit` used to over-fetch candidates ahead of MMR reduction.
    ///
    /// `over_fetch(k) = min(max(k*4, k+10), cap)`, per the search executor's
    /// MMR-mode sizing rule.
    #[must_use]
    pub fn mmr_overfetch(&self, k: usize) -> usize {
        let wide = (k.saturating_mul(4)).max(k.saturating_add(10));
        wide.min(self.mmr_overfetch_cap).max(k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_overfetch_matches_formula() {
        let cfg = StoreConfig::default();
        assert_eq!(cfg.mmr_overfetch(2), 12);
        assert_eq!(cfg.mmr_overfetch(5), 20);
        assert_eq!(cfg.mmr_overfetch(100), 200);
    }

    #[test]
    fn overfetch_never_smaller_than_k() {
        let cfg = StoreConfig::default();
        for k in 0..300 {
            assert!(cfg.mmr_overfetch(k) >= k);
        }
    }
}
