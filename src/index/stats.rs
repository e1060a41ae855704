use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use serde::Serialize;

/// Snapshot of index statistics at a point in time.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexStatsSnapshot {
    /// Pages fetched from the page source
    pub page_fetches: u64,
    /// Leaf nodes served, from cache or source
    pub leaf_reads: u64,
    /// Internal nodes served, from cache or source
    pub internal_reads: u64,
    /// Node requests answered by the cache
    pub cache_hits: u64,
    /// Node requests that had to fetch a page
    pub cache_misses: u64,
    /// Calls to single-index ancestor resolution
    pub ancestry_calls: u64,
    /// Keys resolved through parent expansion on an already loaded leaf
    pub on_page_resolutions: u64,
}

/// Thread-safe statistics tracking for index reads.
#[derive(Default)]
pub struct IndexStats {
    page_fetches: AtomicU64,
    leaf_reads: AtomicU64,
    internal_reads: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    ancestry_calls: AtomicU64,
    on_page_resolutions: AtomicU64,
}

impl IndexStats {
    /// Returns the number of pages fetched from the source.
    pub fn page_fetches(&self) -> u64 {
        self.page_fetches.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of leaf nodes served.
    pub fn leaf_reads(&self) -> u64 {
        self.leaf_reads.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of internal nodes served.
    pub fn internal_reads(&self) -> u64 {
        self.internal_reads.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of node cache hits.
    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of node cache misses.
    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of single-index ancestor resolution calls.
    pub fn ancestry_calls(&self) -> u64 {
        self.ancestry_calls.load(AtomicOrdering::Relaxed)
    }

    /// Returns the number of keys resolved without leaving their parent's leaf.
    pub fn on_page_resolutions(&self) -> u64 {
        self.on_page_resolutions.load(AtomicOrdering::Relaxed)
    }

    pub(crate) fn inc_page_fetches(&self) {
        self.page_fetches.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_leaf_reads(&self) {
        self.leaf_reads.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_internal_reads(&self) {
        self.internal_reads.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_cache_hits(&self) {
        self.cache_hits.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_cache_misses(&self) {
        self.cache_misses.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn inc_ancestry_calls(&self) {
        self.ancestry_calls.fetch_add(1, AtomicOrdering::Relaxed);
    }

    pub(crate) fn add_on_page_resolutions(&self, n: u64) {
        self.on_page_resolutions
            .fetch_add(n, AtomicOrdering::Relaxed);
    }

    /// Creates a snapshot of all current statistics.
    pub fn snapshot(&self) -> IndexStatsSnapshot {
        IndexStatsSnapshot {
            page_fetches: self.page_fetches(),
            leaf_reads: self.leaf_reads(),
            internal_reads: self.internal_reads(),
            cache_hits: self.cache_hits(),
            cache_misses: self.cache_misses(),
            ancestry_calls: self.ancestry_calls(),
            on_page_resolutions: self.on_page_resolutions(),
        }
    }

    /// Emits current statistics to the tracing infrastructure.
    pub fn emit_tracing(&self) {
        let snapshot = self.snapshot();
        tracing::info!(
            target: "refgraph::stats",
            page_fetches = snapshot.page_fetches,
            leaf_reads = snapshot.leaf_reads,
            internal_reads = snapshot.internal_reads,
            cache_hits = snapshot.cache_hits,
            cache_misses = snapshot.cache_misses,
            ancestry_calls = snapshot.ancestry_calls,
            on_page_resolutions = snapshot.on_page_resolutions,
            "index stats snapshot"
        );
    }
}
