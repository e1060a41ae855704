use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use super::node::{InternalNode, LeafNode};
use crate::types::PageId;

/// Sharded LRU keyed by page id.
///
/// Pages are immutable, so two threads racing to fill the same slot hold
/// equal nodes; the first insert wins and later callers adopt it.
pub(crate) struct ShardedLru<V> {
    shards: Vec<Mutex<LruCache<u64, Arc<V>>>>,
}

impl<V> ShardedLru<V> {
    /// Returns `None` when `capacity` is zero, which disables caching.
    pub(crate) fn new(shards: usize, capacity: usize) -> Option<Self> {
        if capacity == 0 {
            return None;
        }
        let shard_count = shards.clamp(1, capacity);
        let per_shard_cap = NonZeroUsize::new((capacity / shard_count).max(1))?;
        let shards = (0..shard_count)
            .map(|_| Mutex::new(LruCache::new(per_shard_cap)))
            .collect();
        Some(Self { shards })
    }

    pub(crate) fn get(&self, id: PageId) -> Option<Arc<V>> {
        self.shard_for(id).lock().get(&id.0).cloned()
    }

    /// Inserts `node` unless the page is already cached; returns the cached node.
    pub(crate) fn insert_if_absent(&self, id: PageId, node: Arc<V>) -> Arc<V> {
        let mut guard = self.shard_for(id).lock();
        if let Some(existing) = guard.get(&id.0) {
            return Arc::clone(existing);
        }
        guard.put(id.0, Arc::clone(&node));
        node
    }

    pub(crate) fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().len()).sum()
    }

    pub(crate) fn clear(&self) {
        for shard in &self.shards {
            shard.lock().clear();
        }
    }

    fn shard_for(&self, id: PageId) -> &Mutex<LruCache<u64, Arc<V>>> {
        let idx = (id.0 as usize) % self.shards.len();
        &self.shards[idx]
    }
}

/// Per-index node cache, split by node kind so the few internal pages are
/// not evicted by leaf churn.
pub(crate) struct NodeCache {
    leaves: Option<ShardedLru<LeafNode>>,
    internals: Option<ShardedLru<InternalNode>>,
}

impl NodeCache {
    pub(crate) fn new(shards: usize, leaf_capacity: usize, internal_capacity: usize) -> Self {
        Self {
            leaves: ShardedLru::new(shards, leaf_capacity),
            internals: ShardedLru::new(shards, internal_capacity),
        }
    }

    pub(crate) fn leaf(&self, id: PageId) -> Option<Arc<LeafNode>> {
        self.leaves.as_ref().and_then(|c| c.get(id))
    }

    pub(crate) fn internal(&self, id: PageId) -> Option<Arc<InternalNode>> {
        self.internals.as_ref().and_then(|c| c.get(id))
    }

    pub(crate) fn insert_leaf(&self, id: PageId, node: Arc<LeafNode>) -> Arc<LeafNode> {
        match &self.leaves {
            Some(cache) => cache.insert_if_absent(id, node),
            None => node,
        }
    }

    pub(crate) fn insert_internal(&self, id: PageId, node: Arc<InternalNode>) -> Arc<InternalNode> {
        match &self.internals {
            Some(cache) => cache.insert_if_absent(id, node),
            None => node,
        }
    }

    /// Cached (leaf, internal) node counts.
    pub(crate) fn len(&self) -> (usize, usize) {
        (
            self.leaves.as_ref().map_or(0, ShardedLru::len),
            self.internals.as_ref().map_or(0, ShardedLru::len),
        )
    }

    pub(crate) fn clear(&self) {
        if let Some(cache) = &self.leaves {
            cache.clear();
        }
        if let Some(cache) = &self.internals {
            cache.clear();
        }
    }
}
