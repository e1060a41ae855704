use crate::types::page::DEFAULT_PAGE_SIZE;

/// Configuration supplied when opening a [`super::GraphIndex`].
#[derive(Clone, Debug)]
pub struct IndexOptions {
    /// Maximum number of cached leaf nodes (0 disables the leaf cache).
    pub leaf_cache_capacity: usize,
    /// Maximum number of cached internal nodes (0 disables the internal cache).
    pub internal_cache_capacity: usize,
    /// Number of shards the node caches are split across.
    pub cache_shards: usize,
    /// Whether to verify page checksums when reading pages.
    pub verify_checksums: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            leaf_cache_capacity: 1000,
            internal_cache_capacity: 100,
            cache_shards: 8,
            verify_checksums: true,
        }
    }
}

impl IndexOptions {
    /// Sets the leaf cache capacity.
    pub fn leaf_cache_capacity(mut self, nodes: usize) -> Self {
        self.leaf_cache_capacity = nodes;
        self
    }

    /// Sets the internal node cache capacity.
    pub fn internal_cache_capacity(mut self, nodes: usize) -> Self {
        self.internal_cache_capacity = nodes;
        self
    }

    /// Sets the number of cache shards.
    pub fn cache_shards(mut self, shards: usize) -> Self {
        self.cache_shards = shards;
        self
    }

    /// Enables or disables checksum verification on page reads.
    pub fn verify_checksums(mut self, enabled: bool) -> Self {
        self.verify_checksums = enabled;
        self
    }

    /// Disables both node caches; every node access reads its page.
    pub fn uncached(self) -> Self {
        self.leaf_cache_capacity(0).internal_cache_capacity(0)
    }
}

/// Configuration for [`super::IndexBuilder`].
#[derive(Clone, Debug)]
pub struct BuilderOptions {
    /// Size of each page slot in bytes; nodes are packed to fit.
    pub page_size: u32,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl BuilderOptions {
    /// Sets the page slot size.
    pub fn page_size(mut self, bytes: u32) -> Self {
        self.page_size = bytes;
        self
    }
}
