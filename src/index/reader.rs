use std::collections::BTreeMap;
use std::sync::Arc;

use super::cache::NodeCache;
use super::node::Node;
use super::options::IndexOptions;
use super::page::{decode_page, IndexHeader};
use super::source::PageSource;
use super::stats::IndexStats;
use crate::types::{IndexError, PageId, Result};

/// Reads pages from a [`PageSource`] and parses them into nodes, serving
/// repeated reads from the node cache.
pub(crate) struct NodeReader {
    source: Arc<dyn PageSource>,
    cache: NodeCache,
    stats: Arc<IndexStats>,
    verify_checksums: bool,
}

impl NodeReader {
    pub(crate) fn new(
        source: Arc<dyn PageSource>,
        options: &IndexOptions,
        stats: Arc<IndexStats>,
    ) -> Self {
        Self {
            source,
            cache: NodeCache::new(
                options.cache_shards,
                options.leaf_cache_capacity,
                options.internal_cache_capacity,
            ),
            stats,
            verify_checksums: options.verify_checksums,
        }
    }

    pub(crate) fn cache(&self) -> &NodeCache {
        &self.cache
    }

    /// Reads page 0 and returns the index header it carries. The root node is
    /// cached on the way so the first descent does not fetch it again.
    pub(crate) fn read_header(&self) -> Result<IndexHeader> {
        let raw = self.source.read_page(PageId::ROOT)?;
        self.stats.inc_page_fetches();
        let decoded = decode_page(PageId::ROOT, &raw, None, self.verify_checksums)?;
        let header = decoded
            .index_header
            .ok_or(IndexError::Corruption("root page lacks index header"))?;
        if let Some(available) = self.source.page_count() {
            if available < header.page_count() {
                return Err(IndexError::Corruption(
                    "index header declares more pages than the source holds",
                ));
            }
        }
        self.check_kind(&header, PageId::ROOT, &decoded.node)?;
        self.admit(PageId::ROOT, decoded.node);
        tracing::debug!(
            target: "refgraph::read",
            node_ref_lists = header.node_ref_lists,
            key_elements = header.key_elements,
            key_count = header.key_count,
            rows = header.row_count(),
            "loaded index header"
        );
        Ok(header)
    }

    /// Returns the parsed node for every id in `ids`.
    ///
    /// Fails on the first page that cannot be fetched or parsed; nothing is
    /// returned for the pages read before it.
    pub(crate) fn read_nodes(
        &self,
        header: &IndexHeader,
        ids: &[PageId],
    ) -> Result<BTreeMap<PageId, Node>> {
        let mut out = BTreeMap::new();
        for &id in ids {
            if out.contains_key(&id) {
                continue;
            }
            let node = self.read_node(header, id)?;
            out.insert(id, node);
        }
        Ok(out)
    }

    fn read_node(&self, header: &IndexHeader, id: PageId) -> Result<Node> {
        let row = header.row_of(id).ok_or(IndexError::PageOutOfRange(id))?;
        let leaf_row = row + 1 == header.row_count();
        if let Some(node) = self.cached(id, leaf_row) {
            self.stats.inc_cache_hits();
            self.count_read(&node);
            tracing::trace!(target: "refgraph::read", page = id.0, "node cache hit");
            return Ok(node);
        }
        self.stats.inc_cache_misses();
        let raw = self.source.read_page(id)?;
        self.stats.inc_page_fetches();
        let decoded = decode_page(id, &raw, Some(header), self.verify_checksums)?;
        self.check_kind(header, id, &decoded.node)?;
        tracing::trace!(
            target: "refgraph::read",
            page = id.0,
            leaf = leaf_row,
            bytes = raw.len(),
            "read node page"
        );
        let node = self.admit(id, decoded.node);
        self.count_read(&node);
        Ok(node)
    }

    fn cached(&self, id: PageId, leaf_row: bool) -> Option<Node> {
        if leaf_row {
            self.cache.leaf(id).map(Node::Leaf)
        } else {
            self.cache.internal(id).map(Node::Internal)
        }
    }

    fn admit(&self, id: PageId, node: Node) -> Node {
        match node {
            Node::Leaf(leaf) => Node::Leaf(self.cache.insert_leaf(id, leaf)),
            Node::Internal(internal) => Node::Internal(self.cache.insert_internal(id, internal)),
        }
    }

    fn count_read(&self, node: &Node) {
        match node {
            Node::Leaf(_) => self.stats.inc_leaf_reads(),
            Node::Internal(_) => self.stats.inc_internal_reads(),
        }
    }

    /// Leaves live in the last row and only there.
    fn check_kind(&self, header: &IndexHeader, id: PageId, node: &Node) -> Result<()> {
        let row = header.row_of(id).ok_or(IndexError::PageOutOfRange(id))?;
        let leaf_row = row + 1 == header.row_count();
        match (leaf_row, node.is_leaf()) {
            (true, true) | (false, false) => Ok(()),
            (true, false) => Err(IndexError::Corruption("internal node in leaf row")),
            (false, true) => Err(IndexError::Corruption("leaf node above leaf row")),
        }
    }
}
