use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, OnceLock};

use bytes::Bytes;

use super::key::{IndexEntry, Key};
use super::node::{LeafNode, Node};
use super::options::IndexOptions;
use super::page::IndexHeader;
use super::reader::NodeReader;
use super::source::{FilePageSource, MemPageSource, PageSource};
use super::stats::{IndexStats, IndexStatsSnapshot};
use crate::types::{IndexError, PageId, Result};

/// Leaves reached by a descent and the keys routed to each of them.
#[derive(Clone, Debug, Default)]
pub struct LeafAssignment {
    /// Every leaf named in `assignment`, by page id.
    pub nodes: BTreeMap<PageId, Arc<LeafNode>>,
    /// Sorted keys grouped by the leaf whose range could contain them, in
    /// leaf order. Each input key appears exactly once.
    pub assignment: Vec<(PageId, Vec<Key>)>,
}

/// An immutable, paged B+tree index mapping keys to a value and ref lists.
///
/// Opening an index performs no I/O; the root page is read on first use to
/// learn the row layout, `node_ref_lists`, and `key_elements`.
pub struct GraphIndex {
    reader: NodeReader,
    header: OnceLock<IndexHeader>,
    stats: Arc<IndexStats>,
}

impl GraphIndex {
    /// Opens an index over `source`.
    pub fn open(source: Arc<dyn PageSource>, options: IndexOptions) -> Self {
        let stats = Arc::new(IndexStats::default());
        Self {
            reader: NodeReader::new(source, &options, Arc::clone(&stats)),
            header: OnceLock::new(),
            stats,
        }
    }

    /// Opens an index over in-memory pages with default options.
    pub fn from_pages(pages: Vec<Bytes>) -> Self {
        Self::open(Arc::new(MemPageSource::new(pages)), IndexOptions::default())
    }

    /// Opens an index written by [`super::IndexBuilder::finish_to_file`].
    pub fn open_file(
        path: impl AsRef<Path>,
        page_size: u32,
        options: IndexOptions,
    ) -> Result<Self> {
        let source = FilePageSource::open(path, page_size)?;
        Ok(Self::open(Arc::new(source), options))
    }

    pub(crate) fn header(&self) -> Result<&IndexHeader> {
        if let Some(header) = self.header.get() {
            return Ok(header);
        }
        let loaded = self.reader.read_header()?;
        Ok(self.header.get_or_init(|| loaded))
    }

    /// Number of entries in the index.
    pub fn key_count(&self) -> Result<u64> {
        Ok(self.header()?.key_count)
    }

    /// Number of ref lists carried by every key.
    pub fn node_ref_lists(&self) -> Result<usize> {
        Ok(self.header()?.node_ref_lists)
    }

    /// Number of elements in every key.
    pub fn key_elements(&self) -> Result<usize> {
        Ok(self.header()?.key_elements)
    }

    /// Reads and parses the given pages, using the node cache.
    pub fn read_nodes(&self, ids: &[PageId]) -> Result<BTreeMap<PageId, Node>> {
        let header = self.header()?;
        self.reader.read_nodes(header, ids)
    }

    pub(crate) fn check_ref_list(&self, ref_list_num: usize) -> Result<&IndexHeader> {
        let header = self.header()?;
        if ref_list_num >= header.node_ref_lists {
            return Err(IndexError::InvalidRefList {
                requested: ref_list_num,
                available: header.node_ref_lists,
            });
        }
        Ok(header)
    }

    /// Routes every key from the root to the single leaf whose range could
    /// hold it. Keys absent from the index are still assigned a leaf.
    pub fn locate_leaves<'a, I>(&self, keys: I) -> Result<LeafAssignment>
    where
        I: IntoIterator<Item = &'a Key>,
    {
        let sorted: Vec<Key> = keys
            .into_iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if sorted.is_empty() {
            return Ok(LeafAssignment::default());
        }
        let header = self.header()?;
        let mut groups = vec![(PageId::ROOT, sorted)];
        for row in 0..header.row_count() - 1 {
            let ids: Vec<PageId> = groups.iter().map(|(id, _)| *id).collect();
            let nodes = self.reader.read_nodes(header, &ids)?;
            let child_row = header.row_range(row + 1);
            let mut next = Vec::with_capacity(groups.len());
            for (id, keys) in groups {
                let internal = nodes
                    .get(&id)
                    .cloned()
                    .ok_or(IndexError::Corruption("descent lost a page"))?
                    .into_internal()?;
                let first = internal.offset().0;
                let last = first
                    .checked_add(internal.keys().len() as u64)
                    .ok_or(IndexError::Corruption("internal node children overflow page ids"))?;
                if first < child_row.start || last >= child_row.end {
                    return Err(IndexError::Corruption("internal node children outside next row"));
                }
                next.extend(internal.route(&keys));
            }
            tracing::trace!(
                target: "refgraph::search",
                row = row + 1,
                pages = next.len(),
                "descended one row"
            );
            groups = next;
        }
        let ids: Vec<PageId> = groups.iter().map(|(id, _)| *id).collect();
        let mut nodes = BTreeMap::new();
        for (id, node) in self.reader.read_nodes(header, &ids)? {
            nodes.insert(id, node.into_leaf()?);
        }
        Ok(LeafAssignment {
            nodes,
            assignment: groups,
        })
    }

    /// Entries for the keys that are present, sorted by key.
    pub fn iter_entries<'a, I>(&self, keys: I) -> Result<Vec<IndexEntry>>
    where
        I: IntoIterator<Item = &'a Key>,
    {
        if self.key_count()? == 0 {
            return Ok(Vec::new());
        }
        let located = self.locate_leaves(keys)?;
        let mut out = Vec::new();
        for (id, keys) in &located.assignment {
            let leaf = located
                .nodes
                .get(id)
                .ok_or(IndexError::Corruption("descent lost a leaf"))?;
            out.extend(keys.iter().filter_map(|key| leaf.entry(key)));
        }
        Ok(out)
    }

    /// Every entry in key order.
    pub fn iter_all_entries(&self) -> Result<Vec<IndexEntry>> {
        let header = self.header()?;
        let mut out = Vec::with_capacity(usize::try_from(header.key_count).unwrap_or(0));
        for id in header.leaf_range() {
            let leaf = self.read_leaf(header, PageId(id))?;
            out.extend(leaf.iter().map(|(key, entry)| IndexEntry {
                key: key.clone(),
                value: entry.value.clone(),
                ref_lists: entry.ref_lists.clone(),
            }));
        }
        Ok(out)
    }

    /// Entries whose key begins with `prefix`, in key order.
    pub fn iter_entries_prefix(&self, prefix: &[Bytes]) -> Result<Vec<IndexEntry>> {
        let header = self.header()?;
        if prefix.is_empty() || prefix.len() > header.key_elements {
            return Err(IndexError::InvalidArgument(format!(
                "prefix of {} elements for keys of {} elements",
                prefix.len(),
                header.key_elements
            )));
        }
        if header.key_count == 0 {
            return Ok(Vec::new());
        }
        let start = Key::new(prefix.iter().cloned());
        let located = self.locate_leaves(std::iter::once(&start))?;
        let first = located
            .assignment
            .first()
            .map(|(id, _)| id.0)
            .ok_or(IndexError::Corruption("descent lost a leaf"))?;
        let mut out = Vec::new();
        for id in first..header.leaf_range().end {
            let leaf = self.read_leaf(header, PageId(id))?;
            for (key, entry) in leaf.iter_from(&start) {
                if !key.starts_with(prefix) {
                    return Ok(out);
                }
                out.push(IndexEntry {
                    key: key.clone(),
                    value: entry.value.clone(),
                    ref_lists: entry.ref_lists.clone(),
                });
            }
        }
        Ok(out)
    }

    /// Keys referenced through `ref_list_num` that have no entry of their own.
    pub fn external_references(&self, ref_list_num: usize) -> Result<BTreeSet<Key>> {
        let header = self.check_ref_list(ref_list_num)?;
        let mut present = BTreeSet::new();
        let mut referenced = BTreeSet::new();
        for id in header.leaf_range() {
            let leaf = self.read_leaf(header, PageId(id))?;
            for (key, entry) in leaf.iter() {
                present.insert(key.clone());
                if let Some(list) = entry.ref_lists.get(ref_list_num) {
                    referenced.extend(list.iter().cloned());
                }
            }
        }
        Ok(referenced.difference(&present).cloned().collect())
    }

    /// Reads every page and checks the structural invariants of the tree:
    /// page kinds per row, entry ordering across leaves, disjoint leaf
    /// ranges, the header's key count, and that every leaf bound routes back
    /// to its own leaf.
    pub fn validate(&self) -> Result<()> {
        let header = self.header()?;
        let all: Vec<PageId> = (0..header.page_count()).map(PageId).collect();
        let nodes = self.reader.read_nodes(header, &all)?;
        let mut entries = 0u64;
        let mut previous_max: Option<Key> = None;
        let mut expected: HashMap<Key, PageId> = HashMap::new();
        for id in header.leaf_range() {
            let leaf = nodes
                .get(&PageId(id))
                .cloned()
                .ok_or(IndexError::Corruption("validation lost a page"))?
                .into_leaf()?;
            entries += leaf.len() as u64;
            let Some(bounds) = leaf.bounds() else {
                continue;
            };
            if previous_max.as_ref().is_some_and(|max| *max >= bounds.min_key) {
                return Err(IndexError::Corruption("leaf ranges overlap or are out of order"));
            }
            previous_max = Some(bounds.max_key.clone());
            expected.insert(bounds.min_key.clone(), PageId(id));
            expected.insert(bounds.max_key.clone(), PageId(id));
        }
        if entries != header.key_count {
            return Err(IndexError::Corruption("key count disagrees with leaf entries"));
        }
        let located = self.locate_leaves(expected.keys())?;
        for (id, keys) in &located.assignment {
            if keys.iter().any(|key| expected.get(key) != Some(id)) {
                return Err(IndexError::Corruption("leaf bound routes to a different leaf"));
            }
        }
        tracing::debug!(
            target: "refgraph::read",
            pages = header.page_count(),
            entries,
            "index validated"
        );
        Ok(())
    }

    /// Single-index ancestry: resolves `keys` and every ancestor reachable
    /// through `ref_list_num`.
    pub fn find_ancestry<'a, I>(&self, keys: I, ref_list_num: usize) -> Result<super::Ancestry>
    where
        I: IntoIterator<Item = &'a Key>,
    {
        super::combined::resolve_ancestry(std::slice::from_ref(self), keys, ref_list_num)
    }

    /// Drops every cached node. The index header stays loaded.
    pub fn clear_cache(&self) {
        self.reader.cache().clear();
    }

    /// Cached (leaf, internal) node counts.
    pub fn cached_nodes(&self) -> (usize, usize) {
        self.reader.cache().len()
    }

    /// Live read statistics.
    pub fn stats(&self) -> &IndexStats {
        &self.stats
    }

    /// Point-in-time copy of the read statistics.
    pub fn stats_snapshot(&self) -> IndexStatsSnapshot {
        self.stats.snapshot()
    }

    /// Emits the read statistics through `tracing`.
    pub fn emit_stats(&self) {
        self.stats.emit_tracing();
    }

    fn read_leaf(&self, header: &IndexHeader, id: PageId) -> Result<Arc<LeafNode>> {
        self.reader
            .read_nodes(header, &[id])?
            .remove(&id)
            .ok_or(IndexError::Corruption("read lost a page"))?
            .into_leaf()
    }
}
