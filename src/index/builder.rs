use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;

use super::key::Key;
use super::node::{InternalNode, LeafEntry, LeafNode, Node};
use super::options::BuilderOptions;
use super::page::{
    encode_page, entry_encoded_len, key_encoded_len, IndexHeader, MAX_INDEX_HEADER_LEN, MAX_ROWS,
};
use super::source::MemPageSource;
use crate::primitives::io::{FileIo, StdFileIo};
use crate::types::{
    page::{MIN_PAGE_SIZE, PAGE_HDR_LEN},
    IndexError, PageId, Result,
};

/// Room for the entry or separator count and the first-child offset.
const NODE_OVERHEAD: usize = 20;

/// Bulk-loads sorted entries into an immutable paged index.
///
/// Entries may be added in any order. [`IndexBuilder::finish`] packs them
/// into leaves of at most `page_size` bytes, builds the internal rows above
/// them, and lays every row out root first.
pub struct IndexBuilder {
    node_ref_lists: usize,
    key_elements: usize,
    options: BuilderOptions,
    entries: BTreeMap<Key, LeafEntry>,
}

impl IndexBuilder {
    /// Starts an index whose keys have `key_elements` elements and carry
    /// `node_ref_lists` ref lists.
    pub fn new(node_ref_lists: usize, key_elements: usize) -> Self {
        Self::with_options(node_ref_lists, key_elements, BuilderOptions::default())
    }

    /// Like [`IndexBuilder::new`] with explicit options.
    pub fn with_options(
        node_ref_lists: usize,
        key_elements: usize,
        options: BuilderOptions,
    ) -> Self {
        Self {
            node_ref_lists,
            key_elements,
            options,
            entries: BTreeMap::new(),
        }
    }

    /// Number of entries added so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no entries were added.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Adds one entry.
    pub fn add_node(
        &mut self,
        key: Key,
        value: impl Into<Bytes>,
        ref_lists: Vec<Vec<Key>>,
    ) -> Result<()> {
        if key.len() != self.key_elements {
            return Err(IndexError::InvalidArgument(format!(
                "key {key:?} has {} elements, index keys have {}",
                key.len(),
                self.key_elements
            )));
        }
        if ref_lists.len() != self.node_ref_lists {
            return Err(IndexError::InvalidArgument(format!(
                "key {key:?} has {} ref lists, index declares {}",
                ref_lists.len(),
                self.node_ref_lists
            )));
        }
        if let Some(bad) = ref_lists.iter().flatten().find(|r| r.len() != self.key_elements) {
            return Err(IndexError::InvalidArgument(format!(
                "reference {bad:?} from {key:?} has {} elements, index keys have {}",
                bad.len(),
                self.key_elements
            )));
        }
        if self.entries.contains_key(&key) {
            return Err(IndexError::InvalidArgument(format!("duplicate key {key:?}")));
        }
        self.entries.insert(
            key,
            LeafEntry {
                value: value.into(),
                ref_lists,
            },
        );
        Ok(())
    }

    /// Encodes the index into pages, page 0 first.
    pub fn finish(self) -> Result<Vec<Bytes>> {
        if self.key_elements == 0 {
            return Err(IndexError::Invalid("index keys need at least one element"));
        }
        if self.options.page_size < MIN_PAGE_SIZE {
            return Err(IndexError::Invalid("page size below minimum"));
        }
        let budget = self.options.page_size as usize - PAGE_HDR_LEN - MAX_INDEX_HEADER_LEN;
        let key_count = self.entries.len() as u64;

        let leaves = pack_leaves(self.entries, budget)?;
        let mut first_keys: Vec<Option<Key>> =
            leaves.iter().map(|leaf| leaf.min_key().cloned()).collect();
        // Rows bottom-up; internal nodes hold child positions relative to the row below.
        let mut internal_rows: Vec<Vec<(usize, Vec<Key>)>> = Vec::new();
        let mut width = leaves.len();
        while width > 1 {
            let row = pack_internal_row(&first_keys, budget)?;
            first_keys = row
                .iter()
                .map(|(first_child, _)| first_keys[*first_child].clone())
                .collect();
            width = row.len();
            internal_rows.push(row);
            if internal_rows.len() + 1 > MAX_ROWS {
                return Err(IndexError::InvalidArgument(format!(
                    "index would need more than {MAX_ROWS} rows at page size {}",
                    self.options.page_size
                )));
            }
        }

        let mut row_lengths: Vec<u64> =
            internal_rows.iter().rev().map(|row| row.len() as u64).collect();
        row_lengths.push(leaves.len() as u64);
        let header = IndexHeader {
            node_ref_lists: self.node_ref_lists,
            key_elements: self.key_elements,
            key_count,
            row_lengths,
        };
        header.validate()?;

        let mut pages = Vec::with_capacity(header.page_count() as usize);
        for (depth, row) in internal_rows.iter().rev().enumerate() {
            let child_start = header.row_range(depth + 1).start;
            for (first_child, separators) in row {
                let offset = PageId(child_start + *first_child as u64);
                let node = InternalNode::new(offset, separators.clone())?;
                pages.push(Node::Internal(Arc::new(node)));
            }
        }
        pages.extend(leaves.into_iter().map(|leaf| Node::Leaf(Arc::new(leaf))));

        let encoded = pages
            .iter()
            .enumerate()
            .map(|(i, node)| {
                let id = PageId(i as u64);
                let index_header = (id == PageId::ROOT).then_some(&header);
                encode_page(id, node, index_header).map(Bytes::from)
            })
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(
            target: "refgraph::build",
            key_count,
            pages = encoded.len(),
            rows = header.row_count(),
            "built index"
        );
        Ok(encoded)
    }

    /// Encodes the index and wraps the pages in a [`MemPageSource`].
    pub fn finish_to_source(self) -> Result<MemPageSource> {
        Ok(MemPageSource::new(self.finish()?))
    }

    /// Writes the index to `path` as fixed-size page slots and returns the
    /// number of pages written.
    pub fn finish_to_file(self, path: impl AsRef<Path>) -> Result<u64> {
        let page_size = self.options.page_size as usize;
        let pages = self.finish()?;
        let io = StdFileIo::create(path)?;
        let mut slot = vec![0u8; page_size];
        for (i, page) in pages.iter().enumerate() {
            if page.len() > page_size {
                return Err(IndexError::Invalid("encoded page exceeds page size"));
            }
            slot.fill(0);
            slot[..page.len()].copy_from_slice(page);
            io.write_at((i * page_size) as u64, &slot)?;
        }
        io.sync_all()?;
        Ok(pages.len() as u64)
    }
}

/// Greedily fills leaves in key order. Each leaf's fences are its first and
/// last keys.
fn pack_leaves(entries: BTreeMap<Key, LeafEntry>, budget: usize) -> Result<Vec<LeafNode>> {
    let mut leaves = Vec::new();
    let mut current: BTreeMap<Key, LeafEntry> = BTreeMap::new();
    let mut first_key_len = 0usize;
    let mut used = 0usize;
    for (key, entry) in entries {
        let entry_len = entry_encoded_len(&key, &entry);
        let key_len = key_encoded_len(&key);
        if NODE_OVERHEAD + 2 * key_len + entry_len > budget {
            return Err(IndexError::InvalidArgument(format!(
                "entry {key:?} of {entry_len} bytes does not fit a page"
            )));
        }
        if !current.is_empty()
            && NODE_OVERHEAD + first_key_len + key_len + used + entry_len > budget
        {
            leaves.push(LeafNode::from_entries(std::mem::take(&mut current)));
            used = 0;
        }
        if current.is_empty() {
            first_key_len = key_len;
        }
        used += entry_len;
        current.insert(key, entry);
    }
    if !current.is_empty() || leaves.is_empty() {
        leaves.push(LeafNode::from_entries(current));
    }
    Ok(leaves)
}

/// Groups the children of one row under parents. Returns, per parent, the
/// position of its first child and its separators.
fn pack_internal_row(first_keys: &[Option<Key>], budget: usize) -> Result<Vec<(usize, Vec<Key>)>> {
    let mut row: Vec<(usize, Vec<Key>)> = Vec::new();
    let mut separators: Vec<Key> = Vec::new();
    let mut first_child = 0usize;
    let mut used = NODE_OVERHEAD;
    for (pos, first_key) in first_keys.iter().enumerate().skip(1) {
        let separator = first_key
            .clone()
            .ok_or(IndexError::Invalid("empty child below an internal node"))?;
        let len = key_encoded_len(&separator);
        if used + len > budget {
            if separators.is_empty() {
                return Err(IndexError::InvalidArgument(format!(
                    "separator {separator:?} does not fit a page"
                )));
            }
            row.push((first_child, std::mem::take(&mut separators)));
            first_child = pos;
            used = NODE_OVERHEAD;
            continue;
        }
        used += len;
        separators.push(separator);
    }
    row.push((first_child, separators));
    Ok(row)
}
