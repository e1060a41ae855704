use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;

use super::key::{IndexEntry, Key};
use crate::types::{IndexError, PageId, Result};

/// Value and ref lists stored against a key on a leaf.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeafEntry {
    /// Opaque value bytes.
    pub value: Bytes,
    /// One list of referenced keys per declared ref list.
    pub ref_lists: Vec<Vec<Key>>,
}

/// Where a key stands relative to a loaded leaf.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Placement {
    /// The key is an entry on this leaf.
    Present,
    /// The key falls inside the leaf's bounds but is not on it, so it is
    /// absent from the whole index.
    Missing,
    /// The key falls outside the leaf's bounds; another leaf decides.
    OffPage,
}

/// Inclusive key range covered by a leaf.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyBounds {
    /// Smallest key that may live on the leaf.
    pub min_key: Key,
    /// Largest key that may live on the leaf.
    pub max_key: Key,
}

impl KeyBounds {
    /// Returns true when `key` lies in `[min_key, max_key]`.
    pub fn contains(&self, key: &Key) -> bool {
        *key >= self.min_key && *key <= self.max_key
    }

    /// Returns true when the two ranges share at least one key.
    pub fn overlaps(&self, other: &KeyBounds) -> bool {
        self.min_key <= other.max_key && other.min_key <= self.max_key
    }
}

/// A bottom-row page: sorted entries plus the bounds used for absence checks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeafNode {
    bounds: Option<KeyBounds>,
    entries: BTreeMap<Key, LeafEntry>,
}

impl LeafNode {
    /// Builds a leaf with explicit bounds. Every entry must fall inside them.
    pub fn new(bounds: Option<KeyBounds>, entries: BTreeMap<Key, LeafEntry>) -> Result<Self> {
        match &bounds {
            Some(b) => {
                if b.min_key > b.max_key {
                    return Err(IndexError::Corruption("leaf fences inverted"));
                }
                let in_range = entries.keys().all(|k| b.contains(k));
                if !in_range {
                    return Err(IndexError::Corruption("leaf entry outside fences"));
                }
            }
            None if !entries.is_empty() => {
                return Err(IndexError::Corruption("non-empty leaf without fences"));
            }
            None => {}
        }
        Ok(Self { bounds, entries })
    }

    /// Builds a leaf whose bounds are its first and last keys.
    pub fn from_entries(entries: BTreeMap<Key, LeafEntry>) -> Self {
        let bounds = match (entries.keys().next(), entries.keys().next_back()) {
            (Some(min), Some(max)) => Some(KeyBounds {
                min_key: min.clone(),
                max_key: max.clone(),
            }),
            _ => None,
        };
        Self { bounds, entries }
    }

    /// The leaf's inclusive bounds; `None` only for an empty leaf.
    pub fn bounds(&self) -> Option<&KeyBounds> {
        self.bounds.as_ref()
    }

    /// Lower bound of the leaf.
    pub fn min_key(&self) -> Option<&Key> {
        self.bounds.as_ref().map(|b| &b.min_key)
    }

    /// Upper bound of the leaf.
    pub fn max_key(&self) -> Option<&Key> {
        self.bounds.as_ref().map(|b| &b.max_key)
    }

    /// Looks up an entry.
    pub fn get(&self, key: &Key) -> Option<&LeafEntry> {
        self.entries.get(key)
    }

    /// Returns true when `key` is an entry on this leaf.
    pub fn contains(&self, key: &Key) -> bool {
        self.entries.contains_key(key)
    }

    /// Classifies `key` against this leaf alone.
    pub fn placement(&self, key: &Key) -> Placement {
        if self.entries.contains_key(key) {
            return Placement::Present;
        }
        match &self.bounds {
            Some(bounds) if bounds.contains(key) => Placement::Missing,
            _ => Placement::OffPage,
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true for a leaf with no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&Key, &LeafEntry)> + '_ {
        self.entries.iter()
    }

    /// Entries at or after `start`, in key order.
    pub fn iter_from<'a>(
        &'a self,
        start: &Key,
    ) -> impl Iterator<Item = (&'a Key, &'a LeafEntry)> + 'a {
        self.entries.range(start.clone()..)
    }

    /// Materializes the entry for `key`, if present.
    pub fn entry(&self, key: &Key) -> Option<IndexEntry> {
        self.entries.get_key_value(key).map(|(k, e)| IndexEntry {
            key: k.clone(),
            value: e.value.clone(),
            ref_lists: e.ref_lists.clone(),
        })
    }
}

/// An upper-row page routing keys to children by separator.
///
/// Child `i` is page `offset + i`; separator `i` is the smallest key of
/// child `i + 1`, so a node with `n` separators has `n + 1` children.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InternalNode {
    offset: PageId,
    keys: Vec<Key>,
}

impl InternalNode {
    /// Builds an internal node. Separators must be strictly ascending.
    pub fn new(offset: PageId, keys: Vec<Key>) -> Result<Self> {
        if keys.windows(2).any(|w| w[0] >= w[1]) {
            return Err(IndexError::Corruption("internal separators out of order"));
        }
        if offset.0.checked_add(keys.len() as u64).is_none() {
            return Err(IndexError::Corruption("internal node children overflow page ids"));
        }
        Ok(Self { offset, keys })
    }

    /// Page id of the first child.
    pub fn offset(&self) -> PageId {
        self.offset
    }

    /// Separator keys.
    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    /// Number of children.
    pub fn child_count(&self) -> u64 {
        self.keys.len() as u64 + 1
    }

    /// Smallest separator, a lower bound for every child but the first.
    pub fn min_key(&self) -> Option<&Key> {
        self.keys.first()
    }

    /// Largest separator, a lower bound for the last child.
    pub fn max_key(&self) -> Option<&Key> {
        self.keys.last()
    }

    /// Child whose range could contain `key`.
    pub fn child_for(&self, key: &Key) -> PageId {
        let pos = self.keys.partition_point(|sep| sep <= key);
        PageId(self.offset.0 + pos as u64)
    }

    /// Splits sorted `keys` into per-child groups, preserving order.
    pub fn route(&self, keys: &[Key]) -> Vec<(PageId, Vec<Key>)> {
        let mut out: Vec<(PageId, Vec<Key>)> = Vec::new();
        for key in keys {
            let child = self.child_for(key);
            match out.last_mut() {
                Some((last, group)) if *last == child => group.push(key.clone()),
                _ => out.push((child, vec![key.clone()])),
            }
        }
        out
    }
}

/// A parsed page of either kind.
#[derive(Clone, Debug)]
pub enum Node {
    /// Bottom-row page.
    Leaf(Arc<LeafNode>),
    /// Upper-row page.
    Internal(Arc<InternalNode>),
}

impl Node {
    /// Returns the leaf, or a corruption error for an internal node.
    pub fn into_leaf(self) -> Result<Arc<LeafNode>> {
        match self {
            Node::Leaf(leaf) => Ok(leaf),
            Node::Internal(_) => Err(IndexError::Corruption("expected leaf node in leaf row")),
        }
    }

    /// Returns the internal node, or a corruption error for a leaf.
    pub fn into_internal(self) -> Result<Arc<InternalNode>> {
        match self {
            Node::Internal(node) => Ok(node),
            Node::Leaf(_) => Err(IndexError::Corruption(
                "expected internal node above leaf row",
            )),
        }
    }

    /// Returns true for leaves.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }
}
