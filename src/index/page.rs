//! On-disk page codec for index nodes.
//!
//! Every page is a fixed [`PAGE_HDR_LEN`]-byte header followed by a payload.
//! Page 0 is the root and its payload starts with the [`IndexHeader`], which
//! carries the row layout and the per-index constants needed to parse every
//! other page.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;

use bytes::Bytes;

use super::key::Key;
use super::node::{InternalNode, KeyBounds, LeafEntry, LeafNode, Node};
use crate::primitives::bytes::{buf::Cursor, var};
use crate::types::{
    checksum::page_crc32,
    page::{PageHeader, PageKind, FLAG_INDEX_HEADER, PAGE_HDR_LEN},
    IndexError, PageId, Result,
};

/// Upper bound on the number of rows (tree height) an index may declare.
pub const MAX_ROWS: usize = 12;

/// Upper bound on the encoded size of an [`IndexHeader`].
pub const MAX_INDEX_HEADER_LEN: usize = 10 * (4 + MAX_ROWS);

/// Per-index constants and row layout, stored at the front of page 0.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexHeader {
    /// Number of ref lists attached to every key.
    pub node_ref_lists: usize,
    /// Number of elements in every key.
    pub key_elements: usize,
    /// Total number of entries across all leaves.
    pub key_count: u64,
    /// Pages per row, root row first, leaf row last.
    pub row_lengths: Vec<u64>,
}

impl IndexHeader {
    /// Checks the layout is a plausible tree: one root, non-shrinking rows.
    pub fn validate(&self) -> Result<()> {
        if self.key_elements == 0 {
            return Err(IndexError::Corruption("index declares zero key elements"));
        }
        if self.row_lengths.is_empty() || self.row_lengths.len() > MAX_ROWS {
            return Err(IndexError::Corruption("index row count out of range"));
        }
        if self.row_lengths[0] != 1 {
            return Err(IndexError::Corruption("root row must hold exactly one page"));
        }
        if self.row_lengths.windows(2).any(|w| w[1] < w[0]) {
            return Err(IndexError::Corruption("index rows shrink towards the leaves"));
        }
        self.row_lengths
            .iter()
            .try_fold(0u64, |total, len| total.checked_add(*len))
            .ok_or(IndexError::Corruption("index page count overflows"))?;
        Ok(())
    }

    /// Number of rows (tree height).
    pub fn row_count(&self) -> usize {
        self.row_lengths.len()
    }

    /// Page id range occupied by `row`.
    pub fn row_range(&self, row: usize) -> Range<u64> {
        let start: u64 = self.row_lengths[..row].iter().sum();
        start..start + self.row_lengths[row]
    }

    /// Page id range of the leaf row.
    pub fn leaf_range(&self) -> Range<u64> {
        self.row_range(self.row_count() - 1)
    }

    /// Total pages in the index.
    pub fn page_count(&self) -> u64 {
        self.row_lengths.iter().sum()
    }

    /// Row holding `page`, if the page exists.
    pub fn row_of(&self, page: PageId) -> Option<usize> {
        let mut start = 0u64;
        for (row, len) in self.row_lengths.iter().enumerate() {
            if page.0 < start + len {
                return Some(row);
            }
            start += len;
        }
        None
    }

    fn encode(&self, out: &mut Vec<u8>) {
        var::encode_u64(self.node_ref_lists as u64, out);
        var::encode_u64(self.key_elements as u64, out);
        var::encode_u64(self.key_count, out);
        var::encode_u64(self.row_lengths.len() as u64, out);
        for len in &self.row_lengths {
            var::encode_u64(*len, out);
        }
    }

    fn decode(cursor: &mut Cursor<'_>) -> Result<Self> {
        let node_ref_lists = to_usize(cursor.varint()?)?;
        let key_elements = to_usize(cursor.varint()?)?;
        let key_count = cursor.varint()?;
        let rows = cursor.count()?;
        if rows > MAX_ROWS {
            return Err(IndexError::Corruption("index row count out of range"));
        }
        let mut row_lengths = Vec::with_capacity(rows);
        for _ in 0..rows {
            row_lengths.push(cursor.varint()?);
        }
        let header = Self {
            node_ref_lists,
            key_elements,
            key_count,
            row_lengths,
        };
        header.validate()?;
        Ok(header)
    }
}

fn to_usize(value: u64) -> Result<usize> {
    usize::try_from(value).map_err(|_| IndexError::Corruption("header field overflow"))
}

/// Appends the encoded form of `key`.
pub fn encode_key(key: &Key, out: &mut Vec<u8>) {
    var::encode_u64(key.len() as u64, out);
    for element in key.elements() {
        var::encode_u64(element.len() as u64, out);
        out.extend_from_slice(element);
    }
}

/// Encoded size of `key`.
pub fn key_encoded_len(key: &Key) -> usize {
    var::encoded_len(key.len() as u64)
        + key
            .elements()
            .iter()
            .map(|e| var::encoded_len(e.len() as u64) + e.len())
            .sum::<usize>()
}

/// Encoded size of one leaf entry.
pub fn entry_encoded_len(key: &Key, entry: &LeafEntry) -> usize {
    key_encoded_len(key)
        + var::encoded_len(entry.value.len() as u64)
        + entry.value.len()
        + var::encoded_len(entry.ref_lists.len() as u64)
        + entry
            .ref_lists
            .iter()
            .map(|list| {
                var::encoded_len(list.len() as u64)
                    + list.iter().map(key_encoded_len).sum::<usize>()
            })
            .sum::<usize>()
}

fn decode_key(cursor: &mut Cursor<'_>, payload: &Bytes, key_elements: usize) -> Result<Key> {
    let n = cursor.count()?;
    if n != key_elements {
        return Err(IndexError::Corruption("key width disagrees with index header"));
    }
    let mut elements = Vec::with_capacity(n);
    for _ in 0..n {
        let element = cursor.len_prefixed()?;
        let end = cursor.off;
        elements.push(payload.slice(end - element.len()..end));
    }
    Ok(Key::new(elements))
}

/// Encodes a complete page (header and payload) for `node` at `page_no`.
///
/// `index_header` must be supplied for page 0 and only for page 0.
pub fn encode_page(
    page_no: PageId,
    node: &Node,
    index_header: Option<&IndexHeader>,
) -> Result<Vec<u8>> {
    if (page_no == PageId::ROOT) != index_header.is_some() {
        return Err(IndexError::Invalid(
            "index header belongs on page 0 and only on page 0",
        ));
    }
    let mut payload = Vec::new();
    let mut flags = 0u8;
    if let Some(header) = index_header {
        header.encode(&mut payload);
        flags |= FLAG_INDEX_HEADER;
    }
    let kind = match node {
        Node::Leaf(leaf) => {
            encode_leaf_body(leaf, &mut payload);
            PageKind::Leaf
        }
        Node::Internal(internal) => {
            encode_internal_body(internal, &mut payload);
            PageKind::Internal
        }
    };
    let payload_len = u32::try_from(payload.len())
        .map_err(|_| IndexError::Invalid("page payload larger than 4GiB"))?;
    let header = PageHeader {
        kind,
        flags,
        payload_len,
        crc32: page_crc32(page_no.0, kind.as_u8(), flags, &payload),
    };
    let mut page = vec![0u8; PAGE_HDR_LEN];
    header.encode(&mut page)?;
    page.extend_from_slice(&payload);
    Ok(page)
}

fn encode_leaf_body(leaf: &LeafNode, out: &mut Vec<u8>) {
    var::encode_u64(leaf.len() as u64, out);
    if let (false, Some(bounds)) = (leaf.is_empty(), leaf.bounds()) {
        encode_key(&bounds.min_key, out);
        encode_key(&bounds.max_key, out);
    }
    for (key, entry) in leaf.iter() {
        encode_key(key, out);
        var::encode_u64(entry.value.len() as u64, out);
        out.extend_from_slice(&entry.value);
        var::encode_u64(entry.ref_lists.len() as u64, out);
        for list in &entry.ref_lists {
            var::encode_u64(list.len() as u64, out);
            for reference in list {
                encode_key(reference, out);
            }
        }
    }
}

fn encode_internal_body(node: &InternalNode, out: &mut Vec<u8>) {
    var::encode_u64(node.offset().0, out);
    var::encode_u64(node.keys().len() as u64, out);
    for key in node.keys() {
        encode_key(key, out);
    }
}

/// A decoded page: the node plus, for page 0, the index header.
#[derive(Clone, Debug)]
pub struct DecodedPage {
    /// Present only on page 0.
    pub index_header: Option<IndexHeader>,
    /// The parsed node.
    pub node: Node,
}

/// Decodes the page at `page_no`.
///
/// For page 0 the schema comes from the page's own index header and `schema`
/// is ignored; every other page needs the index header read from page 0.
pub fn decode_page(
    page_no: PageId,
    raw: &Bytes,
    schema: Option<&IndexHeader>,
    verify_checksum: bool,
) -> Result<DecodedPage> {
    let header = PageHeader::decode(raw)?;
    let payload = raw.slice(PAGE_HDR_LEN..PAGE_HDR_LEN + header.payload_len as usize);
    if verify_checksum {
        let expected = page_crc32(page_no.0, header.kind.as_u8(), header.flags, &payload);
        if expected != header.crc32 {
            return Err(IndexError::Corruption("page checksum mismatch"));
        }
    }
    let has_index_header = header.flags & FLAG_INDEX_HEADER != 0;
    if has_index_header != (page_no == PageId::ROOT) {
        return Err(IndexError::Corruption("index header flag on wrong page"));
    }
    let mut cursor = Cursor::new(&payload);
    let own_header = if has_index_header {
        Some(IndexHeader::decode(&mut cursor)?)
    } else {
        None
    };
    let schema = match (&own_header, schema) {
        (Some(own), _) => own,
        (None, Some(schema)) => schema,
        (None, None) => {
            return Err(IndexError::Invalid("non-root page decoded without index header"))
        }
    };
    let node = match header.kind {
        PageKind::Leaf => Node::Leaf(Arc::new(decode_leaf_body(&mut cursor, &payload, schema)?)),
        PageKind::Internal => Node::Internal(Arc::new(decode_internal_body(
            &mut cursor,
            &payload,
            schema,
        )?)),
    };
    if !cursor.is_exhausted() {
        return Err(IndexError::Corruption("trailing bytes after node payload"));
    }
    Ok(DecodedPage {
        index_header: own_header,
        node,
    })
}

fn decode_leaf_body(
    cursor: &mut Cursor<'_>,
    payload: &Bytes,
    schema: &IndexHeader,
) -> Result<LeafNode> {
    let count = cursor.count()?;
    if count == 0 {
        return LeafNode::new(None, BTreeMap::new());
    }
    let bounds = KeyBounds {
        min_key: decode_key(cursor, payload, schema.key_elements)?,
        max_key: decode_key(cursor, payload, schema.key_elements)?,
    };
    let mut entries = BTreeMap::new();
    let mut previous: Option<Key> = None;
    for _ in 0..count {
        let key = decode_key(cursor, payload, schema.key_elements)?;
        if previous.as_ref().is_some_and(|prev| *prev >= key) {
            return Err(IndexError::Corruption("leaf entries out of order"));
        }
        let value_bytes = cursor.len_prefixed()?;
        let value = payload.slice(cursor.off - value_bytes.len()..cursor.off);
        let lists = cursor.count()?;
        if lists != schema.node_ref_lists {
            return Err(IndexError::Corruption(
                "ref list count disagrees with index header",
            ));
        }
        let mut ref_lists = Vec::with_capacity(lists);
        for _ in 0..lists {
            let refs = cursor.count()?;
            let mut list = Vec::with_capacity(refs);
            for _ in 0..refs {
                list.push(decode_key(cursor, payload, schema.key_elements)?);
            }
            ref_lists.push(list);
        }
        previous = Some(key.clone());
        entries.insert(key, LeafEntry { value, ref_lists });
    }
    LeafNode::new(Some(bounds), entries)
}

fn decode_internal_body(
    cursor: &mut Cursor<'_>,
    payload: &Bytes,
    schema: &IndexHeader,
) -> Result<InternalNode> {
    let offset = PageId(cursor.varint()?);
    let count = cursor.count()?;
    let mut keys = Vec::with_capacity(count);
    for _ in 0..count {
        keys.push(decode_key(cursor, payload, schema.key_elements)?);
    }
    InternalNode::new(offset, keys)
}
