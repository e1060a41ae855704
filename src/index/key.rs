use std::collections::{HashMap, HashSet};
use std::fmt;

use bytes::Bytes;
use smallvec::SmallVec;

/// An ordered tuple of opaque byte strings.
///
/// Keys compare element-wise by byte order, and a key that is a strict
/// prefix of another sorts first. Cloning is cheap: elements are
/// reference-counted [`Bytes`].
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Key(SmallVec<[Bytes; 2]>);

impl Key {
    /// Builds a key from its elements.
    pub fn new<I, B>(elements: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Key(elements.into_iter().map(Into::into).collect())
    }

    /// Builds a key by copying borrowed element slices.
    pub fn from_slices<I, S>(elements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        Key(elements
            .into_iter()
            .map(|e| Bytes::copy_from_slice(e.as_ref()))
            .collect())
    }

    /// The key's elements in order.
    pub fn elements(&self) -> &[Bytes] {
        &self.0
    }

    /// Number of elements in the key.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true for the zero-element key.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns true when the first `prefix.len()` elements equal `prefix`.
    pub fn starts_with(&self, prefix: &[Bytes]) -> bool {
        self.0.len() >= prefix.len() && self.0[..prefix.len()] == *prefix
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tuple = f.debug_tuple("");
        for element in &self.0 {
            tuple.field(&format_args!("\"{}\"", element.escape_ascii()));
        }
        tuple.finish()
    }
}

impl From<&'static str> for Key {
    fn from(value: &'static str) -> Self {
        Key::new([value])
    }
}

impl<const N: usize> From<[&'static str; N]> for Key {
    fn from(value: [&'static str; N]) -> Self {
        Key::new(value)
    }
}

impl From<Vec<Vec<u8>>> for Key {
    fn from(value: Vec<Vec<u8>>) -> Self {
        Key::new(value)
    }
}

/// Resolved key → selected ref list ("parents").
pub type ParentMap = HashMap<Key, Vec<Key>>;

/// An unordered set of keys.
pub type KeySet = HashSet<Key>;

/// A fully materialized index entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    /// The entry's key.
    pub key: Key,
    /// Opaque value bytes.
    pub value: Bytes,
    /// One list of referenced keys per ref list declared by the index.
    pub ref_lists: Vec<Vec<Key>>,
}
