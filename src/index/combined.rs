use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::key::{IndexEntry, Key, KeySet, ParentMap};
use super::tree::GraphIndex;
use crate::types::{IndexError, Result};

/// Outcome of an ancestry walk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ancestry {
    /// Every key found, mapped to its selected ref list.
    pub parent_map: ParentMap,
    /// Keys absent from every consulted index.
    pub missing_keys: KeySet,
}

impl Ancestry {
    /// Splits the result into `(parent_map, missing_keys)`.
    pub fn into_parts(self) -> (ParentMap, KeySet) {
        (self.parent_map, self.missing_keys)
    }
}

/// An ordered collection of indices queried as one.
///
/// Earlier indices take precedence: when several indices hold the same key,
/// the entry from the first one wins.
#[derive(Default)]
pub struct CombinedIndex {
    indices: Vec<Arc<GraphIndex>>,
}

impl CombinedIndex {
    /// Creates a combined index over `indices`, in precedence order.
    pub fn new(indices: Vec<Arc<GraphIndex>>) -> Self {
        Self { indices }
    }

    /// Inserts `index` at `pos` in the precedence order.
    pub fn insert_index(&mut self, pos: usize, index: Arc<GraphIndex>) -> Result<()> {
        if pos > self.indices.len() {
            return Err(IndexError::InvalidArgument(format!(
                "insert position {pos} beyond {} indices",
                self.indices.len()
            )));
        }
        self.indices.insert(pos, index);
        Ok(())
    }

    /// Number of member indices.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Returns true when there are no member indices.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Member indices in precedence order.
    pub fn indices(&self) -> &[Arc<GraphIndex>] {
        &self.indices
    }

    /// Resolves `keys` and all their ancestors through `ref_list_num`
    /// across every member index.
    ///
    /// A key is reported missing only once every index in a pass has failed
    /// to find it. Keys found in a later index may name parents held only by
    /// an earlier one, so passes repeat until nothing is left to look up.
    pub fn find_ancestry<'a, I>(&self, keys: I, ref_list_num: usize) -> Result<Ancestry>
    where
        I: IntoIterator<Item = &'a Key>,
    {
        resolve_ancestry(&self.indices, keys, ref_list_num)
    }

    /// Entries for the keys present in any index, sorted by key.
    pub fn iter_entries<'a, I>(&self, keys: I) -> Result<Vec<IndexEntry>>
    where
        I: IntoIterator<Item = &'a Key>,
    {
        let mut wanted: KeySet = keys.into_iter().cloned().collect();
        let mut found = BTreeMap::new();
        for index in &self.indices {
            if wanted.is_empty() {
                break;
            }
            for entry in index.iter_entries(&wanted)? {
                wanted.remove(&entry.key);
                found.insert(entry.key.clone(), entry);
            }
        }
        Ok(found.into_values().collect())
    }

    /// Every entry of every index in key order; duplicates resolve to the
    /// earliest index holding the key.
    pub fn iter_all_entries(&self) -> Result<Vec<IndexEntry>> {
        let mut found = BTreeMap::new();
        for index in &self.indices {
            for entry in index.iter_all_entries()? {
                found.entry(entry.key.clone()).or_insert(entry);
            }
        }
        Ok(found.into_values().collect())
    }

    /// One generation of parents (ref list 0) for the keys that are present.
    pub fn get_parent_map<'a, I>(&self, keys: I) -> Result<ParentMap>
    where
        I: IntoIterator<Item = &'a Key>,
    {
        let mut parent_map = ParentMap::new();
        for entry in self.iter_entries(keys)? {
            let parents = entry
                .ref_lists
                .into_iter()
                .next()
                .ok_or(IndexError::InvalidRefList {
                    requested: 0,
                    available: 0,
                })?;
            parent_map.insert(entry.key, parents);
        }
        Ok(parent_map)
    }

    /// Sum of the member indices' key counts.
    pub fn key_count(&self) -> Result<u64> {
        self.indices.iter().map(|index| index.key_count()).sum()
    }

    /// Validates every member index.
    pub fn validate(&self) -> Result<()> {
        self.indices.iter().try_for_each(|index| index.validate())
    }
}

/// Multi-pass ancestry walk over `indices` in precedence order.
pub(crate) fn resolve_ancestry<'a, G, I>(
    indices: &[G],
    keys: I,
    ref_list_num: usize,
) -> Result<Ancestry>
where
    G: Borrow<GraphIndex>,
    I: IntoIterator<Item = &'a Key>,
{
    let mut parent_map = ParentMap::new();
    let mut missing_keys = KeySet::new();
    let mut keys_to_lookup: KeySet = keys.into_iter().cloned().collect();
    if indices.is_empty() {
        return Ok(Ancestry {
            parent_map,
            missing_keys: keys_to_lookup,
        });
    }
    let mut pass = 0usize;
    while !keys_to_lookup.is_empty() {
        pass += 1;
        let mut all_index_missing: Option<KeySet> = None;
        for index in indices {
            let index = index.borrow();
            let mut index_missing = KeySet::new();
            let mut search_keys = std::mem::take(&mut keys_to_lookup);
            let mut generation = 0usize;
            while !search_keys.is_empty() {
                generation += 1;
                search_keys = index.find_ancestors(
                    &search_keys,
                    ref_list_num,
                    &mut parent_map,
                    &mut index_missing,
                )?;
            }
            tracing::trace!(
                target: "refgraph::ancestry",
                pass,
                generations = generation,
                missing = index_missing.len(),
                "index exhausted"
            );
            all_index_missing = Some(match all_index_missing {
                None => index_missing.clone(),
                Some(mut all) => {
                    all.retain(|key| index_missing.contains(key));
                    all
                }
            });
            keys_to_lookup = index_missing;
            if keys_to_lookup.is_empty() {
                break;
            }
        }
        if let Some(all_missing) = all_index_missing {
            keys_to_lookup.retain(|key| !all_missing.contains(key));
            missing_keys.extend(all_missing);
        }
        tracing::debug!(
            target: "refgraph::ancestry",
            pass,
            found = parent_map.len(),
            missing = missing_keys.len(),
            pending = keys_to_lookup.len(),
            "ancestry pass finished"
        );
    }
    Ok(Ancestry {
        parent_map,
        missing_keys,
    })
}
