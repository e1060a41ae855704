//! Ancestor resolution against a single index.
//!
//! A leaf's bounds decide what can be concluded without further I/O: a
//! parent inside `[min_key, max_key]` that is not on the leaf cannot be
//! anywhere else in the index, so it is missing; a parent outside the bounds
//! has to be looked up through another descent.

use super::key::{Key, KeySet, ParentMap};
use super::node::{LeafNode, Placement};
use super::tree::GraphIndex;
use crate::types::{IndexError, Result};

impl GraphIndex {
    /// Resolves `keys` and as many of their ancestors as the leaves holding
    /// them can answer.
    ///
    /// Found keys are recorded in `parent_map` with their `ref_list_num`
    /// list. Keys proven absent from this index are added to `missing_keys`.
    /// The returned keys are parents that live outside every leaf read by
    /// this call; feed them back in to continue the walk.
    ///
    /// Fails with [`IndexError::InvalidRefList`] before touching either
    /// accumulator when `ref_list_num` is out of range. A corrupt page also
    /// leaves both accumulators unchanged.
    pub fn find_ancestors<'a, I>(
        &self,
        keys: I,
        ref_list_num: usize,
        parent_map: &mut ParentMap,
        missing_keys: &mut KeySet,
    ) -> Result<KeySet>
    where
        I: IntoIterator<Item = &'a Key>,
    {
        let header = self.check_ref_list(ref_list_num)?;
        self.stats().inc_ancestry_calls();
        let keys: Vec<&Key> = keys
            .into_iter()
            .filter(|key| !parent_map.contains_key(*key))
            .collect();
        if header.key_count == 0 {
            missing_keys.extend(keys.into_iter().cloned());
            return Ok(KeySet::new());
        }
        let located = self.locate_leaves(keys)?;
        let mut parents_not_on_page = KeySet::new();
        let mut resolved_on_page = 0u64;
        for (id, queried) in &located.assignment {
            let leaf = located
                .nodes
                .get(id)
                .ok_or(IndexError::Corruption("descent lost a leaf"))?;
            resolved_on_page += resolve_leaf(
                leaf,
                queried,
                ref_list_num,
                parent_map,
                missing_keys,
                &mut parents_not_on_page,
            );
        }
        self.stats().add_on_page_resolutions(resolved_on_page);
        let search_keys: KeySet = parents_not_on_page
            .into_iter()
            .filter(|key| !parent_map.contains_key(key) && !missing_keys.contains(key))
            .collect();
        tracing::trace!(
            target: "refgraph::ancestry",
            leaves = located.assignment.len(),
            resolved_on_page,
            search_keys = search_keys.len(),
            "resolved keys against leaves"
        );
        Ok(search_keys)
    }
}

/// Resolves `queried` and their ancestors against one leaf without I/O.
///
/// Returns how many parents were found on the leaf itself.
pub(crate) fn resolve_leaf(
    leaf: &LeafNode,
    queried: &[Key],
    ref_list_num: usize,
    parent_map: &mut ParentMap,
    missing_keys: &mut KeySet,
    parents_not_on_page: &mut KeySet,
) -> u64 {
    let mut to_check: Vec<Key> = Vec::new();
    for key in queried {
        if parent_map.contains_key(key) {
            continue;
        }
        match parents_of(leaf, key, ref_list_num) {
            Some(parents) => {
                to_check.extend(parents.iter().cloned());
                parent_map.insert(key.clone(), parents);
            }
            None => {
                missing_keys.insert(key.clone());
            }
        }
    }
    let mut resolved = 0;
    while let Some(parent) = to_check.pop() {
        if parent_map.contains_key(&parent) || missing_keys.contains(&parent) {
            continue;
        }
        match leaf.placement(&parent) {
            Placement::Present => {
                let parents = parents_of(leaf, &parent, ref_list_num).unwrap_or_default();
                to_check.extend(parents.iter().cloned());
                parent_map.insert(parent, parents);
                resolved += 1;
            }
            Placement::Missing => {
                missing_keys.insert(parent);
            }
            Placement::OffPage => {
                parents_not_on_page.insert(parent);
            }
        }
    }
    resolved
}

/// The selected ref list of `key`, if the key is on the leaf.
fn parents_of(leaf: &LeafNode, key: &Key, ref_list_num: usize) -> Option<Vec<Key>> {
    leaf.get(key)
        .map(|entry| entry.ref_lists.get(ref_list_num).cloned().unwrap_or_default())
}
