#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use refgraph::{
    index::{
        page::{encode_page, IndexHeader},
        GraphIndex, IndexBuilder, Key, KeyBounds, KeySet, LeafEntry, LeafNode, Node, ParentMap,
    },
    types::{IndexError, PageId, Result},
};

fn k(s: &str) -> Key {
    Key::from_slices([s])
}

fn keys(list: &[&'static str]) -> KeySet {
    list.iter().map(|s| Key::from(*s)).collect()
}

/// A single-leaf index whose leaf covers `[b, m]` but holds only `f`.
fn fenced_index(f_parents: &[&'static str]) -> Result<GraphIndex> {
    let mut entries = BTreeMap::new();
    entries.insert(
        k("f"),
        LeafEntry {
            value: Bytes::from_static(b"rev-f"),
            ref_lists: vec![f_parents.iter().map(|p| k(p)).collect()],
        },
    );
    let leaf = LeafNode::new(
        Some(KeyBounds {
            min_key: k("b"),
            max_key: k("m"),
        }),
        entries,
    )?;
    let header = IndexHeader {
        node_ref_lists: 1,
        key_elements: 1,
        key_count: 1,
        row_lengths: vec![1],
    };
    let page = encode_page(PageId::ROOT, &Node::Leaf(Arc::new(leaf)), Some(&header))?;
    Ok(GraphIndex::from_pages(vec![Bytes::from(page)]))
}

#[test]
fn parents_outside_leaf_bounds_are_returned_for_search() -> Result<()> {
    let index = fenced_index(&["a", "z"])?;
    let mut parent_map = ParentMap::new();
    let mut missing = KeySet::new();
    let search = index.find_ancestors([&k("f")], 0, &mut parent_map, &mut missing)?;

    assert_eq!(search, keys(&["a", "z"]));
    assert_eq!(parent_map.len(), 1);
    assert_eq!(parent_map[&k("f")], vec![k("a"), k("z")]);
    assert!(missing.is_empty());

    // Looked up directly, both land on the same leaf and are absent.
    let search = index.find_ancestors(&search, 0, &mut parent_map, &mut missing)?;
    assert!(search.is_empty());
    assert_eq!(missing, keys(&["a", "z"]));
    Ok(())
}

#[test]
fn parent_inside_leaf_bounds_is_missing_without_more_reads() -> Result<()> {
    let index = fenced_index(&["h"])?;
    let mut parent_map = ParentMap::new();
    let mut missing = KeySet::new();
    let search = index.find_ancestors([&k("f")], 0, &mut parent_map, &mut missing)?;

    assert!(search.is_empty());
    assert_eq!(missing, keys(&["h"]));
    assert_eq!(index.stats_snapshot().page_fetches, 1);
    Ok(())
}

#[test]
fn empty_index_reports_every_key_missing() -> Result<()> {
    let index = GraphIndex::from_pages(IndexBuilder::new(1, 1).finish()?);
    let mut parent_map = ParentMap::new();
    let mut missing = KeySet::new();
    let search = index.find_ancestors([&k("x"), &k("y")], 0, &mut parent_map, &mut missing)?;
    assert!(search.is_empty());
    assert!(parent_map.is_empty());
    assert_eq!(missing, keys(&["x", "y"]));

    let ancestry = index.find_ancestry([&k("x")], 0)?;
    assert!(ancestry.parent_map.is_empty());
    assert_eq!(ancestry.missing_keys, keys(&["x"]));
    Ok(())
}

#[test]
fn invalid_ref_list_leaves_accumulators_untouched() -> Result<()> {
    let index = fenced_index(&["a"])?;
    let mut parent_map = ParentMap::new();
    parent_map.insert(k("q"), vec![k("p")]);
    let mut missing = keys(&["r"]);
    let before = (parent_map.clone(), missing.clone());

    let err = index
        .find_ancestors([&k("f")], 1, &mut parent_map, &mut missing)
        .unwrap_err();
    assert!(matches!(
        err,
        IndexError::InvalidRefList {
            requested: 1,
            available: 1
        }
    ));
    assert_eq!((parent_map, missing), before);
    assert!(matches!(
        index.find_ancestry([&k("f")], 3),
        Err(IndexError::InvalidRefList { requested: 3, .. })
    ));
    Ok(())
}

#[test]
fn known_keys_are_skipped_and_never_reclassified() -> Result<()> {
    let index = fenced_index(&["a"])?;
    let mut parent_map = ParentMap::new();
    parent_map.insert(k("f"), vec![k("from-elsewhere")]);
    let mut missing = KeySet::new();
    let search = index.find_ancestors([&k("f")], 0, &mut parent_map, &mut missing)?;
    assert!(search.is_empty());
    assert_eq!(parent_map[&k("f")], vec![k("from-elsewhere")]);
    assert!(missing.is_empty());
    Ok(())
}

#[test]
fn ancestry_is_idempotent() -> Result<()> {
    let mut builder = IndexBuilder::new(1, 1);
    builder.add_node(k("a"), "", vec![vec![]])?;
    builder.add_node(k("b"), "", vec![vec![k("a")]])?;
    builder.add_node(k("c"), "", vec![vec![k("b"), k("ghost")]])?;
    builder.add_node(k("d"), "", vec![vec![k("c"), k("a")]])?;
    let index = GraphIndex::from_pages(builder.finish()?);

    let first = index.find_ancestry([&k("d"), &k("nope")], 0)?;
    let second = index.find_ancestry([&k("d"), &k("nope")], 0)?;
    assert_eq!(first, second);
    assert_eq!(first.parent_map.len(), 4);
    assert_eq!(first.missing_keys, keys(&["ghost", "nope"]));
    Ok(())
}

#[test]
fn second_ref_list_is_walked_independently() -> Result<()> {
    let mut builder = IndexBuilder::new(2, 1);
    builder.add_node(k("a"), "", vec![vec![], vec![]])?;
    builder.add_node(k("b"), "", vec![vec![k("a")], vec![]])?;
    builder.add_node(k("c"), "", vec![vec![k("b")], vec![k("a")]])?;
    let index = GraphIndex::from_pages(builder.finish()?);

    let (parents, missing) = index.find_ancestry([&k("c")], 1)?.into_parts();
    assert_eq!(parents.len(), 2);
    assert_eq!(parents[&k("c")], vec![k("a")]);
    assert!(!parents.contains_key(&k("b")));
    assert!(missing.is_empty());
    Ok(())
}
