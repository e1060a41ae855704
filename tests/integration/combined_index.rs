#![allow(missing_docs)]

use std::sync::Arc;

use refgraph::{
    index::{BuilderOptions, CombinedIndex, GraphIndex, IndexBuilder, Key, KeySet},
    types::{IndexError, Result},
};

fn k(s: &str) -> Key {
    Key::from_slices([s])
}

fn build(entries: &[(&'static str, &'static str, &[&'static str])]) -> Result<Arc<GraphIndex>> {
    let mut builder = IndexBuilder::new(1, 1);
    for (key, value, parents) in entries {
        builder.add_node(k(key), *value, vec![parents.iter().map(|p| k(p)).collect()])?;
    }
    Ok(Arc::new(GraphIndex::from_pages(builder.finish()?)))
}

#[test]
fn parent_held_by_earlier_index_is_found_in_a_later_pass() -> Result<()> {
    // A lacks K; B holds K whose parent P lives only in A.
    let a = build(&[("a0", "", &[]), ("p", "", &["a0"])])?;
    let b = build(&[("k", "", &["p"]), ("zz", "", &[])])?;
    let combined = CombinedIndex::new(vec![a, b]);

    let ancestry = combined.find_ancestry([&k("k")], 0)?;
    assert!(ancestry.missing_keys.is_empty());
    assert_eq!(ancestry.parent_map[&k("k")], vec![k("p")]);
    assert_eq!(ancestry.parent_map[&k("p")], vec![k("a0")]);
    assert!(ancestry.parent_map.contains_key(&k("a0")));
    Ok(())
}

#[test]
fn only_keys_missing_everywhere_are_missing() -> Result<()> {
    let a = build(&[("a", "", &["ghost"]), ("c", "", &[])])?;
    let b = build(&[("b", "", &["a", "c"]), ("x", "", &["b", "gone"])])?;
    let combined = CombinedIndex::new(vec![a, b]);

    let (parents, missing) = combined.find_ancestry([&k("x"), &k("nowhere")], 0)?.into_parts();
    let found: KeySet = parents.keys().cloned().collect();
    let expected: KeySet = ["a", "b", "c", "x"].into_iter().map(Key::from).collect();
    assert_eq!(found, expected);
    let expected_missing: KeySet = ["ghost", "gone", "nowhere"]
        .into_iter()
        .map(Key::from)
        .collect();
    assert_eq!(missing, expected_missing);
    Ok(())
}

#[test]
fn precedence_decides_duplicate_entries() -> Result<()> {
    let first = build(&[("dup", "first", &[]), ("only-first", "1", &[])])?;
    let second = build(&[("dup", "second", &["only-first"]), ("only-second", "2", &[])])?;
    let combined = CombinedIndex::new(vec![first, second]);

    let entries = combined.iter_entries([&k("dup"), &k("only-second"), &k("absent")])?;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].key, k("dup"));
    assert_eq!(&entries[0].value[..], b"first");

    let all = combined.iter_all_entries()?;
    assert_eq!(all.len(), 3);
    assert_eq!(&all[0].value[..], b"first");

    let parents = combined.get_parent_map([&k("dup"), &k("absent")])?;
    assert_eq!(parents.len(), 1);
    assert_eq!(parents[&k("dup")], Vec::<Key>::new());

    assert_eq!(combined.key_count()?, 4);
    combined.validate()?;
    Ok(())
}

#[test]
fn insert_index_changes_precedence() -> Result<()> {
    let low = build(&[("dup", "low", &[])])?;
    let high = build(&[("dup", "high", &[])])?;
    let mut combined = CombinedIndex::new(vec![low]);
    combined.insert_index(0, high)?;
    assert_eq!(combined.len(), 2);
    let entries = combined.iter_entries([&k("dup")])?;
    assert_eq!(&entries[0].value[..], b"high");

    let extra = build(&[])?;
    assert!(matches!(
        combined.insert_index(5, extra),
        Err(IndexError::InvalidArgument(_))
    ));
    Ok(())
}

#[test]
fn no_indices_means_everything_is_missing() -> Result<()> {
    let combined = CombinedIndex::default();
    assert!(combined.is_empty());
    let (parents, missing) = combined.find_ancestry([&k("a"), &k("b")], 0)?.into_parts();
    assert!(parents.is_empty());
    assert_eq!(missing.len(), 2);
    Ok(())
}

#[test]
fn invalid_ref_list_propagates() -> Result<()> {
    let combined = CombinedIndex::new(vec![build(&[("a", "", &[])])?]);
    assert!(matches!(
        combined.find_ancestry([&k("a")], 1),
        Err(IndexError::InvalidRefList {
            requested: 1,
            available: 1
        })
    ));
    Ok(())
}

#[test]
fn multi_page_indices_interleave() -> Result<()> {
    // Even revisions in one index, odd in the other; each names its predecessor.
    let opts = BuilderOptions::default().page_size(512);
    let mut even = IndexBuilder::with_options(1, 1, opts.clone());
    let mut odd = IndexBuilder::with_options(1, 1, opts);
    let rev = |i: u32| Key::from_slices([format!("rev-{i:04}").as_bytes()]);
    for i in 0..400u32 {
        let parents = if i == 0 { vec![] } else { vec![rev(i - 1)] };
        let target = if i % 2 == 0 { &mut even } else { &mut odd };
        target.add_node(rev(i), "", vec![parents])?;
    }
    let combined = CombinedIndex::new(vec![
        Arc::new(GraphIndex::from_pages(even.finish()?)),
        Arc::new(GraphIndex::from_pages(odd.finish()?)),
    ]);
    let ancestry = combined.find_ancestry([&rev(399)], 0)?;
    assert_eq!(ancestry.parent_map.len(), 400);
    assert!(ancestry.missing_keys.is_empty());
    Ok(())
}
