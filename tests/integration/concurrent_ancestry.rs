#![allow(missing_docs)]

use std::sync::Arc;
use std::thread;

use refgraph::{
    index::{BuilderOptions, CombinedIndex, GraphIndex, IndexBuilder, IndexOptions, Key},
    types::Result,
};

const THREADS: usize = 8;
const ROUNDS: usize = 25;

fn rev(i: u32) -> Key {
    Key::from_slices([format!("rev-{i:05}").as_bytes()])
}

/// Linear history with a merge every tenth revision, one index per stripe.
fn striped_indices(stripes: u32, revisions: u32) -> Result<Vec<Arc<GraphIndex>>> {
    let opts = BuilderOptions::default().page_size(512);
    let mut builders: Vec<IndexBuilder> = (0..stripes)
        .map(|_| IndexBuilder::with_options(1, 1, opts.clone()))
        .collect();
    for i in 0..revisions {
        let mut parents = Vec::new();
        if i > 0 {
            parents.push(rev(i - 1));
        }
        if i % 10 == 9 {
            parents.push(rev(i / 2));
            parents.push(Key::from_slices([format!("ghost-{i}").as_bytes()]));
        }
        builders[(i % stripes) as usize].add_node(rev(i), "", vec![parents])?;
    }
    let leaf_cache = IndexOptions::default().leaf_cache_capacity(2);
    builders
        .into_iter()
        .map(|b| -> Result<Arc<GraphIndex>> {
            let pages = b.finish()?;
            Ok(Arc::new(GraphIndex::open(
                Arc::new(refgraph::index::MemPageSource::new(pages)),
                leaf_cache.clone(),
            )))
        })
        .collect()
}

#[test]
fn threads_sharing_one_index_agree_with_a_single_threaded_run() -> Result<()> {
    let index = striped_indices(1, 600)?.remove(0);
    let queries: Vec<Key> = (0..THREADS as u32).map(|t| rev(599 - t * 37)).collect();
    let expected: Vec<_> = queries
        .iter()
        .map(|q| index.find_ancestry([q], 0))
        .collect::<Result<_>>()?;
    index.clear_cache();

    thread::scope(|scope| {
        for (query, want) in queries.iter().zip(&expected) {
            let index = Arc::clone(&index);
            scope.spawn(move || {
                for _ in 0..ROUNDS {
                    let got = index.find_ancestry([query], 0).unwrap();
                    assert_eq!(&got, want);
                }
            });
        }
    });

    let (leaves, _) = index.cached_nodes();
    assert!(leaves <= 2);
    Ok(())
}

#[test]
fn threads_sharing_a_combined_index_agree_with_a_single_threaded_run() -> Result<()> {
    let combined = CombinedIndex::new(striped_indices(3, 450)?);
    let expected = combined.find_ancestry([&rev(449), &rev(123)], 0)?;
    assert!(!expected.missing_keys.is_empty());

    thread::scope(|scope| {
        for _ in 0..THREADS {
            scope.spawn(|| {
                for _ in 0..ROUNDS {
                    let got = combined.find_ancestry([&rev(449), &rev(123)], 0).unwrap();
                    assert_eq!(got, expected);
                }
            });
        }
    });
    Ok(())
}
