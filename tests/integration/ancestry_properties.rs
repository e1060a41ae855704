#![allow(missing_docs)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use refgraph::index::{
    BuilderOptions, CombinedIndex, GraphIndex, IndexBuilder, Key, KeySet, ParentMap,
};

fn rev(i: usize) -> Key {
    Key::from_slices([format!("rev-{i:05}").as_bytes()])
}

fn ghost(i: usize) -> Key {
    Key::from_slices([format!("ghost-{i:05}").as_bytes()])
}

struct Fixture {
    combined: CombinedIndex,
    graph: HashMap<Key, Vec<Key>>,
    queries: Vec<Key>,
}

/// Random DAG spread over one to three indices. Some parents point at keys
/// no index holds, and some entries are stored in more than one index.
fn fixture(nodes: usize, seed: u64) -> Fixture {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut graph = HashMap::new();
    for i in 0..nodes {
        let mut parents = Vec::new();
        for _ in 0..rng.gen_range(0..=3) {
            if i > 0 && rng.gen_bool(0.85) {
                parents.push(rev(rng.gen_range(0..i)));
            } else {
                parents.push(ghost(rng.gen_range(0..nodes * 2)));
            }
        }
        parents.dedup();
        graph.insert(rev(i), parents);
    }

    let index_count = rng.gen_range(1..=3);
    let mut builders: Vec<IndexBuilder> = (0..index_count)
        .map(|_| IndexBuilder::with_options(1, 1, BuilderOptions::default().page_size(512)))
        .collect();
    let mut keys: Vec<&Key> = graph.keys().collect();
    keys.sort();
    for key in keys {
        let home = rng.gen_range(0..index_count);
        let parents = graph[key].clone();
        builders[home].add_node(key.clone(), "", vec![parents.clone()]).unwrap();
        let copy = rng.gen_range(0..index_count);
        if copy != home && rng.gen_bool(0.1) {
            builders[copy].add_node(key.clone(), "", vec![parents]).unwrap();
        }
    }
    let indices = builders
        .into_iter()
        .map(|b| Arc::new(GraphIndex::from_pages(b.finish().unwrap())))
        .collect();

    let mut queries: Vec<Key> = (0..rng.gen_range(1..=4))
        .map(|_| rev(rng.gen_range(0..nodes)))
        .collect();
    if rng.gen_bool(0.3) {
        queries.push(ghost(nodes * 3));
    }
    Fixture {
        combined: CombinedIndex::new(indices),
        graph,
        queries,
    }
}

/// Breadth-first closure over the full graph.
fn naive_closure(graph: &HashMap<Key, Vec<Key>>, queries: &[Key]) -> (ParentMap, KeySet) {
    let mut parent_map = ParentMap::new();
    let mut missing = KeySet::new();
    let mut queue: VecDeque<Key> = queries.iter().cloned().collect();
    while let Some(key) = queue.pop_front() {
        if parent_map.contains_key(&key) || missing.contains(&key) {
            continue;
        }
        match graph.get(&key) {
            Some(parents) => {
                queue.extend(parents.iter().cloned());
                parent_map.insert(key, parents.clone());
            }
            None => {
                missing.insert(key);
            }
        }
    }
    (parent_map, missing)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn ancestry_matches_naive_closure(nodes in 1usize..160, seed in any::<u64>()) {
        let fx = fixture(nodes, seed);
        let ancestry = fx.combined.find_ancestry(&fx.queries, 0).unwrap();
        let (expected_parents, expected_missing) = naive_closure(&fx.graph, &fx.queries);
        prop_assert_eq!(&ancestry.parent_map, &expected_parents);
        prop_assert_eq!(&ancestry.missing_keys, &expected_missing);
    }

    #[test]
    fn ancestry_partitions_and_closes(nodes in 1usize..160, seed in any::<u64>()) {
        let fx = fixture(nodes, seed);
        let ancestry = fx.combined.find_ancestry(&fx.queries, 0).unwrap();
        for key in ancestry.parent_map.keys() {
            prop_assert!(!ancestry.missing_keys.contains(key));
        }
        for key in &fx.queries {
            prop_assert!(
                ancestry.parent_map.contains_key(key) ^ ancestry.missing_keys.contains(key)
            );
        }
        for parents in ancestry.parent_map.values() {
            for parent in parents {
                prop_assert!(
                    ancestry.parent_map.contains_key(parent)
                        || ancestry.missing_keys.contains(parent)
                );
            }
        }
        let again = fx.combined.find_ancestry(&fx.queries, 0).unwrap();
        prop_assert_eq!(again, ancestry);
    }

    #[test]
    fn every_index_validates(nodes in 1usize..200, seed in any::<u64>()) {
        let fx = fixture(nodes, seed);
        prop_assert!(fx.combined.validate().is_ok());
        let stored: KeySet = fx
            .combined
            .iter_all_entries()
            .unwrap()
            .into_iter()
            .map(|entry| entry.key)
            .collect();
        let expected: KeySet = fx.graph.keys().cloned().collect();
        prop_assert_eq!(stored, expected);
    }
}
