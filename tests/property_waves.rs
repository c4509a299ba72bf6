// tests/property_waves.rs

use std::collections::{BTreeMap, HashSet};

use proptest::prelude::*;

use convoy::dag::{compute_waves, DependencyGraph, ItemDescriptor};
use convoy::store::DepEdge;
use convoy::types::{DepType, ItemType};

// Acyclic by construction: item N only depends on items 0..N-1.
// Edge kinds are mixed so non-blocking edges are exercised too.
fn batch_strategy(max_items: usize) -> impl Strategy<Value = Vec<ItemDescriptor>> {
    (1..=max_items).prop_flat_map(|count| {
        proptest::collection::vec(
            proptest::collection::vec((any::<usize>(), 0..4u8), 0..count),
            count,
        )
        .prop_map(move |raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, potential)| {
                    let mut seen = HashSet::new();
                    let deps = potential
                        .into_iter()
                        .filter(|_| i > 0)
                        .map(|(dep, kind)| (dep % i, kind))
                        .filter(|pair| seen.insert(*pair))
                        .map(|(dep, kind)| {
                            let dep_type = match kind {
                                0 => DepType::Blocks,
                                1 => DepType::WaitsFor,
                                2 => DepType::Related,
                                _ => DepType::ParentChild,
                            };
                            DepEdge::new(format!("gt-{i:02}"), format!("gt-{dep:02}"), dep_type)
                        })
                        .collect();
                    ItemDescriptor {
                        id: format!("gt-{i:02}"),
                        title: format!("item {i}"),
                        item_type: ItemType::Task,
                        deps,
                    }
                })
                .collect()
        })
    })
}

proptest! {
    #[test]
    fn waves_respect_blocking_edges(batch in batch_strategy(12)) {
        let (graph, cycles) = DependencyGraph::build(&batch);
        prop_assert!(cycles.is_empty());

        let plan = compute_waves(&graph);
        let mut wave_of: BTreeMap<String, usize> = BTreeMap::new();
        for wave in plan.waves() {
            prop_assert!(!wave.items.is_empty());
            for id in &wave.items {
                prop_assert!(wave_of.insert(id.clone(), wave.number).is_none(), "{} placed twice", id);
            }
        }
        prop_assert_eq!(wave_of.len(), batch.len());

        for d in &batch {
            for edge in d.deps.iter().filter(|e| e.dep_type.is_execution_relevant()) {
                prop_assert!(
                    wave_of[&edge.target] < wave_of[&d.id],
                    "{} (wave {}) must come after {} (wave {})",
                    d.id, wave_of[&d.id], edge.target, wave_of[&edge.target]
                );
            }
        }

        // Every item outside wave 1 waits on something in the previous wave.
        for d in &batch {
            let wave = wave_of[&d.id];
            if wave > 1 {
                let has_prev = graph
                    .dependencies_of(&d.id)
                    .iter()
                    .any(|dep| wave_of[dep] == wave - 1);
                prop_assert!(has_prev, "{} could have been scheduled earlier", d.id);
            }
        }
    }

    #[test]
    fn planning_is_deterministic(batch in batch_strategy(10)) {
        let (graph, _) = DependencyGraph::build(&batch);
        let mut reversed = batch.clone();
        reversed.reverse();
        let (graph_rev, _) = DependencyGraph::build(&reversed);
        prop_assert_eq!(compute_waves(&graph), compute_waves(&graph_rev));
    }
}
