// src/dag/waves.rs

//! Deterministic wave assignment.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::dag::DependencyGraph;

/// One dispatch wave. `number` is 1-based; `items` are sorted by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Wave {
    pub number: usize,
    pub items: Vec<String>,
}

/// Ordered waves of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct WavePlan {
    waves: Vec<Wave>,
}

impl WavePlan {
    pub fn waves(&self) -> &[Wave] {
        &self.waves
    }

    pub fn first(&self) -> Option<&Wave> {
        self.waves.first()
    }

    pub fn len(&self) -> usize {
        self.waves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waves.is_empty()
    }

    /// 1-based wave number of an item.
    pub fn wave_of(&self, id: &str) -> Option<usize> {
        self.waves
            .iter()
            .find(|w| w.items.iter().any(|i| i == id))
            .map(|w| w.number)
    }

    pub fn item_count(&self) -> usize {
        self.waves.iter().map(|w| w.items.len()).sum()
    }
}

/// Peel the graph into waves.
///
/// In-degree counts only predecessors that are leaf-dispatchable graph
/// nodes. Each round takes the whole zero-in-degree frontier (sorted) as the
/// next wave and releases its dependents. Nodes on a cycle are never
/// released, so callers must reject cyclic graphs first.
pub fn compute_waves(graph: &DependencyGraph) -> WavePlan {
    let is_leaf = |id: &str| graph.item_type_of(id).is_some_and(|t| t.is_leaf());

    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
    for id in graph.items().filter(|id| is_leaf(*id)) {
        let count = graph
            .dependencies_of(id)
            .iter()
            .filter(|dep| is_leaf(dep.as_str()))
            .count();
        in_degree.insert(id, count);
    }

    let mut frontier: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| *id)
        .collect();

    let mut waves = Vec::new();
    while !frontier.is_empty() {
        let current: Vec<&str> = frontier.iter().copied().collect();
        frontier.clear();

        for id in &current {
            in_degree.remove(id);
            for dependent in graph.dependents_of(id) {
                if let Some(d) = in_degree.get_mut(dependent.as_str()) {
                    *d = d.saturating_sub(1);
                    if *d == 0 {
                        frontier.insert(dependent.as_str());
                    }
                }
            }
        }

        waves.push(Wave {
            number: waves.len() + 1,
            items: current.into_iter().map(str::to_string).collect(),
        });
    }

    WavePlan { waves }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::ItemDescriptor;
    use crate::store::DepEdge;
    use crate::types::{DepType, ItemType};

    fn item(id: &str, item_type: ItemType, blocked_by: &[&str]) -> ItemDescriptor {
        ItemDescriptor {
            id: id.to_string(),
            title: id.to_string(),
            item_type,
            deps: blocked_by
                .iter()
                .map(|b| DepEdge::new(id, *b, DepType::Blocks))
                .collect(),
        }
    }

    fn plan(descriptors: &[ItemDescriptor]) -> Vec<Vec<String>> {
        let (graph, cycles) = DependencyGraph::build(descriptors);
        assert!(cycles.is_empty());
        compute_waves(&graph)
            .waves()
            .iter()
            .map(|w| w.items.clone())
            .collect()
    }

    #[test]
    fn chain_yields_one_item_per_wave() {
        let waves = plan(&[
            item("c", ItemType::Task, &["b"]),
            item("a", ItemType::Task, &[]),
            item("b", ItemType::Bug, &["a"]),
        ]);
        assert_eq!(waves, vec![vec!["a"], vec!["b"], vec!["c"]]);
    }

    #[test]
    fn diamond_sorts_within_wave() {
        let waves = plan(&[
            item("top", ItemType::Task, &[]),
            item("right", ItemType::Task, &["top"]),
            item("left", ItemType::Feature, &["top"]),
            item("bottom", ItemType::Chore, &["left", "right"]),
        ]);
        assert_eq!(
            waves,
            vec![vec!["top"], vec!["left", "right"], vec!["bottom"]]
        );
    }

    #[test]
    fn containers_never_land_in_a_wave() {
        let waves = plan(&[
            item("epic", ItemType::Epic, &[]),
            item("a", ItemType::Task, &["epic"]),
        ]);
        assert_eq!(waves, vec![vec!["a"]]);
    }

    #[test]
    fn wave_lookup() {
        let (graph, _) = DependencyGraph::build(&[
            item("a", ItemType::Task, &[]),
            item("b", ItemType::Task, &["a"]),
        ]);
        let plan = compute_waves(&graph);
        assert_eq!(plan.wave_of("b"), Some(2));
        assert_eq!(plan.wave_of("zz"), None);
        assert_eq!(plan.item_count(), 2);
    }
}
