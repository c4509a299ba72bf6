// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;
use serde::Serialize;

use crate::store::DepEdge;
use crate::types::ItemType;

/// Everything the graph builder needs to know about one work item.
#[derive(Debug, Clone)]
pub struct ItemDescriptor {
    pub id: String,
    pub title: String,
    pub item_type: ItemType,
    /// Outgoing edges (`id` depends on `edge.target`), of any type.
    pub deps: Vec<DepEdge>,
}

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone)]
struct DagNode {
    title: String,
    item_type: ItemType,
    /// Execution-relevant predecessors inside the graph, sorted.
    deps: Vec<String>,
    /// Items inside the graph that wait on this one, sorted.
    dependents: Vec<String>,
}

/// A dependency cycle among execution-relevant edges.
///
/// `path` lists the cycle in dependency order: `path[0]` waits on `path[1]`,
/// and so on, with the last element waiting on `path[0]`. That closing edge
/// (`item` waits on `blocked_by`) is the one to remove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleError {
    pub item: String,
    pub blocked_by: String,
    pub path: Vec<String>,
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut chain = self.path.join(" -> ");
        if let Some(first) = self.path.first() {
            chain.push_str(" -> ");
            chain.push_str(first);
        }
        write!(
            f,
            "dependency cycle {chain}; remove the edge {} -> {}",
            self.item, self.blocked_by
        )
    }
}

/// Execution-order graph over the leaf-dispatchable items of a batch.
///
/// Only `blocks`, `conditional-blocks` and `waits-for` edges between items
/// that are both in the batch become graph edges. Containers, membership,
/// hierarchy and informational links never do.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeMap<String, DagNode>,
}

impl DependencyGraph {
    /// Build the graph and run cycle detection.
    ///
    /// Pure: no store access, no logging side effects on the inputs.
    pub fn build(descriptors: &[ItemDescriptor]) -> (Self, Vec<CycleError>) {
        let mut nodes: BTreeMap<String, DagNode> = BTreeMap::new();

        // First pass: leaf nodes only.
        for d in descriptors.iter().filter(|d| d.item_type.is_leaf()) {
            nodes.insert(
                d.id.clone(),
                DagNode {
                    title: d.title.clone(),
                    item_type: d.item_type.clone(),
                    deps: Vec::new(),
                    dependents: Vec::new(),
                },
            );
        }

        // Second pass: execution-relevant edges whose both ends are nodes.
        let mut edges: BTreeSet<(String, String)> = BTreeSet::new();
        for d in descriptors.iter().filter(|d| nodes.contains_key(&d.id)) {
            for edge in &d.deps {
                if edge.dep_type.is_execution_relevant() && nodes.contains_key(&edge.target) {
                    edges.insert((d.id.clone(), edge.target.clone()));
                }
            }
        }

        for (item, dep) in &edges {
            if let Some(node) = nodes.get_mut(item) {
                node.deps.push(dep.clone());
            }
            if let Some(node) = nodes.get_mut(dep) {
                node.dependents.push(item.clone());
            }
        }

        let graph = Self { nodes };
        let cycles = graph.find_cycles();
        (graph, cycles)
    }

    /// All node ids, sorted.
    pub fn items(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn title_of(&self, id: &str) -> Option<&str> {
        self.nodes.get(id).map(|n| n.title.as_str())
    }

    pub fn item_type_of(&self, id: &str) -> Option<&ItemType> {
        self.nodes.get(id).map(|n| &n.item_type)
    }

    /// Immediate execution-relevant predecessors of an item.
    pub fn dependencies_of(&self, id: &str) -> &[String] {
        self.nodes
            .get(id)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Items that wait on this one.
    pub fn dependents_of(&self, id: &str) -> &[String] {
        self.nodes
            .get(id)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.deps.len()).sum()
    }

    fn find_cycles(&self) -> Vec<CycleError> {
        // Edge direction: item -> what it waits on.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for (id, node) in &self.nodes {
            graph.add_node(id.as_str());
            for dep in &node.deps {
                graph.add_edge(id.as_str(), dep.as_str(), ());
            }
        }

        let mut cycles = Vec::new();
        for component in tarjan_scc(&graph) {
            let is_cycle = component.len() > 1
                || component
                    .first()
                    .is_some_and(|&n| graph.contains_edge(n, n));
            if !is_cycle {
                continue;
            }

            let members: HashSet<&str> = component.iter().copied().collect();
            if let Some(start) = component.iter().min() {
                if let Some(path) = self.cycle_path(start, &members) {
                    let item = path.last().cloned().unwrap_or_default();
                    cycles.push(CycleError {
                        item,
                        blocked_by: start.to_string(),
                        path,
                    });
                }
            }
        }

        cycles.sort_by(|a, b| a.blocked_by.cmp(&b.blocked_by));
        cycles
    }

    /// Depth-first walk from `start` (alphabetical neighbour order, staying
    /// inside the component) until an edge leads back to `start`.
    fn cycle_path(&self, start: &str, members: &HashSet<&str>) -> Option<Vec<String>> {
        let mut path: Vec<&str> = vec![start];
        let mut cursors: Vec<usize> = vec![0];
        let mut visited: HashSet<&str> = HashSet::from([start]);

        while let Some(&current) = path.last() {
            let deps = self.dependencies_of(current);
            let cursor = cursors.last_mut()?;

            if *cursor >= deps.len() {
                path.pop();
                cursors.pop();
                continue;
            }

            let next = deps[*cursor].as_str();
            *cursor += 1;

            if next == start {
                return Some(path.iter().map(|s| s.to_string()).collect());
            }
            if members.contains(next) && visited.insert(next) {
                path.push(next);
                cursors.push(0);
            }
        }

        None
    }
}
