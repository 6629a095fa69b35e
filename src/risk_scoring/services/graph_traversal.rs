use crate::risk_scoring::domain::PackageVersionId;
use crate::shared::error::ScanError;
use petgraph::algo::condensation;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use petgraph::Direction;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Dependency graph over package version ids.
///
/// Nodes live in a flat arena indexed by id and edges point from a parent to
/// the package it depends on. Self-loops are dropped on construction and
/// parallel edges collapse into one.
#[derive(Debug, Clone, Default)]
pub struct DependencyDigraph {
    graph: DiGraph<PackageVersionId, ()>,
    index_by_id: HashMap<PackageVersionId, NodeIndex>,
}

impl DependencyDigraph {
    pub fn new(
        nodes: impl IntoIterator<Item = PackageVersionId>,
        edges: impl IntoIterator<Item = (PackageVersionId, PackageVersionId)>,
    ) -> Self {
        let mut digraph = Self::default();
        for id in nodes {
            digraph.add_node(id);
        }
        for (parent, child) in edges {
            if parent == child {
                warn!(node = %parent, "dropping self-loop dependency edge");
                continue;
            }
            let parent_index = digraph.add_node(parent);
            let child_index = digraph.add_node(child);
            digraph.graph.update_edge(parent_index, child_index, ());
        }
        digraph
    }

    fn add_node(&mut self, id: PackageVersionId) -> NodeIndex {
        if let Some(&index) = self.index_by_id.get(&id) {
            return index;
        }
        let index = self.graph.add_node(id);
        self.index_by_id.insert(id, index);
        index
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, id: PackageVersionId) -> bool {
        self.index_by_id.contains_key(&id)
    }

    /// Direct dependencies of `id`, sorted by id.
    pub fn dependencies_of(&self, id: PackageVersionId) -> Vec<PackageVersionId> {
        let Some(&index) = self.index_by_id.get(&id) else {
            return Vec::new();
        };
        let mut dependencies: Vec<_> = self
            .graph
            .neighbors_directed(index, Direction::Outgoing)
            .map(|neighbor| self.graph[neighbor])
            .collect();
        dependencies.sort();
        dependencies
    }

    /// Number of distinct packages reachable from `id`, excluding `id` itself.
    pub fn descendant_count(&self, id: PackageVersionId) -> usize {
        let Some(&start) = self.index_by_id.get(&id) else {
            return 0;
        };
        let mut dfs = Dfs::new(&self.graph, start);
        let mut reached = 0;
        while let Some(index) = dfs.next(&self.graph) {
            if index != start {
                reached += 1;
            }
        }
        reached
    }

    /// Groups nodes into batches that can be visited leaf-first.
    ///
    /// Strongly connected components are collapsed first, so the batches
    /// come from an acyclic condensation. The first batch holds the members
    /// of every sink component. Each later batch holds the members of the
    /// components whose dependencies all sit in earlier batches. All members
    /// of one cycle land in the same batch. Ids within a batch are sorted.
    ///
    /// # Errors
    /// Returns [`ScanError::EmptyGraph`] when the graph has no nodes.
    pub fn outer_in_batches(&self) -> Result<Vec<Vec<PackageVersionId>>, ScanError> {
        if self.graph.node_count() == 0 {
            return Err(ScanError::EmptyGraph {
                graph: "dependency digraph with no nodes".to_string(),
            });
        }

        let condensed = condensation(self.graph.clone(), true);
        debug!(
            nodes = self.graph.node_count(),
            components = condensed.node_count(),
            "condensed dependency graph"
        );

        let mut pending_dependencies: Vec<usize> = condensed
            .node_indices()
            .map(|component| {
                condensed
                    .neighbors_directed(component, Direction::Outgoing)
                    .count()
            })
            .collect();

        let mut frontier: Vec<NodeIndex> = condensed
            .node_indices()
            .filter(|component| pending_dependencies[component.index()] == 0)
            .collect();

        let mut batches = Vec::new();
        let mut visited_components = 0;

        while !frontier.is_empty() {
            let mut batch: Vec<PackageVersionId> = frontier
                .iter()
                .flat_map(|&component| condensed[component].iter().copied())
                .collect();
            batch.sort();
            visited_components += frontier.len();

            let mut next = Vec::new();
            for &component in &frontier {
                for dependent in condensed.neighbors_directed(component, Direction::Incoming) {
                    let pending = &mut pending_dependencies[dependent.index()];
                    *pending -= 1;
                    if *pending == 0 {
                        next.push(dependent);
                    }
                }
            }

            batches.push(batch);
            frontier = next;
        }

        if visited_components != condensed.node_count() {
            // Unreachable for an acyclic condensation
            return Err(ScanError::UnresolvedDependency {
                package: format!("{} components", condensed.node_count()),
                dependency: format!("{} visited", visited_components),
            });
        }

        Ok(batches)
    }
}
