//! Dependency graph (DAG) construction and traversal
//!
//! Builds forward and reverse dependency graphs over node unique_ids.
//! Unknown ids are tolerated everywhere: they simply have no edges.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use crate::manifest::Manifest;

/// Node identifier (unique_id from manifest)
pub type NodeId = String;

/// Dependency graph with forward and reverse edges
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Forward edges: node -> nodes it depends on (parents)
    parents: BTreeMap<NodeId, BTreeSet<NodeId>>,

    /// Reverse edges: node -> nodes that depend on it (children)
    children: BTreeMap<NodeId, BTreeSet<NodeId>>,

    /// All nodes in the graph
    nodes: BTreeSet<NodeId>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from `(child, parent)` pairs
    pub fn from_edges<I, C, P>(edges: I) -> Self
    where
        I: IntoIterator<Item = (C, P)>,
        C: Into<NodeId>,
        P: Into<NodeId>,
    {
        let mut graph = Self::new();
        for (child, parent) in edges {
            graph.add_edge(child, parent);
        }
        graph
    }

    /// Build a dependency graph from the resolved dependencies of model nodes.
    ///
    /// Tests, seeds and other non-model nodes never contribute edges, so a
    /// model's children are always models.
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let mut graph = Self::new();

        for (node_id, node) in manifest.models() {
            graph.add_node(node_id);
            for dep_id in &node.depends_on.nodes {
                graph.add_edge(node_id, dep_id.as_str());
            }
        }

        for source_id in manifest.sources.keys() {
            graph.add_node(source_id.as_str());
        }

        graph
    }

    pub fn add_node(&mut self, node_id: impl Into<NodeId>) {
        self.nodes.insert(node_id.into());
    }

    /// Record that `child` depends on `parent`
    pub fn add_edge(&mut self, child: impl Into<NodeId>, parent: impl Into<NodeId>) {
        let child = child.into();
        let parent = parent.into();

        self.parents.entry(child.clone()).or_default().insert(parent.clone());
        self.children.entry(parent.clone()).or_default().insert(child.clone());
        self.nodes.insert(child);
        self.nodes.insert(parent);
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.contains(node_id)
    }

    /// Get all nodes in the graph
    pub fn all_nodes(&self) -> Vec<&NodeId> {
        self.nodes.iter().collect()
    }

    /// Get immediate parents (dependencies) of a node
    pub fn parents(&self, node_id: &str) -> BTreeSet<&str> {
        Self::neighbours(&self.parents, node_id)
    }

    /// Get immediate children (dependents) of a node
    pub fn children(&self, node_id: &str) -> BTreeSet<&str> {
        Self::neighbours(&self.children, node_id)
    }

    /// All upstream nodes, optionally limited to `max_depth` hops
    pub fn ancestors(&self, node_id: &str, max_depth: Option<usize>) -> BTreeSet<&str> {
        Self::traverse(&self.parents, node_id, max_depth)
    }

    /// All downstream nodes, optionally limited to `max_depth` hops
    ///
    /// Unbounded, this is the "blast radius" - all models affected if this node changes.
    pub fn descendants(&self, node_id: &str, max_depth: Option<usize>) -> BTreeSet<&str> {
        Self::traverse(&self.children, node_id, max_depth)
    }

    /// Check if there's a path from source to target
    pub fn has_path(&self, source: &str, target: &str) -> bool {
        self.descendants(source, None).contains(target)
    }

    fn neighbours<'a>(edges: &'a BTreeMap<NodeId, BTreeSet<NodeId>>, node_id: &str) -> BTreeSet<&'a str> {
        edges
            .get(node_id)
            .map(|ids| ids.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Breadth-first walk along `edges`, excluding the start node
    fn traverse<'a>(
        edges: &'a BTreeMap<NodeId, BTreeSet<NodeId>>,
        node_id: &str,
        max_depth: Option<usize>,
    ) -> BTreeSet<&'a str> {
        let mut visited: BTreeSet<&'a str> = BTreeSet::new();
        let mut queue: VecDeque<(&'a str, usize)> = VecDeque::new();

        if let Some(first) = edges.get(node_id) {
            for next in first {
                queue.push_back((next.as_str(), 1));
            }
        }

        while let Some((current, depth)) = queue.pop_front() {
            if max_depth.is_some_and(|limit| depth > limit) {
                continue;
            }
            if current == node_id || !visited.insert(current) {
                continue;
            }

            if let Some(next_nodes) = edges.get(current) {
                for next in next_nodes {
                    if !visited.contains(next.as_str()) {
                        queue.push_back((next.as_str(), depth + 1));
                    }
                }
            }
        }

        visited
    }

    /// Topological order, parents before children.
    ///
    /// On a cycle, returns the nodes that could not be ordered.
    pub fn topological_sort(&self) -> Result<Vec<NodeId>, Vec<NodeId>> {
        let mut in_degree: BTreeMap<&str, usize> = self
            .nodes
            .iter()
            .map(|node| (node.as_str(), self.parents.get(node).map_or(0, BTreeSet::len)))
            .collect();

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(node, _)| *node)
            .collect();

        let mut result = Vec::with_capacity(self.nodes.len());

        // Kahn's algorithm
        while let Some(node) = queue.pop_front() {
            result.push(node.to_string());

            if let Some(children) = self.children.get(node) {
                for child in children {
                    if let Some(degree) = in_degree.get_mut(child.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(child.as_str());
                        }
                    }
                }
            }
        }

        if result.len() == self.nodes.len() {
            Ok(result)
        } else {
            let ordered: BTreeSet<&str> = result.iter().map(String::as_str).collect();
            Err(self
                .nodes
                .iter()
                .filter(|node| !ordered.contains(node.as_str()))
                .cloned()
                .collect())
        }
    }
}
