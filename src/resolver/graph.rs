//! ResolvedGraph - the dependency graph produced by one framework walk.
//!
//! Nodes are keyed by lowercased library name; a name appears at most once.
//! Edges keep declaration order so flattening is deterministic.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::core::library::{LibraryDescription, LibraryType};
use crate::walk::{WalkProvider, WalkProviderMatch};

/// Per-node and per-walk progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkState {
    Pending,
    Walking,
    Resolved,
    Unresolved,
    Cyclic,
}

/// A package found through a walk provider, kept so it can be installed.
#[derive(Clone)]
pub struct RemoteMatch {
    pub provider: Arc<dyn WalkProvider>,
    pub matched: WalkProviderMatch,
}

impl fmt::Debug for RemoteMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteMatch")
            .field("provider", &self.provider.name())
            .field("matched", &self.matched)
            .finish()
    }
}

/// A library in the graph.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub description: Arc<LibraryDescription>,
    pub remote: Option<RemoteMatch>,
    pub state: WalkState,
}

impl GraphNode {
    pub fn new(description: Arc<LibraryDescription>, remote: Option<RemoteMatch>) -> Self {
        GraphNode {
            description,
            remote,
            state: WalkState::Pending,
        }
    }

    pub fn name(&self) -> &str {
        self.description.name()
    }

    pub fn is_package(&self) -> bool {
        self.description.library_type() == LibraryType::Package
    }
}

/// The resolved graph for one (framework, runtime) pair.
#[derive(Debug, Clone, Default)]
pub struct ResolvedGraph {
    graph: DiGraph<GraphNode, ()>,
    name_to_node: HashMap<String, NodeIndex>,
    root: Option<NodeIndex>,
}

impl ResolvedGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node unless one with the same name exists. The first node
    /// added becomes the root.
    pub fn add_node(&mut self, node: GraphNode) -> NodeIndex {
        let key = node.name().to_ascii_lowercase();
        if let Some(&existing) = self.name_to_node.get(&key) {
            return existing;
        }

        let index = self.graph.add_node(node);
        self.name_to_node.insert(key, index);
        if self.root.is_none() {
            self.root = Some(index);
        }
        index
    }

    /// Add a dependency edge between named nodes.
    pub fn add_edge(&mut self, from: &str, to: &str) {
        if let (Some(&from), Some(&to)) = (
            self.name_to_node.get(&from.to_ascii_lowercase()),
            self.name_to_node.get(&to.to_ascii_lowercase()),
        ) {
            if !self.graph.contains_edge(from, to) {
                self.graph.add_edge(from, to, ());
            }
        }
    }

    /// Update a node's walk state.
    pub fn set_state(&mut self, name: &str, state: WalkState) {
        if let Some(&index) = self.name_to_node.get(&name.to_ascii_lowercase()) {
            self.graph[index].state = state;
        }
    }

    /// The root node, normally the project being restored.
    pub fn root(&self) -> Option<&GraphNode> {
        self.root.map(|index| &self.graph[index])
    }

    /// Get a node by name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&GraphNode> {
        self.name_to_node
            .get(&name.to_ascii_lowercase())
            .map(|&index| &self.graph[index])
    }

    /// Check if a library is in the graph.
    pub fn contains(&self, name: &str) -> bool {
        self.name_to_node.contains_key(&name.to_ascii_lowercase())
    }

    /// Direct dependencies, in declaration order.
    pub fn dependencies(&self, name: &str) -> Vec<&GraphNode> {
        self.neighbors(name, Direction::Outgoing)
    }

    /// Libraries that depend on the given one.
    pub fn dependents(&self, name: &str) -> Vec<&GraphNode> {
        self.neighbors(name, Direction::Incoming)
    }

    fn neighbors(&self, name: &str, direction: Direction) -> Vec<&GraphNode> {
        let Some(&index) = self.name_to_node.get(&name.to_ascii_lowercase()) else {
            return Vec::new();
        };
        // petgraph yields the most recently added edge first.
        let mut nodes: Vec<&GraphNode> = self
            .graph
            .neighbors_directed(index, direction)
            .map(|n| &self.graph[n])
            .collect();
        nodes.reverse();
        nodes
    }

    /// Every non-root library: depth-first from the root in declaration
    /// order, then anything unreachable sorted by name.
    pub fn libraries(&self) -> Vec<&GraphNode> {
        let mut visited = HashSet::new();
        let mut order = Vec::new();

        if let Some(root) = self.root {
            visited.insert(root);
            let mut stack: Vec<NodeIndex> = self.ordered_children(root).into_iter().rev().collect();
            while let Some(index) = stack.pop() {
                if !visited.insert(index) {
                    continue;
                }
                order.push(&self.graph[index]);
                stack.extend(self.ordered_children(index).into_iter().rev());
            }
        }

        let mut rest: Vec<&GraphNode> = self
            .graph
            .node_indices()
            .filter(|index| !visited.contains(index))
            .map(|index| &self.graph[index])
            .collect();
        rest.sort_by_key(|node| node.name().to_ascii_lowercase());
        order.extend(rest);
        order
    }

    fn ordered_children(&self, index: NodeIndex) -> Vec<NodeIndex> {
        let mut children: Vec<NodeIndex> = self.graph.neighbors(index).collect();
        children.reverse();
        children
    }

    /// Number of libraries, root included.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Whether any dependency chain loops.
    pub fn has_cycle(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::library::{LibraryIdentity, LibraryRange};
    use semver::Version;

    fn node(name: &str, ty: LibraryType) -> GraphNode {
        let identity = LibraryIdentity::new(name, Version::new(1, 0, 0), ty);
        let description = LibraryDescription::new(LibraryRange::new(name).unwrap(), identity);
        GraphNode::new(Arc::new(description), None)
    }

    #[test]
    fn test_graph_basic() {
        let mut graph = ResolvedGraph::new();
        graph.add_node(node("App", LibraryType::Project));
        graph.add_node(node("B", LibraryType::Package));
        graph.add_node(node("b", LibraryType::Package));
        graph.add_edge("App", "B");

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.root().unwrap().name(), "App");
        assert_eq!(graph.dependencies("app")[0].name(), "B");
        assert_eq!(graph.dependents("B")[0].name(), "App");
        assert!(!graph.has_cycle());
    }

    #[test]
    fn test_libraries_in_declaration_order() {
        let mut graph = ResolvedGraph::new();
        for name in ["App", "Zeta", "Alpha", "Shared", "Leaf"] {
            graph.add_node(node(name, LibraryType::Package));
        }
        graph.add_edge("App", "Zeta");
        graph.add_edge("App", "Alpha");
        graph.add_edge("Zeta", "Shared");
        graph.add_edge("Alpha", "Shared");
        graph.add_edge("Shared", "Leaf");

        let names: Vec<_> = graph.libraries().iter().map(|n| n.name()).collect();
        assert_eq!(names, vec!["Zeta", "Shared", "Leaf", "Alpha"]);
    }

    #[test]
    fn test_set_state() {
        let mut graph = ResolvedGraph::new();
        graph.add_node(node("App", LibraryType::Project));
        graph.set_state("APP", WalkState::Resolved);
        assert_eq!(graph.root().unwrap().state, WalkState::Resolved);
    }
}
