use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};
use thiserror::Error;

/// Options for a [DependencyGraph]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphOptions {
    /// Tolerate cycles instead of failing traversals on them
    pub circular: bool,
}

/// Directed graph of named nodes.
///
/// An edge `from -> to` means "from depends on to". Edges are indexed in both
/// directions so dependencies and dependants are one lookup away.
/// Nodes keep their insertion order, which makes every traversal deterministic.
#[derive(Debug, Clone)]
pub struct DependencyGraph<T> {
    /// Node -> payload, `None` if the node only carries its name
    nodes: IndexMap<String, Option<T>>,
    /// Node -> nodes it depends on
    outgoing: IndexMap<String, IndexSet<String>>,
    /// Node -> nodes depending on it
    incoming: IndexMap<String, IndexSet<String>>,
    circular: bool,
}
impl<T> Default for DependencyGraph<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DependencyGraph<T> {
    /// Creates a strict graph, failing traversals on cycles
    pub fn new() -> Self {
        Self::with_options(GraphOptions::default())
    }

    pub fn with_options(options: GraphOptions) -> Self {
        Self {
            nodes: IndexMap::new(),
            outgoing: IndexMap::new(),
            incoming: IndexMap::new(),
            circular: options.circular,
        }
    }

    pub fn is_circular(&self) -> bool {
        self.circular
    }

    pub fn set_circular(&mut self, circular: bool) {
        self.circular = circular;
    }

    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All node names in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &str> + '_ {
        self.nodes.keys().map(String::as_str)
    }

    pub fn has_node(&self, name: &str) -> bool {
        self.nodes.contains_key(name)
    }

    /// Adds a node without payload - no-op if the node exists
    pub fn add_node(&mut self, name: impl Into<String>) {
        self.insert_node(name.into(), None);
    }

    /// Adds a node carrying `data` - no-op if the node exists, the existing payload is kept
    pub fn add_node_with(&mut self, name: impl Into<String>, data: T) {
        self.insert_node(name.into(), Some(data));
    }

    fn insert_node(&mut self, name: String, data: Option<T>) {
        if self.nodes.contains_key(&name) {
            return;
        }

        self.outgoing.insert(name.clone(), IndexSet::new());
        self.incoming.insert(name.clone(), IndexSet::new());
        self.nodes.insert(name, data);
    }

    /// Removes a node and every edge touching it
    pub fn remove_node(&mut self, name: &str) {
        if self.nodes.shift_remove(name).is_none() {
            return;
        }
        self.outgoing.shift_remove(name);
        self.incoming.shift_remove(name);

        for edges in self.outgoing.values_mut().chain(self.incoming.values_mut()) {
            edges.shift_remove(name);
        }
    }

    /// Payload of a node
    ///
    /// `None` if the node was added without one. The node is then identified by its
    /// name alone, which the caller already holds, so no stand-in value is returned.
    pub fn node_data(&self, name: &str) -> Result<Option<&T>, GraphError> {
        self.nodes
            .get(name)
            .map(Option::as_ref)
            .ok_or_else(|| GraphError::NodeNotFound(name.to_string()))
    }

    pub fn set_node_data(&mut self, name: &str, data: T) -> Result<(), GraphError> {
        match self.nodes.get_mut(name) {
            Some(slot) => {
                *slot = Some(data);
                Ok(())
            }
            None => Err(GraphError::NodeNotFound(name.to_string())),
        }
    }

    /// Records that `from` depends on `to`
    ///
    /// Both nodes must exist. Adding an existing edge is a no-op.
    pub fn add_dependency(&mut self, from: &str, to: &str) -> Result<(), GraphError> {
        for name in [from, to] {
            if !self.has_node(name) {
                return Err(GraphError::NodeNotFound(name.to_string()));
            }
        }

        if let Some(edges) = self.outgoing.get_mut(from) {
            edges.insert(to.to_string());
        }
        if let Some(edges) = self.incoming.get_mut(to) {
            edges.insert(from.to_string());
        }
        Ok(())
    }

    pub fn has_dependency(&self, from: &str, to: &str) -> bool {
        self.outgoing
            .get(from)
            .is_some_and(|edges| edges.contains(to))
    }

    pub fn remove_dependency(&mut self, from: &str, to: &str) {
        if let Some(edges) = self.outgoing.get_mut(from) {
            edges.shift_remove(to);
        }
        if let Some(edges) = self.incoming.get_mut(to) {
            edges.shift_remove(from);
        }
    }

    /// Nodes `name` depends on directly
    pub fn direct_dependencies_of(
        &self,
        name: &str,
    ) -> Result<impl Iterator<Item = &str> + '_, GraphError> {
        Self::edges_of(&self.outgoing, name)
    }

    /// Nodes depending on `name` directly
    pub fn direct_dependants_of(
        &self,
        name: &str,
    ) -> Result<impl Iterator<Item = &str> + '_, GraphError> {
        Self::edges_of(&self.incoming, name)
    }

    fn edges_of<'g>(
        edges: &'g IndexMap<String, IndexSet<String>>,
        name: &str,
    ) -> Result<impl Iterator<Item = &'g str> + 'g, GraphError> {
        edges
            .get(name)
            .map(|edges| edges.iter().map(String::as_str))
            .ok_or_else(|| GraphError::NodeNotFound(name.to_string()))
    }

    /// Every node `name` depends on, transitively, excluding `name` itself
    ///
    /// With `leaves_only` only nodes that depend on nothing are returned.
    pub fn dependencies_of(&self, name: &str, leaves_only: bool) -> Result<Vec<String>, GraphError> {
        self.closure(&self.outgoing, name, leaves_only)
    }

    /// Every node depending on `name`, transitively, excluding `name` itself
    ///
    /// With `leaves_only` only nodes nothing depends on are returned.
    pub fn dependants_of(&self, name: &str, leaves_only: bool) -> Result<Vec<String>, GraphError> {
        self.closure(&self.incoming, name, leaves_only)
    }

    fn closure(
        &self,
        edges: &IndexMap<String, IndexSet<String>>,
        name: &str,
        leaves_only: bool,
    ) -> Result<Vec<String>, GraphError> {
        let Some((start, _)) = edges.get_key_value(name) else {
            return Err(GraphError::NodeNotFound(name.to_string()));
        };

        let mut dfs = Dfs::new(edges, leaves_only, self.circular);
        dfs.visit(start)?;
        dfs.result.shift_remove(name);

        Ok(dfs.into_result())
    }

    /// Order in which all nodes can be processed, dependencies first
    ///
    /// Checks the whole graph for cycles first, starting at every node so disconnected
    /// subgraphs are covered. In circular mode nodes that are only reachable through a
    /// cycle are appended in insertion order.
    pub fn overall_order(&self, leaves_only: bool) -> Result<Vec<String>, GraphError> {
        if self.nodes.is_empty() {
            return Ok(Vec::new());
        }

        let mut cycle_check = Dfs::new(&self.outgoing, false, self.circular);
        for name in self.outgoing.keys() {
            cycle_check.visit(name)?;
        }

        let mut dfs = Dfs::new(&self.outgoing, leaves_only, self.circular);
        let roots = self
            .incoming
            .iter()
            .filter(|(_, dependants)| dependants.is_empty())
            .map(|(name, _)| name);
        for root in roots {
            dfs.visit(root)?;
        }

        if self.circular {
            for name in self.outgoing.keys() {
                if !dfs.visited.contains(name.as_str()) {
                    dfs.visit(name)?;
                }
            }
        }

        Ok(dfs.into_result())
    }
}

/// Depth first search over one edge direction
///
/// `visited` is shared between all starting points of one search, `path` is the
/// active recursion path used to spot cycles.
struct Dfs<'g> {
    edges: &'g IndexMap<String, IndexSet<String>>,
    leaves_only: bool,
    circular: bool,
    visited: HashSet<&'g str>,
    path: Vec<&'g str>,
    result: IndexSet<&'g str>,
}
impl<'g> Dfs<'g> {
    fn new(edges: &'g IndexMap<String, IndexSet<String>>, leaves_only: bool, circular: bool) -> Self {
        Self {
            edges,
            leaves_only,
            circular,
            visited: HashSet::new(),
            path: Vec::new(),
            result: IndexSet::new(),
        }
    }

    fn visit(&mut self, node: &'g str) -> Result<(), GraphError> {
        let all_edges = self.edges;
        let Some(next) = all_edges.get(node) else {
            return Err(GraphError::NodeNotFound(node.to_string()));
        };

        self.visited.insert(node);
        self.path.push(node);

        for dependency in next {
            if !self.visited.contains(dependency.as_str()) {
                self.visit(dependency)?;
                continue;
            }

            // Revisit of a node on the active path closes a cycle
            if let Some(start) = self.path.iter().position(|n| *n == dependency.as_str()) {
                if !self.circular {
                    let mut path: Vec<String> =
                        self.path[start..].iter().map(|n| n.to_string()).collect();
                    path.push(dependency.clone());
                    return Err(GraphError::CycleDetected { path });
                }
            }
        }

        self.path.pop();
        if !self.leaves_only || next.is_empty() {
            self.result.insert(node);
        }

        Ok(())
    }

    fn into_result(self) -> Vec<String> {
        self.result.into_iter().map(str::to_string).collect()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Node does not exist: '{0}'")]
    NodeNotFound(String),
    #[error("Dependency cycle found: {}", .path.join(" -> "))]
    CycleDetected {
        /// Path from the first repeated node through the repeat
        path: Vec<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> DependencyGraph<()> {
        let mut graph = DependencyGraph::new();
        graph.add_node("a");
        graph.add_node("b");
        graph.add_node("c");
        graph.add_dependency("a", "b").unwrap();
        graph.add_dependency("b", "c").unwrap();
        graph
    }

    fn triangle(circular: bool) -> DependencyGraph<()> {
        let mut graph = DependencyGraph::with_options(GraphOptions { circular });
        for name in ["a", "b", "c"] {
            graph.add_node(name);
        }
        graph.add_dependency("a", "b").unwrap();
        graph.add_dependency("b", "c").unwrap();
        graph.add_dependency("c", "a").unwrap();
        graph
    }

    fn sorted(mut names: Vec<String>) -> Vec<String> {
        names.sort();
        names
    }

    #[test]
    fn chain_orders_dependencies_first() {
        let graph = chain();

        assert_eq!(graph.overall_order(false).unwrap(), ["c", "b", "a"]);
        assert_eq!(sorted(graph.dependencies_of("a", false).unwrap()), ["b", "c"]);
        assert_eq!(graph.dependencies_of("a", true).unwrap(), ["c"]);
        assert_eq!(sorted(graph.dependants_of("c", false).unwrap()), ["a", "b"]);
        assert_eq!(graph.dependants_of("c", true).unwrap(), ["a"]);
    }

    #[test]
    fn leaves_only_order_skips_nodes_with_dependencies() {
        let mut graph = chain();
        graph.add_node("d");

        assert_eq!(graph.overall_order(true).unwrap(), ["c", "d"]);
    }

    #[test]
    fn adding_a_node_twice_keeps_payload_and_edges() {
        let mut graph = DependencyGraph::new();
        graph.add_node_with("a", 1);
        graph.add_node_with("b", 2);
        graph.add_dependency("a", "b").unwrap();

        graph.add_node_with("a", 10);
        graph.add_node("b");
        graph.add_node("plain");

        assert_eq!(graph.node_data("a").unwrap(), Some(&1));
        assert_eq!(graph.node_data("b").unwrap(), Some(&2));
        assert_eq!(graph.node_data("plain").unwrap(), None);
        assert!(graph.has_dependency("a", "b"));
        assert_eq!(graph.len(), 3);
    }

    #[test]
    fn edges_are_visible_from_both_ends() {
        let mut graph: DependencyGraph<()> = DependencyGraph::new();
        for name in ["x", "y", "z"] {
            graph.add_node(name);
        }
        graph.add_dependency("x", "y").unwrap();
        graph.add_dependency("z", "y").unwrap();
        graph.add_dependency("x", "y").unwrap();

        for from in ["x", "z"] {
            assert!(graph.dependencies_of(from, false).unwrap().contains(&"y".to_string()));
            assert!(graph.dependants_of("y", false).unwrap().contains(&from.to_string()));
        }
        assert_eq!(graph.direct_dependants_of("y").unwrap().collect::<Vec<_>>(), ["x", "z"]);
        assert_eq!(graph.direct_dependencies_of("x").unwrap().count(), 1);
    }

    #[test]
    fn dependency_on_unknown_node_fails() {
        let mut graph: DependencyGraph<()> = DependencyGraph::new();
        graph.add_node("a");

        assert_eq!(
            graph.add_dependency("a", "missing"),
            Err(GraphError::NodeNotFound("missing".to_string()))
        );
        assert_eq!(
            graph.add_dependency("missing", "a"),
            Err(GraphError::NodeNotFound("missing".to_string()))
        );
        assert!(graph.dependencies_of("missing", false).is_err());
        assert!(graph.set_node_data("missing", ()).is_err());
    }

    #[test]
    fn strict_cycle_reports_the_cycle_path() {
        let graph = triangle(false);

        let Err(GraphError::CycleDetected { path }) = graph.overall_order(false) else {
            panic!("expected a cycle error");
        };
        assert_eq!(path.first(), path.last());
        assert_eq!(path, ["a", "b", "c", "a"]);
        assert!(graph.dependencies_of("b", false).is_err());
    }

    #[test]
    fn cycle_path_starts_at_the_repeated_node() {
        let mut graph = triangle(false);
        graph.add_node("entry");
        graph.add_dependency("entry", "b").unwrap();

        let error = graph.dependencies_of("entry", false).unwrap_err();
        assert_eq!(
            error,
            GraphError::CycleDetected {
                path: vec!["b".into(), "c".into(), "a".into(), "b".into()]
            }
        );
        assert_eq!(error.to_string(), "Dependency cycle found: b -> c -> a -> b");
    }

    #[test]
    fn circular_graph_orders_every_node_once() {
        let graph = triangle(true);

        let order = graph.overall_order(false).unwrap();
        assert_eq!(sorted(order), ["a", "b", "c"]);
        assert_eq!(sorted(graph.dependencies_of("a", false).unwrap()), ["b", "c"]);
    }

    #[test]
    fn removing_a_node_prunes_both_edge_directions() {
        let mut graph = chain();
        graph.remove_node("b");
        graph.remove_node("never-added");

        assert!(!graph.has_node("b"));
        assert_eq!(graph.dependencies_of("a", false).unwrap(), Vec::<String>::new());
        assert_eq!(graph.dependants_of("c", false).unwrap(), Vec::<String>::new());
        assert_eq!(graph.overall_order(false).unwrap(), ["a", "c"]);
    }

    #[test]
    fn removing_a_dependency_keeps_the_nodes() {
        let mut graph = chain();
        graph.remove_dependency("a", "b");
        graph.remove_dependency("a", "c");

        assert!(!graph.has_dependency("a", "b"));
        assert!(graph.has_node("a") && graph.has_node("b"));
        assert_eq!(graph.direct_dependants_of("b").unwrap().count(), 0);
    }

    #[test]
    fn clone_has_independent_edges() {
        let original = chain();
        let mut copy = original.clone();
        copy.add_node("d");
        copy.add_dependency("c", "d").unwrap();

        assert!(!original.has_node("d"));
        assert_eq!(original.dependencies_of("c", false).unwrap(), Vec::<String>::new());
        assert_eq!(copy.dependencies_of("c", false).unwrap(), ["d"]);
    }

    #[test]
    fn disconnected_subgraphs_are_all_ordered() {
        let mut graph = chain();
        graph.add_node("x");
        graph.add_node("y");
        graph.add_dependency("x", "y").unwrap();

        assert_eq!(graph.overall_order(false).unwrap(), ["c", "b", "a", "y", "x"]);
    }

    #[test]
    fn empty_graph_has_empty_order() {
        let graph: DependencyGraph<()> = DependencyGraph::new();
        assert!(graph.is_empty());
        assert!(graph.overall_order(false).unwrap().is_empty());
    }
}
