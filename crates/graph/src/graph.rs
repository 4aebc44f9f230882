use crate::error::{GraphError, Result};
use petgraph::algo::{astar, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::HashMap;
use std::fmt::{self, Display, Write as _};
use std::hash::Hash;

/// Directed acyclic graph over plain value nodes.
///
/// An edge `a -> b` reads "a depends on b". Edges that would close a cycle
/// are rejected, so the graph is acyclic at every point in time. Iteration
/// follows insertion order.
#[derive(Debug, Clone)]
pub struct Graph<N> {
    graph: DiGraph<N, ()>,
    index: HashMap<N, NodeIndex>,
}

impl<N> Default for Graph<N> {
    fn default() -> Self {
        Self {
            graph: DiGraph::new(),
            index: HashMap::new(),
        }
    }
}

impl<N> Graph<N>
where
    N: Clone + Eq + Hash + Display,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `node` if missing.
    pub fn add_node(&mut self, node: N) {
        self.index_of(node);
    }

    fn index_of(&mut self, node: N) -> NodeIndex {
        if let Some(&idx) = self.index.get(&node) {
            return idx;
        }
        let idx = self.graph.add_node(node.clone());
        self.index.insert(node, idx);
        idx
    }

    /// Add `from -> to`, creating missing nodes. Adding an existing edge is a
    /// no-op. Fails with the full chain when `to` already reaches `from`.
    pub fn add_edge(&mut self, from: N, to: N) -> Result<()> {
        let from_idx = self.index_of(from);
        let to_idx = self.index_of(to);
        if self.graph.contains_edge(from_idx, to_idx) {
            return Ok(());
        }
        if let Some(path) = self.path(to_idx, from_idx) {
            let mut chain = vec![self.graph[from_idx].to_string()];
            chain.extend(path.into_iter().map(|idx| self.graph[idx].to_string()));
            return Err(GraphError::Cycle(chain));
        }
        self.graph.add_edge(from_idx, to_idx, ());
        Ok(())
    }

    /// Shortest path from `start` to `goal`, both included.
    fn path(&self, start: NodeIndex, goal: NodeIndex) -> Option<Vec<NodeIndex>> {
        astar(&self.graph, start, |idx| idx == goal, |_| 1u32, |_| 0)
            .map(|(_, path)| path)
    }

    /// Neighbors in edge insertion order.
    fn ordered_neighbors(&self, idx: NodeIndex, direction: Direction) -> Vec<NodeIndex> {
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(idx, direction)
            .map(|edge| {
                let other = match direction {
                    Direction::Outgoing => edge.target(),
                    Direction::Incoming => edge.source(),
                };
                (edge.id(), other)
            })
            .collect();
        edges.sort_by_key(|(id, _)| *id);
        edges.into_iter().map(|(_, other)| other).collect()
    }

    pub fn contains(&self, node: &N) -> bool {
        self.index.contains_key(node)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &N> {
        self.graph.node_weights()
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Nodes `node` depends on.
    pub fn outbound(&self, node: &N) -> Vec<N> {
        self.neighbors(node, Direction::Outgoing)
    }

    /// Nodes that depend on `node`.
    pub fn inbound(&self, node: &N) -> Vec<N> {
        self.neighbors(node, Direction::Incoming)
    }

    fn neighbors(&self, node: &N, direction: Direction) -> Vec<N> {
        match self.index.get(node) {
            Some(&idx) => self
                .ordered_neighbors(idx, direction)
                .into_iter()
                .map(|other| self.graph[other].clone())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Every node after the nodes it depends on. The order only depends on
    /// the sequence of insertions.
    pub fn topological_sort(&self) -> Result<Vec<N>> {
        let mut order = toposort(&self.graph, None).map_err(|cycle| {
            GraphError::Cycle(vec![self.graph[cycle.node_id()].to_string()])
        })?;
        order.reverse();
        Ok(order
            .into_iter()
            .map(|idx| self.graph[idx].clone())
            .collect())
    }

    /// Graphviz rendering. Nodes without edges are listed on their own.
    pub fn dot(&self) -> String {
        let mut out = String::from("digraph {\n\n");
        for idx in self.graph.node_indices() {
            let outbound = self.ordered_neighbors(idx, Direction::Outgoing);
            let has_inbound = self
                .graph
                .edges_directed(idx, Direction::Incoming)
                .next()
                .is_some();
            if outbound.is_empty() && !has_inbound {
                let _ = writeln!(out, "  {:?};", self.graph[idx].to_string());
            }
            for other in outbound {
                let _ = writeln!(
                    out,
                    "  {:?} -> {:?};",
                    self.graph[idx].to_string(),
                    self.graph[other].to_string()
                );
            }
        }
        out.push_str("}\n");
        out
    }
}

impl<N> fmt::Display for Graph<N>
where
    N: Clone + Eq + Hash + Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dot())
    }
}
