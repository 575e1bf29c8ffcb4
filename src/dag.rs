//! Node-level dependency snapshot derived from port connections

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::error::{PipeGraphError, Result};
use crate::graph::ProcessingGraph;
use crate::port::NodeId;

/// Immutable snapshot of the node-to-node dependency relation.
///
/// A predecessor of N is any node with an output port connected to one of
/// N's input ports. Edges point producer → consumer and are deduplicated
/// even when two nodes are wired together through several port pairs.
#[derive(Debug)]
pub struct DependencyDag {
    graph: DiGraph<NodeId, ()>,
    indices: HashMap<NodeId, NodeIndex>,
    names: HashMap<NodeId, String>,
    up_to_date: HashMap<NodeId, bool>,
}

impl DependencyDag {
    /// Snapshot the dependency relation of `source`.
    pub fn build(source: &ProcessingGraph) -> Self {
        let mut graph = DiGraph::new();
        let mut indices = HashMap::new();
        let mut names = HashMap::new();
        let mut up_to_date = HashMap::new();

        for node in source.nodes() {
            let index = graph.add_node(node.id);
            indices.insert(node.id, index);
            names.insert(node.id, node.name.clone());
            up_to_date.insert(node.id, node.is_up_to_date());
        }

        let mut seen = HashSet::new();
        for node in source.nodes() {
            for port in node.outputs() {
                for peer in port.peers() {
                    if !indices.contains_key(&peer.node) {
                        continue;
                    }
                    if seen.insert((node.id, peer.node)) {
                        graph.add_edge(indices[&node.id], indices[&peer.node], ());
                    }
                }
            }
        }

        Self {
            graph,
            indices,
            names,
            up_to_date,
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Validate that the snapshot is acyclic.
    pub fn validate_acyclic(&self) -> Result<()> {
        if is_cyclic_directed(&self.graph) {
            // Find a cycle for better error message
            let cycle_info = self.find_cycle();
            return Err(PipeGraphError::CycleDetected(cycle_info));
        }
        Ok(())
    }

    fn name(&self, id: NodeId) -> &str {
        self.names.get(&id).map(String::as_str).unwrap_or("?")
    }

    /// Find a cycle in the graph for error reporting
    fn find_cycle(&self) -> String {
        // Simple DFS to find cycle
        let mut visited = HashMap::new();
        let mut path = Vec::new();

        for node in self.graph.node_indices() {
            if !visited.contains_key(&node) {
                if let Some(cycle) = self.dfs_find_cycle(node, &mut visited, &mut path) {
                    return cycle;
                }
            }
        }

        "Unknown cycle".to_string()
    }

    fn dfs_find_cycle(
        &self,
        node: NodeIndex,
        visited: &mut HashMap<NodeIndex, bool>,
        path: &mut Vec<String>,
    ) -> Option<String> {
        if let Some(&in_path) = visited.get(&node) {
            if in_path {
                // Found cycle
                path.push(self.name(self.graph[node]).to_string());
                return Some(path.join(" -> "));
            }
            return None;
        }

        visited.insert(node, true);
        path.push(self.name(self.graph[node]).to_string());

        for neighbor in self.graph.neighbors(node) {
            if let Some(cycle) = self.dfs_find_cycle(neighbor, visited, path) {
                return Some(cycle);
            }
        }

        path.pop();
        visited.insert(node, false);
        None
    }

    /// Kahn pass over the ancestor closure of `start`, seeded from nodes
    /// with no remaining successors inside the closure.
    ///
    /// The returned order runs from the start set toward the sources; the
    /// scheduler executes its reverse. Up-to-date nodes are visited but not
    /// included. Closure members that never become eligible sit on a cycle
    /// and are reported, never silently dropped.
    pub fn visitation_order(&self, start: &[NodeId]) -> Result<Vec<NodeId>> {
        let mut stack = Vec::with_capacity(start.len());
        for id in start {
            let index = self
                .indices
                .get(id)
                .copied()
                .ok_or(PipeGraphError::UnknownNode(id.0))?;
            stack.push(index);
        }

        // Ancestor closure: the start nodes and their transitive producers
        let mut closure: HashSet<NodeIndex> = HashSet::new();
        while let Some(index) = stack.pop() {
            if closure.insert(index) {
                for pred in self.graph.neighbors_directed(index, Direction::Incoming) {
                    if !closure.contains(&pred) {
                        stack.push(pred);
                    }
                }
            }
        }

        // Sorted by node id so the schedule is deterministic
        let mut members: Vec<NodeIndex> = closure.iter().copied().collect();
        members.sort_by_key(|&index| self.graph[index]);

        let mut remaining: HashMap<NodeIndex, usize> = members
            .iter()
            .map(|&index| {
                let successors = self
                    .graph
                    .neighbors_directed(index, Direction::Outgoing)
                    .filter(|s| closure.contains(s))
                    .count();
                (index, successors)
            })
            .collect();

        let mut queue: VecDeque<NodeIndex> = members
            .iter()
            .copied()
            .filter(|index| remaining[index] == 0)
            .collect();

        let mut order = Vec::new();
        let mut popped: HashSet<NodeIndex> = HashSet::new();
        while let Some(index) = queue.pop_front() {
            popped.insert(index);
            let id = self.graph[index];
            if !self.up_to_date.get(&id).copied().unwrap_or(false) {
                order.push(id);
            }
            for pred in self.graph.neighbors_directed(index, Direction::Incoming) {
                if !closure.contains(&pred) {
                    continue;
                }
                let count = remaining
                    .get_mut(&pred)
                    .expect("every closure member has a successor count");
                *count -= 1;
                if *count == 0 {
                    queue.push_back(pred);
                }
            }
        }

        if popped.len() < members.len() {
            let leftover: Vec<&str> = members
                .iter()
                .filter(|index| !popped.contains(index))
                .map(|&index| self.name(self.graph[index]))
                .collect();
            return Err(PipeGraphError::CycleDetected(format!(
                "nodes never became schedulable: {}",
                leftover.join(", ")
            )));
        }

        Ok(order)
    }
}
