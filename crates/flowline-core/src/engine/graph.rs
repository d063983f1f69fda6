//! Graph building, entry selection, and topological validation.
//!
//! Uses `petgraph` to model node connections as a directed graph. A Kahn
//! in-degree walk produces the execution order and, on failure, names every
//! node still caught in a cycle. The adjacency map built here is ephemeral:
//! it is rebuilt from the stored connections at the start of every run.

use std::collections::{HashMap, HashSet, VecDeque};

use flowline_types::workflow::{Connection, Node, MAIN_OUTPUT};
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;

/// Outgoing edges per node, grouped by output label.
///
/// `node_id -> output_label -> target node ids`. Target order follows the
/// order connections were listed.
pub type AdjacencyMap = HashMap<String, HashMap<String, Vec<String>>>;

/// Errors from graph construction and validation.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The graph contains at least one cycle. Every node on a cycle (or
    /// reachable only through one) is named.
    #[error("cycle detected involving nodes: {}", .0.join(", "))]
    CycleDetected(Vec<String>),

    /// A connection references a node ID that is not in the graph.
    #[error("connection references unknown node '{0}'")]
    UnknownNode(String),

    /// The graph has no nodes.
    #[error("workflow graph has no nodes")]
    Empty,
}

// ---------------------------------------------------------------------------
// Adjacency
// ---------------------------------------------------------------------------

/// Build the adjacency map from stored connections.
pub fn build_adjacency(connections: &[Connection]) -> AdjacencyMap {
    let mut adjacency: AdjacencyMap = HashMap::new();
    for conn in connections {
        adjacency
            .entry(conn.from_node_id.clone())
            .or_default()
            .entry(conn.from_output.clone())
            .or_default()
            .push(conn.to_node_id.clone());
    }
    adjacency
}

/// Resolve the successors of a node.
///
/// - With an explicit branch decision, only that output's targets follow.
/// - Without one, the `main` output is used when present; otherwise, if the
///   node has exactly one labeled output, that sole output is followed.
/// - Two or more non-main outputs without a decision resolve to nothing:
///   the path simply ends there.
pub fn next_node_ids(
    adjacency: &AdjacencyMap,
    node_id: &str,
    decision: Option<&str>,
) -> Vec<String> {
    let Some(outputs) = adjacency.get(node_id) else {
        return Vec::new();
    };

    let targets = match decision {
        Some(label) => outputs.get(label),
        None => outputs.get(MAIN_OUTPUT).or_else(|| {
            if outputs.len() == 1 {
                outputs.values().next()
            } else {
                None
            }
        }),
    };

    targets.cloned().unwrap_or_default()
}

/// Transitive closure of node IDs reachable from `seeds`, across all output
/// labels. Seeds themselves are included.
pub fn reachable_from(adjacency: &AdjacencyMap, seeds: &[String]) -> HashSet<String> {
    let mut reachable: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<&str> = seeds.iter().map(String::as_str).collect();

    while let Some(id) = queue.pop_front() {
        if !reachable.insert(id.to_string()) {
            continue;
        }
        if let Some(outputs) = adjacency.get(id) {
            for targets in outputs.values() {
                for target in targets {
                    if !reachable.contains(target.as_str()) {
                        queue.push_back(target);
                    }
                }
            }
        }
    }

    reachable
}

// ---------------------------------------------------------------------------
// Entry selection
// ---------------------------------------------------------------------------

/// Pick the entry node of a graph.
///
/// Candidates are nodes with no incoming connections. A trigger-typed
/// candidate wins; otherwise the first candidate in listed order; a graph
/// where every node has an incoming edge falls back to the first listed
/// node. The result does not depend on storage order beyond these ties.
pub fn find_entry<'a>(nodes: &'a [Node], connections: &[Connection]) -> Option<&'a Node> {
    if nodes.is_empty() {
        return None;
    }

    let has_incoming: HashSet<&str> = connections
        .iter()
        .map(|c| c.to_node_id.as_str())
        .collect();

    let mut candidates = nodes.iter().filter(|n| !has_incoming.contains(n.id.as_str()));
    let mut first_candidate = None;
    for candidate in candidates.by_ref() {
        if candidate.node_type.is_trigger() {
            return Some(candidate);
        }
        first_candidate.get_or_insert(candidate);
    }

    first_candidate.or_else(|| nodes.first())
}

// ---------------------------------------------------------------------------
// Topological sort (Kahn)
// ---------------------------------------------------------------------------

/// Topologically sort the graph's nodes.
///
/// Kahn's algorithm over a petgraph `DiGraph`: repeatedly emit zero
/// in-degree nodes in listed order. If fewer nodes come out than went in,
/// every node left over sits on a cycle (or behind one) and all of them are
/// reported in the error.
pub fn topo_sort<'a>(
    nodes: &'a [Node],
    connections: &[Connection],
) -> Result<Vec<&'a Node>, GraphError> {
    if nodes.is_empty() {
        return Err(GraphError::Empty);
    }

    let id_to_pos: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let mut graph = DiGraph::<&str, ()>::new();
    let indices: Vec<NodeIndex> = nodes.iter().map(|n| graph.add_node(n.id.as_str())).collect();

    for conn in connections {
        let from = *id_to_pos
            .get(conn.from_node_id.as_str())
            .ok_or_else(|| GraphError::UnknownNode(conn.from_node_id.clone()))?;
        let to = *id_to_pos
            .get(conn.to_node_id.as_str())
            .ok_or_else(|| GraphError::UnknownNode(conn.to_node_id.clone()))?;
        graph.add_edge(indices[from], indices[to], ());
    }

    let mut in_degree: Vec<usize> = indices
        .iter()
        .map(|&idx| graph.neighbors_directed(idx, petgraph::Direction::Incoming).count())
        .collect();

    let mut queue: VecDeque<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut sorted: Vec<&Node> = Vec::with_capacity(nodes.len());
    let mut emitted = vec![false; nodes.len()];

    while let Some(pos) = queue.pop_front() {
        sorted.push(&nodes[pos]);
        emitted[pos] = true;
        for neighbor in graph.neighbors_directed(indices[pos], petgraph::Direction::Outgoing) {
            let npos = neighbor.index();
            in_degree[npos] -= 1;
            if in_degree[npos] == 0 {
                queue.push_back(npos);
            }
        }
    }

    if sorted.len() < nodes.len() {
        let stuck: Vec<String> = nodes
            .iter()
            .enumerate()
            .filter(|(i, _)| !emitted[*i])
            .map(|(_, n)| n.id.clone())
            .collect();
        return Err(GraphError::CycleDetected(stuck));
    }

    Ok(sorted)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
