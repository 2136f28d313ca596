//! Priority ordering of edges feeding a shared input port
//!
//! Several edges may terminate at the same `(to_node_id, to_port)` group.
//! Their `index` field is a contiguous `1..N` ranking that fixes the order
//! in which the engine aggregates upstream values. Normalization repairs
//! gaps and duplicates; edges referencing missing nodes are excluded from
//! ranking but never removed from the document.

use std::collections::{HashMap, HashSet};

use crate::registry::NodeRegistry;
use crate::types::{EdgeId, GraphEdge, LogicGraph, NodeId};

/// Reassign contiguous `1..N` priority ranks within every input-port group
///
/// Within a group, edges sort by their stored index (missing ranks last),
/// with edge id as the tiebreak.
pub fn normalize_indices(graph: &mut LogicGraph) {
    let node_ids: HashSet<NodeId> = graph.nodes.iter().map(|n| n.id).collect();

    let mut groups: HashMap<(NodeId, u32), Vec<usize>> = HashMap::new();
    for (pos, edge) in graph.edges.iter().enumerate() {
        if node_ids.contains(&edge.from_node_id) && node_ids.contains(&edge.to_node_id) {
            groups
                .entry((edge.to_node_id, edge.to_port))
                .or_default()
                .push(pos);
        }
    }

    for positions in groups.values_mut() {
        positions.sort_by_key(|&pos| sort_key(&graph.edges[pos]));
        for (rank, &pos) in positions.iter().enumerate() {
            graph.edges[pos].index = Some(rank as u32 + 1);
        }
    }
}

/// Move an edge to position `k` (1-based, clamped to `[1, N]`) within its
/// input-port group, then re-normalize every group
pub fn reindex(graph: &mut LogicGraph, edge_id: EdgeId, position: u32) {
    let Some(edge) = graph.find_edge(edge_id) else {
        return;
    };
    let group = (edge.to_node_id, edge.to_port);

    let mut others: Vec<(u32, EdgeId, usize)> = graph
        .edges
        .iter()
        .enumerate()
        .filter(|(_, e)| (e.to_node_id, e.to_port) == group && e.id != edge_id)
        .map(|(pos, e)| (e.index.unwrap_or(u32::MAX), e.id, pos))
        .collect();
    others.sort_unstable();

    let mut order: Vec<usize> = others.into_iter().map(|(_, _, pos)| pos).collect();
    let target_pos = graph
        .edges
        .iter()
        .position(|e| e.id == edge_id)
        .unwrap_or(0);
    let slot = position.clamp(1, order.len() as u32 + 1) as usize - 1;
    order.insert(slot, target_pos);

    for (rank, &pos) in order.iter().enumerate() {
        graph.edges[pos].index = Some(rank as u32 + 1);
    }

    normalize_indices(graph);
}

/// The valid edges of one input-port group, in priority order
///
/// This is the read-side contract the execution engine consumes: edges whose
/// endpoints are missing, whose node types are unregistered, or whose port
/// indexes fall outside the declared port lists are skipped here (and only
/// here; the document keeps them).
pub fn ordered_inputs<'a>(
    graph: &'a LogicGraph,
    registry: &NodeRegistry,
    node_id: NodeId,
    port: u32,
) -> Vec<&'a GraphEdge> {
    let mut edges: Vec<&GraphEdge> = graph
        .edges
        .iter()
        .filter(|e| e.to_node_id == node_id && e.to_port == port)
        .filter(|e| is_readable(graph, registry, e))
        .collect();
    edges.sort_by_key(|e| sort_key(e));
    edges
}

/// Whether an edge connects declared ports on registered, existing nodes
pub fn is_readable(graph: &LogicGraph, registry: &NodeRegistry, edge: &GraphEdge) -> bool {
    let Some(from) = graph.find_node(edge.from_node_id) else {
        return false;
    };
    let Some(to) = graph.find_node(edge.to_node_id) else {
        return false;
    };
    let Some(from_handler) = registry.get(&from.node_type) else {
        return false;
    };
    let Some(to_handler) = registry.get(&to.node_type) else {
        return false;
    };
    (edge.from_port as usize) < from_handler.ports().outputs.len()
        && (edge.to_port as usize) < to_handler.ports().inputs.len()
}

fn sort_key(edge: &GraphEdge) -> (u32, EdgeId) {
    (edge.index.unwrap_or(u32::MAX), edge.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn two_into_one() -> (LogicGraph, NodeId) {
        let mut graph = LogicGraph::default();
        let a = graph.add_node("src", json!({}));
        let b = graph.add_node("src", json!({}));
        let c = graph.add_node("sink", json!({}));
        graph.add_edge(a, 0, c, 0);
        graph.add_edge(b, 0, c, 0);
        (graph, c)
    }

    fn group_ranks(graph: &LogicGraph, node: NodeId, port: u32) -> Vec<(EdgeId, Option<u32>)> {
        let mut edges: Vec<&GraphEdge> = graph
            .edges
            .iter()
            .filter(|e| e.to_node_id == node && e.to_port == port)
            .collect();
        edges.sort_by_key(|e| (e.index.unwrap_or(u32::MAX), e.id));
        edges.iter().map(|e| (e.id, e.index)).collect()
    }

    #[test]
    fn test_normalize_assigns_contiguous_ranks() {
        let (mut graph, sink) = two_into_one();
        normalize_indices(&mut graph);

        assert_eq!(group_ranks(&graph, sink, 0), vec![(1, Some(1)), (2, Some(2))]);
    }

    #[test]
    fn test_stored_order_wins_over_edge_id() {
        let (mut graph, sink) = two_into_one();
        // Stored indices [2, 1]: the edge persisted at index 1 ranks first
        graph.edges[0].index = Some(2);
        graph.edges[1].index = Some(1);

        normalize_indices(&mut graph);

        assert_eq!(group_ranks(&graph, sink, 0), vec![(2, Some(1)), (1, Some(2))]);
    }

    #[test]
    fn test_missing_index_sorts_last() {
        let mut graph = LogicGraph::default();
        let a = graph.add_node("src", json!({}));
        let b = graph.add_node("src", json!({}));
        let c = graph.add_node("src", json!({}));
        let sink = graph.add_node("sink", json!({}));
        let e1 = graph.add_edge(a, 0, sink, 0); // no index
        let e2 = graph.add_edge(b, 0, sink, 0);
        let e3 = graph.add_edge(c, 0, sink, 0);
        graph.edges[1].index = Some(1);
        graph.edges[2].index = Some(2);

        normalize_indices(&mut graph);

        assert_eq!(
            group_ranks(&graph, sink, 0),
            vec![(e2, Some(1)), (e3, Some(2)), (e1, Some(3))]
        );
    }

    #[test]
    fn test_reindex_moves_edge_into_slot() {
        let mut graph = LogicGraph::default();
        let a = graph.add_node("src", json!({}));
        let b = graph.add_node("src", json!({}));
        let c = graph.add_node("src", json!({}));
        let sink = graph.add_node("sink", json!({}));
        let e1 = graph.add_edge(a, 0, sink, 0);
        let e2 = graph.add_edge(b, 0, sink, 0);
        let e3 = graph.add_edge(c, 0, sink, 0);
        normalize_indices(&mut graph);

        reindex(&mut graph, e3, 1);

        assert_eq!(
            group_ranks(&graph, sink, 0),
            vec![(e3, Some(1)), (e1, Some(2)), (e2, Some(3))]
        );
    }

    #[test]
    fn test_reindex_clamps_position() {
        let mut graph = LogicGraph::default();
        let a = graph.add_node("src", json!({}));
        let b = graph.add_node("src", json!({}));
        let sink = graph.add_node("sink", json!({}));
        let e1 = graph.add_edge(a, 0, sink, 0);
        let e2 = graph.add_edge(b, 0, sink, 0);
        normalize_indices(&mut graph);

        reindex(&mut graph, e1, 99);
        assert_eq!(group_ranks(&graph, sink, 0), vec![(e2, Some(1)), (e1, Some(2))]);

        reindex(&mut graph, e1, 0);
        assert_eq!(group_ranks(&graph, sink, 0), vec![(e1, Some(1)), (e2, Some(2))]);
    }

    #[test]
    fn test_dangling_edges_left_untouched() {
        let mut graph = LogicGraph::default();
        let a = graph.add_node("src", json!({}));
        let sink = graph.add_node("sink", json!({}));
        graph.add_edge(a, 0, sink, 0);
        graph.add_edge(99, 0, sink, 0); // source node missing
        graph.edges[1].index = Some(7);

        normalize_indices(&mut graph);

        // Valid edge ranked; dangling edge keeps its stored index and stays
        assert_eq!(graph.edges[0].index, Some(1));
        assert_eq!(graph.edges[1].index, Some(7));
        assert_eq!(graph.edges.len(), 2);
    }
}
