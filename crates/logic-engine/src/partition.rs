//! Flow partitioning
//!
//! A flow is a weakly-connected component of the graph: edge direction is
//! ignored, so a trigger and everything reachable from it (upstream or
//! downstream) share one flow id and execute as an isolated pipeline.

use std::collections::{HashMap, HashSet};

use crate::types::{FlowId, LogicGraph, NodeId};

/// Assign a flow id to every node
///
/// Components are numbered `0, 1, 2, ...` in first-discovery order over the
/// node list. Edges referencing missing nodes contribute no adjacency but
/// stay in the document. Must run after every structural edit, before
/// persistence.
pub fn assign_flows_per_branch(graph: &mut LogicGraph) {
    let node_ids: HashSet<NodeId> = graph.nodes.iter().map(|n| n.id).collect();

    let mut adjacency: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for edge in &graph.edges {
        if node_ids.contains(&edge.from_node_id) && node_ids.contains(&edge.to_node_id) {
            adjacency
                .entry(edge.from_node_id)
                .or_default()
                .push(edge.to_node_id);
            adjacency
                .entry(edge.to_node_id)
                .or_default()
                .push(edge.from_node_id);
        }
    }

    let mut assigned: HashMap<NodeId, FlowId> = HashMap::new();
    let mut next_flow: FlowId = 0;
    let order: Vec<NodeId> = graph.nodes.iter().map(|n| n.id).collect();

    for start in order {
        if assigned.contains_key(&start) {
            continue;
        }
        let flow = next_flow;
        next_flow += 1;

        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            if assigned.contains_key(&id) {
                continue;
            }
            assigned.insert(id, flow);
            if let Some(neighbors) = adjacency.get(&id) {
                for &neighbor in neighbors {
                    if !assigned.contains_key(&neighbor) {
                        stack.push(neighbor);
                    }
                }
            }
        }
    }

    for node in &mut graph.nodes {
        if let Some(&flow) = assigned.get(&node.id) {
            node.flow_id = flow;
        }
    }
}
