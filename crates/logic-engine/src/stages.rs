//! Topological stage scheduling of process nodes
//!
//! A stage is the execution level of a computational node: every
//! process-to-process dependency completes in a strictly earlier stage.
//! Nodes reachable over several paths take the longest-path level, and
//! nodes trapped in a cycle receive no stage at all: they are skipped by
//! scheduled runs and reported through [`unscheduled_process_nodes`].

use std::collections::{HashMap, HashSet, VecDeque};

use crate::registry::NodeRegistry;
use crate::types::{LogicGraph, NodeId};

/// Compute the stage number of every schedulable process node
///
/// Process restriction: a node counts as process when its handler says so
/// for its configuration: statically by category, or dynamically flagged
/// (e.g. a loader configured to execute). Only edges with process nodes on
/// both ends contribute dependencies; paths through non-process nodes do
/// not chain stages.
pub fn compute_stages(graph: &LogicGraph, registry: &NodeRegistry) -> HashMap<NodeId, u32> {
    let process: HashSet<NodeId> = graph
        .nodes
        .iter()
        .filter(|n| {
            registry
                .get(&n.node_type)
                .map(|h| h.acts_as_process(&n.data))
                .unwrap_or(false)
        })
        .map(|n| n.id)
        .collect();

    let mut indegree: HashMap<NodeId, usize> = process.iter().map(|&id| (id, 0)).collect();
    let mut successors: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for edge in &graph.edges {
        if process.contains(&edge.from_node_id) && process.contains(&edge.to_node_id) {
            if let Some(degree) = indegree.get_mut(&edge.to_node_id) {
                *degree += 1;
            }
            successors
                .entry(edge.from_node_id)
                .or_default()
                .push(edge.to_node_id);
        }
    }

    let mut stages: HashMap<NodeId, u32> = HashMap::new();
    let mut queue: VecDeque<NodeId> = VecDeque::new();
    for node in &graph.nodes {
        if indegree.get(&node.id) == Some(&0) {
            stages.insert(node.id, 1);
            queue.push_back(node.id);
        }
    }

    while let Some(current) = queue.pop_front() {
        let current_stage = stages.get(&current).copied().unwrap_or(1);
        if let Some(targets) = successors.get(&current) {
            for &target in targets {
                let level = stages.entry(target).or_insert(0);
                *level = (*level).max(current_stage + 1);
                if let Some(degree) = indegree.get_mut(&target) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(target);
                    }
                }
            }
        }
    }

    // Nodes whose indegree never reached zero sit inside a cycle; their
    // partial levels are discarded.
    stages.retain(|id, _| indegree.get(id) == Some(&0));
    stages
}

/// Process nodes excluded from scheduling (cyclic subgraphs), in node order
pub fn unscheduled_process_nodes(
    graph: &LogicGraph,
    registry: &NodeRegistry,
    stages: &HashMap<NodeId, u32>,
) -> Vec<NodeId> {
    graph
        .nodes
        .iter()
        .filter(|n| {
            registry
                .get(&n.node_type)
                .map(|h| h.acts_as_process(&n.data))
                .unwrap_or(false)
        })
        .filter(|n| !stages.contains_key(&n.id))
        .map(|n| n.id)
        .collect()
}

/// Highest stage number in a schedule, or 0 when nothing is scheduled
pub fn max_stage(stages: &HashMap<NodeId, u32>) -> u32 {
    stages.values().copied().max().unwrap_or(0)
}
